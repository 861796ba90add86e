pub mod appointment;
pub mod enums;
pub mod request;

pub use appointment::*;
pub use enums::*;
pub use request::*;

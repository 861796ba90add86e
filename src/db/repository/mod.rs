//! Repository layer: entity-scoped database operations.
//!
//! `request` owns the negotiable requests and the compare-and-swap write
//! path; `appointment` owns the appointments those requests produce.

mod appointment;
mod request;

pub use appointment::*;
pub use request::*;

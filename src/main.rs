#[tokio::main]
async fn main() {
    if let Err(e) = rendezvous_lib::run().await {
        eprintln!("rendezvous: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = netpoet::run().await {
        eprintln!("netpoet failed to start: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = locutor::cli::run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = jsref_cli::cli::run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

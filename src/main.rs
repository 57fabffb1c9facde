use std::process;
use clap::Parser;

use stock_news_cache::cli::Cli;

#[tokio::main]
async fn main() {
    // NEWS_API_KEY may live in a .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        // invalid input exits 2, everything else 1
        process::exit(if e.is_user_error() { 2 } else { 1 });
    }
}

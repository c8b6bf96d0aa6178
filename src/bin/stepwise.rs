/// Stepwise CLI
///
/// Runs snippets, prints their traces, asks for explanations and serves the
/// HTTP API.
use stepwise::cli;

#[actix_web::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

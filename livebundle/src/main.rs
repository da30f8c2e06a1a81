use clap::Parser;
use livebundle::cli::{run, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout only carries the upload summary.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    // Usage errors exit 1 like every other validation failure; help and version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    tracing::info!("CLI arguments parsed, invoking run");
    if let Err(e) = run(cli).await {
        tracing::error!(error = ?e, "CLI exited with error");
        eprintln!("[ERROR] {e:#}");
        std::process::exit(1);
    }
    tracing::info!("CLI completed successfully");
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod console_host;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `log` records from the library crates are forwarded through the subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    cli::run(cli).await
}

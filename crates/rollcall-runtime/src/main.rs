//! rollcall: live attendance reconciliation runtime binary.
//! Single-process daemon embedding all three ingestion channels, plus
//! CLI subcommands that query it over UDS.

use clap::Parser;

mod cli;
mod client;
mod daemon;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("ROLLCALL_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("rollcall daemon starting");
            daemon::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Status => {
            client::cmd_status(&socket_path).await?;
        }
        cli::Command::Roster { session } => {
            client::cmd_roster(&socket_path, session.as_deref()).await?;
        }
        cli::Command::Json => {
            client::cmd_json(&socket_path).await?;
        }
    }

    Ok(())
}

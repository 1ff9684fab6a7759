//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rollcall", about = "live attendance reconciliation")]
pub struct Cli {
    /// UDS socket path (default: /tmp/rollcall-$USER/rollcalld.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (ingestion loops + UDS server)
    Daemon(DaemonOpts),
    /// Show daemon status summary
    Status,
    /// Show the reconciled roster for a session
    Roster {
        /// Session code; omit to pick the only tracked session
        session: Option<String>,
    },
    /// Dump all session state as JSON
    Json,
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Path to the relay store file written by the companion process
    #[arg(long)]
    pub bridge_store: Option<String>,

    /// UDS socket of the upstream service to poll for snapshots
    #[arg(long)]
    pub upstream_socket: Option<String>,

    /// Pull interval in milliseconds
    #[arg(long, default_value = "2000")]
    pub pull_interval_ms: u64,

    /// Relay store re-read interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub bridge_interval_ms: u64,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/rollcall/rollcalld.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/rollcall-{user}/rollcalld.sock")
}

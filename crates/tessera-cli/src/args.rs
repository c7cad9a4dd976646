use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera CLI for cluster operations", long_about = None)]
pub struct Args {
    /// Controller URL
    #[arg(
        long,
        env = "TESSERA_CONTROLLER_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub controller_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cluster management
    Cluster {
        #[command(subcommand)]
        subcommand: ClusterCommand,
    },
    /// Chat through the controller (streaming)
    Chat {
        /// Model name forwarded to the worker
        #[arg(long)]
        model: Option<String>,
        /// System prompt
        #[arg(long)]
        system: Option<String>,
        /// Send one message and exit instead of starting a session
        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ClusterCommand {
    /// Show nodes and cluster totals
    Status,
    /// Remove a node from the registry
    Remove {
        /// Node ID
        id: String,
    },
}

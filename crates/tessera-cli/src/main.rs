mod args;
mod chat;
mod output;

use anyhow::Result;
use clap::Parser;
use reqwest::Client;

use tessera_common::ClusterSnapshot;

use crate::args::{Args, ClusterCommand, Command};
use crate::output::print_cluster_status;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new();
    let base = args.controller_url.trim_end_matches('/').to_string();

    match args.command {
        Command::Cluster { subcommand } => match subcommand {
            ClusterCommand::Status => {
                let resp = client.get(format!("{base}/cluster/status")).send().await?;
                if resp.status().is_success() {
                    let snapshot: ClusterSnapshot = resp.json().await?;
                    print_cluster_status(snapshot);
                } else {
                    eprintln!("✗ Failed to fetch cluster status: {}", resp.text().await?);
                }
            }
            ClusterCommand::Remove { id } => {
                let resp = client
                    .delete(format!("{base}/cluster/nodes/{id}"))
                    .send()
                    .await?;
                if resp.status().is_success() {
                    println!("✓ Node {id} removed");
                } else {
                    eprintln!("✗ Failed to remove node {id}: {}", resp.text().await?);
                }
            }
        },
        Command::Chat {
            model,
            system,
            message,
        } => {
            chat::run_chat(&client, &base, model, system, message).await?;
        }
    }

    Ok(())
}

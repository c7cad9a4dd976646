use chrono::{DateTime, Utc};

use tessera_common::{ClusterSnapshot, NodeRecord, NodeRole, NodeStatus};

pub fn format_age(last_seen_ms: u64, now_ms: u64) -> String {
    let secs = now_ms.saturating_sub(last_seen_ms) / 1000;
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}

fn format_timestamp(ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_label(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Healthy => "HEALTHY",
        NodeStatus::Degraded => "DEGRADED",
        NodeStatus::Offline => "OFFLINE",
    }
}

fn load_label(node: &NodeRecord) -> String {
    format!(
        "{}/{}",
        node.metrics.active_requests, node.capabilities.cpu_cores
    )
}

pub fn print_cluster_status(snapshot: ClusterSnapshot) {
    let now = tessera_common::now_ms();
    let stats = &snapshot.stats;

    println!("\n=== Tessera Cluster Status ===");
    println!(
        "\n  nodes: {} ({} healthy)   cores: {}   active requests: {}",
        stats.total_nodes, stats.healthy_nodes, stats.total_capacity_cores, stats.active_requests
    );

    println!("\n[Nodes]");
    if snapshot.nodes.is_empty() {
        println!("  (No nodes registered)");
        println!();
        return;
    }

    println!(
        "  {:<32} {:<10} {:<10} {:<24} {:<8} {:<10} {:<20}",
        "Node ID", "Role", "Status", "Address", "Load", "Avg ms", "Last Seen"
    );
    for node in &snapshot.nodes {
        let role = match node.role {
            NodeRole::Controller => "controller",
            NodeRole::Worker => "worker",
        };
        println!(
            "  {:<32} {:<10} {:<10} {:<24} {:<8} {:<10.0} {} ({})",
            node.id,
            role,
            status_label(node.status),
            format!("{}:{}", node.address.host, node.address.port),
            load_label(node),
            node.metrics.avg_response_time_ms,
            format_age(node.last_seen, now),
            format_timestamp(node.last_seen),
        );
    }
    println!();
}

//! Paxon consensus node.
//!
//! Runs one node: it registers with the hub, then serves consensus
//! instances as the hub proposes them.
//!
//! # Usage
//!
//! ```bash
//! paxon-node --port 5011 --hub-host 127.0.0.1 --hub-port 5000 \
//!     --owner node --index 1
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use paxon_node::{init_telemetry, Node, NodeConfig, TelemetryConfig};
use paxon_stack::StackConfig;
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Paxon consensus node.
///
/// Participates in hub-driven uniform consensus instances.
#[derive(Parser, Debug)]
#[command(name = "paxon-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listening port; also this node's identity within the group
    #[arg(long)]
    port: u16,

    /// Hub host
    #[arg(long, default_value = "127.0.0.1")]
    hub_host: String,

    /// Hub port
    #[arg(long, default_value_t = 5000)]
    hub_port: u16,

    /// Owner name used in hub registration
    #[arg(long, default_value = "node")]
    owner: String,

    /// Index under the owner used in hub registration
    #[arg(long)]
    index: u32,

    /// Heartbeat period of the failure detector, in milliseconds
    #[arg(long, default_value_t = 100)]
    heartbeat_ms: u64,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info,paxon=debug")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        log_filter: cli.log_filter.clone(),
    })
    .context("failed to initialize telemetry")?;

    let config = NodeConfig {
        node_port: cli.port,
        hub_host: cli.hub_host,
        hub_port: cli.hub_port,
        owner: cli.owner,
        index: cli.index,
        stack: StackConfig {
            delta: Duration::from_millis(cli.heartbeat_ms),
        },
    };

    let node = Node::new(config);
    tokio::select! {
        result = node.run() => {
            result.context("node failed")?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}

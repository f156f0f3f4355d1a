//! `query`: ask a single node and print what came back

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use meshpulse_collector::Collector;
use meshpulse_core::{InterfaceConfig, Node, RespondConfigBuilder};
use meshpulse_state::Nodes;

/// Cycle period for the query collector; long enough that no cycle completes
const QUERY_INTERVAL: Duration = Duration::from_secs(3600);

pub async fn run(ifname: &str, ip: IpAddr, port: u16, wait: Duration) -> anyhow::Result<()> {
    let nodes = Arc::new(Nodes::new());
    let found = query(ifname, ip, port, wait, nodes).await?;

    if found.is_empty() {
        anyhow::bail!("no reply from {ip} within {wait:?}");
    }
    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}

/// Send one request to `ip` and collect replies for `wait`
pub async fn query(
    ifname: &str,
    ip: IpAddr,
    port: u16,
    wait: Duration,
    nodes: Arc<Nodes>,
) -> anyhow::Result<Vec<Node>> {
    let iface = InterfaceConfig {
        send_no_request: true,
        ..InterfaceConfig::new(ifname)
    };
    let config = RespondConfigBuilder::new()
        .collect_interval(QUERY_INTERVAL)
        .request_port(port)
        .interface(iface)
        .build();

    let mut collector = Collector::new(config, nodes.clone(), None)?;
    let handle = collector.start()?;

    info!(ip = %ip, wait = ?wait, "Sending request");
    handle.send_request(ip).await?;
    tokio::time::sleep(wait).await;
    handle.shutdown().await?;

    Ok(nodes.read().to_vec())
}

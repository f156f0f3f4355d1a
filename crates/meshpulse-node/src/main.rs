//! Meshpulse - respond protocol collector for community mesh networks
//!
//! This binary runs the collector with:
//! - Multicast/unicast polling of mesh nodes over UDP
//! - Node registry with state file, expiry and pruning
//! - Filtered JSON outputs (`nodelist`, `raw`)
//! - Optional SQLite statistics sink and read-only status API

mod query;
mod serve;
mod server;

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use meshpulse_core::DEFAULT_REQUEST_PORT;

#[derive(Parser)]
#[command(name = "meshpulse")]
#[command(about = "Collects telemetry from mesh nodes over the respond protocol")]
#[command(version)]
struct Args {
    /// Enable verbose logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collector daemon
    Serve {
        /// Configuration file
        #[arg(long, short, default_value = "meshpulse.toml")]
        config: PathBuf,
    },
    /// Request data from one node and print it as JSON
    Query {
        /// Interface to send the request from
        ifname: String,
        /// Address of the node
        ip: IpAddr,
        /// Destination port
        #[arg(long, default_value_t = DEFAULT_REQUEST_PORT)]
        port: u16,
        /// How long to wait for replies
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        wait: Duration,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Serve { config } => serve::run(&config).await,
        Command::Query {
            ifname,
            ip,
            port,
            wait,
        } => query::run(&ifname, ip, port, wait).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let args = Args::parse_from(["meshpulse", "query", "br-ffhb", "fe80::1", "--wait", "500ms"]);
        match args.command {
            Command::Query { ifname, ip, port, wait } => {
                assert_eq!(ifname, "br-ffhb");
                assert_eq!(ip, "fe80::1".parse::<IpAddr>().unwrap());
                assert_eq!(port, DEFAULT_REQUEST_PORT);
                assert_eq!(wait, Duration::from_millis(500));
            }
            Command::Serve { .. } => panic!("expected query"),
        }
    }

    #[test]
    fn test_parse_serve_default_config() {
        let args = Args::parse_from(["meshpulse", "-v", "serve"]);
        assert!(args.verbose);
        match args.command {
            Command::Serve { config } => assert_eq!(config, PathBuf::from("meshpulse.toml")),
            Command::Query { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn test_rejects_bad_wait() {
        assert!(Args::try_parse_from(["meshpulse", "query", "lo", "::1", "--wait", "soon"]).is_err());
    }
}

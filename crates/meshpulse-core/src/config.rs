//! Configuration types for the collector
//!
//! This module provides the configuration structures consumed by the
//! collector, the node registry, the output pipeline and the database sink,
//! together with TOML file loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Multicast group used when an interface does not configure one (ff05::2:1001)
pub const DEFAULT_MULTICAST_ADDRESS: IpAddr =
    IpAddr::V6(Ipv6Addr::new(0xff05, 0, 0, 0, 0, 0, 2, 0x1001));

/// UDP port nodes listen on for respond requests
pub const DEFAULT_REQUEST_PORT: u16 = 1001;

/// Default capacity of the receive queue shared by all sockets
pub const DEFAULT_QUEUE_SIZE: usize = 400;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Collector settings
    #[serde(default)]
    pub respondd: RespondConfig,

    /// Registry, state file and output settings
    #[serde(default)]
    pub nodes: NodesConfig,

    /// Persistence sink settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Status API settings
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Parse and validate a configuration from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Check values that cannot be expressed in the type system
    pub fn validate(&self) -> Result<()> {
        self.respondd.validate()?;
        if self.nodes.save_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "nodes.save_interval must be positive".to_string(),
            ));
        }
        if self.database.enable && self.database.url.is_empty() {
            return Err(CoreError::InvalidConfig(
                "database.url is required when the database is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Staleness threshold after which a node is reported offline
    pub fn offline_after(&self) -> Duration {
        self.nodes
            .offline_after
            .unwrap_or(self.respondd.collect_interval * 2)
    }
}

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondConfig {
    /// Whether the collector runs at all
    #[serde(default = "default_enable")]
    pub enable: bool,

    /// Align the first request cycle to a multiple of this duration
    #[serde(with = "humantime_serde::option", default)]
    pub synchronize: Option<Duration>,

    /// Period of the request cycle
    #[serde(with = "humantime_serde", default = "default_collect_interval")]
    pub collect_interval: Duration,

    /// Period of the global statistics aggregation
    #[serde(with = "humantime_serde", default = "default_aggregate_interval")]
    pub aggregate_interval: Duration,

    /// Destination port for requests
    #[serde(default = "default_request_port")]
    pub request_port: u16,

    /// Capacity of the receive queue
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Interfaces to open sockets on
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,

    /// Sites and their domains, scope of the global statistics
    #[serde(default)]
    pub sites: BTreeMap<String, SiteConfig>,
}

fn default_enable() -> bool {
    true
}

fn default_collect_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_aggregate_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_request_port() -> u16 {
    DEFAULT_REQUEST_PORT
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

impl Default for RespondConfig {
    fn default() -> Self {
        Self {
            enable: true,
            synchronize: None,
            collect_interval: default_collect_interval(),
            aggregate_interval: default_aggregate_interval(),
            request_port: DEFAULT_REQUEST_PORT,
            queue_size: DEFAULT_QUEUE_SIZE,
            interfaces: Vec::new(),
            sites: BTreeMap::new(),
        }
    }
}

impl RespondConfig {
    /// Reject intervals the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.collect_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "respondd.collect_interval must be positive".to_string(),
            ));
        }
        if self.aggregate_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "respondd.aggregate_interval must be positive".to_string(),
            ));
        }
        if self.queue_size == 0 {
            return Err(CoreError::InvalidConfig(
                "respondd.queue_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Site name → domain names
    pub fn sites_domains(&self) -> BTreeMap<String, Vec<String>> {
        self.sites
            .iter()
            .map(|(site, config)| (site.clone(), config.domains.clone()))
            .collect()
    }
}

/// One network interface the collector listens and sends on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface name (e.g. br-ffhb)
    pub ifname: String,

    /// Explicit bind address, skips address discovery
    #[serde(default)]
    pub ip_address: Option<IpAddr>,

    /// Listen only, never send requests on this interface
    #[serde(default)]
    pub send_no_request: bool,

    /// Multicast group for requests
    #[serde(default)]
    pub multicast_address: Option<IpAddr>,

    /// Local port to bind (0 = any)
    #[serde(default)]
    pub port: u16,
}

impl InterfaceConfig {
    /// Create an interface config with discovery defaults
    pub fn new(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
            ..Default::default()
        }
    }

    /// Group requests are multicast to
    pub fn multicast_group(&self) -> IpAddr {
        self.multicast_address.unwrap_or(DEFAULT_MULTICAST_ADDRESS)
    }

    /// Whether the bind address should be link-local rather than global
    pub fn wants_link_local(&self) -> bool {
        self.multicast_address.is_none()
    }
}

/// Domains belonging to one site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Domain codes
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Registry and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesConfig {
    /// State file to restore from and save to
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Period of housekeeping and output rendering
    #[serde(with = "humantime_serde", default = "default_save_interval")]
    pub save_interval: Duration,

    /// Staleness threshold (default: twice the collect interval)
    #[serde(with = "humantime_serde::option", default)]
    pub offline_after: Option<Duration>,

    /// Nodes silent for longer than this are removed
    #[serde(with = "humantime_serde", default = "default_prune_after")]
    pub prune_after: Duration,

    /// Output type → list of output configurations
    #[serde(default)]
    pub output: BTreeMap<String, Vec<toml::Value>>,
}

fn default_save_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_prune_after() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            save_interval: default_save_interval(),
            offline_after: None,
            prune_after: default_prune_after(),
            output: BTreeMap::new(),
        }
    }
}

/// Persistence sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Enable the SQLite sink
    #[serde(default)]
    pub enable: bool,

    /// sqlx connection URL (e.g. sqlite:stats.db?mode=rwc)
    #[serde(default)]
    pub url: String,

    /// Rows older than this are deleted
    #[serde(with = "humantime_serde", default = "default_delete_after")]
    pub delete_after: Duration,

    /// Period of the delete sweep
    #[serde(with = "humantime_serde", default = "default_delete_interval")]
    pub delete_interval: Duration,

    /// Pending writes before new ones are dropped
    #[serde(default = "default_write_queue")]
    pub queue_size: usize,
}

fn default_delete_after() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_delete_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_write_queue() -> usize {
    1024
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: String::new(),
            delete_after: default_delete_after(),
            delete_interval: default_delete_interval(),
            queue_size: default_write_queue(),
        }
    }
}

/// Read-only status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Serve the status API
    #[serde(default)]
    pub enable: bool,

    /// Listen address
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_http_listen(),
        }
    }
}

/// Builder for RespondConfig
#[derive(Debug, Default)]
pub struct RespondConfigBuilder {
    config: RespondConfig,
}

impl RespondConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request cycle period
    pub fn collect_interval(mut self, interval: Duration) -> Self {
        self.config.collect_interval = interval;
        self
    }

    /// Set the aggregation period
    pub fn aggregate_interval(mut self, interval: Duration) -> Self {
        self.config.aggregate_interval = interval;
        self
    }

    /// Set the destination port for requests
    pub fn request_port(mut self, port: u16) -> Self {
        self.config.request_port = port;
        self
    }

    /// Add an interface
    pub fn interface(mut self, interface: InterfaceConfig) -> Self {
        self.config.interfaces.push(interface);
        self
    }

    /// Add a site with its domains
    pub fn site(mut self, site: impl Into<String>, domains: &[&str]) -> Self {
        self.config.sites.insert(
            site.into(),
            SiteConfig {
                domains: domains.iter().map(|d| d.to_string()).collect(),
            },
        );
        self
    }

    /// Build the configuration
    pub fn build(self) -> RespondConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = Option::<String>::deserialize(deserializer)?;
            s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

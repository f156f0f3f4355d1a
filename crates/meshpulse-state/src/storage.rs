//! SQLite persistence sink
//!
//! [`SqliteStore`] implements [`Connection`] by queueing writes onto a bounded
//! channel drained by a single writer task. Callers never wait on the
//! database; when the queue is full the write is dropped with a warning.
//! The writer also deletes rows older than `delete_after` every
//! `delete_interval`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use meshpulse_core::{DatabaseConfig, GlobalStats, Link, Node};

use crate::error::{Result, StateError};
use crate::sink::Connection;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS node_stats (
        time INTEGER NOT NULL,
        node_id TEXT NOT NULL,
        hostname TEXT NOT NULL,
        site TEXT NOT NULL,
        domain TEXT NOT NULL,
        online INTEGER NOT NULL,
        clients_total INTEGER NOT NULL,
        clients_wifi24 INTEGER NOT NULL,
        clients_wifi5 INTEGER NOT NULL,
        load REAL NOT NULL,
        uptime REAL NOT NULL,
        rootfs_usage REAL NOT NULL,
        firmware TEXT NOT NULL,
        model TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS node_stats_time ON node_stats (time)",
    "CREATE TABLE IF NOT EXISTS links (
        time INTEGER NOT NULL,
        source_id TEXT NOT NULL,
        source_address TEXT NOT NULL,
        target_id TEXT NOT NULL,
        target_address TEXT NOT NULL,
        tq REAL NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS links_time ON links (time)",
    "CREATE TABLE IF NOT EXISTS globals (
        time INTEGER NOT NULL,
        site TEXT NOT NULL,
        domain TEXT NOT NULL,
        nodes INTEGER NOT NULL,
        gateways INTEGER NOT NULL,
        clients INTEGER NOT NULL,
        clients_wifi INTEGER NOT NULL,
        clients_wifi24 INTEGER NOT NULL,
        clients_wifi5 INTEGER NOT NULL,
        firmwares TEXT NOT NULL,
        models TEXT NOT NULL,
        autoupdater TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS globals_time ON globals (time)",
];

const TABLES: &[&str] = &["node_stats", "links", "globals"];

/// Flattened node measurement
#[derive(Debug, Clone)]
struct NodeRow {
    time: i64,
    node_id: String,
    hostname: String,
    site: String,
    domain: String,
    online: bool,
    clients_total: i64,
    clients_wifi24: i64,
    clients_wifi5: i64,
    load: f64,
    uptime: f64,
    rootfs_usage: f64,
    firmware: String,
    model: String,
}

impl NodeRow {
    /// None when the node has not identified itself yet
    fn from_node(node: &Node) -> Option<Self> {
        let info = node.nodeinfo.as_ref()?;
        let statistics = node.statistics.clone().unwrap_or_default();
        Some(Self {
            time: node.lastseen.timestamp_millis(),
            node_id: info.node_id.clone(),
            hostname: info.hostname.clone(),
            site: info.system.site_code.clone(),
            domain: info.system.domain_code.clone(),
            online: node.online,
            clients_total: i64::from(statistics.clients.total),
            clients_wifi24: i64::from(statistics.clients.wifi24),
            clients_wifi5: i64::from(statistics.clients.wifi5),
            load: statistics.load_average,
            uptime: statistics.uptime,
            rootfs_usage: statistics.rootfs_usage,
            firmware: info.software.firmware.release.clone(),
            model: info.hardware.model.clone(),
        })
    }
}

/// Stored aggregate of one site/domain pair
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GlobalsRow {
    pub time: i64,
    pub site: String,
    pub domain: String,
    pub nodes: i64,
    pub gateways: i64,
    pub clients: i64,
}

enum Write {
    Node(NodeRow),
    Link(Link, DateTime<Utc>),
    Globals(Box<GlobalStats>, DateTime<Utc>, String, String),
    Flush(oneshot::Sender<()>),
}

/// SQLite-backed [`Connection`]
pub struct SqliteStore {
    pool: SqlitePool,
    tx: Mutex<Option<mpsc::Sender<Write>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteStore {
    /// Open the database, create the schema and start the writer task
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StateError::Connection(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let writer = tokio::spawn(run_writer(
            pool.clone(),
            rx,
            config.delete_after,
            config.delete_interval,
        ));

        info!(url = %config.url, "Database sink ready");
        Ok(Self {
            pool,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    fn enqueue(&self, write: Write) {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            debug!("Database sink closed, dropping write");
            return;
        };
        match tx.try_send(write) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Database queue full, dropping write");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Database writer gone, dropping write");
            }
        }
    }

    /// Wait until every write queued so far has been executed
    pub async fn flush(&self) -> Result<()> {
        let tx = self.tx.lock().clone().ok_or(StateError::Closed)?;
        let (done, wait) = oneshot::channel();
        tx.send(Write::Flush(done))
            .await
            .map_err(|_| StateError::Closed)?;
        wait.await.map_err(|_| StateError::Closed)
    }

    /// Drain the queue, stop the writer and close the pool
    pub async fn close(&self) {
        drop(self.tx.lock().take());
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                error!(error = %e, "Database writer panicked");
            }
        }
        self.pool.close().await;
        info!("Database sink closed");
    }

    /// Delete rows older than `cutoff` from every table
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        delete_before(&self.pool, cutoff).await
    }

    /// Number of stored node measurements
    pub async fn node_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM node_stats")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Number of stored links
    pub async fn link_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM links")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Most recent aggregate for a site/domain pair
    pub async fn latest_globals(&self, site: &str, domain: &str) -> Result<Option<GlobalsRow>> {
        Ok(sqlx::query_as::<_, GlobalsRow>(
            "SELECT time, site, domain, nodes, gateways, clients FROM globals
             WHERE site = ? AND domain = ? ORDER BY time DESC LIMIT 1",
        )
        .bind(site)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?)
    }
}

impl Connection for SqliteStore {
    fn insert_node(&self, node: &Node) {
        if let Some(row) = NodeRow::from_node(node) {
            self.enqueue(Write::Node(row));
        }
    }

    fn insert_link(&self, link: &Link, time: DateTime<Utc>) {
        self.enqueue(Write::Link(link.clone(), time));
    }

    fn insert_globals(&self, stats: &GlobalStats, time: DateTime<Utc>, site: &str, domain: &str) {
        self.enqueue(Write::Globals(
            Box::new(stats.clone()),
            time,
            site.to_string(),
            domain.to_string(),
        ));
    }
}

async fn run_writer(
    pool: SqlitePool,
    mut rx: mpsc::Receiver<Write>,
    delete_after: Duration,
    delete_interval: Duration,
) {
    let period = delete_interval.max(Duration::from_secs(1));
    let mut cleanup = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let keep = chrono::Duration::from_std(delete_after).unwrap_or_else(|_| chrono::Duration::days(365));

    loop {
        tokio::select! {
            write = rx.recv() => {
                let Some(write) = write else { break };
                if let Err(e) = execute(&pool, write).await {
                    error!(error = %e, code = e.error_code(), "Database write failed");
                }
            }
            _ = cleanup.tick() => {
                match delete_before(&pool, Utc::now() - keep).await {
                    Ok(0) => {}
                    Ok(rows) => debug!(rows, "Deleted old rows"),
                    Err(e) => error!(error = %e, "Deleting old rows failed"),
                }
            }
        }
    }

    debug!("Database writer stopped");
}

async fn execute(pool: &SqlitePool, write: Write) -> Result<()> {
    match write {
        Write::Node(row) => {
            sqlx::query(
                "INSERT INTO node_stats (time, node_id, hostname, site, domain, online,
                    clients_total, clients_wifi24, clients_wifi5, load, uptime, rootfs_usage,
                    firmware, model)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.time)
            .bind(row.node_id)
            .bind(row.hostname)
            .bind(row.site)
            .bind(row.domain)
            .bind(row.online)
            .bind(row.clients_total)
            .bind(row.clients_wifi24)
            .bind(row.clients_wifi5)
            .bind(row.load)
            .bind(row.uptime)
            .bind(row.rootfs_usage)
            .bind(row.firmware)
            .bind(row.model)
            .execute(pool)
            .await?;
        }
        Write::Link(link, time) => {
            sqlx::query(
                "INSERT INTO links (time, source_id, source_address, target_id, target_address, tq)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(time.timestamp_millis())
            .bind(link.source_id)
            .bind(link.source_address)
            .bind(link.target_id)
            .bind(link.target_address)
            .bind(f64::from(link.tq))
            .execute(pool)
            .await?;
        }
        Write::Globals(stats, time, site, domain) => {
            sqlx::query(
                "INSERT INTO globals (time, site, domain, nodes, gateways, clients,
                    clients_wifi, clients_wifi24, clients_wifi5, firmwares, models, autoupdater)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(time.timestamp_millis())
            .bind(site)
            .bind(domain)
            .bind(i64::from(stats.nodes))
            .bind(i64::from(stats.gateways))
            .bind(i64::from(stats.clients))
            .bind(i64::from(stats.clients_wifi))
            .bind(i64::from(stats.clients_wifi24))
            .bind(i64::from(stats.clients_wifi5))
            .bind(serde_json::to_string(&stats.firmwares)?)
            .bind(serde_json::to_string(&stats.models)?)
            .bind(serde_json::to_string(&stats.autoupdater)?)
            .execute(pool)
            .await?;
        }
        Write::Flush(done) => {
            let _ = done.send(());
        }
    }
    Ok(())
}

async fn delete_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff = cutoff.timestamp_millis();
    let mut deleted = 0;
    for table in TABLES {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE time < ?"))
            .bind(cutoff)
            .execute(pool)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshpulse_core::NodeInfo;

    async fn store(dir: &tempfile::TempDir) -> SqliteStore {
        let config = DatabaseConfig {
            enable: true,
            url: format!("sqlite:{}?mode=rwc", dir.path().join("stats.db").display()),
            ..Default::default()
        };
        SqliteStore::connect(&config).await.unwrap()
    }

    fn node(id: &str) -> Node {
        let mut node = Node::new(Utc::now());
        node.nodeinfo = Some(NodeInfo {
            node_id: id.to_string(),
            hostname: "gw01".to_string(),
            ..Default::default()
        });
        node
    }

    #[tokio::test]
    async fn test_node_and_link_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.insert_node(&node("aabbccddeeff"));
        // nodes without nodeinfo carry nothing worth storing
        store.insert_node(&Node::new(Utc::now()));
        store.insert_link(
            &Link {
                source_id: "aabbccddee01".to_string(),
                source_address: "aa:bb:cc:dd:ee:01".to_string(),
                target_id: "aabbccddee02".to_string(),
                target_address: "aa:bb:cc:dd:ee:02".to_string(),
                tq: 0.5,
            },
            Utc::now(),
        );
        store.flush().await.unwrap();

        assert_eq!(store.node_count().await.unwrap(), 1);
        assert_eq!(store.link_count().await.unwrap(), 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_globals_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let stats = GlobalStats {
            nodes: 3,
            clients: 12,
            ..Default::default()
        };
        store.insert_globals(&stats, Utc::now(), "ffhb", "city");
        store.flush().await.unwrap();

        let row = store.latest_globals("ffhb", "city").await.unwrap().unwrap();
        assert_eq!((row.nodes, row.clients), (3, 12));
        assert!(store.latest_globals("ffhb", "rural").await.unwrap().is_none());
        store.close().await;
    }

    #[tokio::test]
    async fn test_delete_before() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let old = Utc::now() - chrono::Duration::days(30);
        store.insert_globals(&GlobalStats::default(), old, "ffhb", "city");
        store.insert_globals(&GlobalStats::default(), Utc::now(), "ffhb", "city");
        store.flush().await.unwrap();

        let deleted = store
            .delete_before(Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_writes_after_close_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.close().await;

        store.insert_node(&node("aabbccddeeff"));
        assert!(matches!(store.flush().await, Err(StateError::Closed)));
    }
}

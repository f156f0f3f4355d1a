//! Collector assembly and lifecycle
//!
//! [`Collector`] opens the sockets; [`Collector::start`] spawns the
//! receivers, the decoder, the scheduler and (with a sink) the aggregator,
//! and returns a [`CollectorHandle`] that owns them until shutdown.

use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use meshpulse_core::RespondConfig;
use meshpulse_state::{Connection, Nodes};

use crate::aggregator::Aggregator;
use crate::decoder::Decoder;
use crate::error::{CollectorError, Result};
use crate::interface::Interface;
use crate::receiver::spawn_receiver;
use crate::scheduler::Scheduler;

/// Respond protocol collector
pub struct Collector {
    config: RespondConfig,
    nodes: Arc<Nodes>,
    sink: Option<Arc<dyn Connection>>,
    interfaces: Arc<Vec<Interface>>,
    started: bool,
}

impl Collector {
    /// Validate `config` and open one socket per interface.
    ///
    /// Fails if any interface has no usable address.
    pub fn new(
        config: RespondConfig,
        nodes: Arc<Nodes>,
        sink: Option<Arc<dyn Connection>>,
    ) -> Result<Self> {
        config.validate()?;
        let interfaces = config
            .interfaces
            .iter()
            .map(Interface::open)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            nodes,
            sink,
            interfaces: Arc::new(interfaces),
            started: false,
        })
    }

    /// Opened sockets in configuration order
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Spawn every collector task. May only be called once.
    pub fn start(&mut self) -> Result<CollectorHandle> {
        if self.started {
            return Err(CollectorError::AlreadyStarted);
        }
        self.started = true;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_size);
        let mut tasks = Vec::new();

        for iface in self.interfaces.iter() {
            tasks.push(spawn_receiver(
                iface.ifname.clone(),
                iface.socket.clone(),
                queue_tx.clone(),
                shutdown_rx.clone(),
            ));
        }
        drop(queue_tx);

        tasks.push(
            Decoder::new(self.nodes.clone(), self.sink.clone()).spawn(queue_rx, shutdown_rx.clone()),
        );

        let scheduler = Scheduler::new(
            self.interfaces.clone(),
            self.nodes.clone(),
            self.config.collect_interval,
            self.config.request_port,
            self.config.synchronize,
        );
        tasks.push(scheduler.clone().spawn(shutdown_rx.clone()));

        match &self.sink {
            Some(sink) => tasks.push(
                Aggregator::new(
                    self.nodes.clone(),
                    sink.clone(),
                    self.config.sites_domains(),
                    self.config.aggregate_interval,
                )
                .spawn(shutdown_rx),
            ),
            None => debug!("No database sink, global stats disabled"),
        }

        info!(
            interfaces = self.interfaces.len(),
            interval = ?self.config.collect_interval,
            "Collector started"
        );

        Ok(CollectorHandle {
            shutdown,
            tasks,
            scheduler,
            interfaces: self.interfaces.clone(),
            nodes: self.nodes.clone(),
        })
    }
}

/// Handle for a running collector
pub struct CollectorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    scheduler: Scheduler,
    interfaces: Arc<Vec<Interface>>,
    nodes: Arc<Nodes>,
}

impl CollectorHandle {
    /// The registry the collector writes to
    pub fn nodes(&self) -> &Arc<Nodes> {
        &self.nodes
    }

    /// Opened sockets in configuration order
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Send a request to `ip` on the first socket
    pub async fn send_request(&self, ip: IpAddr) -> Result<()> {
        self.scheduler.send_request_via(0, ip).await
    }

    /// Send a request to `ip` on the socket at `index`
    pub async fn send_request_via(&self, index: usize, ip: IpAddr) -> Result<()> {
        self.scheduler.send_request_via(index, ip).await
    }

    /// Signal every task to stop and wait for all of them.
    ///
    /// Datagrams still queued are abandoned.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);

        let mut failure = None;
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Collector task failed");
                failure.get_or_insert(CollectorError::Task(e.to_string()));
            }
        }

        info!("Collector stopped");
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

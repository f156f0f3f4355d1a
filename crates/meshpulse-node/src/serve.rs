//! `serve`: run the collector with housekeeping, outputs, sink and status API

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use meshpulse_collector::Collector;
use meshpulse_core::Config;
use meshpulse_output::{OutputSet, OutputWorker};
use meshpulse_state::{Connection, Housekeeping, Nodes, SqliteStore};

use crate::server::{self, AppState};

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let nodes = Arc::new(match &config.nodes.state_path {
        Some(path) => Nodes::load(path)
            .with_context(|| format!("restoring state from {}", path.display()))?,
        None => Nodes::new(),
    });
    info!(nodes = nodes.len(), "Registry ready");

    let store = if config.database.enable {
        let store = SqliteStore::connect(&config.database)
            .await
            .context("opening database")?;
        info!(url = %config.database.url, "Database sink enabled");
        Some(Arc::new(store))
    } else {
        None
    };
    let sink = store.clone().map(|store| store as Arc<dyn Connection>);

    // Outputs are built up front so configuration errors abort startup
    let outputs = OutputSet::from_config(&config.nodes.output).context("configuring outputs")?;

    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    workers.push(
        Housekeeping::new(
            nodes.clone(),
            config.nodes.state_path.clone(),
            config.nodes.save_interval,
            config.offline_after(),
            config.nodes.prune_after,
        )
        .spawn(shutdown_rx.clone()),
    );

    if outputs.is_empty() {
        info!("No outputs configured");
    } else {
        workers.push(
            OutputWorker::new(nodes.clone(), outputs, config.nodes.save_interval)
                .spawn(shutdown_rx.clone()),
        );
    }

    let collector = if config.respondd.enable {
        let mut collector = Collector::new(config.respondd.clone(), nodes.clone(), sink)
            .context("opening collector sockets")?;
        Some(collector.start()?)
    } else {
        warn!("Collector disabled, serving restored state only");
        None
    };

    if config.http.enable {
        let listener = tokio::net::TcpListener::bind(config.http.listen)
            .await
            .with_context(|| format!("binding status API to {}", config.http.listen))?;
        info!(address = %listener.local_addr()?, "Status API listening");

        let app = server::create_router(Arc::new(AppState::new(
            nodes.clone(),
            config.respondd.sites_domains(),
        )));
        let mut stop = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = stop.changed().await;
            });
            if let Err(e) = serve.await {
                error!(error = %e, "Status API failed");
            }
        }));
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down");

    if let Some(collector) = collector {
        if let Err(e) = collector.shutdown().await {
            error!(error = %e, "Collector shutdown failed");
        }
    }
    let _ = shutdown.send(true);
    for result in futures::future::join_all(workers).await {
        if let Err(e) = result {
            error!(error = %e, "Worker failed");
        }
    }
    if let Some(store) = store {
        store.close().await;
    }

    info!("Stopped");
    Ok(())
}

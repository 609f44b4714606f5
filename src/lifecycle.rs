//! Server lifecycle management helpers.
//!
//! Encapsulates startup and shutdown: bootstrapping the meta service,
//! wiring the two HTTP servers (the node API and the Raft RPC listener),
//! and coordinating graceful shutdown.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use log::info;
use xuandb_commons::Config;
use xuandb_meta::{http as meta_http, MetaService};

/// Application components shared across the HTTP servers and shutdown
/// handling.
pub struct Components {
    pub meta: Arc<MetaService>,
}

/// Start the services this node is configured to run.
pub async fn bootstrap(config: &Config, node_id: u64) -> Result<Components> {
    let meta = MetaService::start(config.clone(), node_id)
        .await
        .context("failed to start meta service")?;
    info!("meta service started");

    Ok(Components { meta })
}

/// Run the HTTP servers until a termination signal, then tear down.
pub async fn run(config: &Config, node_id: u64, components: Components) -> Result<()> {
    let node_cfg = config
        .node(node_id)
        .context("node is not in the configuration")?;
    let meta = components.meta;
    let voter = node_cfg.meta.raft_voter;
    let data = web::Data::from(meta.clone());

    let api_data = data.clone();
    let api_server = HttpServer::new(move || {
        App::new()
            .app_data(api_data.clone())
            .configure(|cfg| meta_http::configure_api(cfg, voter))
    })
    .bind(&node_cfg.http_addr)
    .with_context(|| format!("failed to bind {}", node_cfg.http_addr))?
    .shutdown_timeout(10)
    .run();

    let raft_data = data.clone();
    let raft_server = HttpServer::new(move || {
        App::new()
            .app_data(raft_data.clone())
            .configure(meta_http::configure_raft)
    })
    .bind(&node_cfg.meta.raft_addr)
    .with_context(|| format!("failed to bind {}", node_cfg.meta.raft_addr))?
    .shutdown_timeout(10)
    .run();

    info!(
        "listening: http on {}, raft on {}",
        node_cfg.http_addr, node_cfg.meta.raft_addr
    );

    // with the listeners up, the node can negotiate its way into the
    // cluster (join, bootstrap, or wait to be added)
    meta.begin_membership();

    // both servers stop on the termination signal
    let (api_result, raft_result) = tokio::join!(api_server, raft_server);

    meta.shutdown().await;

    api_result.context("http api server failed")?;
    raft_result.context("raft rpc server failed")?;
    Ok(())
}

//! XuanDB server entrypoint.
//!
//! The heavy lifting (service startup, HTTP server wiring, graceful
//! shutdown) lives in dedicated modules so this file remains a thin
//! orchestrator.

mod lifecycle;
mod logging;

use anyhow::{bail, Context, Result};
use log::info;
use std::env;
use xuandb_commons::Config;

struct Args {
    config: String,
    node_id: Option<u64>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: "config.toml".to_string(),
        node_id: None,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = iter.next().context("--config requires a path")?;
            }
            "--node-id" | "-n" => {
                let v = iter.next().context("--node-id requires a value")?;
                args.node_id = Some(v.parse().context("--node-id must be an integer")?);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;

    let node_id = match args.node_id {
        Some(id) => id,
        None => env::var("XUAND_NODE_ID")
            .context("--node-id or XUAND_NODE_ID is required")?
            .parse()
            .context("XUAND_NODE_ID must be an integer")?,
    };

    // Logging before any other side effects.
    logging::init_logging(&config.log)?;

    info!("XuanDB v{} starting", env!("CARGO_PKG_VERSION"));
    info!("cluster: {}  node: {}", config.cluster_name, node_id);

    let components = lifecycle::bootstrap(&config, node_id).await?;
    lifecycle::run(&config, node_id, components).await
}

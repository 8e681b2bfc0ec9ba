//! meshkv-node: entry point for a cluster node.
//!
//! Loads config, joins the peer mesh, then serves the HTTP API and
//! optional metrics endpoint until interrupted.

use meshkv_net::TlsContext;
use meshkv_server::{Config, Server};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    meshkv_metrics::init_tracing();

    // Load config: first CLI arg is the YAML config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config =
        meshkv_config::load_from_file(std::path::Path::new(&config_path)).unwrap_or_else(|e| {
            tracing::warn!(
                "failed to load config from {}: {}, using defaults",
                config_path,
                e
            );
            // Minimal default: a single node on 127.0.0.1:2373
            meshkv_config::load_from_str("listen: \"127.0.0.1:2373\"\nneighbors: []\n")
                .expect("hardcoded default config must parse")
        });

    let tls = match &config.tls {
        Some(files) => Some(TlsContext::from_files(&files.cert_file, &files.key_file)?),
        None => None,
    };

    let server = Server::new(Config {
        local_addr: config.listen.clone(),
        neighbors: config.neighbors.clone(),
        partitions: config.cluster.partitions,
        dial_retries: config.cluster.dial_retries,
        tls,
    });

    tracing::info!(
        "node {} joining cluster of {} neighbor(s)",
        server.id(),
        config.neighbors.len()
    );
    server.start().await?;

    // Spawn metrics HTTP server if configured
    if let Some(metrics_port) = config.metrics_port {
        let metrics_addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
            .parse()
            .expect("valid metrics address");
        tokio::spawn(async move {
            if let Err(e) = meshkv_metrics::serve_metrics(metrics_addr).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    // Serve with graceful shutdown on Ctrl+C
    match config.rest_listen.as_deref() {
        Some(rest_addr) => {
            tokio::select! {
                result = meshkv_rest::serve(rest_addr, server.clone()) => {
                    result?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received Ctrl+C, shutting down");
                }
            }
        }
        None => {
            tracing::info!("http api disabled, serving peers only");
            tokio::signal::ctrl_c().await?;
            tracing::info!("received Ctrl+C, shutting down");
        }
    }

    server.stop().await;
    Ok(())
}

use anyhow::{Context, Result};
use gateway_core::{DataServices, MemoryStore};
use gateway_proxy::{Ed25519Signer, EndpointRegistry, ProxyFactory, ProxyMetrics, TimeoutPolicy};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::tokio::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod router;

use config::GatewayConfig;
use router::Router;

const LOG_FORMAT_ENV: &str = "GATEWAY_LOG_FORMAT";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting console-gateway...");

    let config = GatewayConfig::from_env()?;
    info!("Configuration loaded with {} endpoints", config.endpoints.len());

    // Seed the in-memory stores
    let store = Arc::new(MemoryStore::new());
    config.seed.load_into(&store).await;
    info!(
        "Memory store initialized with {} resource controls",
        store.resource_control_count().await
    );

    let signer = match config.signature_seed()? {
        Some(seed) => Ed25519Signer::from_hex(&seed).context("invalid signature key")?,
        None => {
            warn!("No signature key configured - generating an ephemeral key");
            Ed25519Signer::generate()
        }
    };
    info!("Signature key loaded (fingerprint {})", signer.fingerprint());

    let metrics = ProxyMetrics::new().context("failed to create metrics registry")?;
    info!("Metrics registry initialized");

    let factory = ProxyFactory::new(DataServices::from_store(store.clone()), metrics.clone())
        .with_signer(Arc::new(signer))
        .with_timeout(TimeoutPolicy {
            request_timeout: config.request_timeout(),
        });
    info!("Proxy factory initialized with {:?} timeout", config.request_timeout());

    let registry = Arc::new(EndpointRegistry::new());
    for endpoint in &config.endpoints {
        if let Err(e) = registry.configure(&factory, endpoint).await {
            warn!("Skipping endpoint {} ({}): {}", endpoint.id, endpoint.name, e);
        }
    }
    info!("{} endpoints registered", registry.len().await);

    let router = Arc::new(Router::new(registry, metrics));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!("HTTP server listening on {}", config.listen);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let router = router.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let router = router.clone();
                async move { Ok::<_, Infallible>(router.handle(req).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving connection from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Install the global subscriber; `GATEWAY_LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

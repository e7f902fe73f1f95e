//! Offline Cache Worker
//!
//! Runs the worker as a local caching proxy in front of an application
//! origin, with health and metrics endpoints alongside.
//!
//! ```text
//!   client ──► proxy (:8088) ──► worker ──► origin
//!                                  │
//!                      cache namespaces (memory | disk)
//!
//!   health  (:8081)  /healthz /readyz
//!   metrics (:8080)  /metrics
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use offline_cache_worker::{
    CacheEvent, CacheStoreRef, DiskCacheStore, Error, HttpNetworkClient,
    LoggingNotificationSurface, MemoryCacheStore, NamespaceName, OfflineWorker, ProxyServer,
    ProxyServerConfig, Result, StorageBackend, WorkerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Offline Cache Worker - request-interception cache with versioned namespaces
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "WORKER_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream application origin (overrides the config file)
    #[arg(long, env = "ORIGIN")]
    origin: Option<String>,

    /// Deploy version tag (overrides the config file)
    #[arg(long, env = "CACHE_VERSION")]
    version_tag: Option<String>,

    /// API network timeout in milliseconds (overrides the config file)
    #[arg(long, env = "API_TIMEOUT_MS")]
    api_timeout_ms: Option<u64>,

    /// Cache storage backend (memory, disk)
    #[arg(long, env = "CACHE_STORAGE")]
    storage: Option<String>,

    /// Root directory of the disk cache (implies --storage disk)
    #[arg(long, env = "CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Proxy bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8088")]
    listen_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = load_config(&args)?;

    info!("Starting Offline Cache Worker");
    info!("  Version: {}", offline_cache_worker::VERSION);
    info!("  Cache version tag: {}", config.version_tag);
    info!("  Origin: {}", config.origin);
    info!("  Proxy: {}", args.listen_addr);
    info!("  Storage: {:?}", config.storage.backend);

    let store: CacheStoreRef = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryCacheStore::new()),
        StorageBackend::Disk => {
            Arc::new(DiskCacheStore::with_config(config.storage.disk.clone()).await?)
        }
    };
    let network = Arc::new(HttpNetworkClient::with_config(config.network.clone())?);
    let worker = Arc::new(OfflineWorker::new(
        config,
        store,
        network,
        Arc::new(LoggingNotificationSurface::new()),
    )?);

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_worker = worker.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_worker).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_worker = worker.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_worker).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Bring the worker up
    worker.install().await?;
    let report = worker.activate().await?;
    info!(
        "Worker active, collected {} stale namespace(s)",
        report.deleted.len()
    );

    let proxy_config = ProxyServerConfig {
        addr: args
            .listen_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid listen address: {}", e)))?,
        ..Default::default()
    };
    let proxy = Arc::new(ProxyServer::new(proxy_config, worker.clone()));

    let signal_proxy = proxy.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_proxy.shutdown();
        }
    });

    proxy.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> Result<WorkerConfig> {
    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_yaml_file(path)?,
        None => WorkerConfig::default(),
    };

    if let Some(origin) = &args.origin {
        config.origin = origin.clone();
    }
    if let Some(tag) = &args.version_tag {
        config.version_tag = tag.clone();
    }
    if let Some(ms) = args.api_timeout_ms {
        config.routes.api_timeout_ms = ms;
    }
    if let Some(storage) = &args.storage {
        config.storage.backend = match storage.to_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "disk" => StorageBackend::Disk,
            other => {
                return Err(Error::Configuration(format!(
                    "Unknown storage backend {}. Use 'memory' or 'disk'",
                    other
                )))
            }
        };
    }
    if let Some(dir) = &args.cache_dir {
        config.storage.backend = StorageBackend::Disk;
        config.storage.disk.root_path = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "tower_http=info", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, worker: Arc<OfflineWorker>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let worker = worker.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let worker = worker.clone();
                async move {
                    let (status, body) = match req.uri().path() {
                        "/healthz" | "/livez" => (StatusCode::OK, "ok"),
                        "/readyz" if worker.is_active() => (StatusCode::OK, "ok"),
                        "/readyz" => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
                        _ => (StatusCode::NOT_FOUND, "not found"),
                    };
                    let mut response = Response::new(Body::from(body));
                    *response.status_mut() = status;
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, worker: Arc<OfflineWorker>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let metric_err =
        |e: prometheus::Error| Error::Internal(format!("Metric registration failed: {}", e));

    let lookups = prometheus::register_int_gauge_vec!(
        "offline_cache_lookups",
        "Cache lookups by namespace and result",
        &["namespace", "result"]
    )
    .map_err(metric_err)?;
    let writes = prometheus::register_int_gauge_vec!(
        "offline_cache_writes",
        "Write-through outcomes by namespace",
        &["namespace", "outcome"]
    )
    .map_err(metric_err)?;
    let fallbacks = prometheus::register_int_gauge!(
        "offline_cache_offline_fallbacks",
        "Synthetic offline responses served"
    )
    .map_err(metric_err)?;
    let passthrough = prometheus::register_int_gauge!(
        "offline_cache_passthrough_requests",
        "Requests forwarded without cache involvement"
    )
    .map_err(metric_err)?;
    let events = prometheus::register_int_counter_vec!(
        "offline_cache_events_total",
        "Cache events by kind",
        &["kind"]
    )
    .map_err(metric_err)?;

    // Count cache events as they happen
    let mut rx = worker.subscribe();
    let event_counter = events.clone();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match rx.recv().await {
                Ok(event) => event_counter.with_label_values(&[event_kind(&event)]).inc(),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let make_svc = make_service_fn(move |_conn| {
        let worker = worker.clone();
        let lookups = lookups.clone();
        let writes = writes.clone();
        let fallbacks = fallbacks.clone();
        let passthrough = passthrough.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let worker = worker.clone();
                let lookups = lookups.clone();
                let writes = writes.clone();
                let fallbacks = fallbacks.clone();
                let passthrough = passthrough.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => {
                            let stats = worker.dispatcher().stats();
                            for name in NamespaceName::ALL {
                                let ns = stats.namespace(name);
                                let label = name.as_str();
                                lookups.with_label_values(&[label, "hit"]).set(ns.hits as i64);
                                lookups.with_label_values(&[label, "miss"]).set(ns.misses as i64);
                                lookups
                                    .with_label_values(&[label, "stale"])
                                    .set(ns.stale_served as i64);
                                writes.with_label_values(&[label, "stored"]).set(ns.writes as i64);
                                writes
                                    .with_label_values(&[label, "skipped"])
                                    .set(ns.skipped_writes as i64);
                                writes
                                    .with_label_values(&[label, "failed"])
                                    .set(ns.write_failures as i64);
                            }
                            fallbacks.set(stats.offline_fallbacks as i64);
                            passthrough.set(stats.passthrough as i64);

                            let encoder = TextEncoder::new();
                            let mut buffer = Vec::new();
                            match encoder.encode(&prometheus::gather(), &mut buffer) {
                                Ok(()) => {
                                    let mut response = Response::new(Body::from(buffer));
                                    if let Ok(value) = encoder.format_type().parse() {
                                        response.headers_mut().insert("content-type", value);
                                    }
                                    response
                                }
                                Err(e) => {
                                    let mut response = Response::new(Body::from(e.to_string()));
                                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                    response
                                }
                            }
                        }
                        _ => {
                            let mut response = Response::new(Body::from("not found"));
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            response
                        }
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}

fn event_kind(event: &CacheEvent) -> &'static str {
    match event {
        CacheEvent::Put { .. } => "put",
        CacheEvent::Hit { .. } => "hit",
        CacheEvent::Miss { .. } => "miss",
        CacheEvent::WriteSkipped { .. } => "write_skipped",
        CacheEvent::WriteFailed { .. } => "write_failed",
        CacheEvent::Fallback { .. } => "fallback",
        CacheEvent::NamespaceOpened { .. } => "namespace_opened",
        CacheEvent::NamespaceDeleted { .. } => "namespace_deleted",
    }
}

//! ShopGuard Demo
//!
//! Wires the guard components over the in-memory adapters and drives them
//! the way production traffic would.
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Seed shops  │──▶│ Filter        │──▶│  Read storm  │──▶│  Flash sale  │
//! │  & voucher   │   │ bootstrap     │   │  (hot keys)  │   │  (N buyers)  │
//! └──────────────┘   └───────────────┘   └──────────────┘   └──────────────┘
//!                                                                  │
//!                                         optional: /metrics, /healthz, /readyz
//! ```

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shopguard::adapters::{
    CompositeEventPublisher, InMemoryKvStore, InMemoryOrderRepository, InMemoryShopRepository,
    InMemoryShopTypeRepository, InMemoryVoucherRepository, LoggingEventPublisher,
};
use shopguard::cache::{CacheMetrics, LookupOutcome, RebuildStrategy};
use shopguard::clock::SystemClock;
use shopguard::config::GuardConfig;
use shopguard::domain::model::{BuyerId, SeckillVoucher, Shop, ShopId, ShopType, VoucherId};
use shopguard::domain::ports::EventPublisher;
use shopguard::monitoring::{MetricsExporter, StoreHealthCheck};
use shopguard::seckill::{AdmissionMetrics, AdmissionOutcome, InventoryAdmissionController};
use shopguard::service::{FilterBootstrap, ShopService, ShopTypeService};
use shopguard::{DistributedLock, ExistenceFilter, IdGenerator};

const VOUCHER: VoucherId = VoucherId(1);

// =============================================================================
// CLI Arguments
// =============================================================================

/// ShopGuard - cache protection and flash-sale admission demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "SHOPGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Key namespace in the shared store
    #[arg(long, env = "SHOPGUARD_NAMESPACE")]
    namespace: Option<String>,

    /// Cache rebuild strategy (pass_through, mutex, logical_expiration)
    #[arg(long, env = "SHOPGUARD_STRATEGY")]
    strategy: Option<RebuildStrategy>,

    /// Number of shops to seed
    #[arg(long, env = "SHOPGUARD_SHOPS", default_value = "200")]
    shops: u64,

    /// Hot shops hammered by the read storm
    #[arg(long, env = "SHOPGUARD_HOT_SHOPS", default_value = "5")]
    hot_shops: u64,

    /// Concurrent reads in the storm
    #[arg(long, env = "SHOPGUARD_READS", default_value = "2000")]
    reads: u64,

    /// Simulated database latency per point lookup (milliseconds)
    #[arg(long, env = "SHOPGUARD_DB_LATENCY_MS", default_value = "20")]
    db_latency_ms: u64,

    /// Voucher stock for the flash sale
    #[arg(long, env = "SHOPGUARD_STOCK", default_value = "100")]
    stock: u32,

    /// Distinct buyers competing in the flash sale
    #[arg(long, env = "SHOPGUARD_BUYERS", default_value = "1000")]
    buyers: u64,

    /// Keep serving metrics and health endpoints after the simulation
    #[arg(long, env = "SHOPGUARD_SERVE")]
    serve: bool,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

/// Everything the simulations need, wired once.
struct Demo {
    store: Arc<InMemoryKvStore>,
    shop_repo: Arc<InMemoryShopRepository>,
    orders: Arc<InMemoryOrderRepository>,
    vouchers: Arc<InMemoryVoucherRepository>,
    shops: Arc<ShopService>,
    shop_types: ShopTypeService,
    admission: Arc<InventoryAdmissionController>,
    filter: Arc<ExistenceFilter>,
    cache_metrics: Arc<CacheMetrics>,
    admission_metrics: Arc<AdmissionMetrics>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    info!("Starting ShopGuard demo");
    info!("  Strategy: {}", config.cache.strategy);
    info!(
        "  Namespace: {}",
        config.keyspace.namespace.as_deref().unwrap_or("<none>")
    );
    info!("  Shops: {} ({} hot)", args.shops, args.hot_shops);
    info!("  Flash sale: {} stock, {} buyers", args.stock, args.buyers);

    let demo = build(&args, &config).await?;

    run_read_storm(&demo, &args, &config).await?;
    run_category_reads(&demo).await?;
    run_flash_sale(&demo, &args).await?;

    let kv = demo.store.stats();
    info!(
        keys = kv.keys,
        reads = kv.reads,
        writes = kv.writes,
        deletes = kv.deletes,
        "Shared store activity"
    );

    if args.serve {
        serve(&demo, &args).await?;
    }

    info!("ShopGuard demo complete");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<GuardConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            GuardConfig::from_yaml_str(&yaml)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => GuardConfig::default(),
    };

    if let Some(namespace) = &args.namespace {
        config.keyspace.namespace = Some(namespace.clone());
    }
    if let Some(strategy) = args.strategy {
        config.cache.strategy = strategy;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn build(args: &Args, config: &GuardConfig) -> anyhow::Result<Demo> {
    let store = Arc::new(InMemoryKvStore::new());
    let shop_repo = Arc::new(InMemoryShopRepository::with_shops(
        (1..=args.shops).map(|i| Shop::new(i, format!("Shop #{}", i), i % 6 + 1)),
    ));
    shop_repo.set_latency(Some(Duration::from_millis(args.db_latency_ms)));
    let type_repo = Arc::new(InMemoryShopTypeRepository::with_types(
        ["Food", "KTV", "Beauty", "Fitness", "Massage", "Kids"]
            .iter()
            .enumerate()
            .map(|(i, name)| ShopType {
                id: i as u64 + 1,
                name: name.to_string(),
                icon: format!("/types/{}.png", i + 1),
                sort: (6 - i) as i32,
            })
            .collect(),
    ));
    let now = Utc::now();
    let vouchers = Arc::new(InMemoryVoucherRepository::with_vouchers([SeckillVoucher {
        voucher_id: VOUCHER,
        stock: args.stock,
        begin_time: now - chrono::Duration::minutes(1),
        end_time: now + chrono::Duration::hours(1),
    }]));
    let orders = Arc::new(InMemoryOrderRepository::new());

    let events: Arc<dyn EventPublisher> =
        Arc::new(CompositeEventPublisher::new().with_publisher(LoggingEventPublisher::new()));
    let clock = Arc::new(SystemClock);
    let locks = Arc::new(DistributedLock::new(store.clone(), config.keyspace.clone()));
    let filter = Arc::new(ExistenceFilter::new(
        store.clone(),
        config.keyspace.clone(),
        config.filter.sizing()?,
    ));
    let ids = Arc::new(IdGenerator::new(
        store.clone(),
        clock.clone(),
        config.keyspace.clone(),
    ));
    let cache_metrics = Arc::new(CacheMetrics::new());
    let admission_metrics = Arc::new(AdmissionMetrics::new());

    FilterBootstrap::new(shop_repo.clone(), filter.clone())
        .with_events(events.clone())
        .run()
        .await
        .context("bootstrapping the shop filter")?;

    let shops = ShopService::new(
        shop_repo.clone(),
        store.clone(),
        locks.clone(),
        filter.clone(),
        config,
    )
    .with_clock(clock.clone())
    .with_events(events.clone())
    .with_metrics(cache_metrics.clone());

    let shop_types = ShopTypeService::new(store.clone(), type_repo, config);

    let admission = InventoryAdmissionController::new(
        vouchers.clone(),
        orders.clone(),
        locks,
        ids,
        config.seckill.clone(),
    )
    .with_clock(clock)
    .with_events(events)
    .with_metrics(admission_metrics.clone());

    Ok(Demo {
        store,
        shop_repo,
        orders,
        vouchers,
        shops: Arc::new(shops),
        shop_types,
        admission: Arc::new(admission),
        filter,
        cache_metrics,
        admission_metrics,
    })
}

// =============================================================================
// Simulations
// =============================================================================

async fn run_read_storm(demo: &Demo, args: &Args, config: &GuardConfig) -> anyhow::Result<()> {
    if config.cache.strategy == RebuildStrategy::LogicalExpiration {
        for id in 1..=args.hot_shops {
            demo.shops
                .cache()
                .warm_up(&ShopId(id), config.cache.logical_ttl())
                .await?;
        }
        info!(hot_shops = args.hot_shops, "Hot shops warmed up");
    }

    let before = demo.shop_repo.lookup_count();
    let started = Instant::now();
    let hot = args.hot_shops.max(1);

    let handles: Vec<_> = (0..args.reads)
        .map(|i| {
            let shops = demo.shops.clone();
            // Every tenth read asks for a shop that was never created.
            let id = if i % 10 == 9 {
                ShopId(args.shops + 1_000 + i)
            } else {
                ShopId(i % hot + 1)
            };
            tokio::spawn(async move { shops.query_by_id(id).await })
        })
        .collect();

    let mut tally: BTreeMap<&'static str, u64> = BTreeMap::new();
    for joined in futures::future::join_all(handles).await {
        let label = match joined.context("read task panicked")? {
            Ok(LookupOutcome::Hit(_)) => "hit",
            Ok(LookupOutcome::Absent(reason)) => reason.as_str(),
            Err(e) => {
                warn!(error = %e, "Lookup failed");
                "error"
            }
        };
        *tally.entry(label).or_default() += 1;
    }
    demo.shops.cache().wait_background().await;

    info!(
        reads = args.reads,
        outcomes = ?tally,
        db_lookups = demo.shop_repo.lookup_count() - before,
        elapsed_ms = started.elapsed().as_millis() as u64,
        hit_ratio = demo.cache_metrics.hit_ratio(),
        "Read storm finished"
    );
    Ok(())
}

async fn run_category_reads(demo: &Demo) -> anyhow::Result<()> {
    let types = demo.shop_types.list().await?;
    let again = demo.shop_types.list().await?;
    info!(
        categories = types.len(),
        first = types.first().map(|t| t.name.as_str()).unwrap_or("-"),
        consistent = types == again,
        "Category list served"
    );
    Ok(())
}

async fn run_flash_sale(demo: &Demo, args: &Args) -> anyhow::Result<()> {
    let started = Instant::now();

    let mut handles = Vec::new();
    for buyer in 1..=args.buyers {
        let admission = demo.admission.clone();
        handles.push(tokio::spawn(async move {
            admission.admit(VOUCHER, Some(BuyerId(buyer))).await
        }));
        // A slice of buyers double-click.
        if buyer % 50 == 0 {
            let admission = demo.admission.clone();
            handles.push(tokio::spawn(async move {
                admission.admit(VOUCHER, Some(BuyerId(buyer))).await
            }));
        }
    }
    let anonymous = demo.admission.clone();
    handles.push(tokio::spawn(async move { anonymous.admit(VOUCHER, None).await }));

    let mut tally: BTreeMap<&'static str, u64> = BTreeMap::new();
    for joined in futures::future::join_all(handles).await {
        let label = match joined.context("admission task panicked")? {
            Ok(AdmissionOutcome::Admitted(_)) => "admitted",
            Ok(AdmissionOutcome::Rejected(reason)) => reason.as_str(),
            Err(e) => {
                warn!(error = %e, "Admission failed");
                "error"
            }
        };
        *tally.entry(label).or_default() += 1;
    }

    let orders = demo.orders.len() as u64;
    let remaining = demo.vouchers.stock(VOUCHER).unwrap_or(0);
    info!(
        outcomes = ?tally,
        orders,
        remaining_stock = remaining,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Flash sale finished"
    );
    if orders + remaining as u64 != args.stock as u64 {
        error!(
            orders,
            remaining_stock = remaining,
            initial_stock = args.stock,
            "Inventory does not balance"
        );
    }
    let snapshot = demo.admission_metrics.snapshot();
    info!(
        attempts = snapshot.attempts,
        admitted = snapshot.admitted,
        rejected = snapshot.total_rejected(),
        errors = snapshot.errors,
        "Admission metrics"
    );
    Ok(())
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
    for directive in ["hyper=warn", "h2=warn"] {
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
// Metrics & Health Servers
// =============================================================================

async fn serve(demo: &Demo, args: &Args) -> anyhow::Result<()> {
    let exporter = Arc::new(
        MetricsExporter::new(demo.cache_metrics.clone(), demo.admission_metrics.clone())?
            .with_filter(demo.filter.clone()),
    );
    let health = Arc::new(StoreHealthCheck::new(demo.store.clone()));
    let shutdown = CancellationToken::new();

    let metrics_task = tokio::spawn(run_metrics_server(
        args.metrics_addr.clone(),
        exporter,
        shutdown.clone(),
    ));
    let health_task = tokio::spawn(run_health_server(
        args.health_addr.clone(),
        health,
        shutdown.clone(),
    ));

    info!("Serving metrics and health endpoints, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown requested");
    shutdown.cancel();

    for (name, task) in [("metrics", metrics_task), ("health", health_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(server = name, error = %e, "Server error"),
            Err(e) => error!(server = name, error = %e, "Server task panicked"),
        }
    }
    Ok(())
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn run_metrics_server(
    addr: String,
    exporter: Arc<MetricsExporter>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics server address {}", addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics server to {}", addr))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted.context("metrics server accept")?,
        };
        let io = TokioIo::new(stream);
        let exporter = exporter.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let exporter = exporter.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match exporter.render() {
                            Ok(text) => respond(StatusCode::OK, "text/plain; version=0.0.4", text),
                            Err(e) => respond(
                                StatusCode::INTERNAL_SERVER_ERROR,
                                "text/plain",
                                e.to_string(),
                            ),
                        },
                        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}

async fn run_health_server(
    addr: String,
    health: Arc<StoreHealthCheck>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid health server address {}", addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding health server to {}", addr))?;

    info!("Health server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted.context("health server accept")?,
        };
        let io = TokioIo::new(stream);
        let health = health.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let health = health.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => respond(StatusCode::OK, "text/plain", "ok"),
                        "/readyz" => {
                            let report = health.check().await;
                            let status = if report.status.is_operational() {
                                StatusCode::OK
                            } else {
                                StatusCode::SERVICE_UNAVAILABLE
                            };
                            match serde_json::to_string(&report) {
                                Ok(json) => respond(status, "application/json", json),
                                Err(e) => respond(
                                    StatusCode::INTERNAL_SERVER_ERROR,
                                    "text/plain",
                                    e.to_string(),
                                ),
                            }
                        }
                        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

//! Demo service host: registers a few handlers, dispatches requests through
//! the tower pipeline and prints the registration table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use servhost_core::{AnyService, Lifecycle, Request, RequestHandler, Response, TypeKey};
use servhost_server::service::{
    build_dispatch_pipeline, HostConfig, ServiceManager, StaticCollection, TypeEntry,
};
use servhost_server::FactoryContainer;
use tower::ServiceExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Demo service host.
#[derive(Parser, Debug)]
#[command(name = "demo-host")]
#[command(about = "Register demo handlers and dispatch a few requests")]
#[command(version)]
struct Cli {
    /// JSON file with a `HostConfig`; flags below override it.
    #[arg(short, long, value_name = "FILE", env = "SERVHOST_CONFIG")]
    config: Option<String>,

    /// Name reported in logs.
    #[arg(long, env = "SERVHOST_HOST_NAME")]
    host_name: Option<String>,

    /// Default handler lifecycle (per-call or shared).
    #[arg(long, env = "SERVHOST_LIFECYCLE")]
    lifecycle: Option<Lifecycle>,

    /// Build every invoker during init.
    #[arg(long, env = "SERVHOST_EAGER_INVOKERS")]
    eager_invokers: bool,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "SERVHOST_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "SERVHOST_LOG_FORMAT")]
    log_format: LogFormat,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn host_config(&self) -> anyhow::Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {path}"))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing config file {path}"))?
            }
            None => HostConfig::default(),
        };
        if let Some(name) = &self.host_name {
            config.host_name.clone_from(name);
        }
        if let Some(lifecycle) = self.lifecycle {
            config.default_lifecycle = lifecycle;
        }
        if self.eager_invokers {
            config.eager_invokers = true;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.default_operation_timeout_ms = timeout_ms;
        }
        Ok(config)
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    match cli.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

// ---------------------------------------------------------------------------
// Demo handlers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Ping {
    text: String,
}

#[derive(Debug)]
struct Pong {
    text: String,
}

#[derive(Default)]
struct Echo;

#[async_trait]
impl RequestHandler for Echo {
    type Request = Ping;
    type Response = Pong;

    async fn handle(&self, request: Ping) -> anyhow::Result<Pong> {
        Ok(Pong { text: request.text })
    }
}

struct Increment;

#[derive(Default)]
struct Counter {
    hits: AtomicU64,
}

#[async_trait]
impl RequestHandler for Counter {
    type Request = Increment;
    type Response = u64;

    async fn handle(&self, _request: Increment) -> anyhow::Result<u64> {
        Ok(self.hits.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

struct Hello;
struct Goodbye;

/// Catch-all service answering with the name of the message it received.
#[derive(Default)]
struct Announcer;

#[async_trait]
impl AnyService for Announcer {
    fn routes() -> Vec<TypeKey> {
        vec![TypeKey::of::<Hello>()]
    }

    async fn any(&self, request: Request) -> anyhow::Result<Response> {
        Ok(Response::new(format!(
            "received {}",
            request.message_type().short_name()
        )))
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);
    let config = cli.host_config()?;

    let manager = ServiceManager::new(config.clone(), Arc::new(FactoryContainer::new()))
        .with_collection(
            StaticCollection::new("demo")
                .with(TypeEntry::handler::<Echo>())
                .with(TypeEntry::service::<Announcer>()),
        );
    manager.init()?;

    manager.register_instance(
        TypeEntry::builder::<Counter>().request_handler(),
        Arc::new(Counter::default()),
    )?;
    manager.register_route(TypeKey::of::<Goodbye>(), TypeKey::of::<Announcer>())?;

    let manager = Arc::new(manager);
    let pipeline = build_dispatch_pipeline(Arc::clone(&manager), &config);

    let pong = pipeline
        .clone()
        .oneshot(Request::new(Ping {
            text: "hello".to_string(),
        }))
        .await?;
    if let Some(pong) = pong.downcast_ref::<Pong>() {
        info!(text = %pong.text, "echo replied");
    }

    for _ in 0..2 {
        let hits = pipeline.clone().oneshot(Request::new(Increment)).await?;
        info!(hits = ?hits.downcast_ref::<u64>(), "counter replied");
    }

    for request in [Request::new(Hello), Request::new(Goodbye)] {
        let reply = pipeline.clone().oneshot(request).await?;
        info!(reply = ?reply.downcast_ref::<String>(), "announcer replied");
    }

    match pipeline.clone().oneshot(Request::new(42_u8)).await {
        Ok(_) => warn!("unregistered request unexpectedly succeeded"),
        Err(err) => info!(error = %err, "unregistered request rejected"),
    }

    let summary: Vec<_> = manager
        .metadata()
        .entries()
        .into_iter()
        .map(|entry| {
            serde_json::json!({
                "messageType": entry.message_type.short_name(),
                "handlerType": entry.handler_type.short_name(),
                "lifecycle": entry.lifecycle,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !manager.drain(Duration::from_secs(5)).await {
        warn!(in_flight = manager.in_flight_count(), "drain timed out");
    }
    manager.dispose()?;
    Ok(())
}

//! # VPO daemon
//!
//! Long-lived server: HTTP API over the catalog, a worker pool draining
//! the job queue, periodic maintenance, and SIGHUP configuration reload.

mod auth;
mod handlers;
mod maintenance;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vpo_config::{load_config, ReloadState, VpoConfig};
use vpo_core::executor::{ContainerTool, ExecutorConfig, PlanExecutor, TranscodeTool};
use vpo_core::tools::{get_tool_registry, ToolCapabilityCache, ToolPaths, DEFAULT_CACHE_TTL_HOURS};
use vpo_core::transcription::FfmpegAudioExtractor;
use vpo_core::{
    Catalog, EventBus, FfprobeProber, Scanner, WorkerPool, WorkerPoolConfig, WorkflowProcessor,
};

use crate::state::AppState;

/// Command line arguments for the VPO daemon.
#[derive(Parser, Debug)]
#[command(name = "vpo-server")]
#[command(about = "Policy-driven media library orchestrator daemon")]
struct Args {
    /// Path to the configuration file (default: ~/.vpo/config.toml)
    #[arg(long, env = "VPO_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "VPO_PORT")]
    port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(long, env = "VPO_BIND")]
    bind: Option<String>,

    /// Re-detect external tools, ignoring the capability cache
    #[arg(long)]
    refresh_tools: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let config = Arc::new(config);

    if config.server.session_secret.is_none() {
        let ephemeral: [u8; 32] = rand::rng().random();
        warn!(
            "no session secret configured; generated an ephemeral key ({} bytes); \
             sessions will not survive a restart",
            ephemeral.len()
        );
    }

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.policies_dir)?;

    let catalog = Catalog::open(&config.database_path).await?;
    info!(path = %config.database_path.display(), "catalog opened");

    // Tool discovery, cached across runs.
    let cache_path = vpo_config::default_data_dir().join("tool-capabilities.json");
    let cache = ToolCapabilityCache::new(cache_path, DEFAULT_CACHE_TTL_HOURS);
    let tool_paths = ToolPaths {
        ffmpeg: config.tools.ffmpeg.clone(),
        ffprobe: config.tools.ffprobe.clone(),
        mkvmerge: config.tools.mkvmerge.clone(),
        mkvpropedit: config.tools.mkvpropedit.clone(),
    };
    let registry = get_tool_registry(args.refresh_tools, &cache, &tool_paths).await;
    for (name, tool) in [
        ("ffmpeg", &registry.ffmpeg),
        ("ffprobe", &registry.ffprobe),
        ("mkvmerge", &registry.mkvmerge),
        ("mkvpropedit", &registry.mkvpropedit),
    ] {
        match &tool.path {
            Some(path) if tool.is_available() => {
                info!(tool = name, path = %path.display(), "tool available")
            }
            _ => warn!(tool = name, "tool not available; dependent operations will fail"),
        }
    }

    let ffprobe = registry
        .tool_path("ffprobe")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ffprobe"));
    let ffmpeg = registry
        .tool_path("ffmpeg")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ffmpeg"));
    let mkvpropedit = registry
        .tool_path("mkvpropedit")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mkvpropedit"));
    let mkvmerge = registry
        .tool_path("mkvmerge")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mkvmerge"));

    let bus = Arc::new(EventBus::new());
    let prober = Arc::new(FfprobeProber::new(ffprobe));
    let scanner = Arc::new(Scanner::new(
        catalog.clone(),
        prober.clone(),
        Some(Arc::clone(&bus)),
    ));

    let executor = PlanExecutor::new(
        ContainerTool::new(mkvpropedit, mkvmerge),
        TranscodeTool::new(ffmpeg.clone()),
        ExecutorConfig {
            min_free_disk_percent: config.jobs.min_free_disk_percent,
            keep_backup: config.jobs.backup_original,
        },
    );
    let extractor = Arc::new(FfmpegAudioExtractor::new(ffmpeg));
    let processor = Arc::new(WorkflowProcessor::new(
        catalog.clone(),
        executor,
        extractor,
        None,
        Some(Arc::clone(&bus)),
    ));

    let workers = Arc::new(WorkerPool::new(
        catalog.clone(),
        Arc::clone(&processor),
        Arc::clone(&scanner),
        WorkerPoolConfig {
            workers: config.processing.workers,
            retention_days: config.jobs.retention_days,
            policies_dir: config.policies_dir.clone(),
        },
    ));
    let worker_handles = workers.start().await;

    let maintenance_handle = maintenance::spawn_maintenance(Arc::clone(&workers));
    let reload_state = Arc::new(RwLock::new(ReloadState::default()));
    let shared_config: Arc<RwLock<Arc<VpoConfig>>> =
        Arc::new(RwLock::new(Arc::clone(&config)));
    let reload_handle = maintenance::spawn_reload_listener(
        args.config.clone(),
        Arc::clone(&shared_config),
        reload_state,
    );

    let shutting_down = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        catalog: catalog.clone(),
        config: Arc::clone(&config),
        processor,
        scanner,
        workers: Arc::clone(&workers),
        bus,
        started_at: Instant::now(),
        shutting_down: Arc::clone(&shutting_down),
    };
    let router = routes::build_router(app_state);

    let address: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!(%address, "listening");
    let listener = tokio::net::TcpListener::bind(address).await?;

    let shutdown_flag = Arc::clone(&shutting_down);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_flag.store(true, Ordering::SeqCst);
        })
        .await?;

    info!("shutting down");
    workers.shutdown();
    for handle in worker_handles {
        let _ = handle.await;
    }
    maintenance_handle.abort();
    reload_handle.abort();
    catalog.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

//! Background maintenance and configuration reload tasks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use vpo_config::{diff_configs, load_config, ReloadResult, ReloadState, VpoConfig};
use vpo_core::WorkerPool;

/// Interval between retention sweeps.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Reload attempts give up after this long and keep the old config.
const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Periodic retention sweep: purge terminated jobs past their retention
/// window.
pub fn spawn_maintenance(workers: Arc<WorkerPool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = workers.purge_expired_jobs().await {
                warn!(error = %e, "maintenance purge failed");
            }
        }
    })
}

/// SIGHUP-triggered config reload. Re-reads the file, classifies changes,
/// and swaps the shared snapshot when everything parses; failure keeps
/// the old config and records the error.
pub async fn reload_config(
    config_path: Option<&PathBuf>,
    current: &Arc<RwLock<Arc<VpoConfig>>>,
    state: &Arc<RwLock<ReloadState>>,
) -> ReloadResult {
    info!("received SIGHUP, reloading configuration");

    let attempt = tokio::time::timeout(RELOAD_TIMEOUT, async {
        let old = { Arc::clone(&*current.read().await) };
        let new = load_config(config_path.as_ref().map(|p| p.as_path()))?;
        let (changes, requires_restart) = diff_configs(&old, &new);
        if !changes.is_empty() {
            *current.write().await = Arc::new(new);
        }
        Ok::<_, vpo_config::ConfigError>((changes, requires_restart))
    })
    .await;

    let mut reload_state = state.write().await;
    match attempt {
        Ok(Ok((changes, requires_restart))) => {
            if changes.is_empty() {
                info!("configuration unchanged, no reload needed");
            } else {
                info!(
                    changes = changes.len(),
                    requires_restart = requires_restart.len(),
                    "configuration reload complete"
                );
            }
            reload_state.last_reload = Some(std::time::SystemTime::now());
            reload_state.reload_count += 1;
            reload_state.last_error = None;
            reload_state.changes_detected = changes.clone();
            ReloadResult {
                success: true,
                changes,
                requires_restart,
                error: None,
            }
        }
        Ok(Err(e)) => {
            error!(error = %e, "configuration reload failed, keeping old config");
            reload_state.last_error = Some(e.to_string());
            ReloadResult {
                success: false,
                error: Some(e.to_string()),
                ..ReloadResult::default()
            }
        }
        Err(_) => {
            let message = format!("reload timed out after {}s", RELOAD_TIMEOUT.as_secs());
            error!("{message}");
            reload_state.last_error = Some(message.clone());
            ReloadResult {
                success: false,
                error: Some(message),
                ..ReloadResult::default()
            }
        }
    }
}

/// Listens for SIGHUP and runs reloads until shutdown.
#[cfg(unix)]
pub fn spawn_reload_listener(
    config_path: Option<PathBuf>,
    current: Arc<RwLock<Arc<VpoConfig>>>,
    state: Arc<RwLock<ReloadState>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(mut hups) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        else {
            warn!("failed to install SIGHUP handler; config reload disabled");
            return;
        };
        while hups.recv().await.is_some() {
            reload_config(config_path.as_ref(), &current, &state).await;
        }
    })
}

#[cfg(not(unix))]
pub fn spawn_reload_listener(
    _config_path: Option<PathBuf>,
    _current: Arc<RwLock<Arc<VpoConfig>>>,
    _state: Arc<RwLock<ReloadState>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {})
}

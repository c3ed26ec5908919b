//! Plugin registry and event bus.
//!
//! Plugins register by name with a manifest declaring the events they
//! subscribe to. Dispatch is synchronous and failure-isolated: one
//! plugin's error is logged with context and the remaining subscribers
//! still run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use vpo_model::{FileRecord, Plan, TrackRecord};

use crate::error::{CoreError, Result};

/// Supported plugin API version of this build.
pub const PLUGIN_API_VERSION: u32 = 1;

/// Event names plugins can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "file.scanned")]
    FileScanned,
    #[serde(rename = "policy.before_evaluate")]
    PolicyBeforeEvaluate,
    #[serde(rename = "policy.after_evaluate")]
    PolicyAfterEvaluate,
    #[serde(rename = "plan.before_execute")]
    PlanBeforeExecute,
    #[serde(rename = "plan.after_execute")]
    PlanAfterExecute,
    #[serde(rename = "plan.execution_failed")]
    PlanExecutionFailed,
    #[serde(rename = "transcription.requested")]
    TranscriptionRequested,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::FileScanned => "file.scanned",
            EventName::PolicyBeforeEvaluate => "policy.before_evaluate",
            EventName::PolicyAfterEvaluate => "policy.after_evaluate",
            EventName::PlanBeforeExecute => "plan.before_execute",
            EventName::PlanAfterExecute => "plan.after_execute",
            EventName::PlanExecutionFailed => "plan.execution_failed",
            EventName::TranscriptionRequested => "transcription.requested",
        }
    }
}

/// Payload delivered to subscribers.
#[derive(Debug, Clone)]
pub enum PluginEvent {
    FileScanned {
        file: FileRecord,
        tracks: Vec<TrackRecord>,
    },
    PolicyBeforeEvaluate {
        file: FileRecord,
    },
    PolicyAfterEvaluate {
        file: FileRecord,
        plan: Plan,
    },
    PlanBeforeExecute {
        file: FileRecord,
        plan: Plan,
    },
    PlanAfterExecute {
        file: FileRecord,
        plan: Plan,
    },
    PlanExecutionFailed {
        file: FileRecord,
        error: String,
    },
    TranscriptionRequested {
        file: FileRecord,
        track_index: i64,
    },
}

impl PluginEvent {
    pub fn name(&self) -> EventName {
        match self {
            PluginEvent::FileScanned { .. } => EventName::FileScanned,
            PluginEvent::PolicyBeforeEvaluate { .. } => EventName::PolicyBeforeEvaluate,
            PluginEvent::PolicyAfterEvaluate { .. } => EventName::PolicyAfterEvaluate,
            PluginEvent::PlanBeforeExecute { .. } => EventName::PlanBeforeExecute,
            PluginEvent::PlanAfterExecute { .. } => EventName::PlanAfterExecute,
            PluginEvent::PlanExecutionFailed { .. } => EventName::PlanExecutionFailed,
            PluginEvent::TranscriptionRequested { .. } => EventName::TranscriptionRequested,
        }
    }
}

/// Static description a plugin registers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub events: Vec<EventName>,
    #[serde(default)]
    pub min_api_version: Option<u32>,
    #[serde(default)]
    pub max_api_version: Option<u32>,
}

/// A subscriber. Capability queries (`supports_feature`) replace any
/// inheritance hierarchy; callers probe before relying on optional
/// behavior.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> PluginManifest;

    fn supports_feature(&self, _feature: &str) -> bool {
        false
    }

    async fn handle_event(&self, event: &PluginEvent) -> Result<()>;
}

struct LoadedPlugin {
    manifest: PluginManifest,
    instance: Arc<dyn Plugin>,
    enabled: bool,
    loaded_at: DateTime<Utc>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("manifest", &self.manifest)
            .field("enabled", &self.enabled)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Registry of loaded plugins plus the dispatch fan-out.
#[derive(Debug, Default)]
pub struct EventBus {
    plugins: RwLock<HashMap<String, LoadedPlugin>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin. Duplicate names and API version mismatches are
    /// rejected.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let manifest = plugin.manifest();
        if let Some(min) = manifest.min_api_version
            && PLUGIN_API_VERSION < min
        {
            return Err(CoreError::Internal(format!(
                "plugin '{}' requires API version >= {min} (host is {PLUGIN_API_VERSION})",
                manifest.name
            )));
        }
        if let Some(max) = manifest.max_api_version
            && PLUGIN_API_VERSION > max
        {
            return Err(CoreError::Internal(format!(
                "plugin '{}' supports API version <= {max} (host is {PLUGIN_API_VERSION})",
                manifest.name
            )));
        }

        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(&manifest.name) {
            return Err(CoreError::Internal(format!(
                "plugin '{}' is already registered",
                manifest.name
            )));
        }
        debug!(plugin = %manifest.name, version = %manifest.version, "registered plugin");
        plugins.insert(
            manifest.name.clone(),
            LoadedPlugin {
                manifest,
                instance: plugin,
                enabled: true,
                loaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Enables or disables a plugin without unregistering it. Returns
    /// false when the plugin is unknown.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut plugins = self.plugins.write().await;
        match plugins.get_mut(name) {
            Some(loaded) => {
                loaded.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn plugin_names(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        let mut names: Vec<String> = plugins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Fans an event out to every enabled subscriber. Plugin failures are
    /// logged and isolated; the number of failures is returned for the
    /// caller's warning counters.
    pub async fn dispatch(&self, event: &PluginEvent) -> usize {
        let subscribers: Vec<(String, Arc<dyn Plugin>)> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .filter(|loaded| {
                    loaded.enabled && loaded.manifest.events.contains(&event.name())
                })
                .map(|loaded| (loaded.manifest.name.clone(), Arc::clone(&loaded.instance)))
                .collect()
        };

        let mut failures = 0;
        for (name, plugin) in subscribers {
            if let Err(e) = plugin.handle_event(event).await {
                error!(
                    plugin = %name,
                    event = event.name().as_str(),
                    error = %e,
                    "plugin event handler failed"
                );
                failures += 1;
            }
        }
        if failures > 0 {
            warn!(
                event = event.name().as_str(),
                failures, "plugin dispatch completed with failures"
            );
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPlugin {
        name: String,
        events: Vec<EventName>,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Plugin for CountingPlugin {
        fn manifest(&self) -> PluginManifest {
            PluginManifest {
                name: self.name.clone(),
                version: "1.0.0".to_string(),
                events: self.events.clone(),
                min_api_version: None,
                max_api_version: None,
            }
        }

        async fn handle_event(&self, _event: &PluginEvent) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CoreError::Internal("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn sample_file() -> FileRecord {
        FileRecord {
            id: 1,
            path: "/x/a.mkv".into(),
            filename: "a.mkv".into(),
            directory: "/x".into(),
            extension: "mkv".into(),
            size_bytes: 1,
            modified_at: Utc::now(),
            content_hash: None,
            container_format: None,
            scanned_at: None,
            scan_status: vpo_model::ScanStatus::Ok,
            scan_error: None,
            plugin_metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let make = || {
            Arc::new(CountingPlugin {
                name: "dup".to_string(),
                events: vec![EventName::FileScanned],
                calls: Arc::clone(&calls),
                fail: false,
            })
        };
        bus.register(make()).await.unwrap();
        assert!(bus.register(make()).await.is_err());
    }

    #[tokio::test]
    async fn failures_are_isolated_from_other_subscribers() {
        let bus = EventBus::new();
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let ok_calls = Arc::new(AtomicUsize::new(0));
        bus.register(Arc::new(CountingPlugin {
            name: "failing".to_string(),
            events: vec![EventName::FileScanned],
            calls: Arc::clone(&failing_calls),
            fail: true,
        }))
        .await
        .unwrap();
        bus.register(Arc::new(CountingPlugin {
            name: "ok".to_string(),
            events: vec![EventName::FileScanned],
            calls: Arc::clone(&ok_calls),
            fail: false,
        }))
        .await
        .unwrap();

        let failures = bus
            .dispatch(&PluginEvent::FileScanned {
                file: sample_file(),
                tracks: Vec::new(),
            })
            .await;
        assert_eq!(failures, 1);
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_plugins_do_not_receive_events() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register(Arc::new(CountingPlugin {
            name: "toggled".to_string(),
            events: vec![EventName::FileScanned],
            calls: Arc::clone(&calls),
            fail: false,
        }))
        .await
        .unwrap();

        assert!(bus.set_enabled("toggled", false).await);
        bus.dispatch(&PluginEvent::FileScanned {
            file: sample_file(),
            tracks: Vec::new(),
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(bus.set_enabled("toggled", true).await);
        bus.dispatch(&PluginEvent::FileScanned {
            file: sample_file(),
            tracks: Vec::new(),
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribed_events_are_not_delivered() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register(Arc::new(CountingPlugin {
            name: "scanner-only".to_string(),
            events: vec![EventName::FileScanned],
            calls: Arc::clone(&calls),
            fail: false,
        }))
        .await
        .unwrap();

        bus.dispatch(&PluginEvent::PolicyBeforeEvaluate {
            file: sample_file(),
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn api_version_bounds_are_enforced() {
        let bus = EventBus::new();

        struct VersionedPlugin(u32);
        #[async_trait]
        impl Plugin for VersionedPlugin {
            fn manifest(&self) -> PluginManifest {
                PluginManifest {
                    name: "versioned".to_string(),
                    version: "1.0.0".to_string(),
                    events: Vec::new(),
                    min_api_version: Some(self.0),
                    max_api_version: None,
                }
            }
            async fn handle_event(&self, _event: &PluginEvent) -> Result<()> {
                Ok(())
            }
        }

        assert!(bus
            .register(Arc::new(VersionedPlugin(PLUGIN_API_VERSION + 1)))
            .await
            .is_err());
        assert!(bus
            .register(Arc::new(VersionedPlugin(PLUGIN_API_VERSION)))
            .await
            .is_ok());
    }
}

//! Reusable session service runtime.
//!
//! Provides [`ServiceHandle`] that encapsulates the full lifecycle:
//! metrics, command log, session store, replay, retention sweeper and
//! graceful shutdown. The CLI and embedding applications both start the
//! store through this.

use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::events::{create_event_bus, SharedEventBus};
use crate::application::sessions::{
    start_session_sweeper_task, ReplayEngine, ReplayReport, SessionStore, SessionSweeper,
    SharedSessionStore,
};
use crate::config::{AppConfig, MetricsConfig};
use crate::domain::ids::SystemId;
use crate::domain::roaming::RoamingNetwork;
use crate::infrastructure::command_log::FileCommandLog;
use crate::infrastructure::roaming::InMemoryRoamingNetwork;
use crate::shared::shutdown::{ShutdownCoordinator, ShutdownSignal};
use crate::shared::{AppError, InfraError};

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the session service.
pub struct ServiceOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Roaming network for EVSE lookups. An empty in-memory network named
    /// after `store.roaming_network_id` is used when absent.
    pub roaming_network: Option<Arc<dyn RoamingNetwork>>,
    /// Start the periodic retention sweep (default: true).
    pub start_sweeper: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            roaming_network: None,
            start_sweeper: true,
        }
    }
}

// ── ServiceHandle ──────────────────────────────────────────────────

/// Handle to a running session service.
///
/// # Examples
///
/// ```rust,no_run
/// use wwcp_core::server::{ServiceHandle, ServiceOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServiceHandle::start(ServiceOptions::default()).await?;
///     // ... serve traffic against handle.store ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServiceHandle {
    /// The replayed, ready session store.
    pub store: SharedSessionStore,
    /// Session notifications.
    pub event_bus: SharedEventBus,
    /// Counters of the start-up replay.
    pub replay_report: ReplayReport,
    /// Host identity stamped on commands issued by this process.
    pub system_id: SystemId,
    /// The configuration the service was started with.
    pub config: AppConfig,

    log: Arc<FileCommandLog>,
    shutdown: ShutdownCoordinator,
    sweeper_task: Option<JoinHandle<()>>,
}

impl ServiceHandle {
    /// Start the session service.
    ///
    /// This will:
    /// 1. Install the Prometheus exporter (once per process)
    /// 2. Open the command log directory
    /// 3. Replay the log into a fresh store and mark it ready
    /// 4. Start the retention sweeper (if enabled)
    ///
    /// Only an unavailable log directory fails start-up.
    pub async fn start(opts: ServiceOptions) -> Result<Self, AppError> {
        let config = opts.config;
        info!("Starting WWCP session service...");

        static METRICS: OnceLock<()> = OnceLock::new();
        METRICS.get_or_init(|| install_metrics(&config.metrics));

        let roaming_network_id = config.store.roaming_network_id();
        let system_id = config.store.system_id();

        let log = Arc::new(
            FileCommandLog::open(
                &config.store.log_dir,
                config.store.name.as_str(),
                roaming_network_id.clone(),
                config.store.sync_writes,
            )
            .await?,
        );

        let roaming_network: Arc<dyn RoamingNetwork> = match opts.roaming_network {
            Some(network) => network,
            None => Arc::new(InMemoryRoamingNetwork::new(roaming_network_id.clone())),
        };

        let event_bus = create_event_bus();
        let store = SessionStore::new(log.clone(), event_bus.clone())
            .with_roaming_network(roaming_network)
            .shared();

        let replay_report = ReplayEngine::new(log.clone(), store.clone()).run().await?;
        store.mark_ready();

        let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);

        let sweeper_task = if opts.start_sweeper {
            let sweeper = Arc::new(SessionSweeper::new(store.clone(), config.retention.policy()));
            Some(start_session_sweeper_task(
                sweeper,
                system_id.clone(),
                shutdown.signal(),
                config.retention.check_interval_secs,
            ))
        } else {
            None
        };

        info!(
            sessions = store.len(),
            system_id = %system_id,
            log_dir = %log.dir().display(),
            "Session service started"
        );

        Ok(Self {
            store,
            event_bus,
            replay_report,
            system_id,
            config,
            log,
            shutdown,
            sweeper_task,
        })
    }

    pub fn command_log(&self) -> &Arc<FileCommandLog> {
        &self.log
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for background tasks after shutdown has been triggered.
    pub async fn wait(self) {
        let sweeper_task = self.sweeper_task;
        let completed = self
            .shutdown
            .shutdown_with_cleanup(|| async move {
                if let Some(task) = sweeper_task {
                    if let Err(e) = task.await {
                        error!(error = %e, "Session sweeper task panicked");
                    }
                }
            })
            .await;

        if !completed {
            warn!("Background tasks did not stop in time");
        }
        info!(sessions = self.store.len(), "Session service shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("Shutting down session service...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.sweeper_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn install_metrics(config: &MetricsConfig) {
    let Some(addr) = config.prometheus_listen else {
        return;
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => info!(%addr, "Prometheus exporter listening"),
        Err(e) => warn!(%addr, error = %e, "Prometheus exporter not installed"),
    }
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServiceHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

/// Whether a start-up failure means the log storage itself is gone.
pub fn is_log_unavailable(error: &AppError) -> bool {
    matches!(error, AppError::Infra(InfraError::LogDirectoryUnavailable { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::ChargingSession;
    use chrono::Utc;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> ServiceOptions {
        let mut config = AppConfig::default();
        config.store.log_dir = dir.path().join("sessions");
        config.store.sync_writes = false;
        ServiceOptions {
            config,
            roaming_network: None,
            start_sweeper: true,
        }
    }

    #[tokio::test]
    async fn restart_replays_previous_sessions() {
        let dir = TempDir::new().unwrap();

        let handle = ServiceHandle::start(options(&dir)).await.unwrap();
        assert!(handle.store.is_ready());
        assert!(handle.is_running());
        handle
            .store
            .add_session(&handle.system_id, ChargingSession::new("S1".into(), Utc::now()))
            .await
            .unwrap();
        handle.shutdown().await;

        let handle = ServiceHandle::start(options(&dir)).await.unwrap();
        assert!(handle.store.session_exists(&"S1".into()));
        assert_eq!(handle.replay_report.commands_applied, 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn unusable_log_dir_fails_start() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();

        let mut opts = options(&dir);
        opts.config.store.log_dir = file;
        let err = ServiceHandle::start(opts).await.err().unwrap();
        assert!(is_log_unavailable(&err));
    }
}

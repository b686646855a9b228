//! Retention sweep of finished charging sessions.
//!
//! Runs in a tokio::spawn loop next to live traffic. Each candidate is
//! re-checked against the live session at the moment of removal.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::SessionStore;
use crate::domain::ids::{ChargingSessionId, SystemId};
use crate::domain::session::ChargingSession;
use crate::infrastructure::command_log::LogCommand;
use crate::shared::shutdown::ShutdownSignal;
use crate::shared::StoreResult;

pub const DEFAULT_SUCCESSFUL_RETENTION_DAYS: u32 = 40;
pub const DEFAULT_UNSUCCESSFUL_RETENTION_DAYS: u32 = 120;

/// How long sessions are kept, measured from their start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Sessions whose CDR was delivered (`success` or `enqueued`)
    pub successful: Duration,
    /// Everything else
    pub unsuccessful: Duration,
}

impl RetentionPolicy {
    pub fn from_days(successful_days: u32, unsuccessful_days: u32) -> Self {
        Self {
            successful: Duration::days(successful_days as i64),
            unsuccessful: Duration::days(unsuccessful_days as i64),
        }
    }

    /// Tombstone to evict `session` with at `now`, if it is due.
    pub fn eviction(&self, session: &ChargingSession, now: DateTime<Utc>) -> Option<LogCommand> {
        if session.is_pinned(now) {
            return None;
        }
        let age = session.age(now);
        if session.has_delivered_cdr() && age > self.successful {
            Some(LogCommand::Close)
        } else if age > self.unsuccessful {
            Some(LogCommand::Remove)
        } else {
            None
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_days(
            DEFAULT_SUCCESSFUL_RETENTION_DAYS,
            DEFAULT_UNSUCCESSFUL_RETENTION_DAYS,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub closed: usize,
    pub removed: usize,
    pub pinned: usize,
    /// Due when planned but no longer due (or gone) at removal time
    pub skipped_changed: usize,
}

impl SweepReport {
    pub fn evicted(&self) -> usize {
        self.closed + self.removed
    }
}

pub struct SessionSweeper {
    store: Arc<SessionStore>,
    policy: RetentionPolicy,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Sessions due for eviction at `now`, without touching anything.
    pub fn plan(&self, now: DateTime<Utc>) -> Vec<(ChargingSessionId, LogCommand)> {
        self.store
            .sessions()
            .iter()
            .filter_map(|s| self.policy.eviction(s, now).map(|c| (s.id().clone(), c)))
            .collect()
    }

    /// One retention pass. A failed tombstone append aborts the pass.
    pub async fn sweep(&self, system: &SystemId, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        let mut report = SweepReport::default();
        let candidates = self.store.sessions();
        report.checked = candidates.len();

        for candidate in candidates {
            if candidate.is_pinned(now) {
                report.pinned += 1;
                continue;
            }
            let Some(command) = self.policy.eviction(&candidate, now) else {
                continue;
            };

            let policy = self.policy;
            let evicted = self
                .store
                .evict_if(system, candidate.id(), command, |live| {
                    policy.eviction(live, now) == Some(command)
                })
                .await?;

            match evicted {
                Some(_) => {
                    counter!("wwcp_sessions_evicted_total", "command" => command.as_str())
                        .increment(1);
                    match command {
                        LogCommand::Close => report.closed += 1,
                        _ => report.removed += 1,
                    }
                }
                None => {
                    debug!(session_id = %candidate.id(), "Session changed before eviction, kept");
                    report.skipped_changed += 1;
                }
            }
        }

        info!(
            checked = report.checked,
            closed = report.closed,
            removed = report.removed,
            pinned = report.pinned,
            skipped_changed = report.skipped_changed,
            "Retention sweep finished"
        );
        Ok(report)
    }
}

/// Start the retention sweep background task.
///
/// The first pass runs immediately, then every `check_interval_secs`.
pub fn start_session_sweeper_task(
    sweeper: Arc<SessionSweeper>,
    system: SystemId,
    shutdown: ShutdownSignal,
    check_interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            check_interval = check_interval_secs,
            "Session sweeper task started"
        );

        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(check_interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = sweeper.sweep(&system, Utc::now()).await {
                        warn!(error = %e, "Retention sweep error");
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!("Session sweeper task shutting down");
                    break;
                }
            }
        }

        info!("Session sweeper task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::charging::{SendCdrResult, SendCdrResultCode};
    use crate::infrastructure::command_log::{CommandLog, LogEntry};
    use crate::shared::InfraError;
    use async_trait::async_trait;
    use chrono::TimeZone;

    #[derive(Default)]
    struct RecordingLog(std::sync::Mutex<Vec<LogEntry>>);

    #[async_trait]
    impl CommandLog for RecordingLog {
        async fn append(&self, entry: &LogEntry) -> Result<(), InfraError> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
    }

    fn host() -> SystemId {
        SystemId::new("node-1")
    }

    async fn store_with(sessions: Vec<(ChargingSession, Option<SendCdrResultCode>)>) -> (Arc<SessionStore>, Arc<RecordingLog>) {
        let log = Arc::new(RecordingLog::default());
        let store = SessionStore::new(log.clone(), create_event_bus()).shared();
        for (session, forwarded) in sessions {
            let id = session.id().clone();
            store.add_session(&host(), session).await.unwrap();
            if let Some(code) = forwarded {
                store
                    .cdr_forwarded(&host(), &id, SendCdrResult::new(code, now()))
                    .await
                    .unwrap();
            }
        }
        (store, log)
    }

    fn aged(id: &str, days: i64) -> ChargingSession {
        let mut session = ChargingSession::new(id.into(), now() - Duration::days(days));
        session.stop(now() - Duration::days(days) + Duration::hours(1)).unwrap();
        session
    }

    #[tokio::test]
    async fn thresholds_pick_close_or_remove() {
        let (store, log) = store_with(vec![
            (aged("delivered-old", 41), Some(SendCdrResultCode::Success)),
            (aged("enqueued-old", 41), Some(SendCdrResultCode::Enqueued)),
            (aged("delivered-young", 39), Some(SendCdrResultCode::Success)),
            (aged("failed-mid", 100), Some(SendCdrResultCode::Rejected)),
            (aged("failed-old", 121), Some(SendCdrResultCode::Timeout)),
            (aged("never-forwarded", 130), None),
        ])
        .await;

        let sweeper = SessionSweeper::new(store.clone(), RetentionPolicy::default());
        let report = sweeper.sweep(&host(), now()).await.unwrap();

        assert_eq!(report.closed, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(report.evicted(), 4);

        let mut left: Vec<String> = store.ids().iter().map(|i| i.to_string()).collect();
        left.sort();
        assert_eq!(left, vec!["delivered-young", "failed-mid"]);

        let tombstones: Vec<(String, LogCommand)> = log
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.command.is_tombstone())
            .map(|e| (e.id.to_string(), e.command))
            .collect();
        assert_eq!(tombstones.len(), 4);
        assert!(tombstones.contains(&("enqueued-old".to_string(), LogCommand::Close)));
        assert!(tombstones.contains(&("never-forwarded".to_string(), LogCommand::Remove)));
    }

    #[tokio::test]
    async fn pinned_sessions_are_never_swept() {
        let pinned = aged("pinned", 400).with_no_auto_deletion_before(now() + Duration::days(1));
        let expired_pin = aged("expired-pin", 400).with_no_auto_deletion_before(now() - Duration::days(1));
        let (store, _) = store_with(vec![(pinned, None), (expired_pin, None)]).await;

        let sweeper = SessionSweeper::new(store.clone(), RetentionPolicy::default());
        let report = sweeper.sweep(&host(), now()).await.unwrap();

        assert_eq!(report.pinned, 1);
        assert_eq!(report.removed, 1);
        assert!(store.session_exists(&"pinned".into()));
        assert!(!store.session_exists(&"expired-pin".into()));
    }

    #[tokio::test]
    async fn plan_does_not_mutate() {
        let (store, log) = store_with(vec![(aged("old", 200), None)]).await;
        let sweeper = SessionSweeper::new(store.clone(), RetentionPolicy::default());

        let plan = sweeper.plan(now());
        assert_eq!(plan, vec![(ChargingSessionId::new("old"), LogCommand::Remove)]);
        assert!(store.session_exists(&"old".into()));
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn live_recheck_keeps_sessions_pinned_after_planning() {
        let (store, _) = store_with(vec![(aged("S1", 200), None)]).await;
        let policy = RetentionPolicy::default();
        assert_eq!(policy.eviction(&store.get(&"S1".into()).unwrap(), now()), Some(LogCommand::Remove));

        store
            .update_session(&host(), &"S1".into(), |s| {
                s.no_auto_deletion_before = Some(now() + Duration::days(30));
                Ok(())
            })
            .await
            .unwrap();

        let evicted = store
            .evict_if(&host(), &"S1".into(), LogCommand::Remove, |live| {
                policy.eviction(live, now()) == Some(LogCommand::Remove)
            })
            .await
            .unwrap();
        assert!(evicted.is_none());
        assert!(store.session_exists(&"S1".into()));
    }

    #[tokio::test]
    async fn task_stops_on_shutdown() {
        let (store, _) = store_with(vec![]).await;
        let sweeper = Arc::new(SessionSweeper::new(store, RetentionPolicy::default()));
        let shutdown = ShutdownSignal::new();

        let handle = start_session_sweeper_task(sweeper, host(), shutdown.clone(), 3600);
        shutdown.trigger();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! Start-up replay of the command log
//!
//! Files are read newest month first and every file bottom-up, so the
//! first line seen for a session is its most recent one. Two sets drive
//! the scan:
//!
//! - `resolved`: sessions whose final state is already known; any older
//!   line for them is skipped.
//! - `removed`: sessions tombstoned after their last real command; their
//!   older lines are skipped too.
//!
//! Bad lines and unreadable files are counted and skipped. Only an
//! unlistable log directory fails the pass.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};

use super::store::SessionStore;
use crate::domain::ids::ChargingSessionId;
use crate::infrastructure::command_log::{is_comment, FileCommandLog, LogLine};
use crate::shared::InfraError;

/// Counters of one replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub files_processed: usize,
    pub files_failed: usize,
    pub lines_read: usize,
    pub comments: usize,
    pub commands_applied: usize,
    pub skipped_resolved: usize,
    pub skipped_removed: usize,
    pub tombstones: usize,
    pub parse_errors: usize,
    pub sessions: usize,
}

pub struct ReplayEngine {
    log: Arc<FileCommandLog>,
    store: Arc<SessionStore>,
}

#[derive(Default)]
struct ScanState {
    resolved: HashSet<ChargingSessionId>,
    removed: HashSet<ChargingSessionId>,
    report: ReplayReport,
}

impl ReplayEngine {
    pub fn new(log: Arc<FileCommandLog>, store: Arc<SessionStore>) -> Self {
        Self { log, store }
    }

    /// Rebuild the store from the log. Does not mark the store ready.
    pub async fn run(&self) -> Result<ReplayReport, InfraError> {
        let files = self.log.list_files_newest_first().await?;
        info!(
            files = files.len(),
            dir = %self.log.dir().display(),
            "Replaying command log"
        );

        let mut state = ScanState::default();

        for path in files {
            let lines = match FileCommandLog::read_lines_newest_first(&path).await {
                Ok(lines) => lines,
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Unreadable command log file skipped");
                    state.report.files_failed += 1;
                    continue;
                }
            };

            let total = lines.len();
            for (index, line) in lines.into_iter().enumerate() {
                // Line numbers count from the top of the file.
                let at = || format!("{}:{}", path.display(), total - index);
                match line {
                    Ok(line) => self.apply_line(&mut state, &line, at),
                    Err(e) => {
                        warn!(at = %at(), error = %e, "Command log line is not UTF-8, skipped");
                        state.report.lines_read += 1;
                        state.report.parse_errors += 1;
                    }
                }
            }
            state.report.files_processed += 1;
        }

        state.report.sessions = self.store.len();
        counter!("wwcp_replay_parse_errors_total").increment(state.report.parse_errors as u64);
        counter!("wwcp_replay_commands_applied_total")
            .increment(state.report.commands_applied as u64);

        let r = &state.report;
        info!(
            files_processed = r.files_processed,
            files_failed = r.files_failed,
            commands_applied = r.commands_applied,
            skipped_resolved = r.skipped_resolved,
            skipped_removed = r.skipped_removed,
            tombstones = r.tombstones,
            parse_errors = r.parse_errors,
            sessions = r.sessions,
            "Command log replay finished"
        );
        Ok(state.report)
    }

    fn apply_line(&self, state: &mut ScanState, line: &str, location: impl Fn() -> String) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        state.report.lines_read += 1;
        if is_comment(line) {
            state.report.comments += 1;
            return;
        }

        let parsed = match LogLine::parse(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(at = %location(), error = %e, "Unparseable command log line skipped");
                state.report.parse_errors += 1;
                return;
            }
        };

        if state.resolved.contains(&parsed.id) {
            state.report.skipped_resolved += 1;
            return;
        }
        if parsed.command.is_tombstone() {
            state.report.tombstones += 1;
            state.removed.insert(parsed.id);
            return;
        }
        if state.removed.contains(&parsed.id) {
            state.report.skipped_removed += 1;
            return;
        }

        let id = parsed.id.clone();
        let command = parsed.command;
        let session = match parsed.into_snapshot() {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(at = %location(), session_id = %id, %command, "Command without session snapshot skipped");
                state.report.parse_errors += 1;
                return;
            }
            Err(e) => {
                warn!(at = %location(), session_id = %id, error = %e, "Unparseable session snapshot skipped");
                state.report.parse_errors += 1;
                return;
            }
        };

        if session.id() != &id {
            warn!(
                at = %location(),
                line_id = %id,
                snapshot_id = %session.id(),
                "Snapshot id differs from line id, using line id for bookkeeping"
            );
        }

        self.store.restore(command, session);
        state.resolved.insert(id);
        state.report.commands_applied += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::charging::{ChargeDetailRecord, RemoteStartResult, RemoteStopResult};
    use crate::domain::ids::SystemId;
    use crate::domain::roaming::RoamingNetwork;
    use crate::domain::session::{ChargingSession, SessionParty};
    use crate::infrastructure::command_log::{LogCommand, LogEntry};
    use crate::infrastructure::roaming::InMemoryRoamingNetwork;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 7, 15, 0).unwrap()
    }

    fn host() -> SystemId {
        SystemId::new("node-1")
    }

    fn network() -> Arc<InMemoryRoamingNetwork> {
        let rn = InMemoryRoamingNetwork::new("Prod");
        rn.add_operator("DE*GEF", None);
        rn.add_pool("DE*GEF*P1", "DE*GEF");
        rn.add_station("DE*GEF*S1", "DE*GEF*P1");
        rn.add_evse("E1", "DE*GEF*S1");
        Arc::new(rn)
    }

    async fn open_log(dir: &TempDir) -> Arc<FileCommandLog> {
        Arc::new(
            FileCommandLog::open(dir.path(), "ChargingSessions", "Prod".into(), false)
                .await
                .unwrap(),
        )
    }

    fn store_on(log: &Arc<FileCommandLog>, rn: &Arc<InMemoryRoamingNetwork>) -> Arc<SessionStore> {
        SessionStore::new(log.clone(), create_event_bus())
            .with_roaming_network(rn.clone())
            .shared()
    }

    async fn replay(dir: &TempDir) -> (Arc<SessionStore>, Arc<InMemoryRoamingNetwork>, ReplayReport) {
        let log = open_log(dir).await;
        let rn = network();
        let store = store_on(&log, &rn);
        let report = ReplayEngine::new(log, store.clone()).run().await.unwrap();
        (store, rn, report)
    }

    /// remoteStart(S1, E1) at T0, successful remoteStop with CDR at T1
    async fn start_then_stop(store: &SessionStore) {
        let session = ChargingSession::new("S1".into(), t0()).with_evse("E1".into());
        store
            .remote_start(&host(), &RemoteStartResult::success(session))
            .await
            .unwrap();
        let cdr = ChargeDetailRecord::from_session("CDR-1", &store.get(&"S1".into()).unwrap());
        store
            .remote_stop(
                &host(),
                t0() + Duration::hours(1),
                SessionParty::default(),
                RemoteStopResult::success("S1".into(), Some(cdr), None),
            )
            .await
            .unwrap();
    }

    fn write_lines(dir: &TempDir, name: &str, entries: &[LogEntry]) {
        let body: String = entries
            .iter()
            .map(|e| e.encode().unwrap() + "\n")
            .collect();
        std::fs::write(dir.path().join(name), body).unwrap();
    }

    #[tokio::test]
    async fn cold_start_restores_stopped_session() {
        let dir = TempDir::new().unwrap();
        {
            let log = open_log(&dir).await;
            let store = store_on(&log, &network());
            start_then_stop(&store).await;
        }

        let (store, rn, report) = replay(&dir).await;
        let s1 = store.get(&"S1".into()).unwrap();
        assert_eq!(s1.session_time.end_time(), Some(t0() + Duration::hours(1)));
        assert_eq!(s1.received_cdr_infos().len(), 1);
        assert_eq!(rn.evse_session(&"E1".into()), None);
        assert_eq!(report.commands_applied, 1);
        assert_eq!(report.skipped_resolved, 1);
        assert_eq!(report.comments, 1);
    }

    #[tokio::test]
    async fn active_session_is_reattached() {
        let dir = TempDir::new().unwrap();
        {
            let log = open_log(&dir).await;
            let store = store_on(&log, &network());
            let session = ChargingSession::new("S1".into(), t0()).with_evse("E1".into());
            store.auth_start(&host(), session).await.unwrap();
        }

        let (store, rn, _) = replay(&dir).await;
        assert!(store.get(&"S1".into()).unwrap().is_active());
        assert_eq!(rn.evse_session(&"E1".into()), Some("S1".into()));
    }

    #[tokio::test]
    async fn tombstone_after_stop_removes_session() {
        let dir = TempDir::new().unwrap();
        {
            let log = open_log(&dir).await;
            let store = store_on(&log, &network());
            start_then_stop(&store).await;
            store.close_session(&host(), &"S1".into()).await.unwrap();
        }

        let (store, _, report) = replay(&dir).await;
        assert!(!store.session_exists(&"S1".into()));
        assert_eq!(report.tombstones, 1);
        assert_eq!(report.skipped_removed, 2);
        assert_eq!(report.sessions, 0);
    }

    #[tokio::test]
    async fn most_recent_command_wins_across_files() {
        let dir = TempDir::new().unwrap();
        let early = Utc.with_ymd_and_hms(2026, 1, 30, 10, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap();

        let started = ChargingSession::new("S1".into(), early);
        let mut stopped = started.clone();
        stopped.stop(later).unwrap();

        write_lines(
            &dir,
            "ChargingSessions-Prod_2026-01.log",
            &[LogEntry::snapshot(LogCommand::AuthStart, &started, early)],
        );
        write_lines(
            &dir,
            "ChargingSessions-Prod_2026-02.log",
            &[LogEntry::snapshot(LogCommand::AuthStop, &stopped, later)],
        );

        let (store, _, report) = replay(&dir).await;
        assert_eq!(store.get(&"S1".into()).unwrap().session_time.end_time(), Some(later));
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.skipped_resolved, 1);
    }

    #[tokio::test]
    async fn tombstone_only_hides_older_lines() {
        let dir = TempDir::new().unwrap();
        let session = ChargingSession::new("S1".into(), t0());

        // Removed, then started again under the same id.
        write_lines(
            &dir,
            "ChargingSessions-Prod_2026-05.log",
            &[
                LogEntry::snapshot(LogCommand::New, &session, t0()),
                LogEntry::tombstone(LogCommand::Remove, "S1".into(), t0() + Duration::minutes(1)),
                LogEntry::snapshot(
                    LogCommand::New,
                    &session.clone().with_reservation("R-2".into()),
                    t0() + Duration::minutes(2),
                ),
            ],
        );

        let (store, _, report) = replay(&dir).await;
        let s1 = store.get(&"S1".into()).unwrap();
        assert_eq!(s1.reservation_id.as_ref().map(|r| r.as_str()), Some("R-2"));
        assert_eq!(report.tombstones, 0);
        assert_eq!(report.skipped_resolved, 2);
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let dir = TempDir::new().unwrap();
        {
            let log = open_log(&dir).await;
            let store = store_on(&log, &network());
            start_then_stop(&store).await;
            store
                .add_session(&host(), ChargingSession::new("S2".into(), t0()))
                .await
                .unwrap();
            store
                .add_session(&host(), ChargingSession::new("S3".into(), t0()))
                .await
                .unwrap();
            store.remove_session(&host(), &"S3".into()).await.unwrap();
        }

        let (first, _, first_report) = replay(&dir).await;
        let (second, _, second_report) = replay(&dir).await;

        let dump = |store: &SessionStore| serde_json::to_value(store.sessions()).unwrap();
        assert_eq!(dump(&first), dump(&second));
        assert_eq!(first_report, second_report);
        assert_eq!(first.ids().len(), 2);
    }

    #[tokio::test]
    async fn schema_incomplete_line_replays_identically() {
        let dir = TempDir::new().unwrap();
        let body = concat!(
            r#"{"timestamp":"2025-05-01T00:00:00Z","id":"OLD","command":"new","#,
            r#""session":{"id":"OLD","sessionTime":{"startTime":"2025-05-01T00:00:00Z"}}}"#,
            "\n"
        );
        std::fs::write(dir.path().join("ChargingSessions-Prod_2025-05.log"), body).unwrap();

        let (first, _, _) = replay(&dir).await;
        let (second, _, _) = replay(&dir).await;

        let dump = |store: &SessionStore| serde_json::to_value(store.sessions()).unwrap();
        assert_eq!(dump(&first), dump(&second));
        assert!(first.get(&"OLD".into()).unwrap().event_tracking_id.is_none());
    }

    #[tokio::test]
    async fn snapshot_ending_before_its_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let body = concat!(
            r#"{"timestamp":"2026-05-04T08:00:00Z","id":"S1","command":"authStop","#,
            r#""session":{"id":"S1","sessionTime":{"startTime":"2026-05-04T07:15:00Z","endTime":"2026-05-04T07:00:00Z"}}}"#,
            "\n"
        );
        std::fs::write(dir.path().join("ChargingSessions-Prod_2026-05.log"), body).unwrap();

        let (store, _, report) = replay(&dir).await;
        assert!(!store.session_exists(&"S1".into()));
        assert_eq!(report.parse_errors, 1);
    }

    #[tokio::test]
    async fn bad_lines_are_counted_and_skipped() {
        let dir = TempDir::new().unwrap();
        let session = ChargingSession::new("S1".into(), t0());
        let good = LogEntry::snapshot(LogCommand::New, &session, t0()).encode().unwrap();
        let body = format!(
            "# header\n// note\n{}\n{{not json\n{}\n\n",
            good, r#"{"timestamp":"2026-05-04T07:15:00Z","id":"S9","command":"authStop"}"#
        );
        std::fs::write(dir.path().join("ChargingSessions-Prod_2026-05.log"), body).unwrap();

        let (store, _, report) = replay(&dir).await;
        assert!(store.session_exists(&"S1".into()));
        assert!(!store.session_exists(&"S9".into()));
        assert_eq!(report.parse_errors, 2);
        assert_eq!(report.comments, 2);
        assert_eq!(report.commands_applied, 1);
    }

    #[tokio::test]
    async fn non_utf8_line_is_counted_and_skipped() {
        let dir = TempDir::new().unwrap();
        let mut body = Vec::new();
        for id in ["S1", "S2"] {
            let session = ChargingSession::new(id.into(), t0());
            body.extend(LogEntry::snapshot(LogCommand::New, &session, t0()).encode().unwrap().bytes());
            body.push(b'\n');
        }
        // Torn multibyte character.
        body.extend_from_slice(b"{\"timestamp\":\"2026-05-04T07:15:00Z\",\"id\":\"\xe2\x82\n");
        let session = ChargingSession::new("S3".into(), t0());
        body.extend(LogEntry::snapshot(LogCommand::New, &session, t0()).encode().unwrap().bytes());
        body.push(b'\n');
        std::fs::write(dir.path().join("ChargingSessions-Prod_2026-05.log"), body).unwrap();

        let (store, _, report) = replay(&dir).await;
        assert_eq!(report.sessions, 3);
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.files_failed, 0);
        assert_eq!(report.files_processed, 1);
    }

    #[tokio::test]
    async fn command_appended_after_torn_line_survives_replay() {
        let dir = TempDir::new().unwrap();
        {
            let log = open_log(&dir).await;
            std::fs::write(
                log.path_for(Utc::now()),
                "# header\n{\"timestamp\":\"2026-05-04T07:00:00Z\",\"id\":\"S0\",\"comm",
            )
            .unwrap();
            let store = store_on(&log, &network());
            let session = ChargingSession::new("S1".into(), t0()).with_evse("E1".into());
            store.auth_start(&host(), session).await.unwrap();
        }

        let (store, rn, report) = replay(&dir).await;
        assert!(store.session_exists(&"S1".into()));
        assert_eq!(rn.evse_session(&"E1".into()), Some("S1".into()));
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.commands_applied, 1);
    }

    #[tokio::test]
    async fn unreadable_file_does_not_stop_the_scan() {
        let dir = TempDir::new().unwrap();
        let session = ChargingSession::new("S1".into(), t0());
        write_lines(
            &dir,
            "ChargingSessions-Prod_2026-04.log",
            &[LogEntry::snapshot(LogCommand::New, &session, t0())],
        );
        // A directory under a log file name cannot be read.
        std::fs::create_dir(dir.path().join("ChargingSessions-Prod_2026-05.log")).unwrap();

        let (store, _, report) = replay(&dir).await;
        assert!(store.session_exists(&"S1".into()));
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_processed, 1);
    }

    #[tokio::test]
    async fn missing_directory_fails_the_pass() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir).await;
        let store = store_on(&log, &network());
        std::fs::remove_dir_all(dir.path()).unwrap();

        let err = ReplayEngine::new(log, store).run().await.unwrap_err();
        assert!(matches!(err, InfraError::LogDirectoryUnavailable { .. }));
    }
}

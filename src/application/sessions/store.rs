//! Session store: the authoritative map of charging sessions
//!
//! Every mutating operation runs as one step under the commit lock:
//! mutate the map, update the EVSE back-reference, append one command log
//! line, then publish a notification. Holding the lock across the append
//! keeps on-disk order equal to commit order, which replay relies on.
//! Reads never take the lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::location::{apply_evse_link, resolve_location, EvseLink};
use crate::application::events::{
    CdrForwardedEvent, CdrReceivedEvent, Event, SessionCreatedEvent, SessionRemovedEvent,
    SessionStoppedEvent, SessionUpdatedEvent, SharedEventBus,
};
use crate::domain::charging::{ChargeDetailRecord, RemoteStartResult, RemoteStopResult, SendCdrResult};
use crate::domain::ids::{ChargingSessionId, EvseId, SystemId};
use crate::domain::roaming::RoamingNetwork;
use crate::domain::session::{ChargingSession, ReceivedCdrInfo, SessionParty, StopRequest};
use crate::infrastructure::command_log::{CommandLog, LogCommand, LogEntry};
use crate::shared::{DomainError, StoreResult};

pub struct SessionStore {
    sessions: DashMap<ChargingSessionId, ChargingSession>,
    log: Arc<dyn CommandLog>,
    roaming_network: Option<Arc<dyn RoamingNetwork>>,
    events: SharedEventBus,
    commit_lock: Mutex<()>,
    ready: watch::Sender<bool>,
}

/// Shared, reference-counted session store
pub type SharedSessionStore = Arc<SessionStore>;

impl SessionStore {
    pub fn new(log: Arc<dyn CommandLog>, events: SharedEventBus) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            sessions: DashMap::new(),
            log,
            roaming_network: None,
            events,
            commit_lock: Mutex::new(()),
            ready,
        }
    }

    pub fn with_roaming_network(mut self, network: Arc<dyn RoamingNetwork>) -> Self {
        self.roaming_network = Some(network);
        self
    }

    pub fn shared(self) -> SharedSessionStore {
        Arc::new(self)
    }

    pub fn roaming_network(&self) -> Option<&Arc<dyn RoamingNetwork>> {
        self.roaming_network.as_ref()
    }

    // ── Readiness ───────────────────────────────────────────────

    /// Mark replay as finished. Callers must not serve traffic before.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
        info!(sessions = self.sessions.len(), "Session store ready");
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // Only fails if the sender is gone, which cannot outlive `self`.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn session_exists(&self, id: &ChargingSessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get(&self, id: &ChargingSessionId) -> Option<ChargingSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    /// Snapshot of all sessions, ordered by id
    pub fn sessions(&self) -> Vec<ChargingSession> {
        let mut all: Vec<ChargingSession> = self.sessions.iter().map(|s| s.clone()).collect();
        all.sort();
        all
    }

    pub fn sessions_for_evse(&self, evse_id: &EvseId) -> Vec<ChargingSession> {
        let mut found: Vec<ChargingSession> = self
            .sessions
            .iter()
            .filter(|s| s.evse_id.as_ref() == Some(evse_id))
            .map(|s| s.clone())
            .collect();
        found.sort();
        found
    }

    pub fn active_sessions(&self) -> Vec<ChargingSession> {
        let mut found: Vec<ChargingSession> = self
            .sessions
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.clone())
            .collect();
        found.sort();
        found
    }

    pub fn ids(&self) -> Vec<ChargingSessionId> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ── Generic commands ────────────────────────────────────────

    /// Insert a session that must not exist yet. Logged as `new`.
    pub async fn add_session(&self, system: &SystemId, session: ChargingSession) -> StoreResult<()> {
        let _commit = self.commit_lock.lock().await;
        let session = self.insert_new(session)?;
        self.commit(system, LogCommand::New, &session).await?;
        self.publish_created(system, LogCommand::New, session);
        Ok(())
    }

    /// Insert or replace. Logged as `new` or `update`; returns whether the
    /// session was inserted.
    pub async fn add_or_update_session(
        &self,
        system: &SystemId,
        mut session: ChargingSession,
    ) -> StoreResult<bool> {
        let _commit = self.commit_lock.lock().await;
        self.resolve(&mut session);
        let inserted = self
            .sessions
            .insert(session.id().clone(), session.clone())
            .is_none();

        let command = if inserted {
            LogCommand::New
        } else {
            LogCommand::Update
        };
        self.commit(system, command, &session).await?;

        if inserted {
            self.publish_created(system, command, session);
        } else {
            self.publish_updated(system, command, session);
        }
        Ok(inserted)
    }

    /// Fetch, transform, persist. Logged as `update`.
    ///
    /// The transformation runs on a copy; if it fails the stored session is
    /// untouched and nothing is logged.
    pub async fn update_session<F>(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
        update: F,
    ) -> StoreResult<ChargingSession>
    where
        F: FnOnce(&mut ChargingSession) -> Result<(), DomainError>,
    {
        let _commit = self.commit_lock.lock().await;
        let session = self.modify(id, update)?;
        self.commit(system, LogCommand::Update, &session).await?;
        self.publish_updated(system, LogCommand::Update, session.clone());
        Ok(session)
    }

    pub async fn add_energy_metering_value(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
        timestamp: DateTime<Utc>,
        kwh: Decimal,
    ) -> StoreResult<ChargingSession> {
        self.update_session(system, id, |session| {
            session.add_energy_metering_value(timestamp, kwh)
        })
        .await
    }

    /// Delete a session with a `remove` tombstone. Returns the deleted
    /// session, or `None` (and logs nothing) if it was not there.
    pub async fn remove_session(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
    ) -> StoreResult<Option<ChargingSession>> {
        self.delete(system, id, LogCommand::Remove, |_| true).await
    }

    /// Retire a finished session with a `close` tombstone.
    pub async fn close_session(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
    ) -> StoreResult<Option<ChargingSession>> {
        self.delete(system, id, LogCommand::Close, |_| true).await
    }

    /// Delete `id` with a `command` tombstone only if `keep_going` still
    /// holds for the live session at removal time.
    pub(crate) async fn evict_if<P>(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
        command: LogCommand,
        keep_going: P,
    ) -> StoreResult<Option<ChargingSession>>
    where
        P: FnOnce(&ChargingSession) -> bool,
    {
        self.delete(system, id, command, keep_going).await
    }

    // ── Start ───────────────────────────────────────────────────

    /// Record a remote start outcome. Only the success family carrying a
    /// session creates one; every other outcome returns `Ok(None)` untouched.
    pub async fn remote_start(
        &self,
        system: &SystemId,
        result: &RemoteStartResult,
    ) -> StoreResult<Option<ChargingSession>> {
        if !result.is_state_changing() {
            debug!(outcome = result.outcome.code(), "Remote start without state change");
            return Ok(None);
        }
        let Some(session) = result.session() else {
            warn!(outcome = result.outcome.code(), "Remote start succeeded without a session");
            return Ok(None);
        };

        let mut session = session.clone();
        session.start.system_id = Some(system.clone());
        if result.runtime_ms.is_some() {
            session.runtimes.start_ms = result.runtime_ms;
        }

        let _commit = self.commit_lock.lock().await;
        let session = self.insert_new(session)?;
        self.commit(system, LogCommand::RemoteStart, &session).await?;
        self.publish_created(system, LogCommand::RemoteStart, session.clone());
        Ok(Some(session))
    }

    /// Record a session started by local authorization.
    pub async fn auth_start(
        &self,
        system: &SystemId,
        mut session: ChargingSession,
    ) -> StoreResult<ChargingSession> {
        session.start.system_id = Some(system.clone());

        let _commit = self.commit_lock.lock().await;
        let session = self.insert_new(session)?;
        self.commit(system, LogCommand::AuthStart, &session).await?;
        self.publish_created(system, LogCommand::AuthStart, session.clone());
        Ok(session)
    }

    // ── Stop ────────────────────────────────────────────────────

    /// Record a remote stop attempt.
    ///
    /// The attempt is always kept as a stop request. Only a successful
    /// outcome ends the session, stamps the stop party, keeps an embedded
    /// CDR and detaches the EVSE.
    pub async fn remote_stop(
        &self,
        system: &SystemId,
        timestamp: DateTime<Utc>,
        mut party: SessionParty,
        result: RemoteStopResult,
    ) -> StoreResult<ChargingSession> {
        party.system_id = Some(system.clone());
        let id = result.session_id.clone();

        let _commit = self.commit_lock.lock().await;
        let mut rejected = None;
        let session = self.modify(&id, |session| {
            session.add_stop_request(StopRequest {
                timestamp,
                party: party.clone(),
                result: result.clone(),
            });
            if !result.is_state_changing() {
                return Ok(());
            }
            // An invalid stop time still leaves the attempt on record.
            if let Err(e) = session.stop_if_running(timestamp) {
                rejected = Some(e);
                return Ok(());
            }
            session.stop = party.clone();
            if result.runtime_ms.is_some() {
                session.runtimes.stop_ms = result.runtime_ms;
            }
            if let Some(cdr) = result.cdr() {
                session.add_received_cdr(ReceivedCdrInfo {
                    timestamp,
                    party,
                    cdr: cdr.clone(),
                });
            }
            Ok(())
        })?;
        self.commit(system, LogCommand::RemoteStop, &session).await?;

        if let Some(e) = rejected {
            warn!(session_id = %id, error = %e, "Remote stop recorded but not applied");
            self.publish_updated(system, LogCommand::RemoteStop, session.clone());
            return Err(e.into());
        }
        if result.is_state_changing() {
            self.publish_stopped(system, LogCommand::RemoteStop, result.outcome.code(), session.clone());
        } else {
            self.publish_updated(system, LogCommand::RemoteStop, session.clone());
        }
        Ok(session)
    }

    /// Record a stop by local authorization.
    pub async fn auth_stop(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
        timestamp: DateTime<Utc>,
        mut party: SessionParty,
    ) -> StoreResult<ChargingSession> {
        party.system_id = Some(system.clone());

        let _commit = self.commit_lock.lock().await;
        let session = self.modify(id, |session| {
            session.stop_if_running(timestamp)?;
            session.stop = party;
            Ok(())
        })?;
        self.commit(system, LogCommand::AuthStop, &session).await?;
        self.publish_stopped(system, LogCommand::AuthStop, "success", session.clone());
        Ok(session)
    }

    // ── CDR ─────────────────────────────────────────────────────

    /// Keep a received CDR. Ends the session at the CDR's end time (or
    /// `timestamp`) if it is still running.
    pub async fn cdr_received(
        &self,
        system: &SystemId,
        timestamp: DateTime<Utc>,
        cdr: ChargeDetailRecord,
    ) -> StoreResult<ChargingSession> {
        let id = cdr.session_id.clone();
        let cdr_id = cdr.id.clone();
        let party = SessionParty {
            system_id: Some(system.clone()),
            provider_id: cdr.provider_id.clone(),
            authentication: cdr.authentication.clone(),
            ..SessionParty::default()
        };
        let end_time = cdr.session_time.end_time().unwrap_or(timestamp);

        let _commit = self.commit_lock.lock().await;
        let session = self.modify(&id, |session| {
            session.stop_if_running(end_time)?;
            session.add_received_cdr(ReceivedCdrInfo {
                timestamp,
                party,
                cdr,
            });
            Ok(())
        })?;
        self.commit(system, LogCommand::CdrReceived, &session).await?;

        self.events.publish(Event::CdrReceived(CdrReceivedEvent {
            session_id: id,
            event_tracking_id: session.event_tracking_id.clone(),
            cdr_id,
            system_id: system.clone(),
            timestamp: Utc::now(),
        }));
        Ok(session)
    }

    /// Keep the outcome of forwarding this session's CDR downstream.
    pub async fn cdr_forwarded(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
        mut result: SendCdrResult,
    ) -> StoreResult<ChargingSession> {
        if result.system_id.is_none() {
            result.system_id = Some(system.clone());
        }
        let code = result.code;
        let runtime_ms = result.runtime_ms;

        let _commit = self.commit_lock.lock().await;
        let session = self.modify(id, |session| {
            if runtime_ms.is_some() {
                session.runtimes.cdr_ms = runtime_ms;
            }
            session.add_send_cdr_result(result);
            Ok(())
        })?;
        self.commit(system, LogCommand::CdrForwarded, &session).await?;

        self.events.publish(Event::CdrForwarded(CdrForwardedEvent {
            session_id: id.clone(),
            event_tracking_id: session.event_tracking_id.clone(),
            code,
            system_id: system.clone(),
            timestamp: Utc::now(),
        }));
        Ok(session)
    }

    // ── Replay ──────────────────────────────────────────────────

    /// Put a replayed snapshot into the map without logging anything.
    ///
    /// Replay visits newer sessions first, so an EVSE already held by
    /// another session is not taken over.
    pub(crate) fn restore(&self, command: LogCommand, session: ChargingSession) {
        if let Some(network) = self.roaming_network.as_deref() {
            let link = EvseLink::for_command(command, &session);
            apply_evse_link(network, &session, link, true);
        }
        self.sessions.insert(session.id().clone(), session);
        gauge!("wwcp_sessions_live").set(self.sessions.len() as f64);
    }

    // ── Internals ───────────────────────────────────────────────

    fn resolve(&self, session: &mut ChargingSession) {
        if let Some(network) = self.roaming_network.as_deref() {
            resolve_location(network, session);
        }
    }

    fn link(&self, command: LogCommand, session: &ChargingSession) {
        if let Some(network) = self.roaming_network.as_deref() {
            apply_evse_link(network, session, EvseLink::for_command(command, session), false);
        }
    }

    /// Insert a session whose id must be new. Caller holds the commit lock.
    fn insert_new(&self, mut session: ChargingSession) -> StoreResult<ChargingSession> {
        use dashmap::mapref::entry::Entry;

        self.resolve(&mut session);
        match self.sessions.entry(session.id().clone()) {
            Entry::Occupied(_) => {
                warn!(session_id = %session.id(), "Duplicate session start rejected");
                Err(DomainError::SessionAlreadyExists(session.id().clone()).into())
            }
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Apply `change` to a copy of the session and store it if the change
    /// succeeds. Caller holds the commit lock.
    fn modify<F>(&self, id: &ChargingSessionId, change: F) -> StoreResult<ChargingSession>
    where
        F: FnOnce(&mut ChargingSession) -> Result<(), DomainError>,
    {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| DomainError::SessionNotFound(id.clone()))?;

        let mut updated = entry.clone();
        change(&mut updated)?;
        self.resolve(&mut updated);
        *entry = updated.clone();
        Ok(updated)
    }

    async fn delete<P>(
        &self,
        system: &SystemId,
        id: &ChargingSessionId,
        command: LogCommand,
        predicate: P,
    ) -> StoreResult<Option<ChargingSession>>
    where
        P: FnOnce(&ChargingSession) -> bool,
    {
        let _commit = self.commit_lock.lock().await;
        let Some((_, session)) = self.sessions.remove_if(id, |_, s| predicate(s)) else {
            return Ok(None);
        };

        self.link(command, &session);
        self.append(LogEntry::tombstone(command, id.clone(), Utc::now()))
            .await?;

        let event = SessionRemovedEvent {
            session_id: id.clone(),
            system_id: system.clone(),
            timestamp: Utc::now(),
        };
        self.events.publish(match command {
            LogCommand::Close => Event::SessionClosed(event),
            _ => Event::SessionRemoved(event),
        });
        info!(session_id = %id, command = %command, system_id = %system, "Session deleted");
        Ok(Some(session))
    }

    /// EVSE link plus log append for a committed snapshot. Caller holds the
    /// commit lock.
    async fn commit(
        &self,
        system: &SystemId,
        command: LogCommand,
        session: &ChargingSession,
    ) -> StoreResult<()> {
        self.link(command, session);
        self.append(LogEntry::snapshot(command, session, Utc::now()))
            .await?;
        debug!(
            session_id = %session.id(),
            command = %command,
            system_id = %system,
            "Session command committed"
        );
        Ok(())
    }

    async fn append(&self, entry: LogEntry) -> StoreResult<()> {
        if let Err(e) = self.log.append(&entry).await {
            error!(
                session_id = %entry.id,
                command = %entry.command,
                error = %e,
                "Command log append failed, memory is ahead of the log"
            );
            return Err(e.into());
        }
        counter!("wwcp_session_commands_total", "command" => entry.command.as_str()).increment(1);
        gauge!("wwcp_sessions_live").set(self.sessions.len() as f64);
        Ok(())
    }

    fn publish_created(&self, system: &SystemId, command: LogCommand, session: ChargingSession) {
        self.events.publish(Event::SessionCreated(SessionCreatedEvent {
            command: command.to_string(),
            system_id: system.clone(),
            session: Box::new(session),
            timestamp: Utc::now(),
        }));
    }

    fn publish_updated(&self, system: &SystemId, command: LogCommand, session: ChargingSession) {
        self.events.publish(Event::SessionUpdated(SessionUpdatedEvent {
            command: command.to_string(),
            system_id: system.clone(),
            session: Box::new(session),
            timestamp: Utc::now(),
        }));
    }

    fn publish_stopped(
        &self,
        system: &SystemId,
        command: LogCommand,
        result: &str,
        session: ChargingSession,
    ) {
        self.events.publish(Event::SessionStopped(SessionStoppedEvent {
            command: command.to_string(),
            system_id: system.clone(),
            result: result.to_string(),
            evse_id: session.evse_id.clone(),
            session: Box::new(session),
            timestamp: Utc::now(),
        }));
    }
}

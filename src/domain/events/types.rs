//! Session notification events
//!
//! Raised by the session store after each command, for billing and
//! CDR-forwarding subscribers. Best-effort: nobody is required to listen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::charging::SendCdrResultCode;
use crate::domain::ids::{ChargeDetailRecordId, ChargingSessionId, EventTrackingId, EvseId, SystemId};
use crate::domain::session::ChargingSession;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    SessionCreated(SessionCreatedEvent),
    SessionUpdated(SessionUpdatedEvent),
    SessionStopped(SessionStoppedEvent),
    CdrReceived(CdrReceivedEvent),
    CdrForwarded(CdrForwardedEvent),
    SessionClosed(SessionRemovedEvent),
    SessionRemoved(SessionRemovedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::SessionCreated(_) => "session_created",
            Event::SessionUpdated(_) => "session_updated",
            Event::SessionStopped(_) => "session_stopped",
            Event::CdrReceived(_) => "cdr_received",
            Event::CdrForwarded(_) => "cdr_forwarded",
            Event::SessionClosed(_) => "session_closed",
            Event::SessionRemoved(_) => "session_removed",
        }
    }

    pub fn session_id(&self) -> &ChargingSessionId {
        match self {
            Event::SessionCreated(e) => e.session.id(),
            Event::SessionUpdated(e) => e.session.id(),
            Event::SessionStopped(e) => e.session.id(),
            Event::CdrReceived(e) => &e.session_id,
            Event::CdrForwarded(e) => &e.session_id,
            Event::SessionClosed(e) => &e.session_id,
            Event::SessionRemoved(e) => &e.session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreatedEvent {
    /// Log command that created it (`remoteStart`, `authStart`, `new`)
    pub command: String,
    pub system_id: SystemId,
    pub session: Box<ChargingSession>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdatedEvent {
    pub command: String,
    pub system_id: SystemId,
    pub session: Box<ChargingSession>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStoppedEvent {
    pub command: String,
    pub system_id: SystemId,
    /// Outcome code of the stop attempt
    pub result: String,
    pub evse_id: Option<EvseId>,
    pub session: Box<ChargingSession>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdrReceivedEvent {
    pub session_id: ChargingSessionId,
    pub event_tracking_id: Option<EventTrackingId>,
    pub cdr_id: ChargeDetailRecordId,
    pub system_id: SystemId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdrForwardedEvent {
    pub session_id: ChargingSessionId,
    pub event_tracking_id: Option<EventTrackingId>,
    pub code: SendCdrResultCode,
    pub system_id: SystemId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRemovedEvent {
    pub session_id: ChargingSessionId,
    pub system_id: SystemId,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

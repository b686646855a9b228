//! Remote stop outcomes

use serde::{Deserialize, Serialize};

use super::cdr::ChargeDetailRecord;
use crate::domain::ids::ChargingSessionId;

/// What to do with the reservation that backed the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReservationHandling {
    Close,
    KeepAlive { seconds: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum RemoteStopOutcome {
    UnknownOperator,
    UnknownLocation,
    InvalidSessionId,
    InvalidCredentials,
    InternalUse,
    OutOfService,
    Offline,
    AlreadyStopped,
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cdr: Option<Box<ChargeDetailRecord>>,
        #[serde(
            default,
            rename = "reservationHandling",
            skip_serializing_if = "Option::is_none"
        )]
        reservation_handling: Option<ReservationHandling>,
    },
    AsyncOperation,
    Timeout,
    CommunicationError,
    Error,
    NoOperation,
}

impl RemoteStopOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownOperator => "unknownOperator",
            Self::UnknownLocation => "unknownLocation",
            Self::InvalidSessionId => "invalidSessionId",
            Self::InvalidCredentials => "invalidCredentials",
            Self::InternalUse => "internalUse",
            Self::OutOfService => "outOfService",
            Self::Offline => "offline",
            Self::AlreadyStopped => "alreadyStopped",
            Self::Success { .. } => "success",
            Self::AsyncOperation => "asyncOperation",
            Self::Timeout => "timeout",
            Self::CommunicationError => "communicationError",
            Self::Error => "error",
            Self::NoOperation => "noOperation",
        }
    }
}

/// Result of a remote stop for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopResult {
    pub session_id: ChargingSessionId,
    #[serde(flatten)]
    pub outcome: RemoteStopOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<u64>,
}

impl RemoteStopResult {
    pub fn new(session_id: ChargingSessionId, outcome: RemoteStopOutcome) -> Self {
        Self {
            session_id,
            outcome,
            description: None,
            additional_info: None,
            runtime_ms: None,
        }
    }

    pub fn success(
        session_id: ChargingSessionId,
        cdr: Option<ChargeDetailRecord>,
        reservation_handling: Option<ReservationHandling>,
    ) -> Self {
        Self::new(
            session_id,
            RemoteStopOutcome::Success {
                cdr: cdr.map(Box::new),
                reservation_handling,
            },
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_additional_info(mut self, info: serde_json::Value) -> Self {
        self.additional_info = Some(info);
        self
    }

    pub fn with_runtime(mut self, runtime: std::time::Duration) -> Self {
        self.runtime_ms = Some(runtime.as_millis() as u64);
        self
    }

    pub fn is_state_changing(&self) -> bool {
        matches!(self.outcome, RemoteStopOutcome::Success { .. })
    }

    pub fn cdr(&self) -> Option<&ChargeDetailRecord> {
        match &self.outcome {
            RemoteStopOutcome::Success { cdr, .. } => cdr.as_deref(),
            _ => None,
        }
    }

    pub fn reservation_handling(&self) -> Option<ReservationHandling> {
        match &self.outcome {
            RemoteStopOutcome::Success {
                reservation_handling,
                ..
            } => *reservation_handling,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_changes_state() {
        let id = ChargingSessionId::new("S1");
        assert!(RemoteStopResult::success(id.clone(), None, None).is_state_changing());
        for outcome in [
            RemoteStopOutcome::AlreadyStopped,
            RemoteStopOutcome::AsyncOperation,
            RemoteStopOutcome::Offline,
            RemoteStopOutcome::InvalidSessionId,
        ] {
            assert!(!RemoteStopResult::new(id.clone(), outcome).is_state_changing());
        }
    }

    #[test]
    fn success_payload_survives_encoding() {
        let result = RemoteStopResult::success(
            ChargingSessionId::new("S1"),
            None,
            Some(ReservationHandling::KeepAlive { seconds: 900 }),
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"code\":\"success\""));
        let back: RemoteStopResult = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.reservation_handling(),
            Some(ReservationHandling::KeepAlive { seconds: 900 })
        );
    }
}

//! Remote start outcomes

use serde::{Deserialize, Serialize};

use crate::domain::session::ChargingSession;

/// What happened when a remote start was attempted. Exactly one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum RemoteStartOutcome {
    Unspecified,
    UnknownOperator,
    UnknownLocation,
    InvalidSessionId,
    InvalidCredentials,
    #[serde(rename = "noEVConnectedToEVSE")]
    NoEvConnectedToEvse,
    AlreadyInUse,
    InternalUse,
    OutOfService,
    Offline,
    Reserved,
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Box<ChargingSession>>,
    },
    /// Accepted; the charge point confirms later
    AsyncOperation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Box<ChargingSession>>,
    },
    SuccessPlugInCableToStartCharging {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Box<ChargingSession>>,
    },
    Rejected,
    Timeout,
    CommunicationError,
    Error,
    NoOperation,
}

impl RemoteStartOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::UnknownOperator => "unknownOperator",
            Self::UnknownLocation => "unknownLocation",
            Self::InvalidSessionId => "invalidSessionId",
            Self::InvalidCredentials => "invalidCredentials",
            Self::NoEvConnectedToEvse => "noEVConnectedToEVSE",
            Self::AlreadyInUse => "alreadyInUse",
            Self::InternalUse => "internalUse",
            Self::OutOfService => "outOfService",
            Self::Offline => "offline",
            Self::Reserved => "reserved",
            Self::Success { .. } => "success",
            Self::AsyncOperation { .. } => "asyncOperation",
            Self::SuccessPlugInCableToStartCharging { .. } => "successPlugInCableToStartCharging",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::CommunicationError => "communicationError",
            Self::Error => "error",
            Self::NoOperation => "noOperation",
        }
    }
}

/// Result of a remote start as reported by a charge point operator adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartResult {
    #[serde(flatten)]
    pub outcome: RemoteStartOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Diagnostic payload from the remote side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<u64>,
}

impl RemoteStartResult {
    pub fn new(outcome: RemoteStartOutcome) -> Self {
        Self {
            outcome,
            description: None,
            additional_info: None,
            runtime_ms: None,
        }
    }

    pub fn success(session: ChargingSession) -> Self {
        Self::new(RemoteStartOutcome::Success {
            session: Some(Box::new(session)),
        })
    }

    pub fn async_operation(session: ChargingSession) -> Self {
        Self::new(RemoteStartOutcome::AsyncOperation {
            session: Some(Box::new(session)),
        })
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

    /// Only the success family creates a session.
    pub fn is_state_changing(&self) -> bool {
        matches!(
            self.outcome,
            RemoteStartOutcome::Success { .. }
                | RemoteStartOutcome::AsyncOperation { .. }
                | RemoteStartOutcome::SuccessPlugInCableToStartCharging { .. }
        )
    }

    pub fn session(&self) -> Option<&ChargingSession> {
        match &self.outcome {
            RemoteStartOutcome::Success { session }
            | RemoteStartOutcome::AsyncOperation { session }
            | RemoteStartOutcome::SuccessPlugInCableToStartCharging { session } => {
                session.as_deref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn only_success_family_changes_state() {
        let session = ChargingSession::new("S1".into(), Utc::now());
        assert!(RemoteStartResult::success(session.clone()).is_state_changing());
        assert!(RemoteStartResult::async_operation(session).is_state_changing());
        assert!(RemoteStartResult::new(RemoteStartOutcome::SuccessPlugInCableToStartCharging {
            session: None
        })
        .is_state_changing());

        for outcome in [
            RemoteStartOutcome::Offline,
            RemoteStartOutcome::Reserved,
            RemoteStartOutcome::NoEvConnectedToEvse,
            RemoteStartOutcome::Timeout,
        ] {
            assert!(!RemoteStartResult::new(outcome).is_state_changing());
        }
    }

    #[test]
    fn wire_code_matches_code() {
        let result = RemoteStartResult::new(RemoteStartOutcome::NoEvConnectedToEvse)
            .with_description("no cable")
            .with_runtime(std::time::Duration::from_millis(1200));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["code"], result.outcome.code());
        assert_eq!(json["runtimeMs"], 1200);

        let back: RemoteStartResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}

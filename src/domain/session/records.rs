//! Value records attached to a charging session

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::charging::{ChargeDetailRecord, RemoteStopResult};
use crate::domain::ids::{
    ChargingProductId, CsoRoamingProviderId, EMobilityProviderId, EmpRoamingProviderId, SystemId,
};

/// Credential presented to start or stop a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Authentication {
    /// RFID card UID or similar local token
    AuthToken(String),
    /// Contract id supplied by the e-mobility provider (EMAId)
    RemoteIdentification(String),
    /// ISO 15118 contract certificate identity
    PlugAndCharge(String),
}

impl Authentication {
    pub fn value(&self) -> &str {
        match self {
            Self::AuthToken(v) | Self::RemoteIdentification(v) | Self::PlugAndCharge(v) => v,
        }
    }
}

/// Who started (or stopped) a session and through which systems.
///
/// Start and stop are tracked independently on the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cso_roaming_provider_id: Option<CsoRoamingProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emp_roaming_provider_id: Option<EmpRoamingProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<EMobilityProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
}

impl SessionParty {
    pub fn with_provider(mut self, provider_id: impl Into<EMobilityProviderId>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = Some(authentication);
        self
    }

    pub fn with_emp_roaming_provider(mut self, id: impl Into<EmpRoamingProviderId>) -> Self {
        self.emp_roaming_provider_id = Some(id.into());
        self
    }

    pub fn with_cso_roaming_provider(mut self, id: impl Into<CsoRoamingProviderId>) -> Self {
        self.cso_roaming_provider_id = Some(id.into());
        self
    }
}

/// Selected charging product. Its parameters are not interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingProduct {
    pub id: ChargingProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ChargingProduct {
    pub fn new(id: impl Into<ChargingProductId>) -> Self {
        Self {
            id: id.into(),
            parameters: None,
        }
    }
}

/// One energy reading in kWh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyMeteringValue {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

/// Audit entry for one stop attempt, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub party: SessionParty,
    pub result: RemoteStopResult,
}

/// Audit entry for one received charge detail record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedCdrInfo {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub party: SessionParty,
    pub cdr: ChargeDetailRecord,
}

/// Measured latencies of the remote operations, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRuntimes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdr_ms: Option<u64>,
}

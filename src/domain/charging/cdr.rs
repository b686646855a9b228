//! Charge detail records and the outcome of forwarding them

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ids::{
    ChargeDetailRecordId, ChargingPoolId, ChargingReservationId, ChargingSessionId,
    ChargingStationId, ChargingStationOperatorId, EMobilityProviderId, EvseId, SystemId,
};
use crate::domain::session::{
    Authentication, ChargingProduct, ChargingSession, EnergyMeteringValue, SessionTime,
};

/// Billable summary of a completed charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDetailRecord {
    pub id: ChargeDetailRecordId,
    pub session_id: ChargingSessionId,
    pub session_time: SessionTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<ChargingStationOperatorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<ChargingPoolId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<ChargingStationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<EvseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<EMobilityProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ChargingReservationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging_product: Option<ChargingProduct>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub energy_metering_values: Vec<EnergyMeteringValue>,
}

impl ChargeDetailRecord {
    /// Build a record from the current state of `session`.
    pub fn from_session(id: impl Into<ChargeDetailRecordId>, session: &ChargingSession) -> Self {
        Self {
            id: id.into(),
            session_id: session.id().clone(),
            session_time: session.session_time,
            operator_id: session.operator_id.clone(),
            pool_id: session.pool_id.clone(),
            station_id: session.station_id.clone(),
            evse_id: session.evse_id.clone(),
            provider_id: session.start.provider_id.clone(),
            authentication: session.start.authentication.clone(),
            reservation_id: session.reservation_id.clone(),
            charging_product: session.charging_product.clone(),
            energy_metering_values: session.energy_metering_values().to_vec(),
        }
    }

    pub fn consumed_energy(&self) -> Decimal {
        self.energy_metering_values.iter().map(|v| v.value).sum()
    }
}

/// Forwarding outcome codes reported by the outbound CDR pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SendCdrResultCode {
    Unspecified,
    NotForwarded,
    Enqueued,
    Success,
    #[serde(rename = "couldNotConvertCDRFormat")]
    CouldNotConvertCdrFormat,
    InvalidSessionId,
    UnknownLocation,
    Offline,
    Rejected,
    Timeout,
    Error,
}

impl SendCdrResultCode {
    /// Enqueued counts as delivered for retention purposes.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Success | Self::Enqueued)
    }
}

/// One attempt to forward a session's CDR downstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCdrResult {
    pub timestamp: DateTime<Utc>,
    pub code: SendCdrResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdr: Option<ChargeDetailRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<u64>,
}

impl SendCdrResult {
    pub fn new(code: SendCdrResultCode, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            code,
            system_id: None,
            warnings: Vec::new(),
            cdr: None,
            runtime_ms: None,
        }
    }

    pub fn with_cdr(mut self, cdr: ChargeDetailRecord) -> Self {
        self.cdr = Some(cdr);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cdr_copies_session_linkage() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let mut session = ChargingSession::new("S1".into(), start).with_evse("DE*GEF*E1*1".into());
        session
            .add_energy_metering_value(start, Decimal::new(25, 1))
            .unwrap();
        session
            .add_energy_metering_value(start + chrono::Duration::minutes(5), Decimal::new(40, 1))
            .unwrap();

        let cdr = ChargeDetailRecord::from_session("CDR-1", &session);
        assert_eq!(cdr.session_id.as_str(), "S1");
        assert_eq!(cdr.evse_id.as_ref().map(|e| e.as_str()), Some("DE*GEF*E1*1"));
        assert_eq!(cdr.consumed_energy(), Decimal::new(65, 1));
    }

    #[test]
    fn enqueued_counts_as_delivered() {
        assert!(SendCdrResultCode::Success.is_delivered());
        assert!(SendCdrResultCode::Enqueued.is_delivered());
        assert!(!SendCdrResultCode::NotForwarded.is_delivered());
        assert!(!SendCdrResultCode::Timeout.is_delivered());
    }

    #[test]
    fn code_wire_names() {
        assert_eq!(
            serde_json::to_string(&SendCdrResultCode::CouldNotConvertCdrFormat).unwrap(),
            "\"couldNotConvertCDRFormat\""
        );
        assert_eq!(serde_json::to_string(&SendCdrResultCode::Enqueued).unwrap(), "\"enqueued\"");
    }
}

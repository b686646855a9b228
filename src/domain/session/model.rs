//! Charging session aggregate

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::audit::AppendOnly;
use super::records::{
    ChargingProduct, EnergyMeteringValue, OperationRuntimes, ReceivedCdrInfo, SessionParty,
    StopRequest,
};
use super::time::SessionTime;
use crate::domain::charging::SendCdrResult;
use crate::domain::ids::{
    ChargingPoolId, ChargingReservationId, ChargingSessionId, ChargingStationId,
    ChargingStationOperatorId, EvseId, EventTrackingId, RoamingNetworkId,
};
use crate::shared::DomainError;

/// One charging session, from start through CDR forwarding.
///
/// Only the session store mutates a live session. Every field but `id`
/// and `sessionTime` may be missing in older log lines and decodes as
/// "not yet known".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSession {
    id: ChargingSessionId,
    /// Absent in log lines written before tracking ids existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_tracking_id: Option<EventTrackingId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roaming_network_id: Option<RoamingNetworkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<ChargingStationOperatorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<ChargingPoolId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<ChargingStationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<EvseId>,

    pub session_time: SessionTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ChargingReservationId>,

    #[serde(default)]
    pub start: SessionParty,
    #[serde(default)]
    pub stop: SessionParty,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging_product: Option<ChargingProduct>,

    #[serde(default)]
    energy_metering_values: AppendOnly<EnergyMeteringValue>,
    #[serde(default)]
    stop_requests: AppendOnly<StopRequest>,
    #[serde(default, rename = "receivedCDRInfos")]
    received_cdr_infos: AppendOnly<ReceivedCdrInfo>,
    #[serde(default, rename = "sendCDRResults")]
    send_cdr_results: AppendOnly<SendCdrResult>,

    /// Retention pin: never evicted before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_auto_deletion_before: Option<DateTime<Utc>>,

    #[serde(default)]
    pub runtimes: OperationRuntimes,
}

impl ChargingSession {
    pub fn new(id: ChargingSessionId, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            event_tracking_id: Some(EventTrackingId::random()),
            roaming_network_id: None,
            operator_id: None,
            pool_id: None,
            station_id: None,
            evse_id: None,
            session_time: SessionTime::new(start_time),
            reservation_id: None,
            start: SessionParty::default(),
            stop: SessionParty::default(),
            charging_product: None,
            energy_metering_values: AppendOnly::new(),
            stop_requests: AppendOnly::new(),
            received_cdr_infos: AppendOnly::new(),
            send_cdr_results: AppendOnly::new(),
            no_auto_deletion_before: None,
            runtimes: OperationRuntimes::default(),
        }
    }

    pub fn with_event_tracking_id(mut self, event_tracking_id: EventTrackingId) -> Self {
        self.event_tracking_id = Some(event_tracking_id);
        self
    }

    pub fn with_roaming_network(mut self, roaming_network_id: RoamingNetworkId) -> Self {
        self.roaming_network_id = Some(roaming_network_id);
        self
    }

    /// Sets only the EVSE id; station/pool/operator are back-filled by the
    /// store's location resolver.
    pub fn with_evse(mut self, evse_id: EvseId) -> Self {
        self.evse_id = Some(evse_id);
        self
    }

    pub fn with_reservation(mut self, reservation_id: ChargingReservationId) -> Self {
        self.reservation_id = Some(reservation_id);
        self
    }

    pub fn with_charging_product(mut self, product: ChargingProduct) -> Self {
        self.charging_product = Some(product);
        self
    }

    pub fn with_start_party(mut self, party: SessionParty) -> Self {
        self.start = party;
        self
    }

    pub fn with_no_auto_deletion_before(mut self, pin: DateTime<Utc>) -> Self {
        self.no_auto_deletion_before = Some(pin);
        self
    }

    pub fn id(&self) -> &ChargingSessionId {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        !self.session_time.is_ended()
    }

    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.session_time.duration(now)
    }

    /// Time since the session started
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.session_time.start_time()
    }

    pub fn stop(&mut self, end_time: DateTime<Utc>) -> Result<(), DomainError> {
        self.session_time.set_end(end_time)
    }

    /// Set the end time unless one is already known.
    pub fn stop_if_running(&mut self, end_time: DateTime<Utc>) -> Result<(), DomainError> {
        if self.session_time.is_ended() {
            return Ok(());
        }
        self.stop(end_time)
    }

    pub fn is_pinned(&self, now: DateTime<Utc>) -> bool {
        self.no_auto_deletion_before.is_some_and(|pin| pin > now)
    }

    // ── Energy ──────────────────────────────────────────────────

    pub fn energy_metering_values(&self) -> &[EnergyMeteringValue] {
        &self.energy_metering_values
    }

    /// Append a reading in kWh. Negative values and readings older than the
    /// last one are rejected so the consumed energy never decreases.
    pub fn add_energy_metering_value(
        &mut self,
        timestamp: DateTime<Utc>,
        value: Decimal,
    ) -> Result<(), DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "negative energy reading {} for session {}",
                value, self.id
            )));
        }
        if let Some(last) = self.energy_metering_values.last() {
            if timestamp < last.timestamp {
                return Err(DomainError::Validation(format!(
                    "energy reading at {} is older than last reading at {}",
                    timestamp, last.timestamp
                )));
            }
        }
        self.energy_metering_values
            .push(EnergyMeteringValue { timestamp, value });
        Ok(())
    }

    pub fn consumed_energy(&self) -> Decimal {
        self.energy_metering_values.iter().map(|v| v.value).sum()
    }

    // ── Audit trails ────────────────────────────────────────────

    pub fn stop_requests(&self) -> &[StopRequest] {
        &self.stop_requests
    }

    pub fn add_stop_request(&mut self, request: StopRequest) {
        self.stop_requests.push(request);
    }

    pub fn received_cdr_infos(&self) -> &[ReceivedCdrInfo] {
        &self.received_cdr_infos
    }

    pub fn add_received_cdr(&mut self, info: ReceivedCdrInfo) {
        self.received_cdr_infos.push(info);
    }

    pub fn send_cdr_results(&self) -> &[SendCdrResult] {
        &self.send_cdr_results
    }

    pub fn add_send_cdr_result(&mut self, result: SendCdrResult) {
        self.send_cdr_results.push(result);
    }

    /// At least one forwarding attempt ended in `success` or `enqueued`.
    pub fn has_delivered_cdr(&self) -> bool {
        self.send_cdr_results.iter().any(|r| r.code.is_delivered())
    }
}

impl PartialEq for ChargingSession {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChargingSession {}

impl Hash for ChargingSession {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ChargingSession {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChargingSession {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

// ── Tests ──────────────────────────────────────────────────────

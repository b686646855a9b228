//! Roaming network boundary
//!
//! The session store only looks entities up by id and sets the EVSE's
//! session back-reference. It never changes topology.

use serde::{Deserialize, Serialize};

use crate::domain::ids::{
    ChargingPoolId, ChargingSessionId, ChargingStationId, ChargingStationOperatorId, EvseId,
    RoamingNetworkId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingStationOperator {
    pub id: ChargingStationOperatorId,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingPool {
    pub id: ChargingPoolId,
    pub operator_id: ChargingStationOperatorId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingStation {
    pub id: ChargingStationId,
    pub pool_id: ChargingPoolId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evse {
    pub id: EvseId,
    pub station_id: ChargingStationId,
    /// Session currently attached to this EVSE, if any
    pub charging_session_id: Option<ChargingSessionId>,
}

/// Lookups into one roaming network plus the EVSE back-reference.
pub trait RoamingNetwork: Send + Sync {
    fn id(&self) -> &RoamingNetworkId;

    fn get_evse_by_id(&self, id: &EvseId) -> Option<Evse>;
    fn get_charging_station_by_id(&self, id: &ChargingStationId) -> Option<ChargingStation>;
    fn get_charging_pool_by_id(&self, id: &ChargingPoolId) -> Option<ChargingPool>;
    fn get_charging_station_operator_by_id(
        &self,
        id: &ChargingStationOperatorId,
    ) -> Option<ChargingStationOperator>;

    fn evse_session(&self, evse_id: &EvseId) -> Option<ChargingSessionId>;

    /// Set or clear the EVSE's session back-reference. Returns `false` when
    /// the EVSE is unknown.
    fn set_evse_session(&self, evse_id: &EvseId, session_id: Option<ChargingSessionId>) -> bool;
}

//! In-memory roaming network for single-process deployments and tests

use dashmap::DashMap;

use crate::domain::ids::{
    ChargingPoolId, ChargingSessionId, ChargingStationId, ChargingStationOperatorId, EvseId,
    RoamingNetworkId,
};
use crate::domain::roaming::{
    ChargingPool, ChargingStation, ChargingStationOperator, Evse, RoamingNetwork,
};

pub struct InMemoryRoamingNetwork {
    id: RoamingNetworkId,
    operators: DashMap<ChargingStationOperatorId, ChargingStationOperator>,
    pools: DashMap<ChargingPoolId, ChargingPool>,
    stations: DashMap<ChargingStationId, ChargingStation>,
    evses: DashMap<EvseId, Evse>,
}

impl InMemoryRoamingNetwork {
    pub fn new(id: impl Into<RoamingNetworkId>) -> Self {
        Self {
            id: id.into(),
            operators: DashMap::new(),
            pools: DashMap::new(),
            stations: DashMap::new(),
            evses: DashMap::new(),
        }
    }

    pub fn add_operator(&self, id: impl Into<ChargingStationOperatorId>, name: Option<String>) {
        let id = id.into();
        self.operators
            .insert(id.clone(), ChargingStationOperator { id, name });
    }

    pub fn add_pool(
        &self,
        id: impl Into<ChargingPoolId>,
        operator_id: impl Into<ChargingStationOperatorId>,
    ) {
        let id = id.into();
        self.pools.insert(
            id.clone(),
            ChargingPool {
                id,
                operator_id: operator_id.into(),
            },
        );
    }

    pub fn add_station(&self, id: impl Into<ChargingStationId>, pool_id: impl Into<ChargingPoolId>) {
        let id = id.into();
        self.stations.insert(
            id.clone(),
            ChargingStation {
                id,
                pool_id: pool_id.into(),
            },
        );
    }

    pub fn add_evse(&self, id: impl Into<EvseId>, station_id: impl Into<ChargingStationId>) {
        let id = id.into();
        self.evses.insert(
            id.clone(),
            Evse {
                id,
                station_id: station_id.into(),
                charging_session_id: None,
            },
        );
    }
}

impl RoamingNetwork for InMemoryRoamingNetwork {
    fn id(&self) -> &RoamingNetworkId {
        &self.id
    }

    fn get_evse_by_id(&self, id: &EvseId) -> Option<Evse> {
        self.evses.get(id).map(|e| e.clone())
    }

    fn get_charging_station_by_id(&self, id: &ChargingStationId) -> Option<ChargingStation> {
        self.stations.get(id).map(|s| s.clone())
    }

    fn get_charging_pool_by_id(&self, id: &ChargingPoolId) -> Option<ChargingPool> {
        self.pools.get(id).map(|p| p.clone())
    }

    fn get_charging_station_operator_by_id(
        &self,
        id: &ChargingStationOperatorId,
    ) -> Option<ChargingStationOperator> {
        self.operators.get(id).map(|o| o.clone())
    }

    fn evse_session(&self, evse_id: &EvseId) -> Option<ChargingSessionId> {
        self.evses
            .get(evse_id)
            .and_then(|e| e.charging_session_id.clone())
    }

    fn set_evse_session(&self, evse_id: &EvseId, session_id: Option<ChargingSessionId>) -> bool {
        match self.evses.get_mut(evse_id) {
            Some(mut evse) => {
                evse.charging_session_id = session_id;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_reference_is_settable() {
        let network = InMemoryRoamingNetwork::new("Prod");
        network.add_evse("E1", "ST1");

        assert!(network.set_evse_session(&"E1".into(), Some("S1".into())));
        assert_eq!(network.evse_session(&"E1".into()), Some("S1".into()));

        assert!(network.set_evse_session(&"E1".into(), None));
        assert_eq!(network.evse_session(&"E1".into()), None);
    }

    #[test]
    fn unknown_evse_is_reported() {
        let network = InMemoryRoamingNetwork::new("Prod");
        assert!(!network.set_evse_session(&"E404".into(), Some("S1".into())));
        assert!(network.get_evse_by_id(&"E404".into()).is_none());
    }
}

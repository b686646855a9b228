pub mod charging;
pub mod events;
pub mod ids;
pub mod roaming;
pub mod session;

// Re-export commonly used types
pub use charging::{
    ChargeDetailRecord, RemoteStartOutcome, RemoteStartResult, RemoteStopOutcome,
    RemoteStopResult, ReservationHandling, SendCdrResult, SendCdrResultCode,
};
pub use ids::{
    ChargeDetailRecordId, ChargingPoolId, ChargingProductId, ChargingReservationId,
    ChargingSessionId, ChargingStationId, ChargingStationOperatorId, CsoRoamingProviderId,
    EMobilityProviderId, EmpRoamingProviderId, EventTrackingId, EvseId, RoamingNetworkId,
    SystemId,
};
pub use roaming::RoamingNetwork;
pub use session::{
    Authentication, ChargingProduct, ChargingSession, EnergyMeteringValue, ReceivedCdrInfo,
    SessionParty, SessionTime, StopRequest,
};

// Re-export DomainError from shared for convenience
pub use crate::shared::errors::DomainError;

//! Charging session aggregate and its owned records

pub mod audit;
pub mod model;
pub mod records;
pub mod time;

pub use audit::AppendOnly;
pub use model::ChargingSession;
pub use records::{
    Authentication, ChargingProduct, EnergyMeteringValue, OperationRuntimes, ReceivedCdrInfo,
    SessionParty, StopRequest,
};
pub use time::SessionTime;

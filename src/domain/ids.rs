//! Identifier value types
//!
//! All identifiers are opaque strings on the wire. Each gets its own
//! newtype so a station id can never be handed to an EVSE lookup.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Charging session identifier
    ChargingSessionId
);
string_id!(
    /// Correlates all commands caused by the same external request
    EventTrackingId
);
string_id!(RoamingNetworkId);
string_id!(ChargingStationOperatorId);
string_id!(ChargingPoolId);
string_id!(ChargingStationId);
string_id!(
    /// Electric Vehicle Supply Equipment (one connector / socket)
    EvseId
);
string_id!(ChargingReservationId);
string_id!(
    /// E-mobility provider (contracts with the driver)
    EMobilityProviderId
);
string_id!(CsoRoamingProviderId);
string_id!(EmpRoamingProviderId);
string_id!(
    /// Identity of the host/system that issued a command
    SystemId
);
string_id!(ChargeDetailRecordId);
string_id!(ChargingProductId);

impl ChargingSessionId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl EventTrackingId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = EvseId::new("DE*GEF*E1234*1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"DE*GEF*E1234*1\"");
        let parsed: EvseId = serde_json::from_str("\"DE*GEF*E1234*1\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn random_session_ids_differ() {
        assert_ne!(ChargingSessionId::random(), ChargingSessionId::random());
        assert_ne!(EventTrackingId::random(), EventTrackingId::random());
    }
}

//! Session location resolution and EVSE back-references

use tracing::{debug, warn};

use crate::domain::roaming::RoamingNetwork;
use crate::domain::session::ChargingSession;
use crate::infrastructure::command_log::LogCommand;

/// Fill in missing station, pool and operator ids from the most specific
/// id the session already carries. Known ids are never overwritten.
pub fn resolve_location(network: &dyn RoamingNetwork, session: &mut ChargingSession) {
    if session.roaming_network_id.is_none() {
        session.roaming_network_id = Some(network.id().clone());
    }

    if session.station_id.is_none() {
        if let Some(evse) = session
            .evse_id
            .as_ref()
            .and_then(|id| network.get_evse_by_id(id))
        {
            session.station_id = Some(evse.station_id);
        }
    }

    if session.pool_id.is_none() {
        if let Some(station) = session
            .station_id
            .as_ref()
            .and_then(|id| network.get_charging_station_by_id(id))
        {
            session.pool_id = Some(station.pool_id);
        }
    }

    if session.operator_id.is_none() {
        if let Some(pool) = session
            .pool_id
            .as_ref()
            .and_then(|id| network.get_charging_pool_by_id(id))
        {
            session.operator_id = Some(pool.operator_id);
        }
    }
}

/// What a command does to the EVSE back-reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvseLink {
    Attach,
    Detach,
}

impl EvseLink {
    /// Link effect of `command` given the session state it produced.
    pub fn for_command(command: LogCommand, session: &ChargingSession) -> Self {
        match command {
            LogCommand::RemoteStart | LogCommand::AuthStart | LogCommand::New => Self::Attach,
            LogCommand::Update | LogCommand::RemoteStop | LogCommand::AuthStop => {
                if session.is_active() {
                    Self::Attach
                } else {
                    Self::Detach
                }
            }
            LogCommand::CdrReceived | LogCommand::CdrForwarded => Self::Detach,
            LogCommand::Close | LogCommand::Remove => Self::Detach,
        }
    }
}

/// Apply `link` for `session`'s EVSE.
///
/// Detaching only clears a reference that still points at this session.
/// With `only_if_free`, attaching leaves an EVSE already held by another
/// session alone.
pub fn apply_evse_link(
    network: &dyn RoamingNetwork,
    session: &ChargingSession,
    link: EvseLink,
    only_if_free: bool,
) {
    let Some(evse_id) = session.evse_id.as_ref() else {
        return;
    };

    match link {
        EvseLink::Attach => {
            if only_if_free {
                if let Some(current) = network.evse_session(evse_id) {
                    if &current != session.id() {
                        debug!(
                            evse_id = %evse_id,
                            session_id = %session.id(),
                            holder = %current,
                            "EVSE already held by a newer session"
                        );
                        return;
                    }
                }
            }
            if !network.set_evse_session(evse_id, Some(session.id().clone())) {
                warn!(evse_id = %evse_id, session_id = %session.id(), "Unknown EVSE, session not attached");
            }
        }
        EvseLink::Detach => {
            if network.evse_session(evse_id).as_ref() == Some(session.id()) {
                network.set_evse_session(evse_id, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::roaming::InMemoryRoamingNetwork;
    use chrono::Utc;

    fn network() -> InMemoryRoamingNetwork {
        let rn = InMemoryRoamingNetwork::new("Prod");
        rn.add_operator("DE*GEF", Some("GraphDefined".into()));
        rn.add_pool("DE*GEF*P1", "DE*GEF");
        rn.add_station("DE*GEF*S1", "DE*GEF*P1");
        rn.add_evse("DE*GEF*E1", "DE*GEF*S1");
        rn
    }

    #[test]
    fn evse_back_fills_the_whole_chain() {
        let rn = network();
        let mut session = ChargingSession::new("S1".into(), Utc::now()).with_evse("DE*GEF*E1".into());
        resolve_location(&rn, &mut session);

        assert_eq!(session.roaming_network_id.as_ref().map(|i| i.as_str()), Some("Prod"));
        assert_eq!(session.station_id.as_ref().map(|i| i.as_str()), Some("DE*GEF*S1"));
        assert_eq!(session.pool_id.as_ref().map(|i| i.as_str()), Some("DE*GEF*P1"));
        assert_eq!(session.operator_id.as_ref().map(|i| i.as_str()), Some("DE*GEF"));
    }

    #[test]
    fn known_ids_are_kept() {
        let rn = network();
        let mut session = ChargingSession::new("S1".into(), Utc::now()).with_evse("DE*GEF*E1".into());
        session.station_id = Some("DE*GEF*S9".into());
        resolve_location(&rn, &mut session);

        assert_eq!(session.station_id.as_ref().map(|i| i.as_str()), Some("DE*GEF*S9"));
        assert!(session.pool_id.is_none());
    }

    #[test]
    fn detach_leaves_other_sessions_attached() {
        let rn = network();
        let old = ChargingSession::new("S-old".into(), Utc::now()).with_evse("DE*GEF*E1".into());
        let new = ChargingSession::new("S-new".into(), Utc::now()).with_evse("DE*GEF*E1".into());

        apply_evse_link(&rn, &new, EvseLink::Attach, false);
        apply_evse_link(&rn, &old, EvseLink::Detach, false);
        assert_eq!(rn.evse_session(&"DE*GEF*E1".into()), Some("S-new".into()));

        apply_evse_link(&rn, &old, EvseLink::Attach, true);
        assert_eq!(rn.evse_session(&"DE*GEF*E1".into()), Some("S-new".into()));
    }

    #[test]
    fn stop_commands_detach_only_ended_sessions() {
        let mut session = ChargingSession::new("S1".into(), Utc::now());
        assert_eq!(EvseLink::for_command(LogCommand::RemoteStop, &session), EvseLink::Attach);
        session.stop(Utc::now()).unwrap();
        assert_eq!(EvseLink::for_command(LogCommand::RemoteStop, &session), EvseLink::Detach);
        assert_eq!(EvseLink::for_command(LogCommand::CdrForwarded, &session), EvseLink::Detach);
    }
}

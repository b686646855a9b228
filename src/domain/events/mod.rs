//! Domain events
//!
//! Event types that represent facts about what happened to a charging
//! session. The EventBus implementation lives in `application::events`.

pub mod types;

pub use types::{
    CdrForwardedEvent, CdrReceivedEvent, Event, EventMessage, SessionCreatedEvent,
    SessionRemovedEvent, SessionStoppedEvent, SessionUpdatedEvent,
};

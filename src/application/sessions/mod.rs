//! Charging session lifecycle: store, replay and retention

pub mod location;
pub mod replay;
pub mod store;
pub mod sweeper;

pub use location::resolve_location;
pub use replay::{ReplayEngine, ReplayReport};
pub use store::{SessionStore, SharedSessionStore};
pub use sweeper::{
    start_session_sweeper_task, RetentionPolicy, SessionSweeper, SweepReport,
    DEFAULT_SUCCESSFUL_RETENTION_DAYS, DEFAULT_UNSUCCESSFUL_RETENTION_DAYS,
};

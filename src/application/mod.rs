pub mod events;
pub mod sessions;

// Re-export key types for convenience
pub use events::{create_event_bus, Event, EventBus, EventSubscriber, SharedEventBus};
pub use sessions::{
    start_session_sweeper_task, ReplayEngine, ReplayReport, RetentionPolicy, SessionStore,
    SessionSweeper, SharedSessionStore, SweepReport,
};

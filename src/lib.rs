//! # WWCP Core
//!
//! Charging-session lifecycle engine for a multi-operator EV roaming
//! network: a concurrent, crash-recoverable session store backed by an
//! append-only command log.
//!
//! ## Architecture
//!
//! - **domain**: Identifiers, the session aggregate, start/stop result
//!   taxonomy, CDRs and the roaming network boundary
//! - **application**: Session store, start-up replay, retention sweeper
//!   and the notification bus
//! - **infrastructure**: File-backed command log, in-memory roaming network
//! - **shared**: Errors and shutdown coordination

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use application::{
    create_event_bus, Event, EventBus, ReplayEngine, ReplayReport, RetentionPolicy, SessionStore,
    SessionSweeper, SharedEventBus, SharedSessionStore, SweepReport,
};
pub use infrastructure::{CommandLog, FileCommandLog, InMemoryRoamingNetwork};
pub use server::{init_tracing, ServiceHandle, ServiceOptions};
pub use shared::{AppError, DomainError, InfraError, StoreResult};

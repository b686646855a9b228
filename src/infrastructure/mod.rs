pub mod command_log;
pub mod roaming;

pub use command_log::{CommandLog, FileCommandLog, LogCommand, LogEntry};
pub use roaming::InMemoryRoamingNetwork;

//! Append-only command log
//!
//! Every session store command leaves exactly one line here. The replay
//! engine rebuilds the session map from these lines alone.

pub mod entry;
mod file_log;

use async_trait::async_trait;

pub use entry::{is_comment, log_file_name, LogCommand, LogEntry, LogLine};
pub use file_log::FileCommandLog;

use crate::shared::InfraError;

/// Durable sink for session commands.
///
/// Implementations serialize concurrent appends and must report every
/// failed write; a dropped line would let memory and disk diverge.
#[async_trait]
pub trait CommandLog: Send + Sync {
    async fn append(&self, entry: &LogEntry) -> Result<(), InfraError>;
}

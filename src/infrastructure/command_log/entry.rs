//! Command log line format
//!
//! One JSON object per line:
//! `{"timestamp":"2026-10-01T12:00:00Z","id":"S1","command":"remoteStart","session":{...}}`.
//! Tombstones (`close`, `remove`) carry no `session`. Lines starting with
//! `//` or `#` are comments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{ChargingSessionId, RoamingNetworkId};
use crate::domain::session::ChargingSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogCommand {
    #[serde(rename = "remoteStart")]
    RemoteStart,
    #[serde(rename = "authStart")]
    AuthStart,
    #[serde(rename = "remoteStop")]
    RemoteStop,
    #[serde(rename = "authStop")]
    AuthStop,
    #[serde(rename = "CDRReceived")]
    CdrReceived,
    #[serde(rename = "CDRForwarded")]
    CdrForwarded,
    #[serde(rename = "new")]
    New,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "close")]
    Close,
    #[serde(rename = "remove")]
    Remove,
}

impl LogCommand {
    pub const ALL: [LogCommand; 10] = [
        Self::RemoteStart,
        Self::AuthStart,
        Self::RemoteStop,
        Self::AuthStop,
        Self::CdrReceived,
        Self::CdrForwarded,
        Self::New,
        Self::Update,
        Self::Close,
        Self::Remove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteStart => "remoteStart",
            Self::AuthStart => "authStart",
            Self::RemoteStop => "remoteStop",
            Self::AuthStop => "authStop",
            Self::CdrReceived => "CDRReceived",
            Self::CdrForwarded => "CDRForwarded",
            Self::New => "new",
            Self::Update => "update",
            Self::Close => "close",
            Self::Remove => "remove",
        }
    }

    /// Deletion record without session state
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Close | Self::Remove)
    }
}

impl fmt::Display for LogCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown log command '{}'", s))
    }
}

/// One durable command record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub id: ChargingSessionId,
    pub command: LogCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<ChargingSession>,
}

impl LogEntry {
    pub fn snapshot(command: LogCommand, session: &ChargingSession, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            id: session.id().clone(),
            command,
            session: Some(session.clone()),
        }
    }

    pub fn tombstone(command: LogCommand, id: ChargingSessionId, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            id,
            command,
            session: None,
        }
    }

    /// Single-line JSON, without the trailing newline
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A log line with its snapshot left undecoded.
///
/// Replay decides from the header alone whether the snapshot is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub id: ChargingSessionId,
    pub command: LogCommand,
    #[serde(default)]
    session: Option<serde_json::Value>,
}

impl LogLine {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn into_snapshot(self) -> Result<Option<ChargingSession>, serde_json::Error> {
        self.session.map(serde_json::from_value).transpose()
    }
}

pub fn is_comment(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("//") || line.starts_with('#')
}

/// `<store-name>-<roaming-network-id>_`
pub fn log_file_prefix(store_name: &str, roaming_network_id: &RoamingNetworkId) -> String {
    format!("{}-{}_", store_name, roaming_network_id)
}

/// `<store-name>-<roaming-network-id>_<year>-<month>.log`, month zero
/// padded so name order is chronological order.
pub fn log_file_name(
    store_name: &str,
    roaming_network_id: &RoamingNetworkId,
    timestamp: DateTime<Utc>,
) -> String {
    format!(
        "{}{:04}-{:02}.log",
        log_file_prefix(store_name, roaming_network_id),
        timestamp.year(),
        timestamp.month()
    )
}

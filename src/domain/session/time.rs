//! Session start/end time

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::DomainError;

/// Start is mandatory; end, once known, never precedes start. Decoding
/// enforces the same rule as [`SessionTime::set_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SessionTimeRecord")]
pub struct SessionTime {
    start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionTimeRecord {
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
}

impl TryFrom<SessionTimeRecord> for SessionTime {
    type Error = DomainError;

    fn try_from(record: SessionTimeRecord) -> Result<Self, Self::Error> {
        let mut time = Self::new(record.start_time);
        if let Some(end_time) = record.end_time {
            time.set_end(end_time)?;
        }
        Ok(time)
    }
}

impl SessionTime {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
        }
    }

    pub fn with_end(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<Self, DomainError> {
        let mut time = Self::new(start_time);
        time.set_end(end_time)?;
        Ok(time)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn set_end(&mut self, end_time: DateTime<Utc>) -> Result<(), DomainError> {
        if end_time < self.start_time {
            return Err(DomainError::Validation(format!(
                "session end {} precedes start {}",
                end_time, self.start_time
            )));
        }
        self.end_time = Some(end_time);
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// `(end ?? now) - start`
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }
}

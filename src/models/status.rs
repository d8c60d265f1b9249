use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStatus {
    Matched,
    Settled,
    Failed,
    Cancelled,
    Pending,
    Rejected,
    Unknown,
}

impl CanonicalStatus {
    /// Maps a vendor proprietary status code. Unrecognised codes are `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0201" => CanonicalStatus::Matched,
            "0202" => CanonicalStatus::Settled,
            "0203" => CanonicalStatus::Failed,
            "0204" => CanonicalStatus::Cancelled,
            "0205" => CanonicalStatus::Pending,
            "0206" => CanonicalStatus::Rejected,
            _ => CanonicalStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::Matched => "MATCHED",
            CanonicalStatus::Settled => "SETTLED",
            CanonicalStatus::Failed => "FAILED",
            CanonicalStatus::Cancelled => "CANCELLED",
            CanonicalStatus::Pending => "PENDING",
            CanonicalStatus::Rejected => "REJECTED",
            CanonicalStatus::Unknown => "UNKNOWN",
        }
    }
}

impl Display for CanonicalStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical result of parsing one inbound status document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    pub correlation_key: Option<String>,
    pub raw_status_code: Option<String>,
    pub canonical_status: CanonicalStatus,
    pub additional_reason_info: Option<String>,
    pub business_message_id: Option<String>,
    pub status_issuer: Option<String>,
    pub transaction_id: Option<String>,
    pub source_queue: String,
    pub received_at: DateTime<Utc>,
}

impl StatusRecord {
    /// The correlation key, if present and non-blank.
    pub fn usable_correlation_key(&self) -> Option<&str> {
        self.correlation_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollerState {
    Stopped,
    Running,
}

impl PollerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollerState::Stopped => "STOPPED",
            PollerState::Running => "RUNNING",
        }
    }
}

impl Display for PollerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of one status queue's poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuePollerStatus {
    pub queue_name: String,
    pub enabled: bool,
    pub state: PollerState,
    pub consecutive_failures: u32,
}

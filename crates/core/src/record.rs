//! Session metadata records.
//!
//! The orchestrator reports session lifecycle increments to a persistence
//! collaborator but does not own storage; these types are the shape of what
//! it reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The inactivity watchdog said goodbye and disconnected.
    Goodbye,
    /// The caller ended the session deliberately.
    UserEnded,
    /// The transport failed or reported a disconnect the caller did not ask for.
    Error,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Goodbye => write!(f, "goodbye"),
            EndReason::UserEnded => write!(f, "user_ended"),
            EndReason::Error => write!(f, "error"),
        }
    }
}

/// A stored session row, as the persistence collaborator reports it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub messages_exchanged: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

/// The final update the orchestrator flushes when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClose {
    pub reason: EndReason,
    pub duration_seconds: i64,
    pub messages_exchanged: u32,
    /// Optional conversation summary for continuity into the next session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

//! Session persistence collaborator contract.
//!
//! The orchestrator reports lifecycle increments to whatever store the host
//! wires in; it never reads storage beyond the optional previous-session
//! summary fetched at start. Everything except `end_session` is treated as
//! best-effort: failures are logged and never fatal to the session.

use anyhow::Result;
use async_trait::async_trait;
use deckhand_core::{SessionClose, VoiceContext};
use uuid::Uuid;

/// Where session metadata goes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Records that a session started. The orchestrator generates the id so
    /// this call can be fired and forgotten without gating the connect.
    async fn start_session(&self, session_id: Uuid, context: &VoiceContext) -> Result<()>;

    /// Bumps the message counter for a live session.
    async fn increment_message_count(&self, session_id: Uuid) -> Result<()>;

    /// Flushes the final record. The controller awaits this with a short
    /// timeout before declaring the session idle.
    async fn end_session(&self, session_id: Uuid, close: &SessionClose) -> Result<()>;

    /// Fetches a summary of the customer's previous session, if one exists.
    async fn load_previous_summary(&self) -> Result<Option<String>>;
}

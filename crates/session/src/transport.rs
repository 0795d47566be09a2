//! Realtime transport collaborator contract.
//!
//! The orchestrator consumes the transport, it does not implement one. A
//! concrete implementation (WebRTC session, provider WebSocket, in-process
//! fake) lives in the host application; everything here is the seam the
//! session controller drives and listens to. No wire protocol is encoded or
//! decoded in this crate.

use async_trait::async_trait;
use deckhand_core::{ToolInvocation, ToolResult};
use tokio::sync::mpsc;

/// Errors surfaced by a transport implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    ConnectFailed(String),
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport protocol error: {0}")]
    Protocol(String),
}

/// Inbound events a connected transport delivers to the orchestrator.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The user finished an utterance; `transcript` is the recognized text.
    UserUtterance { transcript: String },
    /// The agent began or continued a textual response.
    AgentResponse { text: String },
    /// A chunk of agent speech audio arrived. The orchestrator only treats
    /// this as an agent-activity signal; audio handling is the host's job.
    AudioDelta,
    /// The remote agent requested a local tool invocation.
    ToolCall(ToolInvocation),
    /// The transport closed without the orchestrator asking it to.
    Disconnected { reason: Option<String> },
    /// A transport-level error. The session ends with an `error` reason.
    Error(String),
}

/// The bidirectional realtime channel to the remote conversational agent.
///
/// Implementations take `&self` and manage their own interior state, so the
/// orchestrator can hold them behind `Arc<dyn RealtimeTransport>`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Opens the channel with a session credential. Events for the life of
    /// this connection are delivered through `events`; each connect attempt
    /// is independent and receives its own sender clone.
    async fn connect(
        &self,
        token: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError>;

    /// Sends a text message into the conversation. Used both for
    /// user-typed text and for the orchestrator's synthetic instructions.
    async fn send_message(&self, text: &str) -> Result<(), TransportError>;

    /// Returns a tool result to the remote agent.
    async fn send_tool_result(&self, result: &ToolResult) -> Result<(), TransportError>;

    /// Closes the channel. Idempotent from the orchestrator's point of view.
    async fn end_session(&self) -> Result<(), TransportError>;
}

//! Tool dispatch registry.
//!
//! Maps tool names to uniform async handlers. Dispatch never fails across
//! the transport boundary: unknown tools, handler errors, and timeouts all
//! resolve to a JSON error payload so the remote agent always receives a
//! string result it can react to conversationally.

use deckhand_core::{ToolInvocation, ToolResult};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Generous upper bound for handlers that call external services. Handlers
/// are not timed out unless registered with one.
pub const SUGGESTED_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Uniform handler signature: flat JSON params in, string payload out.
pub type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync>;

struct ToolEntry {
    handler: ToolHandler,
    timeout: Option<Duration>,
}

/// Registry of `name -> handler` entries consulted for every inbound
/// tool-call event.
#[derive(Default)]
pub struct ToolRegistry {
    entries: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler with no timeout. Re-registering a name replaces
    /// the previous handler.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            ToolEntry {
                handler: Box::new(handler),
                timeout: None,
            },
        );
    }

    /// Registers a handler that is cut off after `timeout`; the cut-off
    /// still resolves the invocation with an error payload.
    pub fn register_with_timeout<F>(&mut self, name: impl Into<String>, timeout: Duration, handler: F)
    where
        F: Fn(Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            ToolEntry {
                handler: Box::new(handler),
                timeout: Some(timeout),
            },
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Runs the handler for `invocation` and always produces a result.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> ToolResult {
        let started = Instant::now();
        let Some(entry) = self.entries.get(&invocation.name) else {
            warn!(tool = %invocation.name, "unknown tool invocation");
            return ToolResult {
                invocation_id: invocation.invocation_id.clone(),
                payload: error_payload(&format!("unknown tool: {}", invocation.name)),
            };
        };

        let fut = (entry.handler)(invocation.params.clone());
        let outcome = match entry.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(format!(
                    "tool '{}' timed out after {}ms",
                    invocation.name,
                    limit.as_millis()
                )),
            },
            None => fut.await,
        };

        let (payload, status) = match outcome {
            Ok(payload) => (payload, "ok"),
            Err(message) => (error_payload(&message), "error"),
        };
        info!(
            tool = %invocation.name,
            status,
            duration_ms = started.elapsed().as_millis() as u64,
            "tool dispatched"
        );

        ToolResult {
            invocation_id: invocation.invocation_id.clone(),
            payload,
        }
    }
}

/// Encodes an error message as the string payload the wire contract expects.
fn error_payload(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

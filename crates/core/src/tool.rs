//! Tool invocation wire types.
//!
//! The remote agent requests local side effects by name. The wire contract
//! is deliberately narrow: parameters arrive as a flat JSON map and every
//! result goes back as a single string, so handlers that produce structured
//! data JSON-encode it themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound tool call received from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation id supplied by the remote agent; echoed back in the result.
    pub invocation_id: String,
    /// Registered tool name.
    pub name: String,
    /// Flat key-value parameter map.
    #[serde(default)]
    pub params: Value,
}

/// The answer to a [`ToolInvocation`], sent back over the transport.
///
/// The payload is always a string, success or failure, so the remote agent
/// can react conversationally instead of handling an exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub invocation_id: String,
    pub payload: String,
}

/// Parameters for the inventory lookup tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_hp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<u32>,
    #[serde(default)]
    pub in_stock_only: bool,
}

/// Parameters for the SMS follow-up tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsRequest {
    pub phone: String,
    pub body: String,
}

/// Parameters for the page navigation tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    /// Site-relative path, e.g. "/financing".
    pub page: String,
}

/// Parameters for the price estimation tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimateRequest {
    pub model: String,
    pub hp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_in_value: Option<f64>,
}

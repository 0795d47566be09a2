//! Domain model for the Deckhand voice assistant.
//!
//! This crate holds the pure data types shared between the session
//! orchestrator and its host application: conversation context snapshots,
//! tool invocation wire types, and session metadata records. It contains no
//! runtime and performs no I/O.

pub mod context;
pub mod record;
pub mod tool;

pub use context::{ContextPatch, MotorContext, QuoteContext, VoiceContext};
pub use record::{EndReason, SessionClose, SessionRecord};
pub use tool::{
    InventoryQuery, NavigationRequest, PriceEstimateRequest, SmsRequest, ToolInvocation,
    ToolResult,
};

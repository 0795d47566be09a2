//! Conversation context passed to the remote agent.
//!
//! A [`VoiceContext`] is captured when a session starts and describes what
//! the customer is currently looking at: the motor on screen, the page they
//! navigated from, and any financing quote in progress. The snapshot can be
//! patched while the session is live via [`ContextPatch`].

use serde::{Deserialize, Serialize};

/// The outboard motor the customer is currently viewing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorContext {
    /// Model designation, e.g. "F150 XB".
    pub model: String,
    /// Rated horsepower.
    pub hp: u32,
    /// Listed price, absent for call-for-price inventory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// A financing quote the customer has in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteContext {
    /// Motor the quote was built for.
    pub motor_model: String,
    /// Quoted total price.
    pub total: f64,
    /// Estimated monthly payment, if financing terms were selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<f64>,
    /// Financing term in months.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_months: Option<u32>,
}

/// Immutable context snapshot handed to the agent at session start.
///
/// `previous_summary` is filled in by the orchestrator from the persistence
/// collaborator when a prior session summary is available; callers leave it
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motor: Option<MotorContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_summary: Option<String>,
}

/// A partial update to a live session's [`VoiceContext`].
///
/// `None` fields leave the corresponding snapshot field untouched, so a
/// patch carrying only `current_page` does not clear the motor or quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motor: Option<MotorContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteContext>,
}

impl ContextPatch {
    /// Returns true when the patch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.motor.is_none() && self.current_page.is_none() && self.quote.is_none()
    }

    /// Applies the patch to a snapshot, overwriting only the fields present.
    pub fn apply(&self, ctx: &mut VoiceContext) {
        if let Some(motor) = &self.motor {
            ctx.motor = Some(motor.clone());
        }
        if let Some(page) = &self.current_page {
            ctx.current_page = Some(page.clone());
        }
        if let Some(quote) = &self.quote {
            ctx.quote = Some(quote.clone());
        }
    }
}

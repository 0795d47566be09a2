//! Short-lived session credential acquisition.
//!
//! Before the transport can connect, the orchestrator trades the current
//! conversation context for a one-shot token at the credential endpoint.
//! The absence of a token in the response is a fatal connect error; there
//! is nothing the transport could do with an empty credential.

use crate::config::OrchestratorConfig;
use async_trait::async_trait;
use deckhand_core::{MotorContext, QuoteContext, VoiceContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("credential endpoint returned status {status}")]
    Endpoint { status: u16 },
    #[error("credential endpoint returned no token")]
    MissingToken,
}

/// Context payload sent to the credential endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motor_context: Option<MotorContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_context: Option<QuoteContext>,
}

impl From<&VoiceContext> for CredentialRequest {
    fn from(ctx: &VoiceContext) -> Self {
        Self {
            motor_context: ctx.motor.clone(),
            current_page: ctx.current_page.clone(),
            quote_context: ctx.quote.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CredentialResponse {
    token: Option<String>,
}

/// A usable session credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub token: String,
}

/// Anything that can produce a session credential for a context.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self, request: &CredentialRequest) -> Result<SessionCredential, CredentialError>;
}

/// The production credential source: POSTs the context to the configured
/// token endpoint and requires a non-empty `token` back.
pub struct HttpCredentialClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCredentialClient {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.credential_endpoint.clone(),
        })
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialClient {
    async fn fetch(&self, request: &CredentialRequest) -> Result<SessionCredential, CredentialError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Endpoint {
                status: status.as_u16(),
            });
        }

        let body: CredentialResponse = response.json().await?;
        match body.token {
            Some(token) if !token.is_empty() => {
                debug!("session credential acquired");
                Ok(SessionCredential { token })
            }
            _ => Err(CredentialError::MissingToken),
        }
    }
}

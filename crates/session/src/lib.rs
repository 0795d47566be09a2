//! Real-time voice session orchestrator for the Deckhand assistant.
//!
//! Owns the lifecycle of one live, bidirectional voice connection to the
//! remote conversational agent: connection establishment with bounded
//! backoff, two liveness watchdogs (user inactivity and slow-to-respond
//! "thinking"), and the typed tool-invocation contract that lets the agent
//! trigger local operations and receive string results.
//!
//! The transport, the persistence store, the audio device gate, and every
//! tool handler's business logic are collaborators the host wires in
//! through traits; this crate only orchestrates them.

pub mod backoff;
pub mod config;
pub mod controller;
pub mod credential;
pub mod devices;
pub mod establish;
pub mod store;
pub mod timer;
pub mod tools;
pub mod transport;
pub mod watchdog;

pub use config::{ConfigError, OrchestratorConfig, SessionTiming};
pub use controller::{SessionController, SessionDeps, SessionError, SessionState};
pub use credential::{CredentialError, CredentialSource, HttpCredentialClient};
pub use devices::{AudioDevices, DeviceError};
pub use establish::ConnectError;
pub use store::SessionStore;
pub use tools::ToolRegistry;
pub use transport::{RealtimeTransport, TransportError, TransportEvent};

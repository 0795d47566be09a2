//! Connection establishment: device gate, credential, bounded retries.
//!
//! Each step fails fast into a typed error so a failed `start()` can tell
//! the caller exactly what went wrong and leave nothing half-open behind
//! it. Only the previous-session summary and the start record are
//! best-effort; everything else gates the connect.

use crate::backoff::{self, MAX_CONNECT_ATTEMPTS};
use crate::credential::{CredentialError, CredentialRequest, CredentialSource};
use crate::devices::{AudioDevices, DeviceError};
use crate::store::SessionStore;
use crate::transport::{RealtimeTransport, TransportError, TransportEvent};
use deckhand_core::VoiceContext;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why `start()` could not reach a connected session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no audio input device available")]
    NoDevice,
    #[error("microphone capture permission denied")]
    PermissionDenied,
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("transport connect exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

/// What a successful establishment hands back to the controller.
#[derive(Debug)]
pub struct Established {
    pub session_id: Uuid,
    pub previous_summary: Option<String>,
}

/// Performs the pre-connect checks and opens the transport with bounded
/// retries.
pub struct ConnectionEstablisher {
    devices: Arc<dyn AudioDevices>,
    credentials: Arc<dyn CredentialSource>,
    store: Arc<dyn SessionStore>,
    max_attempts: u32,
}

impl ConnectionEstablisher {
    pub fn new(
        devices: Arc<dyn AudioDevices>,
        credentials: Arc<dyn CredentialSource>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            devices,
            credentials,
            store,
            max_attempts: MAX_CONNECT_ATTEMPTS,
        }
    }

    /// Runs the establishment sequence against `transport`.
    ///
    /// On success the transport is connected, events flow through `events`,
    /// and the session-start record has been fired off to the store. On
    /// failure no timers are armed and no connection is left half-open: a
    /// failed attempt's transport is abandoned, never reused.
    pub async fn establish(
        &self,
        transport: &Arc<dyn RealtimeTransport>,
        context: &VoiceContext,
        events: &mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Established, ConnectError> {
        let inputs = self.devices.list_input_devices().await?;
        if inputs.is_empty() {
            return Err(ConnectError::NoDevice);
        }
        debug!(devices = inputs.len(), "audio input devices found");

        if !self.devices.request_capture().await? {
            return Err(ConnectError::PermissionDenied);
        }

        // The summary fetch is best-effort continuity; its failure must
        // never decide the credential's outcome.
        let credential_request = CredentialRequest::from(context);
        let (credential, summary) = tokio::join!(
            self.credentials.fetch(&credential_request),
            self.store.load_previous_summary(),
        );
        let credential = credential?;
        let previous_summary = summary.unwrap_or_else(|e| {
            warn!(error = ?e, "previous session summary unavailable, continuing without it");
            None
        });

        let mut last_error: Option<TransportError> = None;
        for attempt in 1..=self.max_attempts {
            match transport.connect(&credential.token, events.clone()).await {
                Ok(()) => {
                    info!(attempt, "transport connected");
                    let session_id = Uuid::new_v4();
                    let store = self.store.clone();
                    let start_context = context.clone();
                    tokio::spawn(async move {
                        if let Err(e) = store.start_session(session_id, &start_context).await {
                            warn!(error = ?e, %session_id, "failed to record session start");
                        }
                    });
                    return Ok(Established {
                        session_id,
                        previous_summary,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "transport connect attempt failed");
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff::delay_after(attempt)).await;
                    }
                }
            }
        }

        Err(ConnectError::Exhausted {
            attempts: self.max_attempts,
            source: last_error
                .unwrap_or_else(|| TransportError::ConnectFailed("no attempt was made".into())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{MockCredentialSource, SessionCredential};
    use crate::devices::MockAudioDevices;
    use crate::transport::MockRealtimeTransport;
    use anyhow::anyhow;
    use deckhand_core::SessionClose;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn working_devices() -> MockAudioDevices {
        let mut devices = MockAudioDevices::new();
        devices
            .expect_list_input_devices()
            .returning(|| Ok(vec!["Built-in Microphone".to_string()]));
        devices.expect_request_capture().returning(|| Ok(true));
        devices
    }

    fn working_credentials() -> MockCredentialSource {
        let mut credentials = MockCredentialSource::new();
        credentials.expect_fetch().returning(|_| {
            Ok(SessionCredential {
                token: "tok-1".to_string(),
            })
        });
        credentials
    }

    /// Store stub that counts calls without mockall's drop-time checks, so
    /// fire-and-forget spawns can be asserted positively.
    #[derive(Default)]
    struct CountingStore {
        starts: AtomicU32,
        summary_fails: bool,
    }

    #[async_trait::async_trait]
    impl SessionStore for CountingStore {
        async fn start_session(&self, _id: Uuid, _ctx: &VoiceContext) -> anyhow::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn increment_message_count(&self, _id: Uuid) -> anyhow::Result<()> {
            Ok(())
        }
        async fn end_session(&self, _id: Uuid, _close: &SessionClose) -> anyhow::Result<()> {
            Ok(())
        }
        async fn load_previous_summary(&self) -> anyhow::Result<Option<String>> {
            if self.summary_fails {
                Err(anyhow!("summary table unavailable"))
            } else {
                Ok(Some("asked about the F150 trim".to_string()))
            }
        }
    }

    fn establisher_with(
        devices: MockAudioDevices,
        credentials: MockCredentialSource,
        store: Arc<CountingStore>,
    ) -> ConnectionEstablisher {
        ConnectionEstablisher::new(Arc::new(devices), Arc::new(credentials), store)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_no_input_devices_fails_before_permission() {
        let mut devices = MockAudioDevices::new();
        devices.expect_list_input_devices().returning(|| Ok(vec![]));
        // No expect_request_capture: reaching it would panic the mock.

        let establisher = establisher_with(
            devices,
            MockCredentialSource::new(),
            Arc::new(CountingStore::default()),
        );
        let transport: Arc<dyn RealtimeTransport> = Arc::new(MockRealtimeTransport::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = establisher
            .establish(&transport, &VoiceContext::default(), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::NoDevice));
    }

    #[tokio::test]
    async fn test_permission_refusal_fails_before_credential_fetch() {
        let mut devices = MockAudioDevices::new();
        devices
            .expect_list_input_devices()
            .returning(|| Ok(vec!["mic".to_string()]));
        devices.expect_request_capture().returning(|| Ok(false));

        let establisher = establisher_with(
            devices,
            MockCredentialSource::new(),
            Arc::new(CountingStore::default()),
        );
        let transport: Arc<dyn RealtimeTransport> = Arc::new(MockRealtimeTransport::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = establisher
            .establish(&transport, &VoiceContext::default(), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_summary_failure_does_not_fail_establishment() {
        let store = Arc::new(CountingStore {
            summary_fails: true,
            ..Default::default()
        });
        let establisher = establisher_with(working_devices(), working_credentials(), store.clone());

        let mut transport = MockRealtimeTransport::new();
        transport.expect_connect().returning(|_, _| Ok(()));
        let transport: Arc<dyn RealtimeTransport> = Arc::new(transport);
        let (tx, _rx) = mpsc::unbounded_channel();

        let established = establisher
            .establish(&transport, &VoiceContext::default(), &tx)
            .await
            .expect("summary failure must not gate the connect");
        assert!(established.previous_summary.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_attempt_succeeds_after_backoff() {
        let store = Arc::new(CountingStore::default());
        let establisher = establisher_with(working_devices(), working_credentials(), store.clone());

        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let mut transport = MockRealtimeTransport::new();
        transport.expect_connect().times(2).returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::ConnectFailed("refused".to_string()))
            } else {
                Ok(())
            }
        });
        let transport: Arc<dyn RealtimeTransport> = Arc::new(transport);
        let (tx, _rx) = mpsc::unbounded_channel();

        let before = tokio::time::Instant::now();
        let established = establisher
            .establish(&transport, &VoiceContext::default(), &tx)
            .await
            .expect("second attempt should connect");
        assert!(before.elapsed() >= Duration::from_millis(1_000));
        assert!(established.previous_summary.is_some());

        settle().await;
        assert_eq!(store.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_three_attempts() {
        let store = Arc::new(CountingStore::default());
        let establisher = establisher_with(working_devices(), working_credentials(), store.clone());

        let mut transport = MockRealtimeTransport::new();
        transport
            .expect_connect()
            .times(3)
            .returning(|_, _| Err(TransportError::ConnectFailed("refused".to_string())));
        let transport: Arc<dyn RealtimeTransport> = Arc::new(transport);
        let (tx, _rx) = mpsc::unbounded_channel();

        let before = tokio::time::Instant::now();
        let err = establisher
            .establish(&transport, &VoiceContext::default(), &tx)
            .await
            .unwrap_err();

        // 1s after attempt 1 plus 2s after attempt 2.
        assert!(before.elapsed() >= Duration::from_millis(3_000));
        match err {
            ConnectError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, TransportError::ConnectFailed(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        settle().await;
        assert_eq!(store.starts.load(Ordering::SeqCst), 0);
    }
}

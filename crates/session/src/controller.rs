//! Session controller: the state machine owning one live voice session.
//!
//! Composes the establisher, the two watchdogs, and the tool registry into
//! the surface the host application sees: `start()`, `end(reason)`,
//! `send_text()`, `update_context()`. All state mutation happens either in
//! those entry points or in a single spawned event pump; watchdog timers
//! and tool tasks only talk to the pump through its mailbox, so a
//! late-firing timeout can never race a caller-initiated teardown.

use crate::config::SessionTiming;
use crate::credential::CredentialSource;
use crate::devices::AudioDevices;
use crate::establish::{ConnectError, ConnectionEstablisher};
use crate::store::SessionStore;
use crate::timer::TimerRegistry;
use crate::tools::ToolRegistry;
use crate::transport::{RealtimeTransport, TransportError, TransportEvent};
use crate::watchdog::{InactivityWatchdog, ThinkingWatchdog, WatchdogEvent};
use chrono::{DateTime, Utc};
use deckhand_core::{
    ContextPatch, EndReason, SessionClose, SessionRecord, ToolInvocation, VoiceContext,
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

/// Synthetic instruction injected when the user has been silent too long.
const CHECK_IN_INSTRUCTION: &str = "The customer has been quiet for a little while. \
    Gently check in and ask if they have any other questions about the motors or their quote.";

/// Synthetic instruction injected when the check-in went unanswered.
const GOODBYE_INSTRUCTION: &str = "The customer appears to have stepped away. \
    Say a brief, friendly goodbye and let them know they can start a new voice chat anytime.";

/// Synthetic instruction injected when the agent is slow to start replying.
const THINKING_NUDGE_INSTRUCTION: &str = "Briefly acknowledge that you are looking into it \
    so the customer knows you heard them.";

/// Lifecycle of the controller's single session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

/// Errors from the connected-session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active session")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Everything the controller needs wired in by the host application.
pub struct SessionDeps {
    pub transport: Arc<dyn RealtimeTransport>,
    pub credentials: Arc<dyn CredentialSource>,
    pub devices: Arc<dyn AudioDevices>,
    pub store: Arc<dyn SessionStore>,
    pub tools: Arc<ToolRegistry>,
    pub timing: SessionTiming,
}

struct ActiveSession {
    session_id: Uuid,
    started_at: tokio::time::Instant,
    started_at_utc: DateTime<Utc>,
    context: VoiceContext,
    messages_exchanged: u32,
    inactivity: InactivityWatchdog,
    thinking: ThinkingWatchdog,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    transport: Arc<dyn RealtimeTransport>,
    store: Arc<dyn SessionStore>,
    tools: Arc<ToolRegistry>,
    establisher: ConnectionEstablisher,
    timers: TimerRegistry,
    timing: SessionTiming,
    state: Mutex<SessionState>,
    active: Mutex<Option<ActiveSession>>,
}

/// A tool task finished; its completion counts as session activity.
struct ToolCompletion {
    name: String,
}

/// Manages exactly one live voice session at a time. Reusable: after any
/// teardown completes the controller is `Idle` and `start()` works again.
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(deps: SessionDeps) -> Self {
        let establisher =
            ConnectionEstablisher::new(deps.devices, deps.credentials, deps.store.clone());
        Self {
            inner: Arc::new(Inner {
                transport: deps.transport,
                store: deps.store,
                tools: deps.tools,
                establisher,
                timers: TimerRegistry::new(),
                timing: deps.timing,
                state: Mutex::new(SessionState::Idle),
                active: Mutex::new(None),
            }),
        }
    }

    /// Connects a new session with the given context.
    ///
    /// A no-op when a session is already connecting or connected. Device,
    /// permission, credential, and retry-exhaustion failures surface here as
    /// typed errors and leave the controller `Idle` with no timers armed.
    #[instrument(name = "voice_session_start", skip_all)]
    pub async fn start(&self, context: VoiceContext) -> Result<(), ConnectError> {
        {
            let mut state = self.inner.state.lock().await;
            if *state != SessionState::Idle {
                info!(state = ?*state, "start ignored, session already active");
                return Ok(());
            }
            *state = SessionState::Connecting;
        }

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let established = match self
            .inner
            .establisher
            .establish(&self.inner.transport, &context, &transport_tx)
            .await
        {
            Ok(established) => established,
            Err(e) => {
                // A failed start leaves no dangling timers or half-open state.
                self.inner.timers.cancel_all();
                *self.inner.state.lock().await = SessionState::Idle;
                return Err(e);
            }
        };

        let mut context = context;
        if context.previous_summary.is_none() {
            context.previous_summary = established.previous_summary;
        }

        let timing = self.inner.timing;
        let (watchdog_tx, watchdog_rx) = mpsc::unbounded_channel();
        let (tool_tx, tool_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inactivity = InactivityWatchdog::new(
            self.inner.timers.clone(),
            watchdog_tx.clone(),
            timing.warning_delay,
            timing.final_delay,
            timing.goodbye_grace,
        );
        let thinking = ThinkingWatchdog::new(
            self.inner.timers.clone(),
            watchdog_tx,
            timing.thinking_delay,
        );

        let session_id = established.session_id;
        {
            let mut active = self.inner.active.lock().await;
            *active = Some(ActiveSession {
                session_id,
                started_at: tokio::time::Instant::now(),
                started_at_utc: Utc::now(),
                context,
                messages_exchanged: 0,
                inactivity: inactivity.clone(),
                thinking: thinking.clone(),
                shutdown: shutdown_tx,
            });
        }
        *self.inner.state.lock().await = SessionState::Connected;
        inactivity.reset();
        info!(%session_id, "session connected");

        let inner = self.inner.clone();
        let pump_span = tracing::info_span!("voice_session", %session_id);
        tokio::spawn(
            run_events(
                inner,
                transport_rx,
                watchdog_rx,
                tool_rx,
                shutdown_rx,
                inactivity,
                thinking,
                tool_tx,
            )
            .instrument(pump_span),
        );

        Ok(())
    }

    /// Tears down the connected session with the given reason.
    ///
    /// Returns true if a session was actually torn down. A no-op while
    /// `Idle` or `Disconnecting`, and also while `Connecting`: an in-flight
    /// connection attempt is not aborted retroactively, it resolves first.
    #[instrument(name = "voice_session_end", skip(self))]
    pub async fn end(&self, reason: EndReason) -> bool {
        teardown(&self.inner, reason).await
    }

    /// Sends user-typed text into the conversation. Counts as a completed
    /// user utterance: the inactivity window restarts and the thinking
    /// watchdog arms.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        self.ensure_connected().await?;
        self.inner.transport.send_message(text).await?;

        let mut active = self.inner.active.lock().await;
        if let Some(session) = active.as_mut() {
            session.messages_exchanged += 1;
            session.inactivity.reset();
            session.thinking.on_utterance_complete();
            spawn_count_increment(&self.inner, session.session_id);
        }
        Ok(())
    }

    /// Patches the live context snapshot and tells the agent what changed.
    pub async fn update_context(&self, patch: ContextPatch) -> Result<(), SessionError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.ensure_connected().await?;

        let note = {
            let mut active = self.inner.active.lock().await;
            let Some(session) = active.as_mut() else {
                return Err(SessionError::NotConnected);
            };
            patch.apply(&mut session.context);
            session.inactivity.reset();
            context_note(&session.context)
        };
        self.inner.transport.send_message(&note).await?;
        Ok(())
    }

    pub async fn state(&self) -> SessionState {
        *self.inner.state.lock().await
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        self.inner.active.lock().await.as_ref().map(|s| s.session_id)
    }

    /// Whether the current silence stretch got as far as the injected
    /// warning. Always false without a live session.
    pub async fn warning_shown(&self) -> bool {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.inactivity.warning_shown())
    }

    /// A live view of the session record so far, if a session is active.
    pub async fn snapshot(&self) -> Option<SessionRecord> {
        self.inner.active.lock().await.as_ref().map(|s| SessionRecord {
            session_id: s.session_id,
            started_at: s.started_at_utc,
            ended_at: None,
            duration_seconds: None,
            messages_exchanged: s.messages_exchanged,
            end_reason: None,
        })
    }

    async fn ensure_connected(&self) -> Result<(), SessionError> {
        if *self.inner.state.lock().await == SessionState::Connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }
}

/// The single task that owns all session mutations while connected.
#[allow(clippy::too_many_arguments)]
async fn run_events(
    inner: Arc<Inner>,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut watchdog_rx: mpsc::UnboundedReceiver<WatchdogEvent>,
    mut tool_rx: mpsc::UnboundedReceiver<ToolCompletion>,
    mut shutdown_rx: watch::Receiver<bool>,
    inactivity: InactivityWatchdog,
    thinking: ThinkingWatchdog,
    tool_tx: mpsc::UnboundedSender<ToolCompletion>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("session event pump shutting down");
                break;
            }
            Some(event) = transport_rx.recv() => {
                if handle_transport_event(&inner, event, &inactivity, &thinking, &tool_tx).await {
                    break;
                }
            }
            Some(event) = watchdog_rx.recv() => {
                if handle_watchdog_event(&inner, event, &inactivity, &thinking).await {
                    break;
                }
            }
            Some(done) = tool_rx.recv() => {
                debug!(tool = %done.name, "tool completed");
                inactivity.reset();
            }
            else => break,
        }
    }
}

/// Returns true when the session is over and the pump should stop.
async fn handle_transport_event(
    inner: &Arc<Inner>,
    event: TransportEvent,
    inactivity: &InactivityWatchdog,
    thinking: &ThinkingWatchdog,
    tool_tx: &mpsc::UnboundedSender<ToolCompletion>,
) -> bool {
    match event {
        TransportEvent::UserUtterance { transcript } => {
            debug!(chars = transcript.len(), "user utterance");
            inactivity.reset();
            thinking.on_utterance_complete();
            note_message(inner).await;
            false
        }
        TransportEvent::AgentResponse { text } => {
            debug!(chars = text.len(), "agent response");
            thinking.on_agent_activity();
            inactivity.on_agent_activity();
            note_message(inner).await;
            false
        }
        TransportEvent::AudioDelta => {
            thinking.on_agent_activity();
            inactivity.on_agent_activity();
            false
        }
        TransportEvent::ToolCall(invocation) => {
            inactivity.reset();
            spawn_tool_task(inner, invocation, tool_tx.clone());
            false
        }
        TransportEvent::Disconnected { reason } => {
            warn!(?reason, "transport disconnected");
            teardown(inner, EndReason::Error).await;
            true
        }
        TransportEvent::Error(message) => {
            error!(%message, "transport error");
            teardown(inner, EndReason::Error).await;
            true
        }
    }
}

/// Returns true when the session is over and the pump should stop.
async fn handle_watchdog_event(
    inner: &Arc<Inner>,
    event: WatchdogEvent,
    inactivity: &InactivityWatchdog,
    thinking: &ThinkingWatchdog,
) -> bool {
    match event {
        WatchdogEvent::InactivityWarning => {
            info!("silence threshold reached, injecting check-in");
            if let Err(e) = inner.transport.send_message(CHECK_IN_INSTRUCTION).await {
                warn!(error = %e, "failed to inject check-in instruction");
            }
            inactivity.arm_final();
            false
        }
        WatchdogEvent::InactivityFinal => {
            info!("check-in went unanswered, injecting goodbye");
            if let Err(e) = inner.transport.send_message(GOODBYE_INSTRUCTION).await {
                warn!(error = %e, "failed to inject goodbye instruction");
            }
            inactivity.arm_goodbye_grace();
            false
        }
        WatchdogEvent::GoodbyeElapsed => {
            info!("goodbye grace elapsed, forcing disconnect");
            teardown(inner, EndReason::Goodbye).await;
            true
        }
        WatchdogEvent::ThinkingNudge => {
            if thinking.take_nudge() {
                debug!("agent slow to respond, injecting thinking nudge");
                if let Err(e) = inner.transport.send_message(THINKING_NUDGE_INSTRUCTION).await {
                    warn!(error = %e, "failed to inject thinking nudge");
                }
            }
            false
        }
    }
}

/// The single teardown path for every way a session ends.
///
/// Claims the `Connected -> Disconnecting` transition under the state lock;
/// whoever claims it first decides the end reason, so a goodbye in flight is
/// not overridden by a racing error callback. Everything after the claim is
/// unconditional: timers are cancelled, the transport is closed, and the
/// final record is flushed with a bounded wait.
async fn teardown(inner: &Arc<Inner>, reason: EndReason) -> bool {
    {
        let mut state = inner.state.lock().await;
        match *state {
            SessionState::Connected => *state = SessionState::Disconnecting,
            other => {
                debug!(state = ?other, %reason, "end ignored, no connected session");
                return false;
            }
        }
    }
    info!(%reason, "session disconnecting");

    // From this point no previously armed timer callback may run.
    inner.timers.cancel_all();

    if let Err(e) = inner.transport.end_session().await {
        warn!(error = %e, "transport close reported an error");
    }

    let closed = inner.active.lock().await.take();
    if let Some(session) = closed {
        let _ = session.shutdown.send(true);
        let close = SessionClose {
            reason,
            duration_seconds: session.started_at.elapsed().as_secs() as i64,
            messages_exchanged: session.messages_exchanged,
            summary: None,
        };
        match tokio::time::timeout(
            inner.timing.end_persist_timeout,
            inner.store.end_session(session.session_id, &close),
        )
        .await
        {
            Ok(Ok(())) => debug!("final session record flushed"),
            Ok(Err(e)) => warn!(error = ?e, "failed to flush final session record"),
            Err(_) => warn!("final session record flush timed out"),
        }
    }

    *inner.state.lock().await = SessionState::Idle;
    info!(%reason, "session idle");
    true
}

/// Runs one tool invocation off the pump so handlers never block events.
/// The task always answers the invocation; its completion is reported back
/// as activity.
fn spawn_tool_task(
    inner: &Arc<Inner>,
    invocation: ToolInvocation,
    tool_tx: mpsc::UnboundedSender<ToolCompletion>,
) {
    let tools = inner.tools.clone();
    let transport = inner.transport.clone();
    tokio::spawn(async move {
        let name = invocation.name.clone();
        let result = tools.dispatch(&invocation).await;
        if let Err(e) = transport.send_tool_result(&result).await {
            warn!(tool = %name, error = %e, "failed to return tool result");
        }
        let _ = tool_tx.send(ToolCompletion { name });
    });
}

async fn note_message(inner: &Arc<Inner>) {
    let mut active = inner.active.lock().await;
    if let Some(session) = active.as_mut() {
        session.messages_exchanged += 1;
        spawn_count_increment(inner, session.session_id);
    }
}

fn spawn_count_increment(inner: &Arc<Inner>, session_id: Uuid) {
    let store = inner.store.clone();
    tokio::spawn(async move {
        if let Err(e) = store.increment_message_count(session_id).await {
            debug!(error = ?e, "message count increment failed");
        }
    });
}

/// Renders the patched context as a short note the agent can pick up
/// mid-conversation.
fn context_note(ctx: &VoiceContext) -> String {
    let mut parts = Vec::new();
    if let Some(motor) = &ctx.motor {
        match motor.price {
            Some(price) => parts.push(format!(
                "The customer is now looking at the {} ({} hp, listed at ${price:.0}).",
                motor.model, motor.hp
            )),
            None => parts.push(format!(
                "The customer is now looking at the {} ({} hp).",
                motor.model, motor.hp
            )),
        }
    }
    if let Some(page) = &ctx.current_page {
        parts.push(format!("They are on the {page} page."));
    }
    if let Some(quote) = &ctx.quote {
        match quote.monthly {
            Some(monthly) => parts.push(format!(
                "They have a quote for the {} totaling ${:.0}, about ${monthly:.0} per month.",
                quote.motor_model, quote.total
            )),
            None => parts.push(format!(
                "They have a quote for the {} totaling ${:.0}.",
                quote.motor_model, quote.total
            )),
        }
    }
    if parts.is_empty() {
        "The page context was cleared.".to_string()
    } else {
        parts.join(" ")
    }
}

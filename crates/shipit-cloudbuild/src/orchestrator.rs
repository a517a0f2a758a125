//! Build session orchestrator.
//!
//! One [`CloudBuild`] drives one session through
//! `Idle -> Connecting -> Connected -> Building` and into a terminal state
//! (`Succeeded`, `Failed`, `TimedOut` or `Disconnected`). The transport and a
//! single owned timer are the only event sources; every terminal transition
//! cancels the timer and closes the connection exactly once.

use serde_json::Value;
use shipit_core::build::{BuildAction, BuildEvent, BuildRequest, BuildState};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use tracing::{debug, error, info, warn};

use crate::CloudBuildError;
use crate::transport::{BuildTransport, TransportEvent};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Timeouts for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudBuildOptions {
    pub connect_timeout: Duration,
    pub build_timeout: Duration,
}

impl Default for CloudBuildOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }
}

/// Progress reported to the caller while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(BuildState),
    Connected { id: String },
    Progress(BuildEvent),
    /// Raw output from a `building` event.
    Log(Value),
}

/// The session record. Its event history is append-only.
#[derive(Debug, Clone)]
pub struct BuildSession {
    id: Option<String>,
    endpoint: String,
    request: BuildRequest,
    deadline: Option<Instant>,
    state: BuildState,
    history: Vec<BuildEvent>,
}

impl BuildSession {
    fn new(endpoint: String, request: BuildRequest) -> Self {
        Self {
            id: None,
            endpoint,
            request,
            deadline: None,
            state: BuildState::Idle,
            history: Vec::new(),
        }
    }

    /// Service-assigned id, known once connected.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    /// When the pending timer fires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn history(&self) -> &[BuildEvent] {
        &self.history
    }
}

struct Timer {
    after: Duration,
    sleep: Pin<Box<Sleep>>,
}

enum Step {
    Timeout(Duration),
    Transport(Option<TransportEvent>),
}

/// Drives one build session over a [`BuildTransport`].
pub struct CloudBuild<T: BuildTransport> {
    transport: T,
    session: BuildSession,
    options: CloudBuildOptions,
    timer: Option<Timer>,
    closed: bool,
    build_reported: bool,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl<T: BuildTransport> CloudBuild<T> {
    pub fn new(
        transport: T,
        endpoint: impl Into<String>,
        request: BuildRequest,
        options: CloudBuildOptions,
    ) -> Self {
        Self {
            transport,
            session: BuildSession::new(endpoint.into(), request),
            options,
            timer: None,
            closed: false,
            build_reported: false,
            updates: None,
        }
    }

    /// Report progress on `tx` as the session runs.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn session(&self) -> &BuildSession {
        &self.session
    }

    pub fn state(&self) -> &BuildState {
        &self.session.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Open the session and wait until the service assigns it an id.
    ///
    /// Fails with [`CloudBuildError::ConnectTimeout`] when the connect
    /// deadline passes first; the connection is closed in that case.
    pub async fn init(&mut self) -> Result<String, CloudBuildError> {
        self.expect_state(&BuildState::Idle, "init")?;
        self.set_state(BuildState::Connecting);
        info!(
            endpoint = %self.session.endpoint,
            name = %self.session.request.name,
            branch = %self.session.request.branch,
            "Opening build session"
        );
        self.arm_timeout(self.options.connect_timeout);

        loop {
            match self.next_step().await {
                Step::Timeout(after) => {
                    error!(timeout = ?after, "Build service connection timed out, aborting");
                    self.finish(BuildState::TimedOut).await;
                    return Err(CloudBuildError::ConnectTimeout(after));
                }
                Step::Transport(Some(TransportEvent::Connected { id })) => {
                    self.cancel_timeout();
                    self.session.id = Some(id.clone());
                    self.set_state(BuildState::Connected);
                    info!(session_id = %id, "Build session created");
                    self.notify(SessionUpdate::Connected { id: id.clone() });
                    return Ok(id);
                }
                Step::Transport(Some(TransportEvent::Message { event, .. })) => {
                    debug!(event = %event, "Ignoring message before session is connected");
                }
                Step::Transport(Some(TransportEvent::Disconnected { reason })) => {
                    warn!(reason = ?reason, "Build session disconnected before connecting");
                    self.finish(BuildState::Disconnected).await;
                    return Err(CloudBuildError::Disconnected(reason));
                }
                Step::Transport(Some(TransportEvent::Error(message))) => {
                    error!(error = %message, "Build session error");
                    self.finish(BuildState::Failed {
                        reason: message.clone(),
                    })
                    .await;
                    return Err(CloudBuildError::Transport(message));
                }
                Step::Transport(None) => {
                    self.finish(BuildState::Disconnected).await;
                    return Err(CloudBuildError::Disconnected(None));
                }
            }
        }
    }

    /// Ask the service to build and follow the session to its end.
    ///
    /// Succeeds when the service closes the session after reporting the
    /// `build` action. A terminal failure action, a disconnect before that,
    /// a transport error or the build deadline all fail the session.
    pub async fn build(&mut self) -> Result<(), CloudBuildError> {
        self.expect_state(&BuildState::Connected, "build")?;

        let command = Value::String(self.session.request.build_command.clone());
        if let Err(e) = self.transport.emit("build", command).await {
            self.finish(BuildState::Failed {
                reason: e.to_string(),
            })
            .await;
            return Err(e);
        }

        self.set_state(BuildState::Building);
        self.arm_timeout(self.options.build_timeout);

        loop {
            match self.next_step().await {
                Step::Timeout(after) => {
                    error!(timeout = ?after, "Build timed out, aborting");
                    self.finish(BuildState::TimedOut).await;
                    return Err(CloudBuildError::BuildTimeout(after));
                }
                Step::Transport(Some(TransportEvent::Message { event, payload })) => {
                    if let Some(failure) = self.handle_message(&event, payload) {
                        self.finish(BuildState::Failed {
                            reason: failure.message.clone(),
                        })
                        .await;
                        return Err(CloudBuildError::BuildFailure {
                            action: failure.action.to_string(),
                            message: failure.message,
                        });
                    }
                }
                Step::Transport(Some(TransportEvent::Connected { id })) => {
                    debug!(session_id = %id, "Ignoring repeated connect");
                }
                Step::Transport(Some(TransportEvent::Disconnected { reason })) => {
                    return self.on_build_disconnect(reason).await;
                }
                Step::Transport(None) => {
                    return self.on_build_disconnect(None).await;
                }
                Step::Transport(Some(TransportEvent::Error(message))) => {
                    error!(error = %message, "Build session error");
                    self.finish(BuildState::Failed {
                        reason: message.clone(),
                    })
                    .await;
                    return Err(CloudBuildError::Transport(message));
                }
            }
        }
    }

    /// Cancel the timer and close the connection without changing state.
    pub async fn shutdown(&mut self) {
        self.cancel_timeout();
        self.close().await;
    }

    /// Classify one message. Returns the event when it is a terminal failure.
    fn handle_message(&mut self, event: &str, payload: Value) -> Option<BuildEvent> {
        if event == "building" {
            debug!(output = %payload, "Build output");
            self.notify(SessionUpdate::Log(payload));
            return None;
        }

        let scoped = self.session.id.as_deref() == Some(event);
        if event != "build" && !scoped {
            debug!(event = %event, "Ignoring unrelated event");
            return None;
        }

        let parsed = BuildEvent::from_message(&payload);
        self.session.history.push(parsed.clone());

        if parsed.action.is_terminal_failure() {
            error!(action = %parsed.action, message = %parsed.message, "Build failed");
            return Some(parsed);
        }

        if parsed.action == BuildAction::Build {
            self.build_reported = true;
        }
        info!(action = %parsed.action, message = %parsed.message, "Build progress");
        self.notify(SessionUpdate::Progress(parsed));
        None
    }

    async fn on_build_disconnect(&mut self, reason: Option<String>) -> Result<(), CloudBuildError> {
        if self.build_reported {
            info!("Build session finished");
            self.finish(BuildState::Succeeded).await;
            Ok(())
        } else {
            warn!(reason = ?reason, "Build session disconnected before the build finished");
            self.finish(BuildState::Disconnected).await;
            Err(CloudBuildError::Disconnected(reason))
        }
    }

    /// Wait for the next transport event or the pending timer.
    async fn next_step(&mut self) -> Step {
        let step = match self.timer.as_mut() {
            Some(timer) => {
                let after = timer.after;
                tokio::select! {
                    _ = &mut timer.sleep => Step::Timeout(after),
                    event = self.transport.recv() => Step::Transport(event),
                }
            }
            None => Step::Transport(self.transport.recv().await),
        };

        if matches!(step, Step::Timeout(_)) {
            self.timer = None;
            self.session.deadline = None;
        }
        step
    }

    /// Schedule the session timeout, replacing any pending one.
    fn arm_timeout(&mut self, after: Duration) {
        let deadline = Instant::now() + after;
        self.timer = Some(Timer {
            after,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
        });
        self.session.deadline = Some(deadline);
        info!(seconds = after.as_secs_f64(), "Session timeout set");
    }

    fn cancel_timeout(&mut self) {
        self.timer = None;
        self.session.deadline = None;
    }

    async fn finish(&mut self, state: BuildState) {
        self.cancel_timeout();
        self.close().await;
        self.set_state(state);
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.transport.close().await;
        debug!(session_id = ?self.session.id, "Build session closed");
    }

    fn expect_state(&self, expected: &BuildState, operation: &'static str) -> Result<(), CloudBuildError> {
        if &self.session.state == expected {
            Ok(())
        } else {
            Err(CloudBuildError::InvalidState {
                operation,
                state: format!("{:?}", self.session.state),
            })
        }
    }

    fn set_state(&mut self, state: BuildState) {
        debug!(from = ?self.session.state, to = ?state, "Build session state change");
        self.session.state = state.clone();
        self.notify(SessionUpdate::StateChanged(state));
    }

    fn notify(&self, update: SessionUpdate) {
        if let Some(tx) = &self.updates {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays a fixed script of events, each after a delay. Once the script
    /// runs out it never yields again.
    struct ScriptedTransport {
        script: VecDeque<(Duration, TransportEvent)>,
        emitted: Arc<Mutex<Vec<(String, Value)>>>,
        closes: Arc<AtomicUsize>,
        closed: bool,
    }

    impl ScriptedTransport {
        fn new(script: Vec<(u64, TransportEvent)>) -> Self {
            Self {
                script: script
                    .into_iter()
                    .map(|(ms, e)| (Duration::from_millis(ms), e))
                    .collect(),
                emitted: Arc::default(),
                closes: Arc::default(),
                closed: false,
            }
        }
    }

    #[async_trait]
    impl BuildTransport for ScriptedTransport {
        async fn recv(&mut self) -> Option<TransportEvent> {
            if self.closed {
                return None;
            }
            match self.script.pop_front() {
                Some((delay, event)) => {
                    tokio::time::sleep(delay).await;
                    Some(event)
                }
                None => std::future::pending().await,
            }
        }

        async fn emit(&mut self, event: &str, payload: Value) -> Result<(), CloudBuildError> {
            self.emitted.lock().unwrap().push((event.to_string(), payload));
            Ok(())
        }

        async fn close(&mut self) {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request() -> BuildRequest {
        BuildRequest {
            repo: "git@gitee.com:alice/app.git".to_string(),
            name: "app".to_string(),
            branch: "dev/1.0.0".to_string(),
            version: "1.0.0".to_string(),
            build_command: "npm run build".to_string(),
        }
    }

    fn connected(ms: u64) -> (u64, TransportEvent) {
        (ms, TransportEvent::Connected { id: "sess-1".to_string() })
    }

    fn build_msg(ms: u64, action: &str, message: &str) -> (u64, TransportEvent) {
        (
            ms,
            TransportEvent::Message {
                event: "build".to_string(),
                payload: json!({"data": {"action": action, "payload": {"message": message}}}),
            },
        )
    }

    fn disconnected(ms: u64) -> (u64, TransportEvent) {
        (ms, TransportEvent::Disconnected { reason: None })
    }

    fn orchestrator(
        script: Vec<(u64, TransportEvent)>,
        connect_timeout_ms: u64,
    ) -> (CloudBuild<ScriptedTransport>, Arc<AtomicUsize>, Arc<Mutex<Vec<(String, Value)>>>) {
        let transport = ScriptedTransport::new(script);
        let closes = transport.closes.clone();
        let emitted = transport.emitted.clone();
        let options = CloudBuildOptions {
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            build_timeout: Duration::from_secs(300),
        };
        (
            CloudBuild::new(transport, "ws://build.test", request(), options),
            closes,
            emitted,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_before_deadline_cancels_timer() {
        let (mut build, closes, _) = orchestrator(vec![connected(100)], 5000);
        let start = Instant::now();

        let id = build.init().await.unwrap();

        assert_eq!(id, "sess-1");
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(build.state(), &BuildState::Connected);
        assert!(!build.has_pending_timer());
        assert!(build.session().deadline().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_closes_exactly_once() {
        let (mut build, closes, _) = orchestrator(vec![], 50);

        let err = build.init().await.unwrap_err();

        assert!(matches!(err, CloudBuildError::ConnectTimeout(d) if d == Duration::from_millis(50)));
        assert_eq!(build.state(), &BuildState::TimedOut);
        assert!(build.is_closed());
        assert!(!build.has_pending_timer());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // Later teardown and calls never close again.
        build.shutdown().await;
        assert!(matches!(build.init().await, Err(CloudBuildError::InvalidState { .. })));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_connect_is_a_timeout() {
        let (mut build, closes, _) = orchestrator(vec![connected(80)], 50);
        assert!(matches!(
            build.init().await,
            Err(CloudBuildError::ConnectTimeout(_))
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_keeps_a_single_timer() {
        let (mut build, _, _) = orchestrator(vec![], 5000);
        let start = Instant::now();

        build.arm_timeout(Duration::from_millis(10));
        build.arm_timeout(Duration::from_millis(20));
        build.arm_timeout(Duration::from_millis(30));
        assert!(build.has_pending_timer());
        assert_eq!(build.session().deadline(), Some(start + Duration::from_millis(30)));

        // Only the last timer fires, at its own deadline.
        assert!(matches!(build.next_step().await, Step::Timeout(d) if d == Duration::from_millis(30)));
        assert_eq!(start.elapsed(), Duration::from_millis(30));
        assert!(!build.has_pending_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_failure_fails_session() {
        let (mut build, closes, emitted) = orchestrator(
            vec![
                connected(10),
                build_msg(10, "prepare", "preparing"),
                build_msg(10, "install failed", "npm error"),
                build_msg(10, "build", "never seen"),
            ],
            5000,
        );

        build.init().await.unwrap();
        let err = build.build().await.unwrap_err();

        match err {
            CloudBuildError::BuildFailure { action, message } => {
                assert_eq!(action, "install failed");
                assert_eq!(message, "npm error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            build.state(),
            &BuildState::Failed {
                reason: "npm error".to_string()
            }
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!build.has_pending_timer());
        assert_eq!(build.session().history().len(), 2);
        assert_eq!(
            emitted.lock().unwrap().as_slice(),
            &[("build".to_string(), json!("npm run build"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_code_is_terminal() {
        let (mut build, closes, _) =
            orchestrator(vec![connected(1), build_msg(1, "prepare failed", "no repo")], 5000);

        build.init().await.unwrap();
        assert!(matches!(
            build.build().await,
            Err(CloudBuildError::BuildFailure { message, .. }) if message == "no repo"
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_building_events_do_not_change_state() {
        let (build, _, _) = orchestrator(
            vec![
                connected(1),
                (
                    1,
                    TransportEvent::Message {
                        event: "building".to_string(),
                        payload: json!("> vite build"),
                    },
                ),
            ],
            5000,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut build = build.with_updates(tx);

        build.init().await.unwrap();
        let result = build.build().await;

        // The only thing after the log line is the build deadline.
        assert!(matches!(result, Err(CloudBuildError::BuildTimeout(_))));
        assert!(build.session().history().is_empty());

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        let log_at = updates
            .iter()
            .position(|u| matches!(u, SessionUpdate::Log(_)))
            .unwrap();
        assert_eq!(
            updates[log_at - 1],
            SessionUpdate::StateChanged(BuildState::Building)
        );
        assert_eq!(
            updates[log_at + 1],
            SessionUpdate::StateChanged(BuildState::TimedOut)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_after_build_succeeds() {
        let (mut build, closes, _) = orchestrator(
            vec![
                connected(1),
                build_msg(1, "prepare", "ok"),
                build_msg(1, "download", "ok"),
                build_msg(1, "install", "ok"),
                build_msg(1, "build", "done"),
                disconnected(1),
            ],
            5000,
        );

        build.init().await.unwrap();
        build.build().await.unwrap();

        assert_eq!(build.state(), &BuildState::Succeeded);
        assert_eq!(build.session().history().len(), 4);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_build_is_reported() {
        let (mut build, closes, _) =
            orchestrator(vec![connected(1), build_msg(1, "install", "ok"), disconnected(1)], 5000);

        build.init().await.unwrap();
        assert!(matches!(
            build.build().await,
            Err(CloudBuildError::Disconnected(None))
        ));
        assert_eq!(build.state(), &BuildState::Disconnected);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_scoped_events_are_classified() {
        let (mut build, _, _) = orchestrator(
            vec![
                connected(1),
                (
                    1,
                    TransportEvent::Message {
                        event: "sess-1".to_string(),
                        payload: json!({"data": {"action": "download failed", "payload": {"message": "clone failed"}}}),
                    },
                ),
            ],
            5000,
        );

        build.init().await.unwrap();
        assert!(matches!(
            build.build().await,
            Err(CloudBuildError::BuildFailure { action, .. }) if action == "download failed"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_actions_are_progress() {
        let (mut build, _, _) = orchestrator(
            vec![
                connected(1),
                build_msg(1, "pre-publish", "checking"),
                build_msg(1, "build", "done"),
                disconnected(1),
            ],
            5000,
        );

        build.init().await.unwrap();
        build.build().await.unwrap();
        assert_eq!(
            build.session().history()[0].action,
            BuildAction::Unknown("pre-publish".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_during_init() {
        let (mut build, closes, _) =
            orchestrator(vec![(1, TransportEvent::Error("refused".to_string()))], 5000);

        assert!(matches!(
            build.init().await,
            Err(CloudBuildError::Transport(msg)) if msg == "refused"
        ));
        assert!(matches!(build.state(), BuildState::Failed { .. }));
        assert!(!build.has_pending_timer());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_requires_connection() {
        let (mut build, closes, _) = orchestrator(vec![], 5000);
        assert!(matches!(
            build.build().await,
            Err(CloudBuildError::InvalidState { operation: "build", .. })
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }
}

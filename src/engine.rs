use crate::config::{EngineConfig, truncate_field};
use crate::control::{ControlBlock, Notice, PlaybackEvent, PlaybackState, QueuedLine};
use crate::error::{PacerError, StateError};
use crate::formatter::{LineFormatter, TempSlots};
use crate::scheduler::Scheduler;
use crate::session::{Delivery, Handoff, PlaybackSession, TickOutcome, load_source};
use crate::transport::{EvalHook, InterpreterTransport, PeerLink, PeerTransport, TcpPeerLink, Transport};
use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Build identifier reported by [`Engine::version`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const EVENT_BUFFER: usize = 64;

/// Arguments of [`Engine::start`].
///
/// A present `service` selects the peer transport, otherwise lines go to the
/// host interpreter. A negative `interval_ms` selects single-line mode, where
/// `source` is the line itself rather than a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub service: Option<String>,
    pub channel: Option<String>,
    pub source: String,
    pub interval_ms: i64,
    pub use_file: bool,
}

impl StartRequest {
    /// Play the file at `path`, one line every `interval_ms`.
    pub fn file(path: impl Into<String>, interval_ms: i64) -> Self {
        Self {
            service: None,
            channel: None,
            source: path.into(),
            interval_ms,
            use_file: true,
        }
    }

    /// Deliver `text` as a single line.
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            service: None,
            channel: None,
            source: text.into(),
            interval_ms: -1,
            use_file: false,
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn use_file(mut self, use_file: bool) -> Self {
        self.use_file = use_file;
        self
    }
}

/// Result of one [`Engine::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// No session and nothing queued.
    Idle,
    /// A session is running but its next line is not due yet.
    Waiting,
    Paused,
    /// This many queued single lines were sent back-to-back.
    Drained(usize),
    /// One paced line was sent; `ended` is set when it was the last.
    Delivered { command: Vec<u8>, ended: bool },
    /// Delivery failed and the session was stopped.
    Aborted(String),
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollStatus::Idle => f.write_str("idle"),
            PollStatus::Waiting => f.write_str("waiting"),
            PollStatus::Paused => f.write_str("paused"),
            PollStatus::Drained(count) => write!(f, "drained {count}"),
            PollStatus::Delivered { ended: false, .. } => f.write_str("delivered"),
            PollStatus::Delivered { ended: true, .. } => f.write_str("ended"),
            PollStatus::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
enum StopReason {
    User,
    Ended,
    Failed(String),
}

struct ActiveSession {
    session: PlaybackSession,
    scheduler: Option<Scheduler>,
}

/// Receiving end of a pull session's handoff.
struct PullSlot {
    rx: mpsc::Receiver<Handoff>,
    interval: Duration,
}

struct Inner {
    config: EngineConfig,
    link: Arc<dyn PeerLink>,
    temp: TempSlots,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
    handoff: tokio::sync::Mutex<Option<PullSlot>>,
    control: Mutex<ControlBlock>,
    state: watch::Sender<PlaybackState>,
    events: broadcast::Sender<PlaybackEvent>,
    generation: AtomicU64,
}

/// The playback engine and its control surface.
///
/// Cheap to clone; all clones drive the same single session. Sessions fed to
/// the host interpreter only ever reach it through [`Engine::poll`], which
/// the host calls from its own loop. Sessions fed to a peer process deliver
/// from the timer task.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// An engine whose peer transport speaks TCP to the services listed in
    /// `config.peer.services`.
    pub fn new(config: EngineConfig) -> Self {
        let link = Arc::new(TcpPeerLink::from_config(&config.peer));
        Self::with_peer_link(config, link)
    }

    pub fn with_peer_link(config: EngineConfig, link: Arc<dyn PeerLink>) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let temp = TempSlots::from_config(&config);
        let control = Mutex::new(ControlBlock::new(config.fifo_capacity));
        Self {
            inner: Arc::new(Inner {
                config,
                link,
                temp,
                active: tokio::sync::Mutex::new(None),
                handoff: tokio::sync::Mutex::new(None),
                control,
                state,
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub fn state(&self) -> PlaybackState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    pub async fn has_session(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }

    /// Single lines waiting for the host to drain them.
    pub fn pending_lines(&self) -> usize {
        self.lock_control().fifo.len()
    }

    /// Start a playback or submit a single line. Returns `false` when the
    /// request was rejected; [`Engine::try_start`] says why.
    pub async fn start(&self, request: StartRequest) -> bool {
        match self.try_start(request).await {
            Ok(()) => true,
            Err(PacerError::State(err)) => {
                debug!(error = %err, "start rejected");
                false
            }
            Err(err) => {
                warn!(error = %err, "start failed");
                false
            }
        }
    }

    pub async fn try_start(&self, request: StartRequest) -> Result<(), PacerError> {
        let config = &self.inner.config;
        let channel = match request.channel.as_deref() {
            Some(channel) => truncate_field(channel, config.limits.channel),
            None => config.status_channel.clone(),
        };
        let service = request
            .service
            .as_deref()
            .map(|service| truncate_field(service, config.limits.service));
        let source = truncate_field(&request.source, config.limits.source);

        if request.interval_ms < 0 {
            return self
                .start_single_line(service, channel, source.into_bytes(), request.use_file)
                .await;
        }
        if source.is_empty() {
            return Err(StateError::MissingSource.into());
        }
        let interval = Duration::from_millis(request.interval_ms.unsigned_abs());
        self.start_file(service, channel, PathBuf::from(source), interval)
            .await
    }

    async fn start_single_line(
        &self,
        service: Option<String>,
        channel: String,
        text: Vec<u8>,
        use_file: bool,
    ) -> Result<(), PacerError> {
        let Some(service) = service else {
            if use_file && self.has_session().await {
                return Err(StateError::AlreadyRunning.into());
            }
            let pending = {
                let mut control = self.lock_control();
                control.fifo.push(QueuedLine { channel, text })?;
                control.fifo.len()
            };
            debug!(pending, "queued single line");
            self.emit(PlaybackEvent::LineQueued { pending });
            return Ok(());
        };

        if self.has_session().await {
            return Err(StateError::AlreadyRunning.into());
        }
        let config = &self.inner.config;
        let mut transport = PeerTransport::new(
            self.inner.link.clone(),
            service,
            config.peer.item.clone(),
            config.peer.timeout(),
        );
        let mut formatter = LineFormatter::peer(
            transport.dialect(),
            channel,
            &config.status_channel,
            config.pacing.single_line_ms,
            self.inner.temp.clone(),
        );
        let command = formatter.format(&text).await?;
        let result = transport.send(&command).await;
        transport.shutdown().await;
        match result {
            Ok(()) => {
                self.emit(PlaybackEvent::LineDelivered { command });
                Ok(())
            }
            Err(err) => {
                self.emit(PlaybackEvent::Failed {
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    async fn start_file(
        &self,
        service: Option<String>,
        channel: String,
        path: PathBuf,
        interval: Duration,
    ) -> Result<(), PacerError> {
        let config = &self.inner.config;
        let mut guard = self.inner.active.lock().await;
        if guard.is_some() {
            return Err(StateError::AlreadyRunning.into());
        }

        let buffer = load_source(&path, config).await?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let interval = interval.max(config.min_tick());

        let (delivery, formatter, pull) = match service {
            None => {
                let (tx, rx) = mpsc::channel(1);
                let formatter = LineFormatter::interpreter(channel.as_str(), &config.status_channel);
                (Delivery::Pull(tx), formatter, Some(PullSlot { rx, interval }))
            }
            Some(service) => {
                let transport = PeerTransport::new(
                    self.inner.link.clone(),
                    service,
                    config.peer.item.clone(),
                    config.peer.timeout(),
                );
                let formatter = LineFormatter::peer(
                    transport.dialect(),
                    channel.as_str(),
                    &config.status_channel,
                    config.pacing.file_ms,
                    self.inner.temp.clone(),
                );
                (Delivery::Push(transport), formatter, None)
            }
        };

        let mut session = PlaybackSession::new(
            buffer,
            config.max_line_bytes,
            formatter,
            delivery,
            generation,
            interval,
        );
        let primed = match session.prime().await {
            Ok(primed) => primed,
            Err(err) => {
                session.close().await;
                return Err(err.into());
            }
        };

        let is_pull = pull.is_some();
        if pull.is_some() {
            *self.inner.handoff.lock().await = pull;
            self.lock_control().post_notice(Notice::Started);
        }
        let scheduler = primed.then(|| self.arm(generation, interval));
        info!(
            path = %path.display(),
            channel = %session.channel(),
            interval_ms = session.interval().as_millis() as u64,
            pull = is_pull,
            "playback started"
        );
        *guard = Some(ActiveSession { session, scheduler });
        self.set_state(PlaybackState::Running);
        self.emit(PlaybackEvent::Started { channel });

        if !primed {
            self.teardown(guard, StopReason::Ended, false).await;
        }
        Ok(())
    }

    /// Stop the session and flush queued single lines. Safe to call at any
    /// time; returns `false` when there was nothing to stop.
    ///
    /// Once this returns, no further line of the stopped session is produced
    /// or delivered.
    pub async fn stop(&self) -> bool {
        let flushed = {
            let mut control = self.lock_control();
            let flushed = !control.fifo.is_empty();
            control.fifo.clear();
            flushed
        };
        let guard = self.inner.active.lock().await;
        let stopped = self.teardown(guard, StopReason::User, false).await;
        if !stopped && !flushed {
            debug!("stop ignored: nothing to stop");
        }
        stopped || flushed
    }

    pub async fn pause(&self) -> bool {
        self.transition(Notice::Paused).await
    }

    pub async fn resume(&self) -> bool {
        self.transition(Notice::Resumed).await
    }

    async fn transition(&self, notice: Notice) -> bool {
        let mut guard = self.inner.active.lock().await;
        let Some(active) = guard.as_mut() else {
            debug!(%notice, "ignored: {}", StateError::NoSession);
            return false;
        };
        let (result, state, event) = match notice {
            Notice::Resumed => (
                active.session.resume(),
                PlaybackState::Running,
                PlaybackEvent::Resumed,
            ),
            _ => (
                active.session.pause(),
                PlaybackState::Paused,
                PlaybackEvent::Paused,
            ),
        };
        if let Err(err) = result {
            debug!(%notice, "ignored: {err}");
            return false;
        }

        let announced = active.session.announce(notice).await;
        match announced {
            None => self.lock_control().post_notice(notice),
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!(error = %err, %notice, "could not notify peer, stopping playback");
                self.teardown(guard, StopReason::Failed(err.to_string()), false)
                    .await;
                return false;
            }
        }
        self.set_state(state);
        info!(?state, "playback {}", notice.text());
        self.emit(event);
        true
    }

    /// Run one host tick: echo pending notices, drain queued single lines,
    /// or hand the next paced line to the interpreter.
    ///
    /// Waits at most one interval for the next paced line.
    pub async fn poll(&self, host: &mut dyn EvalHook) -> PollStatus {
        let mut transport = InterpreterTransport::new(host);
        self.flush_notices(&mut transport).await;

        match self.drain_queue(&mut transport).await {
            Ok(0) => {}
            Ok(count) => return PollStatus::Drained(count),
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "single-line drain failed");
                self.lock_control().fifo.clear();
                self.emit(PlaybackEvent::Failed {
                    reason: reason.clone(),
                });
                return PollStatus::Aborted(reason);
            }
        }

        let handoff = {
            let mut slot = self.inner.handoff.lock().await;
            let Some(pull) = slot.as_mut() else {
                return PollStatus::Idle;
            };
            if self.state() == PlaybackState::Paused {
                return PollStatus::Paused;
            }
            let received = tokio::time::timeout(pull.interval, pull.rx.recv()).await;
            match received {
                Err(_) => return PollStatus::Waiting,
                Ok(None) => {
                    *slot = None;
                    return PollStatus::Idle;
                }
                Ok(Some(handoff)) => handoff,
            }
        };

        // held through the send so a concurrent stop waits for this line
        let guard = self.inner.active.lock().await;
        let live = matches!(
            guard.as_ref(),
            Some(active) if active.session.generation() == handoff.generation
        );
        if !live {
            debug!(generation = handoff.generation, "dropping line from a stopped session");
            return PollStatus::Idle;
        }

        match transport.send(&handoff.command).await {
            Ok(()) => {
                self.emit(PlaybackEvent::LineDelivered {
                    command: handoff.command.clone(),
                });
                if handoff.last {
                    self.teardown(guard, StopReason::Ended, false).await;
                    self.flush_notices(&mut transport).await;
                }
                PollStatus::Delivered {
                    command: handoff.command,
                    ended: handoff.last,
                }
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "interpreter rejected line");
                self.teardown(guard, StopReason::Failed(reason.clone()), false)
                    .await;
                PollStatus::Aborted(reason)
            }
        }
    }

    /// Stop everything and release peer resources. Used on unload.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.lock_control().clear();
        *self.inner.handoff.lock().await = None;
        debug!("engine shut down");
    }

    fn arm(&self, generation: u64, period: Duration) -> Scheduler {
        let inner = Arc::downgrade(&self.inner);
        let scheduler = Scheduler::arm(period, move || {
            let inner = inner.clone();
            async move {
                match inner.upgrade() {
                    Some(inner) => Engine { inner }.on_tick(generation).await,
                    None => ControlFlow::Break(()),
                }
            }
        });
        debug!(generation, period = ?scheduler.period(), "scheduler armed");
        scheduler
    }

    async fn on_tick(&self, generation: u64) -> ControlFlow<()> {
        let mut guard = self.inner.active.lock().await;
        let Some(active) = guard.as_mut() else {
            return ControlFlow::Break(());
        };
        if active.session.generation() != generation {
            return ControlFlow::Break(());
        }

        match active.session.tick().await {
            TickOutcome::Idle | TickOutcome::Queued => ControlFlow::Continue(()),
            TickOutcome::Delivered { command, finished } => {
                self.emit(PlaybackEvent::LineDelivered { command });
                if finished {
                    self.teardown(guard, StopReason::Ended, true).await;
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
            TickOutcome::Finished => {
                self.teardown(guard, StopReason::Ended, true).await;
                ControlFlow::Break(())
            }
            TickOutcome::Failed(err) => {
                warn!(error = %err, "delivery failed, stopping playback");
                self.teardown(guard, StopReason::Failed(err.to_string()), true)
                    .await;
                ControlFlow::Break(())
            }
        }
    }

    /// Tear down the session held in `guard`.
    ///
    /// `from_timer` is set when running on the scheduler's own task, which
    /// must not be aborted halfway through its teardown.
    async fn teardown(
        &self,
        mut guard: tokio::sync::MutexGuard<'_, Option<ActiveSession>>,
        reason: StopReason,
        from_timer: bool,
    ) -> bool {
        let Some(active) = guard.take() else {
            return false;
        };
        self.set_state(PlaybackState::Stopping);

        if let Some(scheduler) = active.scheduler {
            if from_timer {
                scheduler.detach();
            } else {
                drop(scheduler);
            }
        }
        let is_pull = active.session.is_pull();
        active.session.close().await;
        drop(guard);

        let (notice, event) = match &reason {
            StopReason::User => (Notice::Stopped, PlaybackEvent::Stopped),
            StopReason::Ended => (Notice::Ended, PlaybackEvent::Ended),
            StopReason::Failed(reason) => (
                Notice::Stopped,
                PlaybackEvent::Failed {
                    reason: reason.clone(),
                },
            ),
        };
        if is_pull {
            self.lock_control().post_notice(notice);
        }
        self.set_state(PlaybackState::Idle);
        info!(reason = ?reason, "playback stopped");
        self.emit(event);
        true
    }

    async fn flush_notices(&self, transport: &mut InterpreterTransport<'_>) {
        let notices = self.lock_control().take_notices();
        if notices.is_empty() {
            return;
        }
        let status = &self.inner.config.status_channel;
        let formatter = LineFormatter::interpreter(status.as_str(), status);
        for notice in notices {
            if let Err(err) = transport.send(&formatter.notice(notice)).await {
                warn!(error = %err, %notice, "could not echo notice");
            }
        }
    }

    async fn drain_queue(&self, transport: &mut InterpreterTransport<'_>) -> Result<usize, PacerError> {
        let status = self.inner.config.status_channel.clone();
        let mut drained = 0;
        while let Some(line) = self.next_queued() {
            let mut formatter = LineFormatter::interpreter(line.channel, &status);
            let command = formatter.format(&line.text).await?;
            transport.send(&command).await?;
            self.emit(PlaybackEvent::LineDelivered { command });
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "drained single lines");
        }
        Ok(drained)
    }

    fn next_queued(&self) -> Option<QueuedLine> {
        self.lock_control().fifo.pop()
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlBlock> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PlaybackState) {
        self.inner.state.send_replace(state);
    }

    fn emit(&self, event: PlaybackEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::Conversation;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl EvalHook for Recorder {
        fn eval(&mut self, script: &[u8]) -> Result<(), TransportError> {
            self.0.push(String::from_utf8_lossy(script).into_owned());
            Ok(())
        }
    }

    struct NullLink;

    #[async_trait]
    impl PeerLink for NullLink {
        async fn connect(
            &self,
            service: &str,
            _topic: &str,
        ) -> Result<Box<dyn Conversation>, TransportError> {
            Err(TransportError::PeerNotFound(service.to_string()))
        }
    }

    fn engine() -> Engine {
        Engine::with_peer_link(EngineConfig::default(), Arc::new(NullLink))
    }

    fn source(text: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("play.txt");
        std::fs::write(&path, text).unwrap();
        (dir, path.display().to_string())
    }

    #[tokio::test]
    async fn test_start_rejects_second_file_session() {
        let engine = engine();
        let (_dir, path) = source("a\nb\n");
        assert!(engine.start(StartRequest::file(&path, 1000)).await);
        assert_eq!(engine.state(), PlaybackState::Running);
        assert!(matches!(
            engine.try_start(StartRequest::file(&path, 1000)).await,
            Err(PacerError::State(StateError::AlreadyRunning))
        ));
        assert!(engine.stop().await);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let engine = engine();
        let (_dir, path) = source("a\nb\n");
        engine.start(StartRequest::file(&path, 1000)).await;
        assert!(engine.stop().await);
        assert!(!engine.stop().await);
        assert!(!engine.stop().await);
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.has_session().await);
    }

    #[tokio::test]
    async fn test_pause_resume_return_values() {
        let engine = engine();
        assert!(!engine.pause().await);
        let (_dir, path) = source("a\nb\n");
        engine.start(StartRequest::file(&path, 1000)).await;
        assert!(engine.pause().await);
        assert!(!engine.pause().await);
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(engine.resume().await);
        assert!(!engine.resume().await);
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_paused_poll_holds_line() {
        let engine = engine();
        let (_dir, path) = source("a\nb\n");
        engine.start(StartRequest::file(&path, 1000)).await;
        engine.pause().await;

        let mut host = Recorder::default();
        assert_eq!(engine.poll(&mut host).await, PollStatus::Paused);
        assert_eq!(
            host.0,
            vec!["echo \"Playback Started!\" status", "echo \"Playback Paused!\" status"]
        );

        engine.resume().await;
        assert!(matches!(
            engine.poll(&mut host).await,
            PollStatus::Delivered { ended: false, .. }
        ));
        assert_eq!(host.0.last().unwrap(), "echo \"a\" status");
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_no_line_after_stop() {
        let engine = engine();
        let (_dir, path) = source("a\nb\n");
        engine.start(StartRequest::file(&path, 20)).await;
        engine.stop().await;

        let mut host = Recorder::default();
        assert_eq!(engine.poll(&mut host).await, PollStatus::Idle);
        assert_eq!(
            host.0,
            vec!["echo \"Playback Started!\" status", "echo \"Playback Stopped!\" status"]
        );
    }

    #[tokio::test]
    async fn test_fifo_full_rejects_newest() {
        let engine = engine();
        for text in ["one", "two", "three"] {
            assert!(engine.start(StartRequest::line(text)).await);
        }
        assert!(matches!(
            engine.try_start(StartRequest::line("four")).await,
            Err(PacerError::State(StateError::FifoFull))
        ));

        let mut host = Recorder::default();
        assert_eq!(engine.poll(&mut host).await, PollStatus::Drained(3));
        assert_eq!(
            host.0,
            vec![
                "echo \"one\" status",
                "echo \"two\" status",
                "echo \"three\" status"
            ]
        );
    }

    #[tokio::test]
    async fn test_single_lines_keep_their_channel() {
        let engine = engine();
        engine.start(StartRequest::line("hi").channel("#a")).await;
        engine.start(StartRequest::line("yo").channel("#b")).await;
        let mut host = Recorder::default();
        engine.poll(&mut host).await;
        assert_eq!(host.0, vec!["/msg #a \"hi\"", "/msg #b \"yo\""]);
    }

    #[tokio::test]
    async fn test_stop_flushes_queued_lines() {
        let engine = engine();
        engine.start(StartRequest::line("x")).await;
        assert_eq!(engine.pending_lines(), 1);
        assert!(engine.stop().await);
        assert_eq!(engine.pending_lines(), 0);
        assert_eq!(engine.poll(&mut Recorder::default()).await, PollStatus::Idle);
    }

    #[tokio::test]
    async fn test_peer_single_line_failure_reports() {
        let engine = engine();
        let mut events = engine.subscribe();
        let err = engine
            .try_start(StartRequest::line("x").service("nosuchclient"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PacerError::Transport(TransportError::PeerNotFound(_))
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            PlaybackEvent::Failed { .. }
        ));
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_peer_pause_failure_stops_session() {
        let engine = engine();
        let mut events = engine.subscribe();
        let (_dir, path) = source("a\nb\n");
        assert!(
            engine
                .start(StartRequest::file(&path, 60_000).service("mirc"))
                .await
        );

        assert!(!engine.pause().await);
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.has_session().await);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(PlaybackEvent::Started { .. })));
        assert!(matches!(
            seen.last(),
            Some(PlaybackEvent::Failed { reason }) if reason.contains("mirc")
        ));
        assert!(!seen.contains(&PlaybackEvent::Paused));
        assert!(!engine.resume().await);
    }

    /// Records when the paced line `a` finished evaluating, slowly.
    struct SlowHost {
        finished: Arc<Mutex<Option<std::time::Instant>>>,
    }

    impl EvalHook for SlowHost {
        fn eval(&mut self, script: &[u8]) -> Result<(), TransportError> {
            if script == b"echo \"a\" status" {
                std::thread::sleep(Duration::from_millis(200));
                *self.finished.lock().unwrap() = Some(std::time::Instant::now());
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_line_in_flight() {
        let engine = engine();
        let (_dir, path) = source("a\nb\n");
        assert!(engine.start(StartRequest::file(&path, 1000)).await);

        let finished = Arc::new(Mutex::new(None));
        let mut host = SlowHost {
            finished: finished.clone(),
        };
        let poller = engine.clone();
        let poll = tokio::spawn(async move { poller.poll(&mut host).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.stop().await);
        let stopped = std::time::Instant::now();

        // the line was already being evaluated, so stop returns only after it
        let finished = finished.lock().unwrap().expect("line was not delivered");
        assert!(finished <= stopped);
        assert!(matches!(
            poll.await.unwrap(),
            PollStatus::Delivered { ended: false, .. }
        ));
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_interval_zero_is_clamped() {
        let engine = engine();
        let (_dir, path) = source("a\nb\nc\n");
        engine.start(StartRequest::file(&path, 0)).await;
        let mut host = Recorder::default();
        let mut delivered = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while delivered < 3 && tokio::time::Instant::now() < deadline {
            if let PollStatus::Delivered { .. } = engine.poll(&mut host).await {
                delivered += 1;
            }
        }
        assert_eq!(delivered, 3);
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_poll_status_display() {
        assert_eq!(PollStatus::Drained(2).to_string(), "drained 2");
        assert_eq!(
            PollStatus::Delivered {
                command: Vec::new(),
                ended: true
            }
            .to_string(),
            "ended"
        );
        assert_eq!(engine().version(), env!("CARGO_PKG_VERSION"));
    }
}

//! Access poller: the fixed-interval capture → verify cycle and the
//! Idle / Granted / Denied state machine it drives.
//!
//! At most one recognition request is in flight at a time. A tick that
//! lands while a request is outstanding is dropped, never queued. Each
//! outcome (re)starts a dwell timer that returns the phase to Idle; a
//! newer outcome always wins over an older timer.

use gymgate_core::{ApiError, RecognitionOutcome, RecognitionService};
use gymgate_hw::{CameraError, CaptureSource};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};

/// Why a poll cycle produced no outcome.
#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Capture(#[from] CameraError),
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The poller was stopped before the cycle reached the network.
    #[error("poller stopped")]
    Stopped,
}

/// Poll cadence and dwell durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub granted_dwell: Duration,
    pub denied_dwell: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            granted_dwell: Duration::from_millis(9500),
            denied_dwell: Duration::from_millis(8000),
        }
    }
}

/// What the access screen shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPhase {
    Idle,
    Granted,
    Denied,
}

/// Re-entrancy guard and last failure of the poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollCycleState {
    pub in_flight: bool,
    pub last_error: Option<String>,
}

/// Everything the presentation layer needs, published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSnapshot {
    pub phase: AccessPhase,
    pub outcome: Option<RecognitionOutcome>,
    pub cycle: PollCycleState,
}

impl Default for AccessSnapshot {
    fn default() -> Self {
        Self {
            phase: AccessPhase::Idle,
            outcome: None,
            cycle: PollCycleState::default(),
        }
    }
}

struct DwellTimer {
    seq: u64,
    handle: AbortHandle,
}

/// Live phase; non-idle phases own the timer that will end them.
enum PhaseState {
    Idle,
    Granted(DwellTimer),
    Denied(DwellTimer),
}

impl PhaseState {
    fn kind(&self) -> AccessPhase {
        match self {
            PhaseState::Idle => AccessPhase::Idle,
            PhaseState::Granted(_) => AccessPhase::Granted,
            PhaseState::Denied(_) => AccessPhase::Denied,
        }
    }

    fn timer_seq(&self) -> Option<u64> {
        match self {
            PhaseState::Idle => None,
            PhaseState::Granted(t) | PhaseState::Denied(t) => Some(t.seq),
        }
    }

    /// Cancel any pending dwell timer and go Idle.
    fn reset(&mut self) {
        if let PhaseState::Granted(t) | PhaseState::Denied(t) =
            std::mem::replace(self, PhaseState::Idle)
        {
            t.handle.abort();
        }
    }
}

struct State {
    ticker: Option<JoinHandle<()>>,
    /// Bumped by `stop()`; completions from an older generation are stale.
    generation: u64,
    dwell_seq: u64,
    phase: PhaseState,
    outcome: Option<RecognitionOutcome>,
    cycle: PollCycleState,
}

impl State {
    fn snapshot(&self) -> AccessSnapshot {
        AccessSnapshot {
            phase: self.phase.kind(),
            outcome: self.outcome.clone(),
            cycle: self.cycle.clone(),
        }
    }
}

struct Inner<R, C> {
    recognizer: Arc<R>,
    camera: Arc<C>,
    config: PollerConfig,
    state: Mutex<State>,
    updates: watch::Sender<AccessSnapshot>,
}

impl<R: RecognitionService, C: CaptureSource> Inner<R, C> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.updates.send_replace(state.snapshot());
    }

    /// Start a cycle unless one is already in flight.
    ///
    /// `scheduled` carries the ticker's generation; a ticker that outlived
    /// `stop()` is ignored.
    fn begin_cycle(self: &Arc<Self>, scheduled: Option<u64>) -> bool {
        let generation = {
            let mut state = self.lock();
            if let Some(generation) = scheduled {
                if state.generation != generation || state.ticker.is_none() {
                    return false;
                }
            }
            if state.cycle.in_flight {
                tracing::trace!("tick dropped: recognition request in flight");
                return false;
            }
            state.cycle.in_flight = true;
            state.cycle.last_error = None;
            self.publish(&state);
            state.generation
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.run_cycle(generation).await;
            inner.finish_cycle(generation, result);
        });
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Capture and verify. A stop before the capture skips the device
    /// entirely; a stop during the capture closes the device it reopened.
    async fn run_cycle(&self, generation: u64) -> Result<RecognitionOutcome, PollError> {
        if !self.is_current(generation) {
            return Err(PollError::Stopped);
        }
        let image = self.camera.capture().await?;
        if !self.is_current(generation) {
            tracing::debug!("poller stopped during capture; releasing camera");
            self.camera.release();
            return Err(PollError::Stopped);
        }

        tracing::debug!(bytes = image.len(), "submitting still for verification");
        Ok(self.recognizer.verify_access(&image).await?)
    }

    fn finish_cycle(self: &Arc<Self>, generation: u64, result: Result<RecognitionOutcome, PollError>) {
        let mut state = self.lock();
        state.cycle.in_flight = false;

        if state.generation != generation {
            tracing::debug!("discarding recognition result issued before stop");
            self.publish(&state);
            return;
        }

        match result {
            Ok(outcome) => {
                tracing::info!(
                    granted = outcome.access_granted,
                    client = outcome.client.as_ref().map(|c| c.name.as_str()),
                    confidence = outcome.confidence,
                    message = %outcome.message,
                    "access decision"
                );

                let dwell = if outcome.access_granted {
                    self.config.granted_dwell
                } else {
                    self.config.denied_dwell
                };
                state.phase.reset();
                state.dwell_seq += 1;
                let timer = DwellTimer {
                    seq: state.dwell_seq,
                    handle: self.spawn_dwell(state.dwell_seq, dwell),
                };
                state.phase = if outcome.access_granted {
                    PhaseState::Granted(timer)
                } else {
                    PhaseState::Denied(timer)
                };
                state.outcome = Some(outcome);
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognition cycle failed");
                state.phase.reset();
                state.outcome = None;
                state.cycle.last_error = Some(e.to_string());
            }
        }

        self.publish(&state);
    }

    fn spawn_dwell(self: &Arc<Self>, seq: u64, dwell: Duration) -> AbortHandle {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(dwell).await;
            inner.expire_dwell(seq);
        })
        .abort_handle()
    }

    fn expire_dwell(&self, seq: u64) {
        let mut state = self.lock();
        // A newer outcome or a stop replaced this timer.
        if state.phase.timer_seq() != Some(seq) {
            return;
        }
        state.phase = PhaseState::Idle;
        state.outcome = None;
        tracing::debug!("dwell elapsed");
        self.publish(&state);
    }
}

/// Drives the capture → verify cycle while the access screen is active.
///
/// `start`, `stop` and `tick` must be called from within a Tokio runtime.
/// Dropping the poller stops it.
pub struct AccessPoller<R: RecognitionService, C: CaptureSource> {
    inner: Arc<Inner<R, C>>,
}

impl<R: RecognitionService, C: CaptureSource> AccessPoller<R, C> {
    pub fn new(recognizer: Arc<R>, camera: Arc<C>, config: PollerConfig) -> Self {
        let (updates, _) = watch::channel(AccessSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                recognizer,
                camera,
                config,
                state: Mutex::new(State {
                    ticker: None,
                    generation: 0,
                    dwell_seq: 0,
                    phase: PhaseState::Idle,
                    outcome: None,
                    cycle: PollCycleState::default(),
                }),
                updates,
            }),
        }
    }

    /// Begin ticking every `interval`. The first tick fires one interval
    /// from now. No-op if already running.
    pub fn start(&self) {
        let mut state = self.inner.lock();
        if state.ticker.is_some() {
            return;
        }

        let period = self.inner.config.interval.max(Duration::from_millis(1));
        let first = Instant::now() + period;
        let generation = state.generation;
        let inner = Arc::clone(&self.inner);

        state.ticker = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(first, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                inner.begin_cycle(Some(generation));
            }
        }));
        tracing::info!(interval_ms = period.as_millis() as u64, "access poller started");
    }

    /// Cancel the tick source and any dwell timer; the phase returns to
    /// Idle. A request already in flight is left to finish but its result
    /// is discarded. Idempotent.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        let ticker = state.ticker.take();
        let was_running = ticker.is_some();
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        state.generation += 1;
        state.phase.reset();
        state.outcome = None;
        self.inner.publish(&state);

        if was_running {
            tracing::info!("access poller stopped");
        }
    }

    /// Run one capture → verify cycle now.
    ///
    /// Returns false, changing nothing, if a request is already in flight.
    pub fn tick(&self) -> bool {
        self.inner.begin_cycle(None)
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().ticker.is_some()
    }

    /// Current state.
    pub fn snapshot(&self) -> AccessSnapshot {
        self.inner.lock().snapshot()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<AccessSnapshot> {
        self.inner.updates.subscribe()
    }
}

impl<R: RecognitionService, C: CaptureSource> Drop for AccessPoller<R, C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ana_welcome, denied, granted, settle, FakeApi, FakeCamera};

    fn poller(api: &Arc<FakeApi>, camera: &Arc<FakeCamera>) -> AccessPoller<FakeApi, FakeCamera> {
        AccessPoller::new(Arc::clone(api), Arc::clone(camera), PollerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_while_in_flight_is_noop() {
        let api = Arc::new(FakeApi::gated());
        let camera = Arc::new(FakeCamera::new());
        let poller = poller(&api, &camera);

        assert!(poller.tick());
        settle().await;
        assert_eq!(api.verify_calls(), 1);
        let before = poller.snapshot();
        assert!(before.cycle.in_flight);

        assert!(!poller.tick());
        settle().await;
        assert_eq!(api.verify_calls(), 1);
        assert_eq!(camera.captures(), 1);
        assert_eq!(poller.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_ticks_dropped_while_request_in_flight() {
        let api = Arc::new(FakeApi::gated());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(denied()));
        let poller = poller(&api, &camera);

        poller.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 1);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(2)).await;
            settle().await;
        }
        assert_eq!(api.verify_calls(), 1);
        assert_eq!(camera.captures(), 1);
        assert!(poller.snapshot().cycle.in_flight);

        api.open_gate(1);
        settle().await;
        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Denied);
        assert!(!snap.cycle.in_flight);

        // Ticking resumes once the slot is free.
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_while_old_request_in_flight() {
        let api = Arc::new(FakeApi::gated());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(granted("Ana")));
        api.push_verify(Ok(denied()));
        let poller = poller(&api, &camera);

        poller.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 1);

        poller.stop();
        poller.start();
        assert!(poller.is_running());

        // The new ticker fires but the old request still holds the slot.
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 1);

        api.open_gate(1);
        settle().await;
        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Idle);
        assert!(snap.outcome.is_none());
        assert!(!snap.cycle.in_flight);

        api.open_gate(1);
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 2);
        assert_eq!(poller.snapshot().phase, AccessPhase::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_granted_scenario_reverts_after_dwell() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(ana_welcome()));
        let poller = poller(&api, &camera);

        poller.tick();
        settle().await;

        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Granted);
        assert_eq!(snap.outcome, Some(ana_welcome()));
        assert!(!snap.cycle.in_flight);
        let client = snap.outcome.unwrap().client.unwrap();
        assert_eq!((client.id, client.name.as_str()), (1, "Ana"));

        tokio::time::advance(Duration::from_millis(9400)).await;
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Granted);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Idle);
        assert!(snap.outcome.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_reverts_after_eight_seconds() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(denied()));
        let poller = poller(&api, &camera);

        poller.tick();
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Denied);

        tokio::time::advance(Duration::from_millis(7900)).await;
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Denied);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Idle);
        assert!(poller.snapshot().outcome.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_outcome_restarts_dwell() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(granted("Ana")));
        api.push_verify(Ok(denied()));
        let poller = poller(&api, &camera);

        poller.tick();
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Granted);

        tokio::time::advance(Duration::from_secs(5)).await;
        poller.tick();
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Denied);

        // Past the first 9.5 s granted deadline: the stale timer must not fire.
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Denied);
        assert!(poller.snapshot().outcome.is_some());

        // 8.1 s after the denied outcome.
        tokio::time::advance(Duration::from_millis(3100)).await;
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending_completion() {
        let api = Arc::new(FakeApi::gated());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(granted("Ana")));
        let poller = poller(&api, &camera);

        poller.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 1);
        assert!(poller.snapshot().cycle.in_flight);

        poller.stop();
        api.open_gate(1);
        settle().await;

        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Idle);
        assert!(snap.outcome.is_none());
        assert!(!snap.cycle.in_flight);

        // No dwell timer was scheduled, and no further ticks happen.
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(poller.snapshot(), snap);
        assert_eq!(api.verify_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_single_tick_source() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(denied()));
        let poller = poller(&api, &camera);

        poller.start();
        poller.start();
        assert!(poller.is_running());

        // First tick waits a full interval.
        tokio::time::advance(Duration::from_millis(1900)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 0);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_error_sets_last_error_and_polling_continues() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Err(ApiError::Status {
            status: 500,
            message: "model unavailable".into(),
        }));
        api.push_verify(Ok(granted("Ana")));
        let poller = poller(&api, &camera);

        poller.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        let snap = poller.snapshot();
        assert_eq!(snap.cycle.last_error.as_deref(), Some("model unavailable"));
        assert_eq!(snap.phase, AccessPhase::Idle);
        assert!(snap.outcome.is_none());
        assert!(!snap.cycle.in_flight);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.verify_calls(), 2);
        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Granted);
        assert!(snap.cycle.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_cancels_live_dwell() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(granted("Ana")));
        api.push_verify(Err(ApiError::Transport("connection refused".into())));
        let poller = poller(&api, &camera);

        poller.tick();
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Granted);

        poller.tick();
        settle().await;
        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Idle);
        assert!(snap.outcome.is_none());
        assert_eq!(
            snap.cycle.last_error.as_deref(),
            Some("connection error: connection refused")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_skips_request() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        camera.set_failing(true);
        let poller = poller(&api, &camera);

        poller.tick();
        settle().await;

        let snap = poller.snapshot();
        assert_eq!(api.verify_calls(), 0);
        assert!(!snap.cycle.in_flight);
        assert_eq!(
            snap.cycle.last_error.as_deref(),
            Some("device not found: /dev/video0")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_live_dwell() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(granted("Ana")));
        let poller = poller(&api, &camera);

        poller.tick();
        settle().await;
        assert_eq!(poller.snapshot().phase, AccessPhase::Granted);

        poller.stop();
        poller.stop();
        assert!(!poller.is_running());
        let snap = poller.snapshot();
        assert_eq!(snap.phase, AccessPhase::Idle);
        assert!(snap.outcome.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_updates() {
        let api = Arc::new(FakeApi::new());
        let camera = Arc::new(FakeCamera::new());
        api.push_verify(Ok(denied()));
        let poller = poller(&api, &camera);
        let mut rx = poller.subscribe();

        poller.tick();
        settle().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, AccessPhase::Denied);
    }
}

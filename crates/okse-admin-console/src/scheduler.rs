//! The single page-wide polling timer.
//!
//! At most one timer is armed at any instant. `start` always cancels the
//! previous timer before arming the new one and issuing its immediate
//! request. Cancelling only stops the timer; calls already in flight run to
//! completion, but their responses are dropped once the timer that issued
//! them is no longer current.
//!
//! The generation only moves under the delivery gate, so `start` and `stop`
//! wait for a handler that is already running. The state lock is never held
//! across a transport call; a transport may query the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::transport::{DeliveryGate, Dispatcher, GenerationGuard, RequestDefinition};

/// Lower bound for any polling period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Upper bound; keeps deadline arithmetic from overflowing.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn clamp_interval(requested: Duration) -> Duration {
    requested.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Describes the armed timer. Returned by [`PollScheduler::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollHandle {
    id: u64,
    generation: u64,
    period: Duration,
    endpoint: String,
}

impl PollHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Period after clamping.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

struct ArmedTimer {
    handle: PollHandle,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerState {
    armed: Option<ArmedTimer>,
    next_id: u64,
}

impl Drop for SchedulerState {
    fn drop(&mut self) {
        if let Some(timer) = self.armed.take() {
            timer.task.abort();
        }
    }
}

/// Owns the page-wide polling timer. Clones share the same timer.
#[derive(Clone)]
pub struct PollScheduler {
    dispatcher: Dispatcher,
    state: Arc<Mutex<SchedulerState>>,
    generation: Arc<AtomicU64>,
    gate: DeliveryGate,
}

impl PollScheduler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(ReentrantMutex::new(())),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Cancel any armed timer, issue `def` once right away, then every
    /// `interval` (clamped to [`MIN_POLL_INTERVAL`]) until the next `start`
    /// or `stop`. Must be called from within a tokio runtime.
    pub fn start(&self, def: RequestDefinition, interval: Duration) -> PollHandle {
        let period = clamp_interval(interval);
        let gate = self.gate.lock();
        let mut state = self.state.lock();

        if let Some(previous) = state.armed.take() {
            previous.task.abort();
            tracing::debug!(
                timer = previous.handle.id,
                endpoint = %previous.handle.endpoint,
                "Cancelled polling timer"
            );
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        state.next_id += 1;
        let handle = PollHandle {
            id: state.next_id,
            generation,
            period,
            endpoint: def.endpoint().to_string(),
        };
        let guard = GenerationGuard::new(Arc::clone(&self.generation), generation, Arc::clone(&self.gate));

        // Measured from now, not from when the task first gets polled.
        let first_tick = Instant::now() + period;
        let dispatcher = self.dispatcher.clone();
        let ticker_def = def.clone();
        let ticker_guard = guard.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                dispatcher.send_guarded(&ticker_def, Some(ticker_guard.clone()));
            }
        });

        tracing::debug!(
            timer = handle.id,
            generation,
            endpoint = %handle.endpoint,
            period_ms = period.as_millis() as u64,
            "Armed polling timer"
        );

        state.armed = Some(ArmedTimer { handle: handle.clone(), task });
        drop(state);
        drop(gate);

        self.dispatcher.send_guarded(&def, Some(guard));
        handle
    }

    /// Cancel the armed timer, if any. Calling it again is a no-op.
    pub fn stop(&self) {
        let _gate = self.gate.lock();
        let mut state = self.state.lock();
        if let Some(timer) = state.armed.take() {
            timer.task.abort();
            self.generation.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                timer = timer.handle.id,
                endpoint = %timer.handle.endpoint,
                "Stopped polling timer"
            );
        }
    }

    pub fn active_handle(&self) -> Option<PollHandle> {
        self.state.lock().armed.as_ref().map(|t| t.handle.clone())
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Payload, Transport};
    use futures_util::future::BoxFuture;
    use okse_admin_protocol::{HttpMethod, TransportError};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{mpsc, OnceLock};

    struct CountingTransport {
        calls: Arc<AtomicUsize>,
    }

    impl Transport for CountingTransport {
        fn execute(
            &self,
            _method: HttpMethod,
            _endpoint: &str,
        ) -> BoxFuture<'static, Result<Payload, TransportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Payload::Null) })
        }
    }

    fn scheduler() -> (PollScheduler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = CountingTransport { calls: Arc::clone(&calls) };
        (PollScheduler::new(Dispatcher::new(Arc::new(transport))), calls)
    }

    #[test]
    fn test_clamp_interval_floor() {
        assert_eq!(clamp_interval(Duration::from_millis(100)), MIN_POLL_INTERVAL);
        assert_eq!(clamp_interval(Duration::ZERO), MIN_POLL_INTERVAL);
        assert_eq!(clamp_interval(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(clamp_interval(Duration::MAX), MAX_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_issues_immediately() {
        let (scheduler, calls) = scheduler();
        let handle = scheduler.start(RequestDefinition::get("main/get/all", |_| {}), Duration::from_secs(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "immediate request happens inside start()");
        assert_eq!(handle.period(), Duration::from_secs(1));
        assert_eq!(scheduler.active_handle(), Some(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (scheduler, _calls) = scheduler();
        scheduler.stop();
        assert!(!scheduler.is_active());
        let generation = scheduler.current_generation();

        scheduler.start(RequestDefinition::get("main/get/all", |_| {}), Duration::from_secs(1));
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.current_generation(), generation + 2);
    }

    /// Transport that asks the scheduler what is armed on every call.
    struct IntrospectingTransport {
        scheduler: Arc<OnceLock<PollScheduler>>,
        seen: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl Transport for IntrospectingTransport {
        fn execute(
            &self,
            _method: HttpMethod,
            _endpoint: &str,
        ) -> BoxFuture<'static, Result<Payload, TransportError>> {
            let armed = self
                .scheduler
                .get()
                .and_then(|s| s.active_handle())
                .map(|h| h.endpoint().to_string());
            self.seen.lock().push(armed);
            Box::pin(async { Ok(Payload::Null) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_may_query_scheduler_during_start() {
        let cell = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = IntrospectingTransport { scheduler: Arc::clone(&cell), seen: Arc::clone(&seen) };
        let scheduler = PollScheduler::new(Dispatcher::new(Arc::new(transport)));
        let _ = cell.set(scheduler.clone());

        scheduler.start(RequestDefinition::get("main/get/all", |_| {}), Duration::from_secs(1));
        scheduler.start(RequestDefinition::get("topic/get/all", |_| {}), Duration::from_secs(1));

        assert_eq!(
            *seen.lock(),
            vec![Some("main/get/all".to_string()), Some("topic/get/all".to_string())],
            "the immediate request sees its own timer already armed"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_running_handler() {
        let (scheduler, _calls) = scheduler();
        let (entered_tx, entered_rx) = mpsc::channel();
        let entered_tx = std::sync::Mutex::new(entered_tx);
        let finished = Arc::new(AtomicBool::new(false));
        let finished_in_handler = Arc::clone(&finished);

        let def = RequestDefinition::get("main/get/all", move |_| {
            let _ = entered_tx.lock().unwrap().send(());
            std::thread::sleep(Duration::from_millis(150));
            finished_in_handler.store(true, Ordering::SeqCst);
        });
        scheduler.start(def, Duration::from_secs(60));

        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        scheduler.stop();
        assert!(
            finished.load(Ordering::SeqCst),
            "stop returned while a handler of the old timer was still running"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_handle() {
        let (scheduler, _calls) = scheduler();
        let first = scheduler.start(RequestDefinition::get("main/get/all", |_| {}), Duration::from_secs(1));
        let second = scheduler.start(RequestDefinition::get("topic/get/all", |_| {}), Duration::from_secs(1));
        assert_ne!(first.id(), second.id());
        assert!(second.generation() > first.generation());
        assert_eq!(scheduler.active_handle().map(|h| h.endpoint().to_string()), Some("topic/get/all".into()));
    }
}

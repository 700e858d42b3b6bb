#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use okse_admin_console::{Dispatcher, Payload, PollScheduler, SharedView, TabRouter, Transport};
use okse_admin_protocol::{HttpMethod, TransportError};
use serde_json::json;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub at_ms: u64,
    pub method: HttpMethod,
    pub endpoint: String,
}

#[derive(Clone)]
pub struct Reply {
    pub outcome: Result<Payload, TransportError>,
    pub delay: Duration,
}

impl Reply {
    pub fn json(payload: Payload) -> Self {
        Self { outcome: Ok(payload), delay: Duration::ZERO }
    }

    pub fn status(status: u16) -> Self {
        Self {
            outcome: Err(TransportError::Status { status, body: String::new() }),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory transport that records every call at the moment it is issued.
///
/// Replies are scripted per endpoint prefix; the longest matching prefix
/// wins. Unscripted endpoints answer `{}`.
pub struct RecordingTransport {
    origin: Instant,
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<String, Reply>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
        })
    }

    pub fn script(&self, endpoint_prefix: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(endpoint_prefix.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.endpoint).collect()
    }

    /// `(at_ms, endpoint)` pairs, the shape most assertions want.
    pub fn timeline(&self) -> Vec<(u64, String)> {
        self.calls().into_iter().map(|c| (c.at_ms, c.endpoint)).collect()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls().iter().filter(|c| c.endpoint == endpoint).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn reply_for(&self, endpoint: &str) -> Reply {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .filter(|(prefix, _)| endpoint.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::json(json!({})))
    }
}

impl Transport for RecordingTransport {
    fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
    ) -> BoxFuture<'static, Result<Payload, TransportError>> {
        let at_ms = Instant::now().duration_since(self.origin).as_millis() as u64;
        self.calls.lock().unwrap().push(Call { at_ms, method, endpoint: endpoint.to_string() });

        let Reply { outcome, delay } = self.reply_for(endpoint);
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }
}

pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub view: SharedView,
    pub router: TabRouter,
}

impl Harness {
    /// Router over a recording transport with a 1 s update interval. Failed
    /// calls without their own handler land on the view's message board.
    pub fn new() -> Self {
        let transport = RecordingTransport::new();
        let view = SharedView::new();
        let banner = view.clone();
        let dispatcher = Dispatcher::new(transport.clone())
            .with_fallback(move |failed| banner.display_message(failed.error.message()));
        let router = TabRouter::new(PollScheduler::new(dispatcher), view.clone())
            .with_update_interval(Duration::from_secs(1));
        Self { transport, view, router }
    }

    pub fn scheduler(&self) -> &PollScheduler {
        self.router.scheduler()
    }
}

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Move the paused clock forward in 100 ms steps so every tick is observed
/// at its own deadline.
pub async fn run_for(ms: u64) {
    let step = 100;
    let mut elapsed = 0;
    while elapsed < ms {
        let next = step.min(ms - elapsed);
        tokio::time::advance(Duration::from_millis(next)).await;
        settle().await;
        elapsed += next;
    }
}

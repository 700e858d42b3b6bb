//! View model the request handlers write into and the front end reads.
//!
//! Adapters are idempotent: applying the same payload twice leaves the same
//! state behind. Topic panels are keyed by normalized topic name so a
//! topic gets one panel no matter how often it is refreshed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use okse_admin_protocol::{
    topic_key, LogTail, MainStatus, SubscriberRow, Tab, TopicSnapshot, TopicsPayload,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::transport::Payload;

const MAX_MESSAGES: usize = 50;

/// Tone of the protocol power button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonTone {
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerButton {
    pub label: &'static str,
    pub tone: ButtonTone,
}

impl PowerButton {
    pub fn for_status(protocol_power: bool) -> Self {
        if protocol_power {
            Self { label: "Stop protocolservers", tone: ButtonTone::Danger }
        } else {
            Self { label: "Start protocolservers", tone: ButtonTone::Success }
        }
    }
}

/// One topic's subscriber table.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicPanel {
    pub title: String,
    pub subscribers: Vec<SubscriberRow>,
}

/// A banner shown to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct BannerMessage {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// Bounded list of error banners, newest last.
#[derive(Debug, Clone, Default)]
pub struct MessageBoard {
    entries: VecDeque<BannerMessage>,
}

impl MessageBoard {
    pub fn display(&mut self, text: impl Into<String>) {
        if self.entries.len() == MAX_MESSAGES {
            self.entries.pop_front();
        }
        self.entries.push_back(BannerMessage { at: Utc::now(), text: text.into() });
    }

    pub fn entries(&self) -> impl Iterator<Item = &BannerMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Everything the console knows about the broker right now.
#[derive(Debug, Default)]
pub struct ConsoleView {
    pub overview: Option<MainStatus>,
    /// Last observed protocol power state; only a main refresh updates it.
    pub protocol_power: Option<bool>,
    topics: BTreeMap<String, TopicPanel>,
    pub statistics: Option<Payload>,
    pub config: Option<Payload>,
    pub subscribers: Option<Payload>,
    pub log: Option<LogTail>,
    pub log_levels: Vec<String>,
    pub log_files: Vec<String>,
    pub messages: MessageBoard,
}

impl ConsoleView {
    /// Apply a payload fetched for `tab`. A payload that does not decode is
    /// logged and leaves the previous state in place.
    pub fn apply(&mut self, tab: Tab, payload: Payload) {
        match tab {
            Tab::Main => {
                if let Some(status) = decode::<MainStatus>(tab, payload) {
                    self.apply_main(status);
                }
            }
            Tab::Topics => {
                if let Some(topics) = decode::<TopicsPayload>(tab, payload) {
                    self.apply_topics(topics);
                }
            }
            Tab::Log => {
                if let Some(tail) = decode::<LogTail>(tab, payload) {
                    self.log = Some(tail);
                }
            }
            Tab::Statistics => self.statistics = Some(payload),
            Tab::Config => self.config = Some(payload),
            Tab::Subscribers => self.subscribers = Some(payload),
        }
    }

    fn apply_main(&mut self, status: MainStatus) {
        self.protocol_power = Some(status.protocol_power);
        self.overview = Some(status);
    }

    fn apply_topics(&mut self, payload: TopicsPayload) {
        for snapshot in payload.into_vec() {
            self.upsert_topic(snapshot);
        }
    }

    fn upsert_topic(&mut self, snapshot: TopicSnapshot) {
        let key = topic_key(&snapshot.topic_name);
        if key.is_empty() {
            tracing::warn!("Ignoring topic payload without a topic name");
            return;
        }
        match self.topics.get_mut(&key) {
            Some(panel) => panel.subscribers = snapshot.subscribers,
            None => {
                self.topics.insert(
                    key,
                    TopicPanel { title: snapshot.topic_name, subscribers: snapshot.subscribers },
                );
            }
        }
    }

    pub fn topic_panels(&self) -> impl Iterator<Item = (&str, &TopicPanel)> {
        self.topics.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn topic_panel(&self, topic_name: &str) -> Option<&TopicPanel> {
        self.topics.get(&topic_key(topic_name))
    }

    pub fn remove_topic(&mut self, topic_name: &str) -> bool {
        self.topics.remove(&topic_key(topic_name)).is_some()
    }

    /// Drop a subscriber row, by id or by row index, from every panel.
    pub fn remove_subscriber(&mut self, subscriber_id: &str) -> bool {
        let mut removed = false;
        for panel in self.topics.values_mut() {
            let before = panel.subscribers.len();
            let mut index = 0;
            panel.subscribers.retain(|row| {
                let matches = row.id.as_deref() == Some(subscriber_id)
                    || (row.id.is_none() && index.to_string() == subscriber_id);
                index += 1;
                !matches
            });
            removed |= panel.subscribers.len() != before;
        }
        removed
    }

    pub fn clear_topics(&mut self) {
        self.topics.clear();
    }

    pub fn power_button(&self) -> Option<PowerButton> {
        self.protocol_power.map(PowerButton::for_status)
    }
}

fn decode<T: DeserializeOwned>(tab: Tab, payload: Payload) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(tab = %tab, error = %e, "Payload did not match the expected shape");
            None
        }
    }
}

/// Shared handle to the view model plus a revision channel the front end
/// watches to know when to re-render.
#[derive(Clone)]
pub struct SharedView {
    inner: Arc<RwLock<ConsoleView>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SharedView {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedView {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(ConsoleView::default())),
            revision: Arc::new(revision),
        }
    }

    /// Mutate the view and bump the revision.
    pub fn update<R>(&self, f: impl FnOnce(&mut ConsoleView) -> R) -> R {
        let out = {
            let mut view = self.inner.write();
            f(&mut view)
        };
        self.revision.send_modify(|r| *r += 1);
        out
    }

    pub fn read<R>(&self, f: impl FnOnce(&ConsoleView) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn apply(&self, tab: Tab, payload: Payload) {
        self.update(|view| view.apply(tab, payload));
    }

    pub fn display_message(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|view| view.messages.display(text));
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

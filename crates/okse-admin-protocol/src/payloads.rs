//! JSON payloads returned by the admin API.
//!
//! Every struct tolerates additive fields and missing optional ones; the
//! backend owns these shapes and extends them freely.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value the backend sends either as a JSON number or as a preformatted
/// string (RAM sizes, ports).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Text(String::new())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Response of `main/get/all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MainStatus {
    pub subscribers: u64,
    pub publishers: u64,
    pub topics: u64,
    pub total_messages: u64,
    pub uptime: String,
    pub runtime_statistics: RuntimeStatistics,
    pub protocols: Vec<ProtocolInfo>,
    pub protocol_power: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeStatistics {
    pub total_ram: Scalar,
    pub free_ram: Scalar,
    pub used_ram: Scalar,
    pub cpu_available: Scalar,
}

/// One protocol server row of the main tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolInfo {
    #[serde(rename = "type")]
    pub protocol_type: String,
    pub host: String,
    pub port: Scalar,
}

/// A topic and its current subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicSnapshot {
    pub topic_name: String,
    pub subscribers: Vec<SubscriberRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberRow {
    pub id: Option<String>,
    pub protocol: String,
    pub ip: String,
    pub port: Scalar,
}

/// `topic/get/all` has been observed returning both a single topic and a
/// list of topics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TopicsPayload {
    Many(Vec<TopicSnapshot>),
    One(TopicSnapshot),
}

impl TopicsPayload {
    pub fn into_vec(self) -> Vec<TopicSnapshot> {
        match self {
            TopicsPayload::Many(topics) => topics,
            TopicsPayload::One(topic) => vec![topic],
        }
    }
}

/// Response of the log tail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogTail {
    pub name: String,
    pub lines: Vec<String>,
}

/// Normalized key for a topic panel.
pub fn topic_key(topic_name: &str) -> String {
    topic_name.trim().to_lowercase()
}

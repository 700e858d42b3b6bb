//! Tabs, endpoints and the log filter.
//!
//! Every endpoint is a path relative to the API base URL. The admin backend
//! owns these strings; the console treats them as a stable contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownTabError;

pub const MAIN_ENDPOINT: &str = "main/get/all";
pub const TOPICS_ENDPOINT: &str = "topic/get/all";
pub const STATISTICS_ENDPOINT: &str = "statistics/get/all";
pub const CONFIG_ENDPOINT: &str = "config/get/all";
pub const SUBSCRIBERS_ENDPOINT: &str = "subscriber/get/all";
pub const LOG_LEVELS_ENDPOINT: &str = "log/levels";
pub const LOG_FILES_ENDPOINT: &str = "log/files";

pub const PROTOCOL_POWER_ENDPOINT: &str = "main/protocols/power";
pub const DELETE_ALL_TOPICS_ENDPOINT: &str = "topics/delete/all";
pub const ENCODING_ENDPOINT: &str = "config/encoding/";

pub const DEFAULT_LOG_LEVEL: &str = "DEBUG";
pub const DEFAULT_LOG_LENGTH: usize = 250;

/// HTTP verbs the admin API uses. POST commands carry no body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard views, each backed by exactly one polling endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    Main,
    Topics,
    Statistics,
    Log,
    Config,
    Subscribers,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Main,
        Tab::Topics,
        Tab::Statistics,
        Tab::Log,
        Tab::Config,
        Tab::Subscribers,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Topics => "topics",
            Self::Statistics => "statistics",
            Self::Log => "log",
            Self::Config => "config",
            Self::Subscribers => "subscribers",
        }
    }

    /// Fixed endpoint for this tab. The log tab's endpoint depends on the
    /// filter, so it has none here; see [`LogFilterState::endpoint`].
    pub fn static_endpoint(self) -> Option<&'static str> {
        match self {
            Self::Main => Some(MAIN_ENDPOINT),
            Self::Topics => Some(TOPICS_ENDPOINT),
            Self::Statistics => Some(STATISTICS_ENDPOINT),
            Self::Log => None,
            Self::Config => Some(CONFIG_ENDPOINT),
            Self::Subscribers => Some(SUBSCRIBERS_ENDPOINT),
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Tab {
    type Err = UnknownTabError;

    /// Accepts the tab id with or without the `#` anchor prefix, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        let id = id.strip_prefix('#').unwrap_or(id);
        Tab::ALL
            .into_iter()
            .find(|tab| tab.id().eq_ignore_ascii_case(id))
            .ok_or_else(|| UnknownTabError(s.to_string()))
    }
}

/// Filter applied to the log tail request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilterState {
    pub level: String,
    pub file_index: usize,
    pub length: usize,
}

impl Default for LogFilterState {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file_index: 0,
            length: DEFAULT_LOG_LENGTH,
        }
    }
}

impl LogFilterState {
    /// Relative log tail endpoint. The level is free operator text and is
    /// percent-encoded so it cannot end the query or add parameters.
    pub fn endpoint(&self) -> String {
        format!(
            "log?logLevel={}&logID={}&length={}",
            urlencoding::encode(&self.level),
            self.file_index,
            self.length
        )
    }

    /// Overwrite the fields present in `patch`. Returns true if anything
    /// actually changed.
    pub fn merge(&mut self, patch: LogFilterPatch) -> bool {
        let before = self.clone();
        if let Some(level) = patch.level {
            self.level = level.trim().to_ascii_uppercase();
        }
        if let Some(file_index) = patch.file_index {
            self.file_index = file_index;
        }
        if let Some(length) = patch.length {
            self.length = length;
        }
        *self != before
    }
}

/// Partial update of [`LogFilterState`]; `None` fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilterPatch {
    pub level: Option<String>,
    pub file_index: Option<usize>,
    pub length: Option<usize>,
}

impl LogFilterPatch {
    pub fn level(level: impl Into<String>) -> Self {
        Self { level: Some(level.into()), ..Default::default() }
    }

    pub fn file_index(file_index: usize) -> Self {
        Self { file_index: Some(file_index), ..Default::default() }
    }

    pub fn length(length: usize) -> Self {
        Self { length: Some(length), ..Default::default() }
    }
}

/// True if `endpoint` can be appended to the API base URL as-is.
pub fn is_relative_endpoint(endpoint: &str) -> bool {
    !endpoint.is_empty() && !endpoint.starts_with('/') && !endpoint.contains("://")
}

/// Validate an operator-supplied path segment (topic name, subscriber id).
pub fn path_segment(raw: &str) -> Option<&str> {
    let segment = raw.trim();
    if segment.is_empty() || segment.contains(['/', '?', '#']) {
        None
    } else {
        Some(segment)
    }
}

pub fn delete_topic_endpoint(topic: &str) -> String {
    format!("topics/delete/{topic}")
}

pub fn delete_subscriber_endpoint(subscriber_id: &str) -> String {
    format!("topics/delete/subscriber/{subscriber_id}")
}

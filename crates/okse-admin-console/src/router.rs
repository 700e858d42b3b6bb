//! Tab routing: which endpoint backs the current view, and the log sub-poll.

use std::time::Duration;

use okse_admin_protocol::{
    LogFilterPatch, LogFilterState, Tab, UnknownTabError, LOG_FILES_ENDPOINT, LOG_LEVELS_ENDPOINT,
};

use crate::scheduler::{clamp_interval, PollHandle, PollScheduler, MIN_POLL_INTERVAL};
use crate::transport::RequestDefinition;
use crate::views::SharedView;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(2);

/// Maps tabs to request definitions and drives the scheduler.
///
/// The router owns the log filter and the update interval setting; the
/// scheduler never reads either on its own.
pub struct TabRouter {
    scheduler: PollScheduler,
    view: SharedView,
    log_filter: LogFilterState,
    active_tab: Option<Tab>,
    log_refresh: bool,
    update_interval: Duration,
}

impl TabRouter {
    pub fn new(scheduler: PollScheduler, view: SharedView) -> Self {
        Self {
            scheduler,
            view,
            log_filter: LogFilterState::default(),
            active_tab: None,
            log_refresh: false,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = clamp_interval(interval);
        self
    }

    /// Set the update interval from the operator-supplied number of seconds.
    /// Takes effect on the next activation. Nonsense input falls back to the
    /// floor.
    pub fn set_update_interval_secs(&mut self, secs: f64) -> Duration {
        let requested = if secs.is_finite() && secs >= 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(MIN_POLL_INTERVAL)
        } else {
            MIN_POLL_INTERVAL
        };
        self.update_interval = clamp_interval(requested);
        tracing::info!(
            interval_ms = self.update_interval.as_millis() as u64,
            "Update interval changed"
        );
        self.update_interval
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Resolve a tab identifier to its request definition. Pure: the
    /// scheduler is not touched.
    pub fn select(&self, tab_id: &str) -> Result<RequestDefinition, UnknownTabError> {
        let tab: Tab = tab_id.parse()?;
        Ok(self.definition_for(tab))
    }

    pub fn definition_for(&self, tab: Tab) -> RequestDefinition {
        let endpoint = match tab.static_endpoint() {
            Some(endpoint) => endpoint.to_string(),
            None => self.log_filter.endpoint(),
        };
        let view = self.view.clone();
        RequestDefinition::get(endpoint, move |payload| view.apply(tab, payload))
    }

    /// Switch to `tab_id` and start polling it. An unknown id is logged and
    /// returned; whatever timer was running keeps running.
    pub fn activate(&mut self, tab_id: &str) -> Result<PollHandle, UnknownTabError> {
        match tab_id.parse::<Tab>() {
            Ok(tab) => Ok(self.activate_tab(tab)),
            Err(e) => {
                tracing::warn!(tab = %tab_id, "Unknown tab selected, ignoring");
                Err(e)
            }
        }
    }

    pub fn activate_tab(&mut self, tab: Tab) -> PollHandle {
        if tab != Tab::Log {
            // The switch tears the log timer down along with everything else.
            self.log_refresh = false;
        }
        self.active_tab = Some(tab);
        let def = self.definition_for(tab);
        let handle = self.scheduler.start(def, self.update_interval);
        tracing::info!(
            tab = %tab,
            endpoint = %handle.endpoint(),
            interval_ms = handle.period().as_millis() as u64,
            "Tab activated"
        );
        handle
    }

    /// Merge `patch` into the log filter. When the log is being polled the
    /// poll restarts right away with the merged filter.
    pub fn update_log_filter(&mut self, patch: LogFilterPatch) -> Option<PollHandle> {
        self.log_filter.merge(patch);
        tracing::debug!(endpoint = %self.log_filter.endpoint(), "Log filter updated");

        if self.active_tab == Some(Tab::Log) || self.log_refresh {
            let def = self.definition_for(Tab::Log);
            Some(self.scheduler.start(def, self.update_interval))
        } else {
            None
        }
    }

    /// The log view's explicit refresh toggle, switched on.
    pub fn start_log_refresh(&mut self) -> PollHandle {
        let handle = self.activate_tab(Tab::Log);
        self.log_refresh = true;
        handle
    }

    /// The log view's explicit refresh toggle, switched off. The filter is
    /// kept for the next start.
    pub fn stop_log_refresh(&mut self) {
        self.log_refresh = false;
        self.scheduler.stop();
        tracing::info!("Log refresh stopped");
    }

    /// Fetch the log level and log file pickers once.
    pub fn load_log_catalog(&self) {
        let dispatcher = self.scheduler.dispatcher();

        let view = self.view.clone();
        dispatcher.send(&RequestDefinition::get(LOG_LEVELS_ENDPOINT, move |payload| {
            match serde_json::from_value::<Vec<String>>(payload) {
                Ok(levels) => view.update(|v| v.log_levels = levels),
                Err(e) => tracing::warn!(error = %e, "Unexpected log level list"),
            }
        }));

        let view = self.view.clone();
        dispatcher.send(&RequestDefinition::get(LOG_FILES_ENDPOINT, move |payload| {
            match serde_json::from_value::<Vec<String>>(payload) {
                Ok(files) => view.update(|v| v.log_files = files),
                Err(e) => tracing::warn!(error = %e, "Unexpected log file list"),
            }
        }));
    }

    /// Startup: load the log pickers, then poll the startup tab.
    pub fn boot(&mut self, startup_tab: Tab) -> PollHandle {
        self.load_log_catalog();
        self.activate_tab(startup_tab)
    }

    pub fn active_tab(&self) -> Option<Tab> {
        self.active_tab
    }

    pub fn log_filter(&self) -> &LogFilterState {
        &self.log_filter
    }

    pub fn log_refresh_enabled(&self) -> bool {
        self.log_refresh
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn view(&self) -> &SharedView {
        &self.view
    }
}

//! Okse admin console: tab-scoped polling engine and operator front end.
//!
//! The [`router::TabRouter`] decides which endpoint backs the visible tab, the
//! [`scheduler::PollScheduler`] keeps exactly one polling timer armed, and the
//! [`transport::Dispatcher`] issues each call and routes its outcome into the
//! [`views::ConsoleView`].

pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod router;
pub mod scheduler;
pub mod transport;
pub mod tui;
pub mod views;

use std::sync::Arc;

pub use commands::Commands;
pub use config::ConsoleConfig;
pub use console::OperatorConsole;
pub use error::ConsoleError;
pub use router::TabRouter;
pub use scheduler::{PollHandle, PollScheduler, MIN_POLL_INTERVAL};
pub use transport::{Dispatcher, HttpTransport, Payload, RequestDefinition, Transport};
pub use tui::{run_dashboard, Dashboard};
pub use views::{ConsoleView, SharedView};

/// Wire up transport, scheduler, router and commands from configuration.
///
/// A missing CSRF credential is logged and leaves commands disabled;
/// polling still works.
pub async fn build_console(config: &ConsoleConfig) -> Result<OperatorConsole, ConsoleError> {
    let credential = match config::resolve_csrf(&config.csrf, config.timeout()).await {
        Ok(credential) => Some(credential),
        Err(e) => {
            tracing::warn!(error = %e, "Commands disabled, continuing with read-only polling");
            None
        }
    };

    let transport = HttpTransport::new(&config.api.base_url, config.timeout(), credential.as_ref())?;
    tracing::info!(base_url = %transport.base_url(), "Admin API transport ready");

    let view = SharedView::new();
    let banner = view.clone();
    let dispatcher = Dispatcher::new(Arc::new(transport)).with_fallback(move |failed| {
        transport::log_failure(failed);
        banner.display_message(failed.error.message());
    });

    let commands = Commands::new(dispatcher.clone(), view.clone(), credential.as_ref()).ok();
    let mut router = TabRouter::new(PollScheduler::new(dispatcher), view);
    router.set_update_interval_secs(config.polling.update_interval_secs);

    Ok(OperatorConsole::new(router, commands))
}

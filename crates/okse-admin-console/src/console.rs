//! Line-oriented operator console.
//!
//! Reads slash commands from stdin, drives the router, and re-renders the
//! active tab whenever the view changes. This is the fallback when stdin or
//! stdout is not a terminal; see [`crate::tui`] for the full-screen one. Diagnostics go to stderr through
//! `tracing`; stdout carries only rendered output.

use okse_admin_protocol::{LogFilterPatch, Tab};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commands::Commands;
use crate::router::TabRouter;
use crate::views::{ButtonTone, ConsoleView};
use crate::ConsoleError;

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Help,
    Tab(Tab),
    Interval(f64),
    Level(String),
    File(usize),
    Length(usize),
    Refresh(bool),
    /// Shutting the servers down needs `confirmed`.
    Power { confirmed: bool },
    DeleteTopic(String),
    DeleteSubscriber(String),
    DeleteAll,
    Encoding,
    Messages,
    Status,
    Quit,
}

/// Parse one input line. A bare tab name switches to that tab.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };

    let require = |what: &'static str| {
        if arg.is_empty() {
            Err(ConsoleError::InvalidArgument { what, value: String::new() })
        } else {
            Ok(arg)
        }
    };
    let number = |what: &'static str| {
        arg.parse::<usize>()
            .map_err(|_| ConsoleError::InvalidArgument { what, value: arg.to_string() })
    };

    let parsed = match command {
        "/help" | "/?" => ConsoleCommand::Help,
        "/tab" => ConsoleCommand::Tab(require("tab")?.parse()?),
        "/interval" => ConsoleCommand::Interval(require("interval")?.parse().map_err(|_| {
            ConsoleError::InvalidArgument { what: "interval", value: arg.to_string() }
        })?),
        "/level" => ConsoleCommand::Level(require("log level")?.to_string()),
        "/file" => ConsoleCommand::File(number("log file index")?),
        "/length" => ConsoleCommand::Length(number("log length")?),
        "/refresh" => match arg {
            "on" | "start" => ConsoleCommand::Refresh(true),
            "off" | "stop" => ConsoleCommand::Refresh(false),
            other => {
                return Err(ConsoleError::InvalidArgument {
                    what: "refresh toggle",
                    value: other.to_string(),
                })
            }
        },
        "/power" => ConsoleCommand::Power { confirmed: arg == "confirm" },
        "/delete-topic" => ConsoleCommand::DeleteTopic(require("topic name")?.to_string()),
        "/delete-subscriber" => {
            ConsoleCommand::DeleteSubscriber(require("subscriber id")?.to_string())
        }
        "/delete-all" => ConsoleCommand::DeleteAll,
        "/encoding" => ConsoleCommand::Encoding,
        "/messages" => ConsoleCommand::Messages,
        "/status" => ConsoleCommand::Status,
        "/quit" | "/exit" => ConsoleCommand::Quit,
        other if !other.starts_with('/') && arg.is_empty() => ConsoleCommand::Tab(other.parse()?),
        other => {
            return Err(ConsoleError::InvalidArgument { what: "command", value: other.to_string() })
        }
    };
    Ok(parsed)
}

pub const HELP: &[&str] = &[
    "Available commands:",
    "  <tab> | /tab <tab>      - Switch to main, topics, statistics, log, config, subscribers",
    "  /interval <secs>        - Set the update interval (applies on next switch)",
    "  /level <LEVEL>          - Filter the log by level",
    "  /file <index>           - Show another log file",
    "  /length <n>             - Number of log lines to fetch",
    "  /refresh on|off         - Start or stop log refresh",
    "  /power [confirm]        - Start or stop the protocol servers",
    "  /delete-topic <name>    - Delete a topic",
    "  /delete-subscriber <id> - Delete a subscriber",
    "  /delete-all             - Delete all topics",
    "  /encoding               - Toggle chunked encoding",
    "  /messages               - Show error messages",
    "  /status                 - Show polling status",
    "  /quit                   - Exit",
];

/// Whether the console keeps running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct OperatorConsole {
    router: TabRouter,
    commands: Option<Commands>,
}

impl OperatorConsole {
    /// `commands` is `None` when no CSRF credential could be loaded.
    pub fn new(router: TabRouter, commands: Option<Commands>) -> Self {
        Self { router, commands }
    }

    pub fn router(&self) -> &TabRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut TabRouter {
        &mut self.router
    }

    /// Execute one command; returns lines to print.
    pub fn execute(&mut self, command: ConsoleCommand) -> (Flow, Vec<String>) {
        let mut out = Vec::new();
        match command {
            ConsoleCommand::Help => out.extend(HELP.iter().map(|l| l.to_string())),
            ConsoleCommand::Tab(tab) => {
                self.router.activate_tab(tab);
            }
            ConsoleCommand::Interval(secs) => {
                let interval = self.router.set_update_interval_secs(secs);
                out.push(format!("Update interval: {} ms", interval.as_millis()));
            }
            ConsoleCommand::Level(level) => {
                self.router.update_log_filter(LogFilterPatch::level(level));
            }
            ConsoleCommand::File(index) => {
                self.router.update_log_filter(LogFilterPatch::file_index(index));
            }
            ConsoleCommand::Length(length) => {
                self.router.update_log_filter(LogFilterPatch::length(length));
            }
            ConsoleCommand::Refresh(true) => {
                self.router.start_log_refresh();
                out.push("Log refresh started".to_string());
            }
            ConsoleCommand::Refresh(false) => {
                self.router.stop_log_refresh();
                out.push("Log refresh stopped".to_string());
            }
            ConsoleCommand::Power { confirmed } => {
                let running = self.router.view().read(|v| v.protocol_power) == Some(true);
                if running && !confirmed {
                    out.push(
                        "Shutting down the protocol servers removes all publishers and subscribers. \
                         Type '/power confirm' to proceed."
                            .to_string(),
                    );
                } else {
                    self.with_commands(&mut out, |c| {
                        c.toggle_protocol_power();
                        Ok(())
                    });
                }
            }
            ConsoleCommand::DeleteTopic(topic) => {
                self.with_commands(&mut out, |c| c.delete_topic(&topic).map(|_| ()))
            }
            ConsoleCommand::DeleteSubscriber(id) => {
                self.with_commands(&mut out, |c| c.delete_subscriber(&id).map(|_| ()))
            }
            ConsoleCommand::DeleteAll => self.with_commands(&mut out, |c| {
                c.delete_all_topics();
                Ok(())
            }),
            ConsoleCommand::Encoding => self.with_commands(&mut out, |c| {
                c.toggle_encoding();
                Ok(())
            }),
            ConsoleCommand::Messages => {
                out = self.router.view().read(|v| {
                    if v.messages.is_empty() {
                        vec!["No messages.".to_string()]
                    } else {
                        v.messages
                            .entries()
                            .map(|m| format!("[{}] Error: {}", m.at.format("%H:%M:%S"), m.text))
                            .collect()
                    }
                });
            }
            ConsoleCommand::Status => out.extend(self.status_lines()),
            ConsoleCommand::Quit => return (Flow::Quit, out),
        }
        (Flow::Continue, out)
    }

    fn with_commands(
        &self,
        out: &mut Vec<String>,
        f: impl FnOnce(&Commands) -> Result<(), ConsoleError>,
    ) {
        match &self.commands {
            Some(commands) => {
                if let Err(e) = f(commands) {
                    out.push(e.to_string());
                }
            }
            None => out.push(commands_disabled()),
        }
    }

    pub fn status_lines(&self) -> Vec<String> {
        let scheduler = self.router.scheduler();
        let mut lines = vec![format!(
            "Active tab: {} | Interval: {} ms | Log refresh: {}",
            self.router.active_tab().map(|t| t.id()).unwrap_or("-"),
            self.router.update_interval().as_millis(),
            if self.router.log_refresh_enabled() { "on" } else { "off" },
        )];
        match scheduler.active_handle() {
            Some(handle) => lines.push(format!(
                "Polling {} every {} ms (timer #{}, generation {})",
                handle.endpoint(),
                handle.period().as_millis(),
                handle.id(),
                handle.generation()
            )),
            None => lines.push("Polling stopped".to_string()),
        }
        lines.push(format!("Log filter: {}", self.router.log_filter().endpoint()));
        if self.commands.is_none() {
            lines.push(commands_disabled());
        }
        lines
    }

    pub fn render_active(&self) -> Vec<String> {
        match self.router.active_tab() {
            Some(tab) => self.router.view().read(|v| render_tab(v, tab)),
            None => Vec::new(),
        }
    }

    /// Read commands from stdin until `/quit` or end of input.
    pub async fn run(mut self) -> Result<(), ConsoleError> {
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut revisions = self.router.view().subscribe();

        write_lines(&mut stdout, &["Okse admin console ready. Type /help for commands.".to_string()]).await;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to read operator input");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let (flow, out) = match parse_command(&line) {
                        Ok(command) => self.execute(command),
                        Err(e) => (Flow::Continue, vec![e.to_string()]),
                    };
                    write_lines(&mut stdout, &out).await;
                    if flow == Flow::Quit {
                        break;
                    }
                }
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    revisions.borrow_and_update();
                    write_lines(&mut stdout, &self.render_active()).await;
                }
            }
        }

        self.router.scheduler().stop();
        Ok(())
    }
}

fn commands_disabled() -> String {
    "Commands are disabled: no CSRF credential was loaded.".to_string()
}

async fn write_lines<W: AsyncWrite + Unpin>(out: &mut W, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let mut buf = String::new();
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }
    if let Err(e) = out.write_all(buf.as_bytes()).await {
        tracing::warn!(error = %e, "Failed to write console output");
        return;
    }
    if let Err(e) = out.flush().await {
        tracing::warn!(error = %e, "Failed to flush console output");
    }
}

/// Text rendering of one tab.
pub fn render_tab(view: &ConsoleView, tab: Tab) -> Vec<String> {
    let mut out = vec![format!("== {} ==", tab.id())];
    match tab {
        Tab::Main => match &view.overview {
            Some(status) => {
                out.push(format!(
                    "Subscribers: {} | Publishers: {} | Topics: {} | Messages: {}",
                    status.subscribers, status.publishers, status.topics, status.total_messages
                ));
                out.push(format!("Uptime: {}", status.uptime));
                let rt = &status.runtime_statistics;
                out.push(format!(
                    "RAM total {} / free {} / used {} | CPU cores {}",
                    rt.total_ram, rt.free_ram, rt.used_ram, rt.cpu_available
                ));
                if status.protocols.is_empty() {
                    out.push("No protocols returned from CoreService".to_string());
                } else {
                    for p in &status.protocols {
                        out.push(format!("  {:<10} {}:{}", p.protocol_type, p.host, p.port));
                    }
                }
                if let Some(button) = view.power_button() {
                    let marker = match button.tone {
                        ButtonTone::Success => "+",
                        ButtonTone::Danger => "!",
                    };
                    out.push(format!("[{marker} {}] /power", button.label));
                }
            }
            None => out.push("Waiting for data...".to_string()),
        },
        Tab::Topics => {
            let mut any = false;
            for (_, panel) in view.topic_panels() {
                any = true;
                out.push(format!("{} ({} subscribers)", panel.title, panel.subscribers.len()));
                for (i, s) in panel.subscribers.iter().enumerate() {
                    let id = s.id.clone().unwrap_or_else(|| i.to_string());
                    out.push(format!("  [{id}] {:<8} {}:{}", s.protocol, s.ip, s.port));
                }
            }
            if !any {
                out.push("No topics.".to_string());
            }
        }
        Tab::Log => match &view.log {
            Some(tail) => {
                out.push(format!("Log: {}", tail.name));
                if !view.log_levels.is_empty() {
                    out.push(format!("Levels: {}", view.log_levels.join(" ")));
                }
                if !view.log_files.is_empty() {
                    let files: Vec<String> = view
                        .log_files
                        .iter()
                        .enumerate()
                        .map(|(i, f)| format!("{i}:{f}"))
                        .collect();
                    out.push(format!("Files: {}", files.join(" ")));
                }
                out.extend(tail.lines.iter().cloned());
            }
            None => out.push("Waiting for data...".to_string()),
        },
        Tab::Statistics => out.extend(render_document(view.statistics.as_ref())),
        Tab::Config => out.extend(render_document(view.config.as_ref())),
        Tab::Subscribers => out.extend(render_document(view.subscribers.as_ref())),
    }
    out
}

pub(crate) fn render_document(doc: Option<&serde_json::Value>) -> Vec<String> {
    match doc {
        Some(doc) => serde_json::to_string_pretty(doc)
            .unwrap_or_else(|_| doc.to_string())
            .lines()
            .map(str::to_string)
            .collect(),
        None => vec!["Waiting for data...".to_string()],
    }
}

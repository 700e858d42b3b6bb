//! Full-screen operator dashboard.
//!
//! A tab header, the active tab's panels, the error message board, command
//! output, and an input line. Commands are the same slash commands the line
//! console accepts. Used when stdin and stdout are both terminals.

use std::io::{self, IsTerminal, Stdout};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use okse_admin_protocol::Tab;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs},
    Frame, Terminal,
};

use crate::console::{parse_command, render_document, ConsoleCommand, Flow, OperatorConsole};
use crate::views::{ButtonTone, ConsoleView, PowerButton};
use crate::ConsoleError;

const MAX_OUTPUT: usize = 500;

/// Whether both ends of the session are terminals.
pub fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

pub fn tone_color(tone: ButtonTone) -> Color {
    match tone {
        ButtonTone::Success => Color::Green,
        ButtonTone::Danger => Color::Red,
    }
}

/// The protocol power button as a filled, bordered block.
pub fn power_button(button: &PowerButton) -> Paragraph<'static> {
    let color = tone_color(button.tone);
    Paragraph::new(Line::from(format!("{}  (/power)", button.label)))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::White).bg(color).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
}

pub struct Dashboard {
    console: OperatorConsole,
    input: String,
    /// Cursor position in chars, not bytes.
    cursor_pos: usize,
    history: Vec<String>,
    history_pos: Option<usize>,
    body_scroll: u16,
    output: Vec<(DateTime<Utc>, String, Color)>,
}

impl Dashboard {
    pub fn new(console: OperatorConsole) -> Self {
        let mut dashboard = Self {
            console,
            input: String::new(),
            cursor_pos: 0,
            history: Vec::new(),
            history_pos: None,
            body_scroll: 0,
            output: Vec::new(),
        };
        dashboard.add_output("Okse admin console ready. Type /help for commands.", Color::Cyan);
        dashboard.add_output("Tab / Shift+Tab switch tabs, PgUp/PgDn scroll.", Color::DarkGray);
        dashboard
    }

    pub fn console(&self) -> &OperatorConsole {
        &self.console
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> impl Iterator<Item = &str> {
        self.output.iter().map(|(_, line, _)| line.as_str())
    }

    fn add_output(&mut self, line: impl Into<String>, color: Color) {
        self.output.push((Utc::now(), line.into(), color));
        if self.output.len() > MAX_OUTPUT {
            self.output.remove(0);
        }
    }

    pub fn render(&self, frame: &mut Frame) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(8),
                Constraint::Length(5),
            ])
            .split(frame.area());

        let active = self.console.router().active_tab();
        self.render_tabs(frame, outer[0], active);
        self.console.router().view().read(|view| {
            self.render_body(frame, outer[1], active, view);
            let bottom = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(outer[2]);
            render_messages(frame, bottom[0], view);
            self.render_output(frame, bottom[1]);
        });
        self.render_input(frame, outer[3]);
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect, active: Option<Tab>) {
        let titles: Vec<Line> = Tab::ALL.iter().map(|tab| Line::from(tab.id())).collect();
        let mut tabs = Tabs::new(titles)
            .block(
                Block::default()
                    .title(" Okse Admin ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .style(Style::default().fg(Color::Gray))
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        if let Some(index) = active.and_then(|tab| Tab::ALL.iter().position(|t| *t == tab)) {
            tabs = tabs.select(index);
        }
        frame.render_widget(tabs, area);
    }

    fn render_body(&self, frame: &mut Frame, area: Rect, active: Option<Tab>, view: &ConsoleView) {
        match active {
            Some(Tab::Main) => render_main(frame, area, view),
            Some(Tab::Topics) => render_topics(frame, area, view),
            Some(Tab::Log) => self.render_log(frame, area, view),
            Some(tab @ (Tab::Statistics | Tab::Config | Tab::Subscribers)) => {
                let document = match tab {
                    Tab::Statistics => view.statistics.as_ref(),
                    Tab::Config => view.config.as_ref(),
                    _ => view.subscribers.as_ref(),
                };
                let lines: Vec<Line> = render_document(document).into_iter().map(Line::from).collect();
                let block = Block::default()
                    .title(format!(" {} ", tab.id()))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::White));
                frame.render_widget(
                    Paragraph::new(lines).block(block).scroll((self.body_scroll, 0)),
                    area,
                );
            }
            None => {
                let block = Block::default().borders(Borders::ALL);
                frame.render_widget(
                    Paragraph::new(Line::from(Span::styled(
                        "  No tab selected.",
                        Style::default().fg(Color::DarkGray),
                    )))
                    .block(block),
                    area,
                );
            }
        }
    }

    fn render_log(&self, frame: &mut Frame, area: Rect, view: &ConsoleView) {
        let router = self.console.router();
        let filter = router.log_filter();
        let title = format!(
            " Log {} | level {} | file {} | {} lines | refresh {} ",
            view.log.as_ref().map(|l| l.name.as_str()).unwrap_or("-"),
            filter.level,
            filter.file_index,
            filter.length,
            if router.log_refresh_enabled() { "on" } else { "off" },
        );
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::LightBlue));

        let mut lines: Vec<Line> = Vec::new();
        if !view.log_levels.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("Levels: {}", view.log_levels.join(" ")),
                Style::default().fg(Color::DarkGray),
            )));
        }
        match &view.log {
            Some(tail) => lines.extend(tail.lines.iter().map(|l| Line::from(l.as_str()))),
            None => lines.push(Line::from(Span::styled(
                "Waiting for data...",
                Style::default().fg(Color::DarkGray),
            ))),
        }
        frame.render_widget(Paragraph::new(lines).block(block).scroll((self.body_scroll, 0)), area);
    }

    fn render_output(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Console Output ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let inner_height = area.height.saturating_sub(2) as usize;
        let start = self.output.len().saturating_sub(inner_height);
        let lines: Vec<Line> = self.output[start..]
            .iter()
            .map(|(ts, msg, color)| {
                Line::from(vec![
                    Span::styled(
                        format!(" [{}] ", ts.format("%H:%M:%S")),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(msg.as_str(), Style::default().fg(*color)),
                ])
            })
            .collect();
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_input(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Command (/help) ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green));

        let input_line = if self.input.is_empty() {
            Line::from(vec![
                Span::styled("  > ", Style::default().fg(Color::Green)),
                Span::styled("tab name or /command...", Style::default().fg(Color::DarkGray)),
            ])
        } else {
            Line::from(vec![
                Span::styled("  > ", Style::default().fg(Color::Green)),
                Span::styled(self.input.as_str(), Style::default().fg(Color::White)),
            ])
        };
        let hint = Line::from(Span::styled(
            "  Ctrl+C or /quit to exit  |  Up/Down for history  |  Enter to submit",
            Style::default().fg(Color::DarkGray),
        ));
        frame.render_widget(Paragraph::new(vec![Line::from(""), input_line, hint]).block(block), area);

        let cursor_x = area.x + 4 + self.cursor_pos as u16;
        frame.set_cursor_position((cursor_x, area.y + 2));
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn input_len(&self) -> usize {
        self.input.chars().count()
    }

    fn cycle_tab(&mut self, forward: bool) {
        let current = self
            .console
            .router()
            .active_tab()
            .and_then(|tab| Tab::ALL.iter().position(|t| *t == tab));
        let count = Tab::ALL.len();
        let next = match (current, forward) {
            (None, _) => 0,
            (Some(i), true) => (i + 1) % count,
            (Some(i), false) => (i + count - 1) % count,
        };
        self.body_scroll = 0;
        self.console.router_mut().activate_tab(Tab::ALL[next]);
    }

    /// Run the current input line as a command.
    pub fn submit(&mut self) -> Flow {
        let line = std::mem::take(&mut self.input);
        self.cursor_pos = 0;
        self.history_pos = None;
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        self.history.push(line.to_string());
        self.add_output(format!("> {line}"), Color::Green);

        let (flow, out) = match parse_command(line) {
            Ok(command) => {
                if matches!(command, ConsoleCommand::Tab(_)) {
                    self.body_scroll = 0;
                }
                self.console.execute(command)
            }
            Err(e) => {
                self.add_output(e.to_string(), Color::Red);
                return Flow::Continue;
            }
        };
        for line in out {
            self.add_output(line, Color::White);
        }
        flow
    }

    /// Handle one key press. Returns `true` if the dashboard should exit.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        match (code, modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => return true,
            (KeyCode::Char(c), _) => {
                let at = self.byte_index();
                self.input.insert(at, c);
                self.cursor_pos += 1;
            }
            (KeyCode::Backspace, _) => {
                if self.cursor_pos > 0 {
                    self.cursor_pos -= 1;
                    let at = self.byte_index();
                    self.input.remove(at);
                }
            }
            (KeyCode::Delete, _) => {
                if self.cursor_pos < self.input_len() {
                    let at = self.byte_index();
                    self.input.remove(at);
                }
            }
            (KeyCode::Left, _) => {
                self.cursor_pos = self.cursor_pos.saturating_sub(1);
            }
            (KeyCode::Right, _) => {
                if self.cursor_pos < self.input_len() {
                    self.cursor_pos += 1;
                }
            }
            (KeyCode::Home, _) => self.cursor_pos = 0,
            (KeyCode::End, _) => self.cursor_pos = self.input_len(),
            (KeyCode::Up, _) => {
                if !self.history.is_empty() {
                    let pos = match self.history_pos {
                        Some(p) if p > 0 => p - 1,
                        Some(p) => p,
                        None => self.history.len() - 1,
                    };
                    self.history_pos = Some(pos);
                    self.input = self.history[pos].clone();
                    self.cursor_pos = self.input_len();
                }
            }
            (KeyCode::Down, _) => {
                if let Some(pos) = self.history_pos {
                    if pos + 1 < self.history.len() {
                        self.history_pos = Some(pos + 1);
                        self.input = self.history[pos + 1].clone();
                        self.cursor_pos = self.input_len();
                    } else {
                        self.history_pos = None;
                        self.input.clear();
                        self.cursor_pos = 0;
                    }
                }
            }
            (KeyCode::Tab, _) => self.cycle_tab(true),
            (KeyCode::BackTab, _) => self.cycle_tab(false),
            (KeyCode::PageUp, _) => self.body_scroll = self.body_scroll.saturating_sub(5),
            (KeyCode::PageDown, _) => self.body_scroll = self.body_scroll.saturating_add(5),
            (KeyCode::Enter, _) => return self.submit() == Flow::Quit,
            _ => {}
        }
        false
    }

    async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), ConsoleError> {
        let tick_rate = Duration::from_millis(100);
        loop {
            terminal.draw(|frame| self.render(frame))?;

            // Never block the runtime thread; polling tasks share it.
            while event::poll(Duration::ZERO)? {
                if let Event::Key(key_event) = event::read()? {
                    if key_event.kind == KeyEventKind::Press
                        && self.handle_key(key_event.code, key_event.modifiers)
                    {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(tick_rate).await;
        }
    }
}

fn render_main(frame: &mut Frame, area: Rect, view: &ConsoleView) {
    let Some(status) = &view.overview else {
        let block = Block::default().title(" main ").borders(Borders::ALL);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                "  Waiting for data...",
                Style::default().fg(Color::DarkGray),
            )))
            .block(block),
            area,
        );
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let rt = &status.runtime_statistics;
    let totals = vec![
        Line::from(vec![
            Span::styled("  Subscribers: ", Style::default().fg(Color::Gray)),
            Span::styled(status.subscribers.to_string(), Style::default().fg(Color::Green)),
            Span::styled("  |  Publishers: ", Style::default().fg(Color::Gray)),
            Span::styled(status.publishers.to_string(), Style::default().fg(Color::Green)),
            Span::styled("  |  Topics: ", Style::default().fg(Color::Gray)),
            Span::styled(status.topics.to_string(), Style::default().fg(Color::Cyan)),
            Span::styled("  |  Messages: ", Style::default().fg(Color::Gray)),
            Span::styled(status.total_messages.to_string(), Style::default().fg(Color::Magenta)),
        ]),
        Line::from(vec![
            Span::styled("  Uptime: ", Style::default().fg(Color::Gray)),
            Span::styled(status.uptime.as_str(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("  RAM: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("total {} / free {} / used {}", rt.total_ram, rt.free_ram, rt.used_ram),
                Style::default().fg(Color::White),
            ),
            Span::styled("  |  CPU cores: ", Style::default().fg(Color::Gray)),
            Span::styled(rt.cpu_available.to_string(), Style::default().fg(Color::White)),
        ]),
    ];
    let block = Block::default()
        .title(" Overview ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(Paragraph::new(totals).block(block), rows[0]);

    let block = Block::default()
        .title(format!(" Protocols ({}) ", status.protocols.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));
    if status.protocols.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                "  No protocols returned from CoreService",
                Style::default().fg(Color::DarkGray),
            )))
            .block(block),
            rows[1],
        );
    } else {
        let table_rows: Vec<Row> = status
            .protocols
            .iter()
            .map(|p| {
                Row::new(vec![
                    Cell::from(Span::styled(format!("  {}", p.protocol_type), Style::default().fg(Color::Cyan))),
                    Cell::from(p.host.clone()),
                    Cell::from(p.port.to_string()),
                ])
            })
            .collect();
        let table = Table::new(
            table_rows,
            [Constraint::Percentage(30), Constraint::Percentage(50), Constraint::Percentage(20)],
        )
        .block(block)
        .header(
            Row::new(vec!["  Type", "Host", "Port"])
                .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
        );
        frame.render_widget(table, rows[1]);
    }

    if let Some(button) = view.power_button() {
        frame.render_widget(power_button(&button), rows[2]);
    }
}

fn render_topics(frame: &mut Frame, area: Rect, view: &ConsoleView) {
    let block = Block::default()
        .title(format!(" Topics ({}) ", view.topic_panels().count()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let mut rows: Vec<Row> = Vec::new();
    for (_, panel) in view.topic_panels() {
        if panel.subscribers.is_empty() {
            rows.push(Row::new(vec![
                Cell::from(Span::styled(format!("  {}", panel.title), Style::default().fg(Color::Yellow))),
                Cell::from("-"),
                Cell::from(Span::styled("no subscribers", Style::default().fg(Color::DarkGray))),
                Cell::from(""),
            ]));
            continue;
        }
        for (i, s) in panel.subscribers.iter().enumerate() {
            let id = s.id.clone().unwrap_or_else(|| i.to_string());
            rows.push(Row::new(vec![
                Cell::from(Span::styled(format!("  {}", panel.title), Style::default().fg(Color::Yellow))),
                Cell::from(id),
                Cell::from(s.protocol.clone()),
                Cell::from(format!("{}:{}", s.ip, s.port)),
            ]));
        }
    }

    if rows.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled("  No topics.", Style::default().fg(Color::DarkGray))))
                .block(block),
            area,
        );
        return;
    }

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(30),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(30),
        ],
    )
    .block(block)
    .header(
        Row::new(vec!["  Topic", "Id", "Protocol", "Address"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
    );
    frame.render_widget(table, area);
}

fn render_messages(frame: &mut Frame, area: Rect, view: &ConsoleView) {
    let block = Block::default()
        .title(format!(" Messages ({}) ", view.messages.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let inner_height = area.height.saturating_sub(2) as usize;
    let skip = view.messages.len().saturating_sub(inner_height);
    let lines: Vec<Line> = view
        .messages
        .entries()
        .skip(skip)
        .map(|m| {
            Line::from(vec![
                Span::styled(format!(" [{}] ", m.at.format("%H:%M:%S")), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("Error: {}", m.text), Style::default().fg(Color::Red)),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the dashboard until `/quit` or Ctrl+C, then stop polling.
pub async fn run_dashboard(console: OperatorConsole) -> Result<(), ConsoleError> {
    if !is_interactive() {
        return Err(ConsoleError::Terminal(io::Error::other(
            "the dashboard requires a terminal (TTY)",
        )));
    }

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;
    let mut dashboard = Dashboard::new(console);
    let result = dashboard.event_loop(&mut terminal).await;

    dashboard.console.router().scheduler().stop();
    restore_terminal(&mut terminal)?;
    result
}

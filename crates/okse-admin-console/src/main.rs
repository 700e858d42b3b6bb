use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use okse_admin_console::console::render_tab;
use okse_admin_console::{build_console, run_dashboard, tui, ConsoleConfig};
use okse_admin_protocol::{HttpMethod, Tab};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "okse-console", about = "Operator console for the Okse broker admin API")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Admin API base URL, e.g. http://localhost:8083/api/
    #[arg(long)]
    base_url: Option<String>,

    /// Update interval in seconds (minimum 0.5).
    #[arg(long)]
    interval: Option<f64>,

    /// Tab to show on startup.
    #[arg(long)]
    tab: Option<String>,

    #[arg(long, requires = "csrf_token")]
    csrf_header: Option<String>,

    #[arg(long, requires = "csrf_header")]
    csrf_token: Option<String>,

    /// Admin page whose CSRF meta tags should be read at startup.
    #[arg(long)]
    page_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the active tab and accept operator commands (default).
    Watch,
    /// Fetch one tab once, print it, and exit.
    Fetch { tab: String },
}

impl Cli {
    fn apply(&self, config: &mut ConsoleConfig) {
        if let Some(url) = &self.base_url {
            config.api.base_url = url.clone();
        }
        if let Some(secs) = self.interval {
            config.polling.update_interval_secs = secs;
        }
        if let Some(tab) = &self.tab {
            config.polling.startup_tab = tab.clone();
        }
        if let Some(header) = &self.csrf_header {
            config.csrf.header_name = Some(header.clone());
        }
        if let Some(token) = &self.csrf_token {
            config.csrf.token = Some(token.clone());
        }
        if let Some(page) = &self.page_url {
            config.csrf.page_url = Some(page.clone());
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ConsoleConfig::load(cli.config.as_deref())?;
    config.apply_env();
    cli.apply(&mut config);

    let watching = matches!(cli.command, None | Some(Command::Watch));
    let dashboard = watching && tui::is_interactive();

    // Log lines written to the terminal would tear through the dashboard;
    // redirect stderr to keep them.
    let writer = if dashboard && std::io::stderr().is_terminal() {
        BoxMakeWriter::new(std::io::sink)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();

    let mut console = build_console(&config).await?;

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => {
            let startup_tab = config
                .startup_tab()
                .context("invalid polling.startup_tab")?;
            console.router_mut().boot(startup_tab);
            if dashboard {
                run_dashboard(console).await?;
            } else {
                console.run().await?;
            }
        }
        Command::Fetch { tab } => {
            let tab: Tab = tab.parse()?;
            let router = console.router();
            let def = router.definition_for(tab);
            let payload = router
                .scheduler()
                .dispatcher()
                .fetch(HttpMethod::Get, def.endpoint())
                .await
                .with_context(|| format!("fetching {}", def.endpoint()))?;
            router.view().apply(tab, payload);
            for line in router.view().read(|v| render_tab(v, tab)) {
                println!("{line}");
            }
        }
    }

    Ok(())
}

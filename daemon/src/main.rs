mod cli;
mod config;
mod dispatch;
mod event;
mod listener;
mod matcher;
mod paths;
mod pidfile;
mod rules;
mod source;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::listener::Listener;
use crate::matcher::EventMatcher;
use crate::pidfile::PidFile;
use crate::rules::RuleTables;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = cli::Args::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let settings = config::load_or_default(&args.settings_path()).map(|mut s| {
        args.apply(&mut s);
        s
    });
    init_logging(settings.as_ref().map_or(args.debug, |s| s.debug));

    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(settings).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<()> {
    // ── Rule tables ───────────────────────────────────────────────────────────
    let rules = RuleTables::load(&settings.action_file, &settings.map_file)?;

    // ── Handlers ──────────────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(&settings.conf_dir, settings.run_parts.clone())
        .with_context(|| format!("Cannot use handler directory {}", settings.conf_dir.display()))?;
    dispatch::ignore_child_exits().context("Failed to ignore SIGCHLD")?;

    // ── Event sources ─────────────────────────────────────────────────────────
    let sources = match &settings.event_file {
        Some(path) => source::open_text(path)?,
        None => source::probe(&settings.input_prefix)?,
    };
    let mut listener = Listener::start(sources)?;
    listener.shutdown_on_signals()?;

    let pid_file = PidFile::create(&settings.pid_file);

    info!(
        root = %dispatcher.root().display(),
        "acpid v{} started",
        env!("CARGO_PKG_VERSION")
    );

    // ── Event loop ────────────────────────────────────────────────────────────
    let matcher = EventMatcher::new(&rules);
    let dispatched = listener
        .run(&matcher, |action| {
            dispatcher.dispatch(action);
        })
        .await;

    info!(dispatched, "stopped");
    if let Some(pid_file) = pid_file {
        pid_file.remove();
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise `debug` with -d and `info` without.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

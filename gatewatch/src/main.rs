//! gatewatch - live activity monitor for a conversational agent gateway
//!
//! Commands:
//! - `watch`: follow the gateway socket and session poll, print activity as it happens
//! - `replay`: feed a JSONL file of recorded frames through the same pipeline
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/gatewatch/config.toml (~/.config/gatewatch/config.toml)
//! - Logs: $XDG_STATE_HOME/gatewatch/ (~/.local/state/gatewatch/)

use std::collections::HashMap;
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gatewatch_core::format::{action_line, session_line};
use gatewatch_core::runtime::{
    apply_event, spawn_ingest, GatewayClient, IngestEvent, SessionPoller, StoreSnapshot,
};
use gatewatch_core::{ActionType, ActivityStore, Config, GraphFilter, SessionStatus};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "gatewatch")]
#[command(about = "Watch an agent gateway's sessions and actions live")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/gatewatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to the state directory
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the gateway and print activity as it arrives
    Watch {
        /// Only show this session and its actions
        #[arg(short, long)]
        session: Option<String>,

        /// Print the projected graph as one JSON object per change
        #[arg(long)]
        json: bool,
    },

    /// Replay recorded frames (one JSON frame per line)
    Replay {
        /// JSONL file of frames
        file: PathBuf,

        /// Only show this session and its actions
        #[arg(short, long)]
        session: Option<String>,

        /// Print the projected graph as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    // A long-running watch always logs; one-shot commands only when asked.
    let _log_guard = if args.verbose || matches!(args.command, Command::Watch { .. }) {
        Some(
            gatewatch_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Watch { session, json } => cmd_watch(&config, session, json),
        Command::Replay {
            file,
            session,
            json,
        } => cmd_replay(&config, &file, session, json),
    }
}

fn graph_filter(config: &Config, session: Option<String>) -> GraphFilter {
    GraphFilter {
        selected_session: session,
        recent_actions: Some(config.graph.recent_actions),
    }
}

// ============================================
// replay
// ============================================

/// Counts from feeding a frame file through the pipeline.
#[derive(Debug, Default)]
struct ReplayStats {
    frames: usize,
    dropped: usize,
}

fn replay_file(path: &Path, store: &mut ActivityStore) -> Result<ReplayStats> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open frame file {}", path.display()))?;
    let mut stats = ReplayStats::default();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        stats.frames += 1;

        let frame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(line = idx + 1, error = %e, "Skipping malformed frame line");
                stats.dropped += 1;
                continue;
            }
        };

        if apply_event(store, IngestEvent::Frame(frame)).dropped {
            stats.dropped += 1;
        }
    }

    Ok(stats)
}

fn cmd_replay(config: &Config, file: &Path, session: Option<String>, json: bool) -> Result<()> {
    let mut store = ActivityStore::new();
    let stats = replay_file(file, &mut store)?;
    tracing::info!(frames = stats.frames, dropped = stats.dropped, "Replay complete");

    let filter = graph_filter(config, session);
    let graph = gatewatch_core::project(store.sessions(), store.actions(), &filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "Replayed {} frames ({} dropped)",
        stats.frames, stats.dropped
    );
    println!();

    println!("Sessions ({})", store.session_count());
    for s in store.sessions() {
        println!("  {}", session_line(s, now));
    }
    println!();

    println!("Actions ({})", store.action_count());
    for a in store.actions() {
        println!("  {}", action_line(a));
    }
    println!();

    println!(
        "Graph: {} nodes, {} edges",
        graph.nodes.len(),
        graph.edges.len()
    );

    Ok(())
}

// ============================================
// watch
// ============================================

/// Remembers what was last printed so only changes are shown.
#[derive(Default)]
struct ChangePrinter {
    actions: HashMap<String, (ActionType, usize, Option<String>)>,
    sessions: HashMap<String, SessionStatus>,
}

impl ChangePrinter {
    fn print(&mut self, snapshot: &StoreSnapshot, selected: Option<&str>) {
        if snapshot.actions.is_empty() && !self.actions.is_empty() {
            println!("-- gateway disconnected, timeline cleared --");
            self.actions.clear();
            self.sessions.clear();
        }

        let now = Utc::now();
        for session in &snapshot.sessions {
            if selected.is_some_and(|key| key != session.key) {
                continue;
            }
            if self.sessions.get(&session.key) != Some(&session.status) {
                self.sessions.insert(session.key.clone(), session.status);
                println!("session {}", session_line(session, now));
            }
        }

        for action in &snapshot.actions {
            if selected.is_some_and(|key| action.session_key.as_deref() != Some(key)) {
                continue;
            }
            let fingerprint = (
                action.action_type,
                action.content.as_ref().map_or(0, String::len),
                action.session_key.clone(),
            );
            if self.actions.get(&action.id) != Some(&fingerprint) {
                self.actions.insert(action.id.clone(), fingerprint);
                println!("{}", action_line(action));
            }
        }
    }
}

/// Hand every published snapshot to `on_snapshot` until `shutdown` resolves
/// or the ingest actor goes away. Returns how many snapshots were handled.
async fn follow_snapshots<S, F>(
    snapshots: &mut watch::Receiver<Arc<StoreSnapshot>>,
    shutdown: S,
    mut on_snapshot: F,
) -> Result<usize>
where
    S: Future,
    F: FnMut(&StoreSnapshot) -> Result<()>,
{
    tokio::pin!(shutdown);
    let mut handled = 0;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    tracing::info!("Ingest stopped");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                on_snapshot(&snapshot)?;
                handled += 1;
            }
            _ = &mut shutdown => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    Ok(handled)
}

fn cmd_watch(config: &Config, session: Option<String>, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(watch(config, session, json))
}

async fn watch(config: &Config, session: Option<String>, json: bool) -> Result<()> {
    let gateway = GatewayClient::new(&config.gateway).context("invalid gateway configuration")?;
    let poller = SessionPoller::new(&config.gateway).context("failed to create session poller")?;

    let handle = spawn_ingest(1024);
    let mut snapshots = handle.snapshots.clone();

    let gateway_task = tokio::spawn(gateway.run(handle.events.clone()));
    let poller_task = tokio::spawn(poller.run(handle.events.clone()));
    drop(handle.events);

    tracing::info!(
        ws_url = %config.gateway.ws_url,
        sessions_url = %config.gateway.sessions_url(),
        "Watching gateway"
    );
    eprintln!("Watching {} (Ctrl-C to quit)", config.gateway.ws_url);
    eprintln!("Logging to {}", Config::log_path().display());

    let filter = graph_filter(config, session.clone());
    let mut printer = ChangePrinter::default();

    follow_snapshots(&mut snapshots, tokio::signal::ctrl_c(), |snapshot| {
        if json {
            println!("{}", serde_json::to_string(&snapshot.graph(&filter))?);
        } else {
            printer.print(snapshot, session.as_deref());
        }
        Ok(())
    })
    .await?;

    gateway_task.abort();
    poller_task.abort();
    let store = handle.task.await.context("ingest task failed")?;
    tracing::info!(
        sessions = store.session_count(),
        actions = store.action_count(),
        "gatewatch shutting down"
    );

    Ok(())
}

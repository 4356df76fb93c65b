use super::action::Command;
use super::geometry::grid_area;
use super::handler::{self, Flow};
use super::multiplexer::{Multiplexer, MuxEvent};
use crate::config::{AppConfig, KeybindingConfig};
use crate::persistence::{self, JsonFileStore, KvStore, MemoryStore};
use crate::tui;
use crate::tui::event::EventHandler;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const FRAME_INTERVAL: Duration = Duration::from_millis(50);
/// Mux events handled before input and the frame timer get another look.
const MAX_EVENTS_PER_PASS: usize = 256;

/// What the grid shows first.
#[derive(Debug, Clone)]
pub enum Launch {
    Open {
        path: PathBuf,
        name: Option<String>,
        panes: Option<usize>,
        layout: Option<String>,
        command: Option<String>,
    },
    /// Reopen the most recent snapshot.
    Resume,
    Empty,
}

fn open_store() -> Arc<dyn KvStore> {
    match JsonFileStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "no data directory, state will not be saved");
            Arc::new(MemoryStore::new())
        }
    }
}

/// The first command for `launch`, or `None` for an empty tab.
fn initial_command(launch: Launch, store: &dyn KvStore) -> Option<Command> {
    match launch {
        Launch::Open {
            path,
            name,
            panes,
            layout,
            command,
        } => Some(Command::OpenProject {
            path,
            workspace_name: name,
            panes,
            layout,
            startup_command: command,
        }),
        Launch::Resume => match persistence::load_last_session(store) {
            Some(snapshot) => Some(Command::Restore(snapshot)),
            None => {
                tracing::info!("no saved session to resume");
                None
            }
        },
        Launch::Empty => None,
    }
}

pub async fn run_tui(config: AppConfig, keys: KeybindingConfig, launch: Launch) -> Result<()> {
    let store = open_store();
    let (mut mux, mut mux_events) = Multiplexer::new(config, store.clone());

    let mut terminal = tui::init()?;
    let size = terminal.size()?;
    mux.set_area(grid_area(size.width, size.height));

    if let Some(command) = initial_command(launch, store.as_ref()) {
        if let Err(e) = mux.apply(command) {
            tracing::error!(error = %e, "could not open the requested workspace");
        }
    }

    let result = run_main_loop(&mut terminal, &mut mux, &mut mux_events, &keys).await;

    mux.shutdown();
    tui::restore()?;

    result
}

async fn run_main_loop(
    terminal: &mut tui::Terminal,
    mux: &mut Multiplexer,
    mux_events: &mut mpsc::Receiver<MuxEvent>,
    keys: &KeybindingConfig,
) -> Result<()> {
    let mut events = EventHandler::new();
    let launch_dir = handler::launch_dir();
    let mut frame = tokio::time::interval(FRAME_INTERVAL);
    frame.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            event = events.next() => {
                let Some(event) = event else {
                    tracing::warn!("terminal event stream ended");
                    break;
                };
                if handler::handle_event(mux, keys, &launch_dir, event, Instant::now()) == Flow::Quit {
                    break;
                }
            }
            _ = frame.tick() => {
                for change in mux.tick(Instant::now()) {
                    tracing::debug!(pane = %change.pane_id, working = change.working, "busy state changed");
                }
                terminal.draw(|f| tui::ui::draw(f, mux, keys))?;
            }
            Some(event) = mux_events.recv() => {
                mux.handle_event(event, Instant::now());
                // A burst costs one pass, but never more than one batch.
                drain_ready(mux_events, MAX_EVENTS_PER_PASS - 1, |event| {
                    mux.handle_event(event, Instant::now())
                });
            }
        }
    }

    Ok(())
}

/// Hand up to `limit` already queued items to `handle` without waiting. Returns how many were taken.
fn drain_ready<T>(rx: &mut mpsc::Receiver<T>, limit: usize, mut handle: impl FnMut(T)) -> usize {
    let mut taken = 0;
    while taken < limit {
        let Ok(item) = rx.try_recv() else {
            break;
        };
        handle(item);
        taken += 1;
    }
    taken
}

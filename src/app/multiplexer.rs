use super::action::{Command, Effect};
use super::geometry::{grid_cells, inner_size};
use super::workspace::Workspace;
use crate::bus::{BusEvent, EventBus};
use crate::busy::{BusyChange, BusyClassifier, BusyRules, RecheckScheduler, VisibleLines};
use crate::config::AppConfig;
use crate::models::LayoutError;
use crate::persistence::{self, KvStore};
use crate::pty::{CreateError, CreateRequest, CreationQueue, PtyManager, RetryPolicy};
use ratatui::layout::Rect;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SCROLLBACK_LINES: usize = 1000;

/// Capacity of the runtime's event channel. A full channel parks the
/// forwarders, and the bus then drops the oldest chunks of a flooding session.
pub(crate) const MUX_QUEUE_SIZE: usize = 256;

/// Everything the runtime loop reacts to besides terminal input.
#[derive(Debug)]
pub enum MuxEvent {
    Output {
        session_id: String,
        data: String,
    },
    Closed {
        session_id: String,
        exit_code: Option<i32>,
    },
    Created {
        pane_id: String,
        session_id: String,
        result: Result<(), CreateError>,
    },
    StartupDue {
        pane_id: String,
        session_id: String,
    },
}

/// Emulator screen and busy state behind one pane.
struct PaneScreen {
    pane_id: String,
    parser: vt100::Parser,
    classifier: BusyClassifier,
    /// Last busy state handed out as a `BusyChange`.
    reported: bool,
    forwarder: JoinHandle<()>,
}

/// Wires the workspace to sessions: executes effects, routes output into
/// screens and keeps the busy indicators current.
pub struct Multiplexer {
    workspace: Workspace,
    config: AppConfig,
    manager: Arc<PtyManager>,
    queue: CreationQueue,
    queue_task: JoinHandle<()>,
    store: Arc<dyn KvStore>,
    rules: BusyRules,
    scheduler: RecheckScheduler<String>,
    screens: HashMap<String, PaneScreen>,
    events: mpsc::Sender<MuxEvent>,
    area: Rect,
}

impl Multiplexer {
    /// Must be called inside a tokio runtime. The receiver feeds `handle_event`.
    pub fn new(config: AppConfig, store: Arc<dyn KvStore>) -> (Self, mpsc::Receiver<MuxEvent>) {
        let manager = Arc::new(PtyManager::new(config.shell.clone(), EventBus::new()));
        let (queue, queue_task) =
            CreationQueue::spawn(manager.clone(), RetryPolicy::from(&config.creation));
        let (events, rx) = mpsc::channel(MUX_QUEUE_SIZE);

        let mux = Self {
            workspace: Workspace::new(config.workspace.pane_limit()),
            rules: BusyRules::new(&config.busy),
            scheduler: RecheckScheduler::new(config.busy.recheck()),
            area: Rect::new(0, 0, config.session.default_cols, config.session.default_rows),
            config,
            manager,
            queue,
            queue_task,
            store,
            screens: HashMap::new(),
            events,
        };
        (mux, rx)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn manager(&self) -> &PtyManager {
        &self.manager
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    /// Run a workspace command and carry out what it asks for.
    pub fn apply(&mut self, command: Command) -> Result<(), LayoutError> {
        let effects = self.workspace.apply(command)?;
        self.execute(effects);
        Ok(())
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CreateSession {
                    pane_id,
                    session_id,
                    cwd,
                } => self.start_session(pane_id, session_id, cwd),
                Effect::CloseSession { pane_id, session_id } => {
                    tracing::debug!(pane = %pane_id, session = %session_id, "closing pane");
                    self.stop_session(&session_id);
                }
                Effect::ResizeAll => self.resize_all(),
                Effect::Persist(snapshot) => {
                    if let Err(e) = persistence::save_last_session(self.store.as_ref(), &snapshot) {
                        tracing::warn!(error = %e, "failed to save session snapshot");
                    }
                }
                Effect::RecordRecent { path, name } => {
                    let limit = self.config.workspace.recent_limit;
                    if let Err(e) = persistence::record_recent(self.store.as_ref(), &path, name, limit) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to record recent project");
                    }
                }
            }
        }
    }

    fn start_session(&mut self, pane_id: String, session_id: String, cwd: PathBuf) {
        let (cols, rows) = self.pane_size(&pane_id);

        // Subscribe before creating: the bus never replays.
        let mut subscription = self.manager.bus().subscribe(&session_id);
        let tx = self.events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let event = match event {
                    BusEvent::Output { id, data } => MuxEvent::Output {
                        session_id: id,
                        data,
                    },
                    BusEvent::Closed { id, exit_code } => MuxEvent::Closed {
                        session_id: id,
                        exit_code,
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        self.screens.insert(
            session_id.clone(),
            PaneScreen {
                pane_id: pane_id.clone(),
                parser: vt100::Parser::new(rows, cols, SCROLLBACK_LINES),
                classifier: BusyClassifier::new(),
                reported: false,
                forwarder,
            },
        );

        let queue = self.queue.clone();
        let tx = self.events.clone();
        let request = CreateRequest {
            id: session_id.clone(),
            cols,
            rows,
            cwd,
        };
        tokio::spawn(async move {
            let result = queue.enqueue(request).await;
            let _ = tx
                .send(MuxEvent::Created {
                    pane_id,
                    session_id,
                    result,
                })
                .await;
        });
    }

    /// Stop forwarding, then close the process; the manager deregisters it from the bus.
    fn stop_session(&mut self, session_id: &str) {
        if let Some(screen) = self.screens.remove(session_id) {
            screen.forwarder.abort();
        }
        self.scheduler.forget(&session_id.to_string());
        if let Err(e) = self.manager.close(session_id) {
            tracing::debug!(session = session_id, error = %e, "close failed");
        }
        // Sessions still queued never reached the manager, so their channel is ours to drop.
        self.manager.bus().remove(session_id);
    }

    /// Cell size for a visible pane; parked panes keep the configured default.
    fn pane_size(&self, pane_id: &str) -> (u16, u16) {
        let panes = self.workspace.panes();
        let cells = grid_cells(self.area, self.workspace.grid(), panes.len());
        panes
            .iter()
            .position(|p| p.id == pane_id)
            .and_then(|i| cells.get(i))
            .map(|cell| inner_size(*cell))
            .unwrap_or((self.config.session.default_cols, self.config.session.default_rows))
    }

    pub fn set_area(&mut self, area: Rect) {
        if area != self.area {
            self.area = area;
            self.resize_all();
        }
    }

    fn resize_all(&mut self) {
        let panes = self.workspace.panes();
        let cells = grid_cells(self.area, self.workspace.grid(), panes.len());

        for (pane, cell) in panes.iter().zip(cells) {
            let (cols, rows) = inner_size(cell);
            if let Some(screen) = self.screens.get_mut(&pane.session_id) {
                if screen.parser.screen().size() != (rows, cols) {
                    screen.parser.set_size(rows, cols);
                }
            }
            if pane.is_inert() {
                continue;
            }
            match self.manager.resize(&pane.session_id, cols, rows) {
                Ok(()) => {}
                Err(e) if e.is_unknown_session() => {
                    // Still in the creation queue, or already torn down.
                    tracing::debug!(pane = %pane.id, "resize skipped: {e}");
                }
                Err(e) => tracing::warn!(pane = %pane.id, error = %e, "resize failed"),
            }
        }
    }

    pub fn handle_event(&mut self, event: MuxEvent, now: Instant) {
        match event {
            MuxEvent::Output { session_id, data } => {
                if let Some(screen) = self.screens.get_mut(&session_id) {
                    screen.parser.process(data.as_bytes());
                    screen.classifier.on_output(&self.rules, &data, now);
                    self.scheduler.touch(session_id, now);
                }
            }
            MuxEvent::Closed {
                session_id,
                exit_code,
            } => {
                tracing::info!(session = %session_id, ?exit_code, "pane session exited");
                self.workspace.mark_exited(&session_id);
                self.scheduler.touch(session_id, now);
            }
            MuxEvent::Created {
                pane_id,
                session_id,
                result,
            } => self.on_created(pane_id, session_id, result),
            MuxEvent::StartupDue {
                pane_id,
                session_id,
            } => {
                if let Some(command) = self.workspace.take_startup_command(&pane_id) {
                    let mut bytes = command.into_bytes();
                    bytes.push(b'\r');
                    self.write_session(&session_id, &bytes, now);
                }
            }
        }
    }

    fn on_created(&mut self, pane_id: String, session_id: String, result: Result<(), CreateError>) {
        match result {
            Ok(()) if !self.screens.contains_key(&session_id) => {
                // The pane was closed while its session was queued.
                let _ = self.manager.close(&session_id);
            }
            Ok(()) => {
                self.workspace.mark_running(&pane_id);
                // The grid may have changed while the request waited in the queue.
                self.resize_all();

                let pending = self
                    .workspace
                    .pane(&pane_id)
                    .is_some_and(|p| !p.startup_consumed);
                if pending {
                    let tx = self.events.clone();
                    let delay = self.config.session.startup_command_delay();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx
                            .send(MuxEvent::StartupDue {
                                pane_id,
                                session_id,
                            })
                            .await;
                    });
                }
            }
            Err(e) => {
                tracing::error!(pane = %pane_id, session = %session_id, error = %e, "pane failed to start");
                self.workspace.mark_failed(&pane_id);
                if let Some(screen) = self.screens.get_mut(&session_id) {
                    screen.forwarder.abort();
                }
                self.manager.bus().remove(&session_id);
            }
        }
    }

    /// Forward keystrokes to the active pane. Inert panes swallow input.
    pub fn send_input(&mut self, data: &[u8], now: Instant) {
        let Some(pane) = self.workspace.active_pane() else {
            return;
        };
        if pane.is_inert() {
            return;
        }
        let session_id = pane.session_id.clone();
        self.write_session(&session_id, data, now);
    }

    fn write_session(&mut self, session_id: &str, data: &[u8], now: Instant) {
        if let Some(screen) = self.screens.get_mut(session_id) {
            screen.classifier.on_input(data, now);
            self.scheduler.touch(session_id.to_string(), now);
        }
        match self.manager.write(session_id, data) {
            Ok(()) => {}
            Err(e) if e.is_unknown_session() => {
                tracing::debug!(session = session_id, "input dropped: {e}");
            }
            Err(e) => tracing::warn!(session = session_id, error = %e, "input failed"),
        }
    }

    /// Re-evaluate panes that are due and report busy-state edges.
    pub fn tick(&mut self, now: Instant) -> Vec<BusyChange> {
        let mut changes = Vec::new();
        for session_id in self.scheduler.due(now) {
            let Some(screen) = self.screens.get_mut(&session_id) else {
                continue;
            };
            let inert = self
                .workspace
                .pane(&screen.pane_id)
                .map_or(true, |p| p.is_inert());

            let working = if inert {
                false
            } else {
                let view: &dyn VisibleLines = &screen.parser;
                screen.classifier.evaluate(&self.rules, Some(view), now)
            };

            if working {
                self.scheduler.defer(session_id.clone(), now);
            }
            if working != screen.reported {
                screen.reported = working;
                changes.push(BusyChange {
                    pane_id: screen.pane_id.clone(),
                    working,
                });
            }
        }
        changes
    }

    pub fn is_working(&self, pane_id: &str) -> bool {
        self.workspace
            .pane(pane_id)
            .and_then(|p| self.screens.get(&p.session_id))
            .is_some_and(|s| s.classifier.is_working())
    }

    pub fn screen(&self, pane_id: &str) -> Option<&vt100::Parser> {
        self.workspace
            .pane(pane_id)
            .and_then(|p| self.screens.get(&p.session_id))
            .map(|s| &s.parser)
    }

    /// Save the active tab and close every session.
    pub fn shutdown(&mut self) {
        if let Some(snapshot) = self.workspace.snapshot() {
            if let Err(e) = persistence::save_last_session(self.store.as_ref(), &snapshot) {
                tracing::warn!(error = %e, "failed to save session snapshot");
            }
        }
        for (_, screen) in self.screens.drain() {
            screen.forwarder.abort();
        }
        self.manager.close_all();
        self.queue_task.abort();
        tracing::info!("all sessions closed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ShellConfig;
    use crate::models::PaneStatus;
    use crate::persistence::MemoryStore;
    use std::time::Duration;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.shell = ShellConfig::with_program("/bin/sh");
        config.creation.retry_backoff_ms = 5;
        config.session.startup_command_delay_ms = 20;
        config
    }

    fn open(dir: &std::path::Path, panes: usize, startup_command: Option<&str>) -> Command {
        Command::OpenProject {
            path: dir.to_path_buf(),
            workspace_name: None,
            panes: Some(panes),
            layout: None,
            startup_command: startup_command.map(str::to_string),
        }
    }

    async fn pump_until(
        mux: &mut Multiplexer,
        rx: &mut mpsc::Receiver<MuxEvent>,
        done: impl Fn(&Multiplexer) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(mux) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) => mux.handle_event(event, Instant::now()),
                _ => break,
            }
        }
        done(mux)
    }

    fn all_running(mux: &Multiplexer) -> bool {
        mux.workspace()
            .panes()
            .iter()
            .all(|p| p.status == PaneStatus::Running)
    }

    fn screen_contains(mux: &Multiplexer, pane_id: &str, text: &str) -> bool {
        mux.screen(pane_id)
            .is_some_and(|parser| parser.screen().contents().contains(text))
    }

    #[tokio::test]
    async fn panes_start_echo_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (mut mux, mut rx) = Multiplexer::new(test_config(), store.clone());

        mux.apply(open(dir.path(), 2, None)).unwrap();
        assert!(pump_until(&mut mux, &mut rx, all_running).await);
        assert_eq!(mux.manager().list().len(), 2);

        let active = mux.workspace().active_pane_id().unwrap().to_string();
        mux.send_input(b"echo grid-$((40+2))\r", Instant::now());
        assert!(pump_until(&mut mux, &mut rx, |m| screen_contains(m, &active, "grid-42")).await);

        mux.apply(Command::Close(None)).unwrap();
        assert_eq!(mux.manager().list().len(), 1);
        assert!(persistence::load_last_session(store.as_ref()).is_some());
        assert_eq!(persistence::load_recent(store.as_ref()).len(), 1);

        mux.shutdown();
        assert!(mux.manager().list().is_empty());
    }

    #[tokio::test]
    async fn startup_command_runs_once_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let (mut mux, mut rx) = Multiplexer::new(test_config(), Arc::new(MemoryStore::new()));

        mux.apply(open(dir.path(), 1, Some("echo started-$((1+1))"))).unwrap();
        let pane_id = mux.workspace().panes()[0].id.clone();
        assert!(pump_until(&mut mux, &mut rx, |m| screen_contains(m, &pane_id, "started-2")).await);
        assert!(mux.workspace().panes()[0].startup_consumed);

        mux.shutdown();
    }

    #[tokio::test]
    async fn marker_output_flags_pane_busy_until_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (mut mux, mut rx) = Multiplexer::new(test_config(), Arc::new(MemoryStore::new()));

        mux.apply(open(dir.path(), 1, None)).unwrap();
        assert!(pump_until(&mut mux, &mut rx, all_running).await);
        let pane = mux.workspace().panes()[0].clone();

        let now = Instant::now();
        mux.handle_event(
            MuxEvent::Output {
                session_id: pane.session_id.clone(),
                data: "✻ Working… (esc to interrupt)\r\n".into(),
            },
            now,
        );
        assert_eq!(
            mux.tick(now),
            vec![BusyChange {
                pane_id: pane.id.clone(),
                working: true
            }]
        );
        assert!(mux.is_working(&pane.id));

        mux.send_input(&[0x03], now);
        assert!(!mux.is_working(&pane.id));
        assert_eq!(
            mux.tick(now),
            vec![BusyChange {
                pane_id: pane.id.clone(),
                working: false
            }]
        );

        mux.shutdown();
    }

    #[tokio::test]
    async fn flooding_pane_keeps_the_event_queue_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut mux, mut rx) = Multiplexer::new(test_config(), Arc::new(MemoryStore::new()));

        mux.apply(open(dir.path(), 1, None)).unwrap();
        assert!(pump_until(&mut mux, &mut rx, all_running).await);
        let pane_id = mux.workspace().panes()[0].id.clone();

        // Nobody drains while the pane floods.
        mux.send_input(b"yes flood\r", Instant::now());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let mut queued = 0;
        while let Ok(event) = rx.try_recv() {
            queued += 1;
            mux.handle_event(event, Instant::now());
        }
        assert!(queued > 0);
        assert!(queued <= MUX_QUEUE_SIZE, "{queued} events queued");

        // The newest output still gets through once the flood stops.
        mux.send_input(&[0x03], Instant::now());
        mux.send_input(b"echo after-$((1+1))\r", Instant::now());
        assert!(pump_until(&mut mux, &mut rx, |m| screen_contains(m, &pane_id, "after-2")).await);

        mux.shutdown();
    }

    #[tokio::test]
    async fn unlaunchable_shell_leaves_an_inert_pane() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.shell = ShellConfig::with_program("/nonexistent/panegrid-shell");
        let (mut mux, mut rx) = Multiplexer::new(config, Arc::new(MemoryStore::new()));

        mux.apply(open(dir.path(), 1, None)).unwrap();
        assert!(
            pump_until(&mut mux, &mut rx, |m| m.workspace().panes()[0].is_inert()).await
        );

        // Input to an inert pane is dropped without touching any session.
        mux.send_input(b"ls\r", Instant::now());
        mux.shutdown();
    }
}

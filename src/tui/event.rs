use crossterm::event::{self, Event, KeyEvent, KeyEventKind, MouseButton, MouseEventKind};
use std::time::Duration;
use tokio::sync::mpsc;

const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Terminal input, decoupled from crossterm's blocking reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Key(KeyEvent),
    Paste(String),
    MouseDown(u16, u16),
    Resize(u16, u16),
    /// Nothing arrived within the poll window.
    Tick,
}

pub struct EventHandler {
    terminal_rx: mpsc::UnboundedReceiver<TerminalEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();

        // crossterm's read blocks, so it gets its own thread
        let spawned = std::thread::Builder::new()
            .name("terminal-events".into())
            .spawn(move || loop {
                let event = if event::poll(POLL_TIMEOUT).unwrap_or(false) {
                    match event::read() {
                        Ok(event) => translate(event),
                        Err(e) => {
                            tracing::warn!(error = %e, "terminal read failed");
                            TerminalEvent::Tick
                        }
                    }
                } else {
                    TerminalEvent::Tick
                };

                if terminal_tx.send(event).is_err() {
                    break; // Channel closed, exit thread
                }
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to start terminal event thread");
        }

        Self { terminal_rx }
    }

    /// Next terminal event; `None` once the reader thread is gone.
    pub async fn next(&mut self) -> Option<TerminalEvent> {
        self.terminal_rx.recv().await
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn translate(event: Event) -> TerminalEvent {
    match event {
        // Windows reports releases too; only presses carry input.
        Event::Key(key) if key.kind != KeyEventKind::Release => TerminalEvent::Key(key),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                TerminalEvent::MouseDown(mouse.column, mouse.row)
            }
            _ => TerminalEvent::Tick,
        },
        Event::Resize(w, h) => TerminalEvent::Resize(w, h),
        Event::Paste(data) => TerminalEvent::Paste(data),
        _ => TerminalEvent::Tick,
    }
}

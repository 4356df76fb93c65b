use super::action::Command;
use super::geometry::{grid_area, grid_cells};
use super::multiplexer::Multiplexer;
use super::workspace::Workspace;
use crate::config::{GridCommand, KeybindingConfig};
use crate::models::{SplitOrientation, TabState};
use crate::tui::event::TerminalEvent;
use crate::tui::input::encode_key;
use std::path::{Path, PathBuf};
use std::time::Instant;

const PASTE_START: &[u8] = b"\x1b[200~";
const PASTE_END: &[u8] = b"\x1b[201~";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Routes one terminal event: bound keys drive the grid, everything else goes to the active pane.
pub fn handle_event(
    mux: &mut Multiplexer,
    keys: &KeybindingConfig,
    launch_dir: &Path,
    event: TerminalEvent,
    now: Instant,
) -> Flow {
    match event {
        TerminalEvent::Key(key) => {
            if let Some(grid_command) = keys.command_for(&key) {
                if grid_command == GridCommand::Quit {
                    return Flow::Quit;
                }
                if let Some(command) = to_command(grid_command, mux.workspace(), launch_dir) {
                    apply(mux, command);
                }
            } else if let Some(bytes) = encode_key(&key) {
                mux.send_input(&bytes, now);
            }
        }
        TerminalEvent::Paste(text) => {
            let bracketed = mux
                .workspace()
                .active_pane_id()
                .and_then(|id| mux.screen(id))
                .is_some_and(|parser| parser.screen().bracketed_paste());
            mux.send_input(&paste_bytes(&text, bracketed), now);
        }
        TerminalEvent::MouseDown(x, y) => {
            if let Some(pane_id) = pane_at(mux, x, y) {
                apply(mux, Command::Focus(pane_id));
            }
        }
        TerminalEvent::Resize(w, h) => mux.set_area(grid_area(w, h)),
        TerminalEvent::Tick => {}
    }
    Flow::Continue
}

fn apply(mux: &mut Multiplexer, command: Command) {
    if let Err(e) = mux.apply(command) {
        tracing::warn!(error = %e, "command rejected");
    }
}

/// Translate a bound key into a workspace command. `Quit` is handled by the caller.
pub fn to_command(command: GridCommand, workspace: &Workspace, launch_dir: &Path) -> Option<Command> {
    let tab_count = workspace.tabs().len();
    let current = workspace.active_tab_index();

    let command = match command {
        GridCommand::SplitHorizontal => Command::Split(SplitOrientation::Horizontal),
        GridCommand::SplitVertical => Command::Split(SplitOrientation::Vertical),
        GridCommand::ClosePane => Command::Close(None),
        GridCommand::FocusNext => Command::FocusNext,
        GridCommand::FocusPrev => Command::FocusPrev,
        // An empty tab opens the launch directory in place instead of stacking another empty tab.
        GridCommand::NewTab if workspace.active_tab().state == TabState::Uninitialized => {
            Command::OpenProject {
                path: launch_dir.to_path_buf(),
                workspace_name: None,
                panes: None,
                layout: None,
                startup_command: None,
            }
        }
        GridCommand::NewTab => Command::NewTab(None),
        GridCommand::NextTab if tab_count > 1 => Command::SwitchTab((current + 1) % tab_count),
        GridCommand::PrevTab if tab_count > 1 => {
            Command::SwitchTab((current + tab_count - 1) % tab_count)
        }
        GridCommand::NextTab | GridCommand::PrevTab => return None,
        GridCommand::CycleLayout => Command::CycleLayout,
        GridCommand::Quit => return None,
    };
    Some(command)
}

fn paste_bytes(text: &str, bracketed: bool) -> Vec<u8> {
    // Terminals send CR for newlines typed at a prompt.
    let body = text.replace("\r\n", "\r").replace('\n', "\r");
    if !bracketed {
        return body.into_bytes();
    }
    let mut bytes = Vec::with_capacity(body.len() + PASTE_START.len() + PASTE_END.len());
    bytes.extend_from_slice(PASTE_START);
    bytes.extend_from_slice(body.as_bytes());
    bytes.extend_from_slice(PASTE_END);
    bytes
}

fn pane_at(mux: &Multiplexer, x: u16, y: u16) -> Option<String> {
    let workspace = mux.workspace();
    let panes = workspace.panes();
    grid_cells(mux.area(), workspace.grid(), panes.len())
        .into_iter()
        .zip(panes)
        .find(|(cell, _)| {
            x >= cell.x && x < cell.x + cell.width && y >= cell.y && y < cell.y + cell.height
        })
        .map(|(_, pane)| pane.id.clone())
}

/// Directory the binary was started from, used by the empty-tab shortcut.
pub fn launch_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
}

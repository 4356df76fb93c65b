use crate::models::{SplitOrientation, Snapshot};
use std::path::PathBuf;

/// Requests understood by the workspace orchestrator.
#[derive(Debug, Clone)]
pub enum Command {
    /// Replace the active tab's contents with a freshly opened project.
    OpenProject {
        path: PathBuf,
        workspace_name: Option<String>,
        /// Defaults to the pinned layout's capacity, or one pane.
        panes: Option<usize>,
        layout: Option<String>,
        startup_command: Option<String>,
    },
    Split(SplitOrientation),
    /// Close the given pane, or the active one.
    Close(Option<String>),
    Focus(String),
    FocusNext,
    FocusPrev,
    RenamePane { pane_id: String, name: String },
    RenameTab(String),
    /// Open a new tab, optionally straight into a project.
    NewTab(Option<PathBuf>),
    SwitchTab(usize),
    CloseTab,
    PinLayout(Option<String>),
    CycleLayout,
    Restore(Snapshot),
}

/// Side effects the runtime performs after a command changed the workspace.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateSession {
        pane_id: String,
        session_id: String,
        cwd: PathBuf,
    },
    CloseSession {
        pane_id: String,
        session_id: String,
    },
    /// Grid geometry changed; every visible pane needs its size recomputed.
    ResizeAll,
    Persist(Snapshot),
    RecordRecent {
        path: PathBuf,
        name: Option<String>,
    },
}

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Id reserved, child not spawned yet.
    Created,
    Running,
    Closed,
}

/// Read-only view of a session owned by the process manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub state: SessionState,
}

impl SessionInfo {
    pub fn new(id: String, cwd: PathBuf, cols: u16, rows: u16) -> Self {
        Self {
            id,
            cwd,
            cols,
            rows,
            state: SessionState::Created,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn mark_running(&mut self) {
        self.state = SessionState::Running;
    }

    pub fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
    }
}

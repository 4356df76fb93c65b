use super::pane::Pane;
use super::snapshot::Snapshot;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabState {
    /// No folder chosen and nothing restored yet.
    Uninitialized,
    /// The tab on screen; its live state is authoritative.
    Ready,
    /// Switched away from; only the frozen snapshot is authoritative.
    Archived,
}

#[derive(Debug, Clone)]
pub struct Tab {
    pub id: Uuid,
    pub title: String,
    pub state: TabState,
    pub snapshot: Option<Snapshot>,
    /// Panes (and their still-running sessions) kept aside while the tab is archived.
    pub parked_panes: Vec<Pane>,
}

impl Tab {
    pub fn new(title: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            state: TabState::Uninitialized,
            snapshot: None,
            parked_panes: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == TabState::Ready
    }
}

//! Best-effort "the agent in this pane is working" indicator.
//!
//! Everything here is read-only with respect to sessions: it watches input,
//! output and the emulator's visible lines, and only ever drives a status
//! badge. Any failure collapses to idle.

mod classifier;
mod schedule;
mod screen;

pub use classifier::{BusyClassifier, BusyRules};
pub use schedule::RecheckScheduler;
pub use screen::{ViewError, VisibleLines};

/// Edge emitted when a pane flips between idle and working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyChange {
    pub pane_id: String,
    pub working: bool,
}

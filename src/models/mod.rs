mod layout;
mod pane;
mod project;
mod session;
mod snapshot;
mod tab;

pub use layout::{
    check_capacity, compute_grid, resolve_grid, GridDims, GridLayout, LayoutError,
    SplitOrientation, LAYOUT_CATALOG, MAX_PANES,
};
pub use pane::{Pane, PaneStatus};
pub use project::{project_name, push_recent, ProjectCommand, RecentProject, RECENT_PROJECTS_LIMIT};
pub use session::{SessionInfo, SessionState};
pub use snapshot::{PaneRecord, Snapshot};
pub use tab::{Tab, TabState};

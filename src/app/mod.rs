mod action;
pub mod geometry;
mod handler;
mod multiplexer;
mod runtime;
mod workspace;

pub use action::{Command, Effect};
pub use handler::{handle_event, to_command, Flow};
pub use multiplexer::{Multiplexer, MuxEvent};
pub use runtime::{run_tui, Launch};
pub use workspace::Workspace;

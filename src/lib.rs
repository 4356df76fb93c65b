//! Grid of interactive shell panes grouped into resumable workspace tabs.
//!
//! Leaves first: [`pty`] owns child processes, [`bus`] carries their output,
//! [`busy`] guesses whether a pane is working, and [`app`] turns all of it into
//! a grid the [`tui`] draws.

pub mod app;
pub mod bus;
pub mod busy;
pub mod config;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod pty;
pub mod tui;

mod creation;
mod error;
mod manager;

pub use creation::{CreateError, CreateRequest, CreationQueue, RetryPolicy};
pub use error::SessionError;
pub use manager::{PtyHandle, PtyManager, SessionSpawner};

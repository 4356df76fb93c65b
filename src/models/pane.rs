use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneStatus {
    /// Waiting in the creation queue.
    Starting,
    Running,
    /// Creation exhausted its retries; the pane stays inert until the user closes it.
    Failed,
    /// The child process went away on its own.
    Exited,
}

/// A grid slot bound to exactly one session for its lifetime.
#[derive(Debug, Clone)]
pub struct Pane {
    pub id: String,
    pub display_name: String,
    pub session_id: String,
    pub startup_command: Option<String>,
    pub startup_consumed: bool,
    pub status: PaneStatus,
}

impl Pane {
    pub fn new(id: String, display_name: String, startup_command: Option<String>) -> Self {
        let startup_command = startup_command.filter(|cmd| !cmd.trim().is_empty());
        Self {
            id,
            display_name,
            session_id: Uuid::new_v4().to_string(),
            startup_consumed: startup_command.is_none(),
            startup_command,
            status: PaneStatus::Starting,
        }
    }

    /// Generate a fresh pane id, short like a session badge.
    pub fn generate_id() -> String {
        format!("pane-{}", &Uuid::new_v4().simple().to_string()[..8])
    }

    /// Hand out the startup command once; later calls return `None`.
    pub fn take_startup_command(&mut self) -> Option<String> {
        if self.startup_consumed {
            return None;
        }
        self.startup_consumed = true;
        self.startup_command.clone()
    }

    pub fn mark_running(&mut self) {
        if self.status == PaneStatus::Starting {
            self.status = PaneStatus::Running;
        }
    }

    pub fn mark_failed(&mut self) {
        self.status = PaneStatus::Failed;
    }

    pub fn mark_exited(&mut self) {
        if self.status != PaneStatus::Failed {
            self.status = PaneStatus::Exited;
        }
    }

    /// Panes that no longer accept input.
    pub fn is_inert(&self) -> bool {
        matches!(self.status, PaneStatus::Failed | PaneStatus::Exited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_command_is_consumed_once() {
        let mut pane = Pane::new("p".into(), "Agent".into(), Some("claude".into()));
        assert!(!pane.startup_consumed);
        assert_eq!(pane.take_startup_command().as_deref(), Some("claude"));
        assert!(pane.take_startup_command().is_none());
        assert!(pane.startup_consumed);
    }

    #[test]
    fn blank_startup_command_counts_as_none() {
        let mut pane = Pane::new("p".into(), "Shell".into(), Some("   ".into()));
        assert!(pane.startup_consumed);
        assert!(pane.take_startup_command().is_none());
    }

    #[test]
    fn failed_is_terminal() {
        let mut pane = Pane::new("p".into(), "Shell".into(), None);
        pane.mark_failed();
        pane.mark_running();
        pane.mark_exited();
        assert_eq!(pane.status, PaneStatus::Failed);
        assert!(pane.is_inert());
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = Pane::generate_id();
        let b = Pane::generate_id();
        assert!(a.starts_with("pane-"));
        assert_ne!(a, b);
    }
}

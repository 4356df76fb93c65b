pub mod keybindings;

use portable_pty::CommandBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use keybindings::{load_keybindings, GridCommand, KeyCombo, KeybindingConfig};

/// Directory name used under the platform config and data dirs.
pub const APP_DIR: &str = "panegrid";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub creation: CreationConfig,
    #[serde(default)]
    pub busy: BusyConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// How a session's child process is launched. Supplied from outside the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Program to run; defaults to `$SHELL`, then `/bin/bash` (`cmd.exe` on Windows).
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ShellConfig {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
            args: Vec::new(),
        }
    }

    pub fn resolved_program(&self) -> String {
        if let Some(program) = self.program.as_ref().filter(|p| !p.trim().is_empty()) {
            return program.clone();
        }
        default_shell()
    }

    /// Build the command for a new session rooted at `cwd`.
    pub fn command(&self, cwd: &Path, cols: u16, rows: u16) -> CommandBuilder {
        let cwd = resolve_cwd(cwd);
        let mut cmd = CommandBuilder::new(self.resolved_program());

        #[cfg(windows)]
        {
            if self.program.is_none() {
                let safe_cwd = if cwd.as_os_str().is_empty() {
                    "%USERPROFILE%".to_string()
                } else {
                    cwd.display().to_string().replace('"', "")
                };
                cmd.arg("/Q");
                cmd.arg("/K");
                cmd.arg(format!("cd /d {}", safe_cwd));
            }
        }

        for arg in &self.args {
            cmd.arg(arg);
        }
        if !cwd.as_os_str().is_empty() {
            cmd.cwd(&cwd);
        }

        cmd.env("TERM", "xterm-256color");
        cmd.env("LINES", rows.to_string());
        cmd.env("COLUMNS", cols.to_string());
        cmd
    }
}

#[cfg(not(windows))]
fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string())
}

#[cfg(windows)]
fn default_shell() -> String {
    "cmd.exe".to_string()
}

/// Blank working directories fall back to the home directory.
fn resolve_cwd(cwd: &Path) -> PathBuf {
    if cwd.as_os_str().is_empty() || cwd.to_string_lossy().trim().is_empty() {
        return dirs::home_dir().unwrap_or_default();
    }
    cwd.to_path_buf()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cols")]
    pub default_cols: u16,
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    /// Delay before a pane's startup command is typed into its shell.
    #[serde(default = "default_startup_command_delay_ms")]
    pub startup_command_delay_ms: u64,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

fn default_startup_command_delay_ms() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_cols: default_cols(),
            default_rows: default_rows(),
            startup_command_delay_ms: default_startup_command_delay_ms(),
        }
    }
}

impl SessionConfig {
    pub fn startup_command_delay(&self) -> Duration {
        Duration::from_millis(self.startup_command_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    150
}

impl Default for CreationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Tuning for the busy heuristic. Empirical values for CLI coding agents, not guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusyConfig {
    /// How long a busy signal keeps the pane marked working.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// How long a submitted prompt waits for output before the pane counts as idle.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// Delayed re-check after the last output chunk.
    #[serde(default = "default_recheck_ms")]
    pub recheck_ms: u64,
    /// Case-insensitive text that means "an agent is running" while visible.
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Regex alternatives matched against stripped output chunks.
    #[serde(default = "default_vocabulary")]
    pub vocabulary: Vec<String>,
}

fn default_grace_ms() -> u64 {
    1500
}

fn default_idle_ms() -> u64 {
    4000
}

fn default_recheck_ms() -> u64 {
    2000
}

fn default_marker() -> String {
    "esc to interrupt".to_string()
}

pub fn default_vocabulary() -> Vec<String> {
    [
        r"esc to interrupt",
        r"\b(thinking|working|generating|analyzing|processing|compacting|reasoning|pondering|running)(\.\.\.|…)",
        r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]",
        r"[✻✶✳✢✽]\s*\w+",
        r"\(\d+s\s*[·•]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BusyConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            idle_ms: default_idle_ms(),
            recheck_ms: default_recheck_ms(),
            marker: default_marker(),
            vocabulary: default_vocabulary(),
        }
    }
}

impl BusyConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn recheck(&self) -> Duration {
        Duration::from_millis(self.recheck_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_max_panes")]
    pub max_panes: usize,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_max_panes() -> usize {
    crate::models::MAX_PANES
}

fn default_recent_limit() -> usize {
    crate::models::RECENT_PROJECTS_LIMIT
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            max_panes: default_max_panes(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl WorkspaceConfig {
    /// Configured ceiling, never above the hard cap.
    pub fn pane_limit(&self) -> usize {
        self.max_panes.clamp(1, crate::models::MAX_PANES)
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load `config.toml`, falling back to defaults when it is missing or unreadable.
pub fn load_config() -> AppConfig {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> AppConfig {
    if !path.exists() {
        return AppConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                AppConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read config, using defaults");
            AppConfig::default()
        }
    }
}

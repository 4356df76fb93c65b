use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default keybindings embedded at compile time
const DEFAULT_KEYBINDINGS: &str = include_str!("defaults.toml");

/// Grid-level commands a key can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridCommand {
    SplitHorizontal,
    SplitVertical,
    ClosePane,
    FocusNext,
    FocusPrev,
    NewTab,
    NextTab,
    PrevTab,
    CycleLayout,
    Quit,
}

impl GridCommand {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "split_horizontal" => Some(Self::SplitHorizontal),
            "split_vertical" => Some(Self::SplitVertical),
            "close_pane" => Some(Self::ClosePane),
            "focus_next" => Some(Self::FocusNext),
            "focus_prev" => Some(Self::FocusPrev),
            "new_tab" => Some(Self::NewTab),
            "next_tab" => Some(Self::NextTab),
            "prev_tab" => Some(Self::PrevTab),
            "cycle_layout" => Some(Self::CycleLayout),
            "quit" => Some(Self::Quit),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SplitHorizontal => "split_horizontal",
            Self::SplitVertical => "split_vertical",
            Self::ClosePane => "close_pane",
            Self::FocusNext => "focus_next",
            Self::FocusPrev => "focus_prev",
            Self::NewTab => "new_tab",
            Self::NextTab => "next_tab",
            Self::PrevTab => "prev_tab",
            Self::CycleLayout => "cycle_layout",
            Self::Quit => "quit",
        }
    }
}

/// A key combination (key code + modifiers)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyCombo {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    /// Normalize a terminal key event. Shift is folded into the character for printable keys.
    pub fn from_event(key: &KeyEvent) -> Self {
        let mut modifiers = key.modifiers;
        if matches!(key.code, KeyCode::Char(_)) {
            modifiers.remove(KeyModifiers::SHIFT);
        }
        Self::new(key.code, modifiers)
    }

    /// Parse a key string like "Alt-s", "Ctrl-Shift-t", "Enter", "`"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut modifiers = KeyModifiers::NONE;
        let mut parts: Vec<&str> = s.split('-').collect();

        // Handle special case of single dash key
        if s == "-" {
            return Some(Self::new(KeyCode::Char('-'), KeyModifiers::NONE));
        }

        // Process modifiers (all but the last part)
        while parts.len() > 1 {
            let modifier = parts.remove(0).to_lowercase();
            match modifier.as_str() {
                "ctrl" | "c" => modifiers |= KeyModifiers::CONTROL,
                "alt" | "a" | "opt" | "option" => modifiers |= KeyModifiers::ALT,
                "shift" | "s" => modifiers |= KeyModifiers::SHIFT,
                "super" | "cmd" | "command" | "meta" => modifiers |= KeyModifiers::SUPER,
                _ => return None, // Unknown modifier
            }
        }

        let code = parse_key_code(parts[0])?;
        Some(Self::new(code, modifiers))
    }

    /// Convert to display string for the status bar
    pub fn display(&self) -> String {
        let mut parts = Vec::new();

        if self.modifiers.contains(KeyModifiers::SUPER) {
            parts.push("Cmd");
        }
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            parts.push("Ctrl");
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            parts.push("Alt");
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            parts.push("Shift");
        }

        let key_name = key_code_display(&self.code);
        parts.push(&key_name);

        parts.join("-")
    }
}

fn parse_key_code(s: &str) -> Option<KeyCode> {
    if s.chars().count() == 1 {
        let c = s.chars().next()?;
        return Some(KeyCode::Char(c));
    }

    match s.to_lowercase().as_str() {
        "enter" | "return" => Some(KeyCode::Enter),
        "esc" | "escape" => Some(KeyCode::Esc),
        "tab" => Some(KeyCode::Tab),
        "backtab" => Some(KeyCode::BackTab),
        "backspace" | "bs" => Some(KeyCode::Backspace),
        "delete" | "del" => Some(KeyCode::Delete),
        "insert" | "ins" => Some(KeyCode::Insert),
        "up" => Some(KeyCode::Up),
        "down" => Some(KeyCode::Down),
        "left" => Some(KeyCode::Left),
        "right" => Some(KeyCode::Right),
        "home" => Some(KeyCode::Home),
        "end" => Some(KeyCode::End),
        "pageup" | "pgup" => Some(KeyCode::PageUp),
        "pagedown" | "pgdn" => Some(KeyCode::PageDown),
        "space" => Some(KeyCode::Char(' ')),
        "backtick" => Some(KeyCode::Char('`')),
        "tilde" => Some(KeyCode::Char('~')),
        other => other
            .strip_prefix('f')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| (1..=12).contains(n))
            .map(KeyCode::F),
    }
}

fn key_code_display(code: &KeyCode) -> String {
    match code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::BackTab => "BackTab".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Delete => "Delete".to_string(),
        KeyCode::Insert => "Insert".to_string(),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PageUp".to_string(),
        KeyCode::PageDown => "PageDown".to_string(),
        KeyCode::F(n) => format!("F{}", n),
        _ => "?".to_string(),
    }
}

/// Raw TOML structure for keybindings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeybindingsToml {
    #[serde(default)]
    pub grid: HashMap<String, String>,
}

/// Parsed keybinding table
#[derive(Debug, Clone)]
pub struct KeybindingConfig {
    pub grid: HashMap<KeyCombo, GridCommand>,
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self::from_toml(DEFAULT_KEYBINDINGS)
    }
}

impl KeybindingConfig {
    /// Parse a TOML table, skipping entries with unknown keys or commands.
    pub fn from_toml(content: &str) -> Self {
        let raw: KeybindingsToml = match toml::from_str(content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "invalid keybindings, using defaults");
                toml::from_str(DEFAULT_KEYBINDINGS).unwrap_or_default()
            }
        };

        let grid = raw
            .grid
            .iter()
            .filter_map(|(key, command)| {
                let combo = KeyCombo::parse(key);
                let command = GridCommand::from_name(command);
                if combo.is_none() || command.is_none() {
                    tracing::warn!(key = %key, command = %command_name(command), "ignoring keybinding");
                }
                Some((combo?, command?))
            })
            .collect();

        Self { grid }
    }

    pub fn command_for(&self, key: &KeyEvent) -> Option<GridCommand> {
        self.grid.get(&KeyCombo::from_event(key)).copied()
    }

    /// First key bound to `command`, for hints.
    pub fn key_for(&self, command: GridCommand) -> Option<String> {
        let mut keys: Vec<String> = self
            .grid
            .iter()
            .filter(|(_, c)| **c == command)
            .map(|(combo, _)| combo.display())
            .collect();
        keys.sort();
        keys.into_iter().next()
    }
}

fn command_name(command: Option<GridCommand>) -> &'static str {
    command.map(|c| c.name()).unwrap_or("?")
}

/// Load keybindings from user config, falling back to defaults
pub fn load_keybindings() -> KeybindingConfig {
    load_keybindings_from(&get_user_config_path())
}

pub fn load_keybindings_from(user_config_path: &Path) -> KeybindingConfig {
    let toml_content = if user_config_path.exists() {
        std::fs::read_to_string(user_config_path)
            .unwrap_or_else(|_| DEFAULT_KEYBINDINGS.to_string())
    } else {
        // Seed the user config with the defaults so they are discoverable
        if let Some(parent) = user_config_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(user_config_path, DEFAULT_KEYBINDINGS);
        DEFAULT_KEYBINDINGS.to_string()
    };

    KeybindingConfig::from_toml(&toml_content)
}

/// Get the path to user's keybindings config file
pub fn get_user_config_path() -> PathBuf {
    super::config_dir().join("keybindings.toml")
}

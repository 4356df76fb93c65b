use super::screen::{ViewError, VisibleLines};
use crate::config::BusyConfig;
use regex::{Regex, RegexSet, RegexSetBuilder};
use std::borrow::Cow;
use std::time::{Duration, Instant};

const INTERRUPT: u8 = 0x03;
const ESCAPE: u8 = 0x1b;

/// Compiled heuristics shared by every pane.
pub struct BusyRules {
    vocabulary: RegexSet,
    ansi: Regex,
    marker: String,
    grace: Duration,
    idle: Duration,
}

impl BusyRules {
    pub fn new(config: &BusyConfig) -> Self {
        // Invalid entries are dropped individually so one typo doesn't disable the rest.
        let valid: Vec<&str> = config
            .vocabulary
            .iter()
            .map(String::as_str)
            .filter(|pattern| match Regex::new(pattern) {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "ignoring invalid busy pattern");
                    false
                }
            })
            .collect();
        let vocabulary = RegexSetBuilder::new(valid)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| RegexSet::empty());

        Self {
            vocabulary,
            ansi: ansi_regex(),
            marker: config.marker.trim().to_lowercase(),
            grace: config.grace(),
            idle: config.idle(),
        }
    }

    pub fn strip_ansi<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.ansi.replace_all(text, "")
    }

    /// Whether an output chunk on its own says "working".
    pub fn is_busy_chunk(&self, data: &str) -> bool {
        if has_bare_carriage_return(data) {
            return true;
        }
        self.vocabulary.is_match(&self.strip_ansi(data))
    }

    /// Scan the viewport plus one line either side for the marker, including across line breaks.
    pub fn marker_visible(&self, view: &dyn VisibleLines) -> Result<bool, ViewError> {
        let count = view.line_count();
        if self.marker.is_empty() || count == 0 {
            return Ok(false);
        }

        let viewport = view.viewport();
        let start = viewport.start.saturating_sub(1);
        let end = viewport.end.saturating_add(1).min(count);

        let mut previous: Option<String> = None;
        for idx in start..end {
            let line = view.line(idx)?.to_lowercase();
            if line.contains(&self.marker) {
                return Ok(true);
            }
            if let Some(prev) = previous.as_deref() {
                let joined = format!("{prev}{line}");
                let spaced = format!("{} {}", prev.trim_end(), line.trim_start());
                if joined.contains(&self.marker) || spaced.contains(&self.marker) {
                    return Ok(true);
                }
            }
            previous = Some(line);
        }
        Ok(false)
    }
}

fn ansi_regex() -> Regex {
    // CSI, OSC (BEL or ST terminated), charset selection, then any other two-byte escape.
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][0-9A-Za-z]|\x1b[@-_]")
        .expect("ANSI pattern is valid")
}

/// A `\r` that doesn't start a `\r\n` pair: an in-place redraw.
fn has_bare_carriage_return(data: &str) -> bool {
    let bytes = data.as_bytes();
    bytes
        .iter()
        .enumerate()
        .any(|(i, b)| *b == b'\r' && i + 1 < bytes.len() && bytes[i + 1] != b'\n')
}

/// Per-pane signal-decay state.
#[derive(Debug, Clone, Default)]
pub struct BusyClassifier {
    last_output_at: Option<Instant>,
    last_busy_signal_at: Option<Instant>,
    awaiting_response: bool,
    /// Set by an interrupt; the marker still on screen is ignored until new output arrives.
    marker_suppressed: bool,
    working: bool,
}

impl BusyClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_working(&self) -> bool {
        self.working
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Track keystrokes sent to the pane. Interrupts win over submits in the same write.
    pub fn on_input(&mut self, data: &[u8], now: Instant) {
        let interrupt = data.contains(&INTERRUPT) || data == [ESCAPE];
        if interrupt {
            self.awaiting_response = false;
            self.last_busy_signal_at = None;
            self.marker_suppressed = true;
            self.working = false;
            return;
        }

        if data.iter().any(|b| *b == b'\r' || *b == b'\n') {
            self.awaiting_response = true;
            self.last_output_at = Some(now);
        }
    }

    pub fn on_output(&mut self, rules: &BusyRules, data: &str, now: Instant) {
        self.last_output_at = Some(now);
        self.marker_suppressed = false;
        if rules.is_busy_chunk(data) {
            self.last_busy_signal_at = Some(now);
        }
    }

    /// Recompute `working`. A failing view counts as idle.
    pub fn evaluate(&mut self, rules: &BusyRules, view: Option<&dyn VisibleLines>, now: Instant) -> bool {
        let marker = match view {
            Some(view) if !self.marker_suppressed => match rules.marker_visible(view) {
                Ok(visible) => visible,
                Err(e) => {
                    tracing::debug!(error = %e, "busy check could not read screen");
                    self.working = false;
                    return false;
                }
            },
            _ => false,
        };

        let recent_signal = self
            .last_busy_signal_at
            .is_some_and(|at| now.saturating_duration_since(at) < rules.grace);
        let fresh_output = self
            .last_output_at
            .is_some_and(|at| now.saturating_duration_since(at) < rules.idle);

        if !marker && self.awaiting_response && !fresh_output {
            self.awaiting_response = false;
        }

        self.working = marker || recent_signal || (self.awaiting_response && fresh_output);
        self.working
    }
}

use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("line {0} is outside the screen")]
    OutOfRange(usize),
    #[error("screen unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to what an emulator currently has on screen.
pub trait VisibleLines {
    /// Total lines the view can address.
    fn line_count(&self) -> usize;

    /// Half-open range of lines the user can see right now.
    fn viewport(&self) -> Range<usize>;

    fn line(&self, idx: usize) -> Result<String, ViewError>;
}

impl VisibleLines for vt100::Parser {
    fn line_count(&self) -> usize {
        self.screen().size().0 as usize
    }

    fn viewport(&self) -> Range<usize> {
        0..self.line_count()
    }

    fn line(&self, idx: usize) -> Result<String, ViewError> {
        let screen = self.screen();
        let (_, cols) = screen.size();
        screen.rows(0, cols).nth(idx).ok_or(ViewError::OutOfRange(idx))
    }
}

impl VisibleLines for Vec<String> {
    fn line_count(&self) -> usize {
        self.len()
    }

    fn viewport(&self) -> Range<usize> {
        0..self.len()
    }

    fn line(&self, idx: usize) -> Result<String, ViewError> {
        self.get(idx).cloned().ok_or(ViewError::OutOfRange(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_exposes_rendered_rows() {
        let mut parser = vt100::Parser::new(4, 20, 0);
        parser.process(b"first\r\n\x1b[1msecond\x1b[0m");

        assert_eq!(parser.line_count(), 4);
        assert_eq!(parser.viewport(), 0..4);
        assert_eq!(parser.line(0).unwrap(), "first");
        assert_eq!(parser.line(1).unwrap(), "second");
        assert!(matches!(parser.line(9), Err(ViewError::OutOfRange(9))));
    }

    #[test]
    fn plain_lines_are_fully_visible() {
        let lines = vec!["a".to_string(), "b".to_string()];
        assert_eq!(lines.viewport(), 0..2);
        assert_eq!(lines.line(1).unwrap(), "b");
        assert!(lines.line(2).is_err());
    }
}

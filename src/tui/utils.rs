use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    Frame,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorInfo {
    pub row: u16,
    pub col: u16,
    pub hidden: bool,
}

pub fn get_cursor_info(screen: &vt100::Screen) -> CursorInfo {
    let (row, col) = screen.cursor_position();
    CursorInfo {
        row,
        col,
        hidden: screen.hide_cursor(),
    }
}

/// Place the terminal cursor inside a pane. Agents often hide the cursor; the active pane still shows it.
pub fn render_cursor(frame: &mut Frame, inner_area: Rect, cursor: CursorInfo, force_visible: bool) {
    if inner_area.width == 0 || inner_area.height == 0 {
        return;
    }
    if cursor.hidden && !force_visible {
        return;
    }
    if cursor.row >= inner_area.height {
        return;
    }

    let max_col = inner_area.width.saturating_sub(1);
    let x = inner_area.x + cursor.col.min(max_col);
    let y = inner_area.y + cursor.row;
    frame.set_cursor_position((x, y));
}

pub fn convert_vt100_to_lines(screen: &vt100::Screen) -> Vec<Line<'static>> {
    let mut all_lines = Vec::new();
    let (rows, cols) = screen.size();

    for row in 0..rows {
        let mut spans = Vec::new();
        let mut current_text = String::new();
        let mut current_style = Style::default();

        for col in 0..cols {
            if let Some(cell) = screen.cell(row, col) {
                let cell_style = convert_vt100_cell_style(cell);
                if cell_style != current_style && !current_text.is_empty() {
                    spans.push(Span::styled(current_text.clone(), current_style));
                    current_text.clear();
                }
                current_style = cell_style;

                // Empty cells keep column alignment for full-screen programs.
                let contents = cell.contents();
                if contents.is_empty() {
                    current_text.push(' ');
                } else {
                    current_text.push_str(&contents);
                }
            }
        }

        let text = current_text.trim_end().to_string();
        if !text.is_empty() {
            spans.push(Span::styled(text, current_style));
        }
        all_lines.push(Line::from(spans));
    }

    all_lines
}

pub fn convert_vt100_cell_style(cell: &vt100::Cell) -> Style {
    let mut style = Style::default();

    let fg = cell.fgcolor();
    if !matches!(fg, vt100::Color::Default) {
        style = style.fg(convert_vt100_color(fg));
    }

    let bg = cell.bgcolor();
    if !matches!(bg, vt100::Color::Default) {
        style = style.bg(convert_vt100_color(bg));
    }

    if cell.bold() {
        style = style.add_modifier(Modifier::BOLD);
    }
    if cell.italic() {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if cell.underline() {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    // Inverse video is how many CLI apps draw their own cursor.
    if cell.inverse() {
        style = style.add_modifier(Modifier::REVERSED);
    }

    style
}

pub fn convert_vt100_color(color: vt100::Color) -> Color {
    match color {
        vt100::Color::Default => Color::Reset,
        vt100::Color::Idx(i) => Color::Indexed(i),
        vt100::Color::Rgb(r, g, b) => Color::Rgb(r, g, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styled_runs_become_spans() {
        let mut parser = vt100::Parser::new(3, 20, 0);
        parser.process(b"plain \x1b[31mred\x1b[0m");

        let lines = convert_vt100_to_lines(parser.screen());
        assert_eq!(lines.len(), 3);
        let first = &lines[0];
        assert_eq!(first.spans[0].content, "plain ");
        assert_eq!(first.spans[1].content, "red");
        assert_eq!(first.spans[1].style.fg, Some(Color::Indexed(1)));
        assert!(lines[1].spans.is_empty());
    }

    #[test]
    fn cursor_follows_the_screen() {
        let mut parser = vt100::Parser::new(5, 20, 0);
        parser.process(b"ab\r\ncd");
        let cursor = get_cursor_info(parser.screen());
        assert_eq!((cursor.row, cursor.col), (1, 2));
        assert!(!cursor.hidden);
    }
}

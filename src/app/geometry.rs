use crate::models::GridDims;
use ratatui::layout::{Constraint, Direction, Layout, Rect};

pub const MIN_PANE_COLS: u16 = 2;
pub const MIN_PANE_ROWS: u16 = 1;

/// Area left for the grid once the status bar takes the bottom line.
pub fn grid_area(width: u16, height: u16) -> Rect {
    Rect::new(0, 0, width, height.saturating_sub(1))
}

/// The first `count` cells of the grid, row-major.
pub fn grid_cells(area: Rect, dims: GridDims, count: usize) -> Vec<Rect> {
    let rows = dims.rows.max(1);
    let cols = dims.cols.max(1);

    let row_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, rows as u32); rows])
        .split(area);

    let mut cells = Vec::with_capacity(count);
    for row in row_areas.iter() {
        let col_areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, cols as u32); cols])
            .split(*row);
        for cell in col_areas.iter() {
            if cells.len() == count {
                return cells;
            }
            cells.push(*cell);
        }
    }
    cells
}

/// PTY size (cols, rows) for a bordered cell.
pub fn inner_size(cell: Rect) -> (u16, u16) {
    (
        cell.width.saturating_sub(2).max(MIN_PANE_COLS),
        cell.height.saturating_sub(2).max(MIN_PANE_ROWS),
    )
}

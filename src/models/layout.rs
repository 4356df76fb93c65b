use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of panes in one tab. Bounds the number of concurrent child processes.
pub const MAX_PANES: usize = 36;

/// Side length of the clamped grid used when the pane count exceeds [`MAX_PANES`].
const MAX_GRID_SIDE: usize = 6;

/// Direction the user last split in; decides how a grid is oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitOrientation {
    /// Panes stack downward (more rows than columns).
    #[default]
    Horizontal,
    /// Panes line up side by side (more columns than rows).
    Vertical,
}

impl SplitOrientation {
    pub fn label(&self) -> &'static str {
        match self {
            SplitOrientation::Horizontal => "horizontal",
            SplitOrientation::Vertical => "vertical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub rows: usize,
    pub cols: usize,
}

impl GridDims {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn capacity(&self) -> usize {
        self.rows * self.cols
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("a tab cannot hold more than {limit} panes")]
    Overflow { limit: usize },
}

/// A fixed rows x cols arrangement a user can pin at workspace setup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub id: &'static str,
    pub rows: usize,
    pub cols: usize,
}

impl GridLayout {
    const fn new(id: &'static str, rows: usize, cols: usize) -> Self {
        Self { id, rows, cols }
    }

    pub fn capacity(&self) -> usize {
        self.rows * self.cols
    }

    pub fn dims(&self) -> GridDims {
        GridDims::new(self.rows, self.cols)
    }

    /// Look up a catalog entry by id ("2x3"). Case and surrounding whitespace are ignored.
    pub fn find(id: &str) -> Option<&'static GridLayout> {
        let id = id.trim().to_lowercase();
        LAYOUT_CATALOG.iter().find(|layout| layout.id == id)
    }
}

/// Enumerated layouts, 1x1 up to 4x4 plus the asymmetric strips and rectangles.
pub const LAYOUT_CATALOG: &[GridLayout] = &[
    GridLayout::new("1x1", 1, 1),
    GridLayout::new("1x2", 1, 2),
    GridLayout::new("2x1", 2, 1),
    GridLayout::new("1x3", 1, 3),
    GridLayout::new("3x1", 3, 1),
    GridLayout::new("2x2", 2, 2),
    GridLayout::new("2x3", 2, 3),
    GridLayout::new("3x2", 3, 2),
    GridLayout::new("2x4", 2, 4),
    GridLayout::new("4x2", 4, 2),
    GridLayout::new("3x3", 3, 3),
    GridLayout::new("3x4", 3, 4),
    GridLayout::new("4x3", 4, 3),
    GridLayout::new("4x4", 4, 4),
];

/// Reject pane counts above the hard ceiling before any geometry is computed.
pub fn check_capacity(panes: usize) -> Result<(), LayoutError> {
    if panes > MAX_PANES {
        return Err(LayoutError::Overflow { limit: MAX_PANES });
    }
    Ok(())
}

/// Compute the grid for `panes` panes when no layout is pinned.
///
/// Picks the most square factorization rows * cols == panes. Primes fall back to a
/// single strip running in the preferred direction. Counts above the ceiling clamp
/// to 6x6.
pub fn compute_grid(panes: usize, preferred: SplitOrientation) -> GridDims {
    let panes = panes.max(1);
    if panes > MAX_PANES {
        return GridDims::new(MAX_GRID_SIDE, MAX_GRID_SIDE);
    }

    let (short, long) = most_square_factors(panes);

    if short == 1 {
        return match preferred {
            SplitOrientation::Horizontal => GridDims::new(long, 1),
            SplitOrientation::Vertical => GridDims::new(1, long),
        };
    }

    match preferred {
        SplitOrientation::Horizontal => GridDims::new(long, short),
        SplitOrientation::Vertical => GridDims::new(short, long),
    }
}

/// Grid to use for a tab: the pinned layout while it still has room, otherwise computed.
pub fn resolve_grid(
    panes: usize,
    preferred: SplitOrientation,
    pinned: Option<&GridLayout>,
) -> GridDims {
    match pinned {
        Some(layout) if panes <= layout.capacity() => layout.dims(),
        _ => compute_grid(panes, preferred),
    }
}

/// Divisor pair (short, long) of `n` with the smallest difference.
fn most_square_factors(n: usize) -> (usize, usize) {
    let mut best = (1, n);
    let mut candidate = 1;
    while candidate * candidate <= n {
        if n % candidate == 0 {
            best = (candidate, n / candidate);
        }
        candidate += 1;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_min_diff(n: usize) -> usize {
        (1..=n)
            .filter(|r| n % r == 0)
            .map(|r| r.abs_diff(n / r))
            .min()
            .unwrap()
    }

    #[test]
    fn grid_uses_exact_capacity_and_most_square_factors() {
        for n in 1..=MAX_PANES {
            for preferred in [SplitOrientation::Horizontal, SplitOrientation::Vertical] {
                let dims = compute_grid(n, preferred);
                assert_eq!(dims.capacity(), n, "n={n} {preferred:?}");
                assert_eq!(
                    dims.rows.abs_diff(dims.cols),
                    brute_force_min_diff(n),
                    "n={n} {preferred:?}"
                );
            }
        }
    }

    #[test]
    fn six_panes_orient_by_preference() {
        assert_eq!(compute_grid(6, SplitOrientation::Horizontal), GridDims::new(3, 2));
        assert_eq!(compute_grid(6, SplitOrientation::Vertical), GridDims::new(2, 3));
    }

    #[test]
    fn primes_fall_back_to_a_strip() {
        assert_eq!(compute_grid(7, SplitOrientation::Horizontal), GridDims::new(7, 1));
        assert_eq!(compute_grid(7, SplitOrientation::Vertical), GridDims::new(1, 7));
        assert_eq!(compute_grid(2, SplitOrientation::Vertical), GridDims::new(1, 2));
    }

    #[test]
    fn single_pane_is_one_cell() {
        assert_eq!(compute_grid(1, SplitOrientation::Horizontal), GridDims::new(1, 1));
        assert_eq!(compute_grid(0, SplitOrientation::Vertical), GridDims::new(1, 1));
    }

    #[test]
    fn square_counts_are_square() {
        assert_eq!(compute_grid(9, SplitOrientation::Vertical), GridDims::new(3, 3));
        assert_eq!(compute_grid(36, SplitOrientation::Horizontal), GridDims::new(6, 6));
    }

    #[test]
    fn counts_above_ceiling_clamp_and_are_rejected() {
        assert_eq!(compute_grid(37, SplitOrientation::Vertical), GridDims::new(6, 6));
        assert_eq!(
            check_capacity(37),
            Err(LayoutError::Overflow { limit: MAX_PANES })
        );
        assert!(check_capacity(36).is_ok());
    }

    #[test]
    fn pinned_layout_wins_while_it_has_room() {
        let pinned = GridLayout::find("2x3").unwrap();
        assert_eq!(
            resolve_grid(2, SplitOrientation::Horizontal, Some(pinned)),
            GridDims::new(2, 3)
        );
        assert_eq!(
            resolve_grid(6, SplitOrientation::Horizontal, Some(pinned)),
            GridDims::new(2, 3)
        );
        // Overflowing the pinned capacity goes back to the computed grid.
        assert_eq!(
            resolve_grid(7, SplitOrientation::Horizontal, Some(pinned)),
            GridDims::new(7, 1)
        );
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(GridLayout::find(" 4X4 ").map(|l| l.capacity()), Some(16));
        assert!(GridLayout::find("5x5").is_none());
    }
}

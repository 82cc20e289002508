//! Geometry of the virtualized definition grid.
//!
//! Cells are laid out row-major: the cell at (row, col) shows global index
//! `columns * row + col`. Only the rows inside the viewport are ever
//! resolved, so the grid can span every stored definition.

/// Default cell width in terminal columns
pub const DEFAULT_COLUMN_WIDTH: u16 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: u64,
    pub rows: u64,
    pub total: u64,
}

impl GridLayout {
    /// Fit as many `column_width`-wide columns into `width` as possible
    /// (always at least one) and enough rows to show `total` cells.
    pub fn new(width: u16, column_width: u16, total: u64) -> Self {
        let columns = u64::from(width / column_width.max(1)).max(1);
        Self {
            columns,
            rows: total.div_ceil(columns),
            total,
        }
    }

    /// Width each column actually gets once spare space is shared out
    pub fn cell_width(&self, width: u16) -> u16 {
        (u64::from(width) / self.columns) as u16
    }

    pub fn global_index(&self, row: u64, col: u64) -> u64 {
        self.columns * row + col
    }

    /// (row, col) of a global index
    pub fn position_of(&self, index: u64) -> (u64, u64) {
        (index / self.columns, index % self.columns)
    }

    /// Whether (row, col) holds a cell
    pub fn contains(&self, row: u64, col: u64) -> bool {
        col < self.columns && self.global_index(row, col) < self.total
    }
}

/// First visible row after scrolling just enough to show `selected_row`.
pub fn scroll_to_show(first_row: u64, visible_rows: u64, selected_row: u64) -> u64 {
    let visible_rows = visible_rows.max(1);
    if selected_row < first_row {
        selected_row
    } else if selected_row >= first_row + visible_rows {
        selected_row + 1 - visible_rows
    } else {
        first_row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_columns_and_rows() {
        let grid = GridLayout::new(100, 28, 10);
        assert_eq!(grid.columns, 3);
        assert_eq!(grid.rows, 4); // last row partially filled
        assert_eq!(grid.cell_width(100), 33);
    }

    #[test]
    fn test_layout_narrow_terminal_keeps_one_column() {
        let grid = GridLayout::new(10, 28, 5);
        assert_eq!(grid.columns, 1);
        assert_eq!(grid.rows, 5);

        let zero_width = GridLayout::new(80, 0, 5);
        assert_eq!(zero_width.columns, 80);
    }

    #[test]
    fn test_index_position_round_trip() {
        let grid = GridLayout::new(120, 30, 1000);
        assert_eq!(grid.global_index(2, 3), 11);
        assert_eq!(grid.position_of(11), (2, 3));
        assert!(grid.contains(249, 3));
        assert!(!grid.contains(250, 0));
        assert!(!grid.contains(0, 4));
    }

    #[test]
    fn test_empty_grid() {
        let grid = GridLayout::new(80, 20, 0);
        assert_eq!(grid.rows, 0);
        assert!(!grid.contains(0, 0));
    }

    #[test]
    fn test_scroll_to_show() {
        assert_eq!(scroll_to_show(0, 10, 5), 0);
        assert_eq!(scroll_to_show(0, 10, 10), 1);
        assert_eq!(scroll_to_show(20, 10, 3), 3);
        assert_eq!(scroll_to_show(5, 0, 5), 5);
    }
}

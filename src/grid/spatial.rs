//! Fixed-point spatial hashing into cells
//!
//! Maps grid-unit coordinates (raw fixed-point position divided by the
//! scale factor) to integer cell ids, and a query point to the small set
//! of cells that must be scanned. Neighbor bounding is a box, not a
//! radius: queries return a superset of true neighbors and callers filter
//! further if they need exact ranges.

use smallvec::SmallVec;

/// Candidate cells for one query point; at most 4 with the 2x2 window
pub type CellSet = SmallVec<[i32; 4]>;

/// Position-to-cell mapping for one grid's dimensions
#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: i32,
    /// Inverse cell size, precomputed for fast position-to-cell conversion
    conv_factor: f32,
    width: i32,
}

impl SpatialHash {
    /// `max` must be evenly divisible by `cell_size`; the grid validates
    /// this before construction.
    pub fn new(max: i32, cell_size: i32) -> Self {
        Self {
            cell_size,
            conv_factor: 1.0 / cell_size as f32,
            width: max / cell_size,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn cell_count(&self) -> i32 {
        self.width * self.width
    }

    /// Cell id for a grid-unit position
    #[inline]
    pub fn hash(&self, x: i32, y: i32) -> i32 {
        (x as f32 * self.conv_factor) as i32 + (y as f32 * self.conv_factor) as i32 * self.width
    }

    /// Cells covering a 2x`cell_size` window around the point
    ///
    /// Candidate rows are `{x - cell_size, x}` and candidate columns are
    /// `{y - cell_size, y}`; combinations with a negative coordinate are
    /// out of grid bounds and skipped. The window can both over- and
    /// under-cover a full 3x3 neighborhood at cell boundaries; callers
    /// rely on these exact semantics.
    pub fn cells_within_bounds(&self, x: i32, y: i32) -> CellSet {
        let mut cells = CellSet::new();
        let offset = self.cell_size;

        let start_x = x - offset;
        let start_y = y - offset;
        // keep the end of the window from hashing into the next cell over
        let end_x = x + offset - 1;
        let end_y = y + offset - 1;

        let mut row = start_x;
        while row <= end_x {
            let mut col = start_y;
            while col <= end_y {
                if row >= 0 && col >= 0 {
                    let cell = self.hash(row, col);
                    if !cells.contains(&cell) {
                        cells.push(cell);
                    }
                }
                col += offset;
            }
            row += offset;
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_matches_cell_formula() {
        // max=1000, cell_size=100 => width=10
        let spatial = SpatialHash::new(1000, 100);
        assert_eq!(spatial.width(), 10);
        assert_eq!(spatial.cell_count(), 100);

        assert_eq!(spatial.hash(0, 0), 0);
        assert_eq!(spatial.hash(250, 250), 2 + 2 * 10);
        assert_eq!(spatial.hash(999, 999), 9 + 9 * 10);
    }

    #[test]
    fn test_same_cell_for_nearby_points() {
        let spatial = SpatialHash::new(1000, 100);
        assert_eq!(spatial.hash(250, 250), spatial.hash(260, 255));
    }

    #[test]
    fn test_interior_point_yields_four_cells() {
        let spatial = SpatialHash::new(1000, 100);
        let cells = spatial.cells_within_bounds(250, 250);

        assert_eq!(cells.len(), 4);
        // own cell plus the row/column one cell toward the origin
        assert!(cells.contains(&spatial.hash(250, 250)));
        assert!(cells.contains(&spatial.hash(150, 250)));
        assert!(cells.contains(&spatial.hash(250, 150)));
        assert!(cells.contains(&spatial.hash(150, 150)));
    }

    #[test]
    fn test_origin_skips_negative_candidates() {
        let spatial = SpatialHash::new(1000, 100);
        let cells = spatial.cells_within_bounds(50, 50);

        // x-100 and y-100 are negative, only the point's own cell remains
        assert_eq!(cells.len(), 1);
        assert!(cells.contains(&spatial.hash(50, 50)));
    }

    #[test]
    fn test_edge_column_yields_two_cells() {
        let spatial = SpatialHash::new(1000, 100);
        let cells = spatial.cells_within_bounds(250, 50);

        assert_eq!(cells.len(), 2);
        assert!(cells.contains(&spatial.hash(250, 50)));
        assert!(cells.contains(&spatial.hash(150, 50)));
    }

    #[test]
    fn test_window_does_not_reach_next_cell_boundary() {
        let spatial = SpatialHash::new(1000, 100);
        // exactly on a boundary: the +offset-1 end keeps the window from
        // spilling into the cell after the query point's own
        let cells = spatial.cells_within_bounds(200, 200);
        for cell in &cells {
            assert!(*cell <= spatial.hash(200, 200));
        }
    }
}

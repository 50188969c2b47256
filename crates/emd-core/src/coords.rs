/// Grid coordinate types and flat-index addressing.
/// Flat indices are column-major: `index = col * size + row`.

/// Reference resolution the physical grid spacing is normalised against.
/// 2^7 + 1 vertices, i.e. 128 tiles across.
pub const REFERENCE_SIZE: usize = 129;

/// A vertex position on an N×N grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub col: usize,
    pub row: usize,
}

impl GridCoord {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// Recover the coordinate of a flat index.
    #[inline]
    pub fn from_index(index: usize, size: usize) -> Self {
        Self {
            col: index / size,
            row: index % size,
        }
    }

    #[inline]
    pub fn index(self, size: usize) -> usize {
        self.col * size + self.row
    }

    /// Neighbour at a signed `(dc, dr)` offset, or `None` if it falls off the grid.
    pub fn offset(self, dc: isize, dr: isize, size: usize) -> Option<Self> {
        let col = self.col.checked_add_signed(dc)?;
        let row = self.row.checked_add_signed(dr)?;
        (col < size && row < size).then_some(Self { col, row })
    }

    /// Euclidean distance in grid units.
    pub fn grid_distance(self, other: Self) -> f64 {
        let dc = self.col as f64 - other.col as f64;
        let dr = self.row as f64 - other.row as f64;
        dc.hypot(dr)
    }
}

/// Physical distance between two adjacent vertices of an N×N grid:
/// `(reference - 1) / (size - 1)`.
///
/// A terrain of any resolution then spans the same physical extent as one at
/// the reference resolution. `size` must be at least 2.
pub fn grid_spacing(size: usize, reference: usize) -> f64 {
    (reference as f64 - 1.0) / (size as f64 - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip_covers_every_vertex() {
        for size in 2..8 {
            for index in 0..size * size {
                let c = GridCoord::from_index(index, size);
                assert!(c.col < size && c.row < size);
                assert_eq!(c.index(size), index);
            }
        }
    }

    #[test]
    fn column_major_layout() {
        // Moving one column moves `size` flat positions; one row moves one.
        let size = 5;
        let c = GridCoord::new(2, 3);
        assert_eq!(c.offset(1, 0, size).map(|n| n.index(size)), Some(c.index(size) + size));
        assert_eq!(c.offset(0, 1, size).map(|n| n.index(size)), Some(c.index(size) + 1));
    }

    #[test]
    fn offset_rejects_out_of_bounds() {
        let c = GridCoord::new(0, 4);
        assert!(c.offset(-1, 0, 5).is_none());
        assert!(c.offset(0, 1, 5).is_none());
        assert_eq!(c.offset(1, -1, 5), Some(GridCoord::new(1, 3)));
    }

    #[test]
    fn spacing_matches_reference_grid() {
        assert_eq!(grid_spacing(129, REFERENCE_SIZE), 1.0);
        assert_eq!(grid_spacing(5, REFERENCE_SIZE), 32.0);
        assert_eq!(grid_spacing(3, 3), 1.0);
    }
}

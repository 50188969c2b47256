use serde::{Deserialize, Serialize};

use crate::coords::GridCoord;
use crate::error::{EmdError, Result};

/// A square N×N grid stored flat in column-major order (`col * size + row`).
///
/// On disk a grid is a JSON array of columns, each an array of row values, so
/// `grid[col][row]` in the file is `data[col * size + row]` in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<T>>", into = "Vec<Vec<T>>")]
#[serde(bound(
    serialize = "T: Clone + Serialize",
    deserialize = "T: Clone + Deserialize<'de>"
))]
pub struct Grid<T> {
    size: usize,
    data: Vec<T>,
}

/// Elevation / mass values per vertex.
pub type Terrain = Grid<f64>;

/// Flatten a column-major 2D grid (`grid[col][row]`) into its flat form.
///
/// Fails if the grid is not square.
pub fn flatten<T: Clone>(grid: &[Vec<T>]) -> Result<Vec<T>> {
    let size = grid.len();
    let mut flat = Vec::with_capacity(size * size);
    for (col, column) in grid.iter().enumerate() {
        if column.len() != size {
            return Err(EmdError::mismatch(
                format!("column {col}"),
                size,
                format!("{} rows", column.len()),
            ));
        }
        flat.extend_from_slice(column);
    }
    Ok(flat)
}

/// Inverse of [`flatten`]: split a flat sequence of `size * size` values into columns.
pub fn unflatten<T: Clone>(flat: &[T], size: usize) -> Result<Vec<Vec<T>>> {
    if flat.len() != size * size {
        return Err(EmdError::mismatch(
            "flat grid",
            size,
            format!("{} values", flat.len()),
        ));
    }
    if size == 0 {
        return Ok(Vec::new());
    }
    Ok(flat.chunks(size).map(<[T]>::to_vec).collect())
}

impl<T: Clone> Grid<T> {
    /// Create a grid filled with `fill`.
    pub fn filled(size: usize, fill: T) -> Result<Self> {
        check_size(size)?;
        Ok(Self {
            size,
            data: vec![fill; size * size],
        })
    }

    /// Wrap an already-flattened column-major buffer.
    pub fn from_flat(size: usize, data: Vec<T>) -> Result<Self> {
        check_size(size)?;
        if data.len() != size * size {
            return Err(EmdError::mismatch(
                "flat grid",
                size,
                format!("{} values", data.len()),
            ));
        }
        Ok(Self { size, data })
    }

    /// Build from `grid[col][row]` columns.
    pub fn from_columns(columns: &[Vec<T>]) -> Result<Self> {
        let data = flatten(columns)?;
        Self::from_flat(columns.len(), data)
    }

    pub fn to_columns(&self) -> Vec<Vec<T>> {
        self.data.chunks(self.size).map(<[T]>::to_vec).collect()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of vertices, `size * size`.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn get(&self, coord: GridCoord) -> &T {
        &self.data[coord.index(self.size)]
    }

    #[inline]
    pub fn set(&mut self, coord: GridCoord, val: T) {
        let i = coord.index(self.size);
        self.data[i] = val;
    }

    /// Fail with a dimension mismatch unless this grid is `size`×`size`.
    pub fn expect_size(&self, what: &str, size: usize) -> Result<()> {
        if self.size != size {
            return Err(EmdError::mismatch(
                what,
                size,
                format!("{0}x{0}", self.size),
            ));
        }
        Ok(())
    }
}

impl Terrain {
    /// Total mass (sum over every vertex).
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Smallest vertex value; used to sanity check solver output.
    pub fn min_value(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }
}

fn check_size(size: usize) -> Result<()> {
    if size < 2 {
        return Err(EmdError::GridTooSmall(size));
    }
    Ok(())
}

impl<T: Clone> TryFrom<Vec<Vec<T>>> for Grid<T> {
    type Error = EmdError;

    fn try_from(columns: Vec<Vec<T>>) -> Result<Self> {
        Self::from_columns(&columns)
    }
}

impl<T: Clone> From<Grid<T>> for Vec<Vec<T>> {
    fn from(grid: Grid<T>) -> Self {
        grid.to_columns()
    }
}

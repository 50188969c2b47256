//! Pairwise ground distances between every ordered pair of grid vertices.
//!
//! For an N×N grid this is an N²×N² matrix: the O(N⁴) part of every model.
//! It is built once and shared by the objective coefficients and the post-hoc
//! cost recomputation.

use crate::coords::GridCoord;

#[cfg(feature = "threading")]
use rayon::prelude::*;

/// Dense, immutable ground-distance matrix indexed by flat vertex indices.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    size: usize,
    scale: f64,
    /// Row-major `n × n` where `n = size²`; entry `i * n + j` is `d(i, j)`.
    data: Vec<f64>,
}

impl DistanceMatrix {
    /// `d(i, j) = sqrt((ic − jc)² + (ir − jr)²) · scale`.
    pub fn build(size: usize, scale: f64) -> Self {
        let n = size * size;
        let mut data = vec![0.0f64; n * n];

        let fill_row = |i: usize, row: &mut [f64]| {
            let from = GridCoord::from_index(i, size);
            for (j, d) in row.iter_mut().enumerate() {
                *d = from.grid_distance(GridCoord::from_index(j, size)) * scale;
            }
        };

        #[cfg(feature = "threading")]
        data.par_chunks_mut(n.max(1))
            .enumerate()
            .for_each(|(i, row)| fill_row(i, row));

        #[cfg(not(feature = "threading"))]
        data.chunks_mut(n.max(1))
            .enumerate()
            .for_each(|(i, row)| fill_row(i, row));

        log::debug!("distance matrix built: {n}x{n} entries, scale {scale}");
        Self { size, scale, data }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.vertices() + j]
    }

    /// Distances from vertex `i` to every vertex, in flat-index order.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.vertices();
        &self.data[i * n..(i + 1) * n]
    }

    /// Grid side length N.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of vertices, N².
    pub fn vertices(&self) -> usize {
        self.size * self.size
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Largest ground distance: the diagonal across the whole grid.
    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(0.0, f64::max)
    }
}

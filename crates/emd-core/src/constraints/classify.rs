use std::collections::BTreeMap;

use super::flags::{ConstraintFlags, ConstraintGrids};
use super::topology::{Quadrant, Region};
use crate::error::Result;

/// Flat vertex index → constraint parameter, for one topology class.
pub type Bucket<T> = BTreeMap<usize, T>;

/// Bound on the directional derivative along a unit direction `(col, row)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalBound {
    pub bound: f64,
    pub direction: (f64, f64),
}

impl DirectionalBound {
    /// Split a `(c0, c1)` vector into its length and unit direction.
    /// A zero vector carries no direction and yields `None`.
    pub fn from_vector(c0: f64, c1: f64) -> Option<Self> {
        let bound = c0.hypot(c1);
        if bound <= 0.0 || !bound.is_finite() {
            return None;
        }
        Some(Self {
            bound,
            direction: (c0 / bound, c1 / bound),
        })
    }
}

/// Every local constraint of a model, bucketed by neighbour topology.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintBuckets {
    gradient: [Bucket<f64>; 4],
    derivative: [Bucket<DirectionalBound>; 4],
    roughness: [Bucket<f64>; 9],
    position: Bucket<f64>,
}

impl ConstraintBuckets {
    pub fn gradient(&self, quadrant: Quadrant) -> &Bucket<f64> {
        &self.gradient[quadrant as usize]
    }

    pub fn derivative(&self, quadrant: Quadrant) -> &Bucket<DirectionalBound> {
        &self.derivative[quadrant as usize]
    }

    pub fn roughness(&self, region: Region) -> &Bucket<f64> {
        &self.roughness[region as usize]
    }

    pub fn position(&self) -> &Bucket<f64> {
        &self.position
    }

    /// True when no vertex carries any constraint.
    pub fn is_empty(&self) -> bool {
        self.gradient.iter().all(BTreeMap::is_empty)
            && self.derivative.iter().all(BTreeMap::is_empty)
            && self.roughness.iter().all(BTreeMap::is_empty)
            && self.position.is_empty()
    }

    /// Entries per class: (gradient, derivative, roughness, position).
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.gradient.iter().map(BTreeMap::len).sum(),
            self.derivative.iter().map(BTreeMap::len).sum(),
            self.roughness.iter().map(BTreeMap::len).sum(),
            self.position.len(),
        )
    }
}

/// Bucket every constrained vertex of an N×N terrain.
///
/// `None` means a constraint-free model and yields empty buckets. Grids of a
/// different size fail with a dimension mismatch.
pub fn classify(size: usize, grids: Option<&ConstraintGrids>) -> Result<ConstraintBuckets> {
    let mut buckets = ConstraintBuckets::default();
    let Some(grids) = grids else {
        return Ok(buckets);
    };
    grids.flags.expect_size("constraint flags", size)?;
    grids.params.expect_size("constraint params", size)?;

    for (index, params) in grids.with_flag(ConstraintFlags::GRADIENT) {
        for q in Quadrant::ALL {
            if q.neighbours(index, size).is_some() {
                buckets.gradient[q as usize].insert(index, params[0]);
            }
        }
    }

    for (index, params) in grids.with_flag(ConstraintFlags::DERIVATIVE) {
        let Some(bound) = DirectionalBound::from_vector(params[0], params[1]) else {
            log::warn!("directional derivative at vertex {index} has no direction, skipped");
            continue;
        };
        for q in Quadrant::ALL {
            if q.neighbours(index, size).is_some() {
                buckets.derivative[q as usize].insert(index, bound);
            }
        }
    }

    for (index, params) in grids.with_flag(ConstraintFlags::ROUGHNESS) {
        buckets.roughness[Region::of(index, size) as usize].insert(index, params[0]);
    }

    for (index, params) in grids.with_flag(ConstraintFlags::POSITION) {
        buckets.position.insert(index, params[2]);
    }

    let (g, d, r, p) = buckets.counts();
    log::debug!("classified constraints: {g} gradient, {d} derivative, {r} roughness, {p} position");
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::GridCoord;
    use crate::terrain::Grid;

    fn grids(size: usize, flags: ConstraintFlags, params: [f64; 3]) -> ConstraintGrids {
        ConstraintGrids::new(
            Grid::filled(size, flags).unwrap(),
            Grid::filled(size, params).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn no_grids_means_no_constraints() {
        assert!(classify(4, None).unwrap().is_empty());
    }

    #[test]
    fn zero_flags_ignore_params() {
        let g = grids(5, ConstraintFlags::NONE, [3.0, -1.0, 7.0]);
        assert!(classify(5, Some(&g)).unwrap().is_empty());
    }

    #[test]
    fn roughness_regions_are_exclusive() {
        let size = 5;
        let g = grids(size, ConstraintFlags::ROUGHNESS, [0.5, 0.0, 0.0]);
        let b = classify(size, Some(&g)).unwrap();

        let total: usize = Region::ALL.iter().map(|&r| b.roughness(r).len()).sum();
        assert_eq!(total, size * size);
        assert_eq!(b.roughness(Region::Interior).len(), 9);

        for index in 0..size * size {
            let at = GridCoord::from_index(index, size);
            let holders: Vec<Region> = Region::ALL
                .into_iter()
                .filter(|&r| b.roughness(r).contains_key(&index))
                .collect();
            assert_eq!(holders.len(), 1);
            let interior = (1..size - 1).contains(&at.col) && (1..size - 1).contains(&at.row);
            if interior {
                assert_eq!(holders[0], Region::Interior);
            }
        }
        for corner in Region::ALL.into_iter().filter(|r| r.is_corner()) {
            assert_eq!(b.roughness(corner).len(), 1);
        }
    }

    #[test]
    fn gradient_quadrants_respect_boundaries() {
        let size = 3;
        let g = grids(size, ConstraintFlags::GRADIENT, [0.1, 0.0, 0.0]);
        let b = classify(size, Some(&g)).unwrap();
        for q in Quadrant::ALL {
            // 2x2 block of vertices has both neighbours inside a 3x3 grid.
            assert_eq!(b.gradient(q).len(), 4, "{q:?}");
        }
        assert!(b.gradient(Quadrant::NorthEast).contains_key(&0));
        assert!(!b.gradient(Quadrant::SouthWest).contains_key(&0));
    }

    #[test]
    fn derivative_splits_vector_into_bound_and_direction() {
        let size = 2;
        let g = grids(size, ConstraintFlags::DERIVATIVE, [3.0, 4.0, 0.0]);
        let b = classify(size, Some(&g)).unwrap();
        let d = b.derivative(Quadrant::NorthEast)[&0];
        assert_eq!(d.bound, 5.0);
        assert_eq!(d.direction, (0.6, 0.8));

        let flat = grids(size, ConstraintFlags::DERIVATIVE, [0.0, 0.0, 0.0]);
        assert!(classify(size, Some(&flat)).unwrap().is_empty());
    }

    #[test]
    fn position_uses_third_parameter() {
        let size = 2;
        let mut flags = Grid::filled(size, ConstraintFlags::NONE).unwrap();
        flags.set(GridCoord::new(1, 1), ConstraintFlags::POSITION);
        let g = ConstraintGrids::new(flags, Grid::filled(size, [1.0, 2.0, 9.5]).unwrap()).unwrap();
        let b = classify(size, Some(&g)).unwrap();
        assert_eq!(b.position().len(), 1);
        assert_eq!(b.position()[&3], 9.5);
    }

    #[test]
    fn mismatched_grids_fail_fast() {
        let g = grids(3, ConstraintFlags::GRADIENT, [0.1, 0.0, 0.0]);
        assert!(classify(4, Some(&g)).is_err());
    }
}

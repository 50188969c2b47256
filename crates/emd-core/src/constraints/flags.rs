use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::terrain::Grid;

/// Per-vertex constraint bitmask.
///
/// Bit layout on disk: `bit0` gradient, `bit1` directional derivative,
/// `bit2` roughness, `bit3` position. Unknown bits are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintFlags(pub u8);

impl ConstraintFlags {
    pub const NONE: Self = Self(0);
    pub const GRADIENT: Self = Self(1 << 0);
    pub const DERIVATIVE: Self = Self(1 << 1);
    pub const ROUGHNESS: Self = Self(1 << 2);
    pub const POSITION: Self = Self(1 << 3);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 & 0b1111 == 0
    }
}

impl std::ops::BitOr for ConstraintFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Per-vertex constraint parameters `(c0, c1, c2)`.
///
/// - gradient, roughness: `c0` is the bound.
/// - directional derivative: `(c0, c1)` is a vector whose direction is the
///   derivative direction and whose length is the bound.
/// - position: `c2` is the fixed elevation.
pub type ConstraintParams = [f64; 3];

/// Flag and parameter grids describing every local constraint on a terrain.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintGrids {
    pub flags: Grid<ConstraintFlags>,
    pub params: Grid<ConstraintParams>,
}

impl ConstraintGrids {
    /// Pair a flag grid with a parameter grid; both must have the same size.
    pub fn new(flags: Grid<ConstraintFlags>, params: Grid<ConstraintParams>) -> Result<Self> {
        params.expect_size("constraint params", flags.size())?;
        Ok(Self { flags, params })
    }

    /// Unconstrained grids of the given size.
    pub fn empty(size: usize) -> Result<Self> {
        Ok(Self {
            flags: Grid::filled(size, ConstraintFlags::NONE)?,
            params: Grid::filled(size, [0.0; 3])?,
        })
    }

    pub fn size(&self) -> usize {
        self.flags.size()
    }

    /// Flat indices and parameters of every vertex with `flag` set.
    pub fn with_flag(
        &self,
        flag: ConstraintFlags,
    ) -> impl Iterator<Item = (usize, &ConstraintParams)> + '_ {
        self.flags
            .as_slice()
            .iter()
            .zip(self.params.as_slice())
            .enumerate()
            .filter(move |(_, (f, _))| f.contains(flag))
            .map(|(i, (_, p))| (i, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_independent() {
        let f = ConstraintFlags(0b1010);
        assert!(f.contains(ConstraintFlags::DERIVATIVE));
        assert!(f.contains(ConstraintFlags::POSITION));
        assert!(!f.contains(ConstraintFlags::GRADIENT));
        assert!(!f.contains(ConstraintFlags::ROUGHNESS));
        assert!(!f.contains(ConstraintFlags::NONE));
        assert!(ConstraintFlags(0b1_0000).is_empty());
    }

    #[test]
    fn flags_deserialize_from_integers() {
        let g: Grid<ConstraintFlags> = serde_json::from_str("[[1, 0], [12, 15]]").unwrap();
        assert_eq!(g.as_slice()[2], ConstraintFlags::ROUGHNESS | ConstraintFlags::POSITION);
    }

    #[test]
    fn mismatched_params_are_rejected() {
        let flags = Grid::filled(3, ConstraintFlags::GRADIENT).unwrap();
        let params = Grid::filled(4, [0.0; 3]).unwrap();
        assert!(ConstraintGrids::new(flags, params).is_err());
    }
}

//! Closed set of neighbour topologies used by the local constraints.
//!
//! Offsets are `(dc, dr)` pairs: a column step moves `±N` flat positions, a row
//! step moves `±1`.
//! ```text
//!   NW(-1,+1)  N( 0,+1)  NE(+1,+1)
//!   W (-1, 0)  *         E (+1, 0)
//!   SW(-1,-1)  S( 0,-1)  SE(+1,-1)
//! ```

use crate::coords::GridCoord;

/// Quadrant around a vertex spanned by one column neighbour and one row
/// neighbour. Gradient and directional-derivative constraints are posed per
/// quadrant, rotating clockwise from north-east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quadrant {
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

/// Flat indices of the two axis neighbours spanning a quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadrantNeighbours {
    /// Column-adjacent neighbour (`±N`).
    pub col: usize,
    /// Row-adjacent neighbour (`±1`).
    pub row: usize,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthEast,
        Quadrant::SouthEast,
        Quadrant::SouthWest,
        Quadrant::NorthWest,
    ];

    /// `(dc, dr)` step towards the quadrant; also the sign that turns a forward
    /// difference in this quadrant into a gradient component.
    pub const fn steps(self) -> (isize, isize) {
        match self {
            Quadrant::NorthEast => (1, 1),
            Quadrant::SouthEast => (1, -1),
            Quadrant::SouthWest => (-1, -1),
            Quadrant::NorthWest => (-1, 1),
        }
    }

    /// Axis neighbours of `index`, or `None` when the quadrant leaves the grid.
    pub fn neighbours(self, index: usize, size: usize) -> Option<QuadrantNeighbours> {
        let (dc, dr) = self.steps();
        let at = GridCoord::from_index(index, size);
        let col = at.offset(dc, 0, size)?.index(size);
        let row = at.offset(0, dr, size)?.index(size);
        Some(QuadrantNeighbours { col, row })
    }
}

/// Boundary class of a vertex: four corners, four edges, or the interior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    SouthWestCorner,
    SouthEastCorner,
    NorthEastCorner,
    NorthWestCorner,
    WestEdge,
    EastEdge,
    SouthEdge,
    NorthEdge,
    Interior,
}

const SW_CORNER: [(isize, isize); 3] = [(0, 1), (1, 0), (1, 1)];
const SE_CORNER: [(isize, isize); 3] = [(0, 1), (-1, 0), (-1, 1)];
const NE_CORNER: [(isize, isize); 3] = [(0, -1), (-1, 0), (-1, -1)];
const NW_CORNER: [(isize, isize); 3] = [(0, -1), (1, 0), (1, -1)];
const W_EDGE: [(isize, isize); 5] = [(0, -1), (0, 1), (1, -1), (1, 0), (1, 1)];
const E_EDGE: [(isize, isize); 5] = [(0, -1), (0, 1), (-1, -1), (-1, 0), (-1, 1)];
const S_EDGE: [(isize, isize); 5] = [(-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)];
const N_EDGE: [(isize, isize); 5] = [(-1, 0), (1, 0), (-1, -1), (0, -1), (1, -1)];
const INTERIOR: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl Region {
    pub const ALL: [Region; 9] = [
        Region::SouthWestCorner,
        Region::SouthEastCorner,
        Region::NorthEastCorner,
        Region::NorthWestCorner,
        Region::WestEdge,
        Region::EastEdge,
        Region::SouthEdge,
        Region::NorthEdge,
        Region::Interior,
    ];

    /// Classify a vertex. Corners win over edges, edges over the interior.
    pub fn of(index: usize, size: usize) -> Self {
        let GridCoord { col, row } = GridCoord::from_index(index, size);
        let last = size - 1;
        match (col, row) {
            (0, 0) => Region::SouthWestCorner,
            (c, 0) if c == last => Region::SouthEastCorner,
            (c, r) if c == last && r == last => Region::NorthEastCorner,
            (0, r) if r == last => Region::NorthWestCorner,
            (0, _) => Region::WestEdge,
            (c, _) if c == last => Region::EastEdge,
            (_, 0) => Region::SouthEdge,
            (_, r) if r == last => Region::NorthEdge,
            _ => Region::Interior,
        }
    }

    /// `(dc, dr)` offsets of every neighbour that exists for this region.
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Region::SouthWestCorner => &SW_CORNER,
            Region::SouthEastCorner => &SE_CORNER,
            Region::NorthEastCorner => &NE_CORNER,
            Region::NorthWestCorner => &NW_CORNER,
            Region::WestEdge => &W_EDGE,
            Region::EastEdge => &E_EDGE,
            Region::SouthEdge => &S_EDGE,
            Region::NorthEdge => &N_EDGE,
            Region::Interior => &INTERIOR,
        }
    }

    pub fn is_corner(self) -> bool {
        matches!(
            self,
            Region::SouthWestCorner
                | Region::SouthEastCorner
                | Region::NorthEastCorner
                | Region::NorthWestCorner
        )
    }

    /// Flat indices of the neighbours of `index`, which must belong to this region.
    pub fn neighbours(self, index: usize, size: usize) -> impl Iterator<Item = usize> {
        let size = size as isize;
        let index = index as isize;
        self.offsets()
            .iter()
            .map(move |&(dc, dr)| (index + dc * size + dr) as usize)
    }
}

//! Local geometric constraints on a synthesized terrain: flag/parameter grids,
//! neighbour topologies, and the bucketing that feeds the model builder.
pub mod classify;
pub mod flags;
pub mod topology;

pub use classify::{classify, Bucket, ConstraintBuckets, DirectionalBound};
pub use flags::{ConstraintFlags, ConstraintGrids, ConstraintParams};
pub use topology::{Quadrant, QuadrantNeighbours, Region};

//! From a decomposed block set to an exact-cover model: gap filling, vertical block fixing and
//! model construction.

pub mod filler;
pub mod vertical;
pub mod model;

pub use filler::{CoverageFiller, RowCoverage, check_complete_cover};
pub use model::{CellConstraint, ConstraintForm, CoverModel, CoverModelBuilder, Objective, Sense};
pub use vertical::{VerticalBlockOptimizer, VerticalChain, VerticalOptimization};

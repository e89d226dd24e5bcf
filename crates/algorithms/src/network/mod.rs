//! Channel networks built from head cells
//!
//! - [`JunctionNetwork`]: links, junctions and Strahler order over a flow graph
//! - Chi profiles and the split search used to refine head positions

mod chi;
mod junction;

pub use chi::{best_split, chi_profile, refine_heads, segment_misfit};
pub use junction::{ExportRow, JunctionNetwork, NO_JUNCTION};

//! Binary morphology on channel masks
//!
//! - **Components**: 8-connected labeling and size filtering
//! - **Skeleton**: Zhang-Suen thinning to one-cell-wide centrelines
//! - **Endpoints**: skeleton tips and per-component upstream pruning
//!
//! Masks are `Raster<u8>` holding 1 for foreground and 0 for background.

mod components;
mod endpoints;
mod skeleton;

pub use components::{connected_components, filter_by_size, ComponentLabels};
pub use endpoints::{find_endpoints, remove_downstream_endpoints};
pub use skeleton::{skeletonize, Skeletonize};

use drainnet_core::raster::Raster;

/// Whether (row, col) is inside the mask and set.
#[inline]
pub(crate) fn is_set(mask: &Raster<u8>, row: usize, col: usize) -> bool {
    matches!(mask.data().get((row, col)), Some(&v) if v == 1)
}

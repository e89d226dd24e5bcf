//! Skeleton endpoints and upstream-tip selection

use drainnet_core::raster::{Neighborhood, NeighborhoodIterator, Raster};
use drainnet_core::Result;

use super::components::ComponentLabels;
use super::is_set;

/// Skeleton cells with exactly one 8-connected skeleton neighbour, as
/// flattened indices in row-major order.
pub fn find_endpoints(skeleton: &Raster<u8>) -> Vec<usize> {
    let (rows, cols) = skeleton.shape();
    let mut endpoints = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if !is_set(skeleton, r, c) {
                continue;
            }
            let neighbours = NeighborhoodIterator::new(skeleton, r, c, Neighborhood::Queen3x3)
                .flatten()
                .filter(|&(_, _, v)| v == 1)
                .count();
            if neighbours == 1 {
                endpoints.push(r * cols + c);
            }
        }
    }
    endpoints
}

/// Keep only the most upstream endpoint of each component.
///
/// "Most upstream" is the highest elevation; equal elevations go to the
/// smaller index. Endpoints outside every component or on no-data
/// elevation are dropped. The survivors come back in ascending order.
pub fn remove_downstream_endpoints(
    endpoints: &[usize],
    components: &ComponentLabels,
    elevation: &Raster<f64>,
) -> Result<Vec<usize>> {
    elevation.ensure_same_shape(&components.labels)?;
    let cols = elevation.cols();

    let mut best: Vec<Option<(f64, usize)>> = vec![None; components.count()];
    for &node in endpoints {
        let (r, c) = (node / cols, node % cols);
        let label = components.label(r, c);
        if label <= 0 || !elevation.is_valid(r, c) {
            continue;
        }
        let z = elevation.data()[(r, c)];
        let slot = &mut best[(label - 1) as usize];
        let replace = match *slot {
            None => true,
            Some((bz, bn)) => z > bz || (z == bz && node < bn),
        };
        if replace {
            *slot = Some((z, node));
        }
    }

    let mut kept: Vec<usize> = best.into_iter().flatten().map(|(_, n)| n).collect();
    kept.sort_unstable();
    Ok(kept)
}

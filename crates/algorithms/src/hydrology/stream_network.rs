//! Threshold sources and node-set rasters

use drainnet_core::raster::Raster;
use drainnet_core::{Error, Result};

use super::flow_accumulation::ensure_matches;
use super::flow_graph::FlowGraph;

/// Channel sources for a contributing-cell threshold `k`.
///
/// A source is a valid node whose accumulation exceeds `k` while none of
/// its donors does: the most upstream cell of each threshold-exceeding
/// flow path. Sources come back in row-major order.
pub fn sources_by_threshold(
    accumulation: &Raster<u32>,
    graph: &FlowGraph,
    k: u32,
) -> Result<Vec<usize>> {
    ensure_matches(accumulation, graph)?;
    if k == 0 {
        return Err(Error::invalid_parameter(
            "threshold_contributing_pixels",
            k,
            "must be at least 1",
        ));
    }
    if k as usize > graph.len() {
        return Err(Error::invalid_parameter(
            "threshold_contributing_pixels",
            k,
            format!("exceeds the {} cells of the grid", graph.len()),
        ));
    }

    let acc = accumulation.data();
    let cols = graph.cols();
    let at = |node: usize| acc[(node / cols, node % cols)];

    Ok((0..graph.len())
        .filter(|&n| graph.is_valid(n) && at(n) > k)
        .filter(|&n| graph.donors(n).iter().all(|&d| at(d) <= k))
        .collect())
}

/// Raster marking `nodes` with 1; other valid cells hold 0 and no-data
/// cells hold -9999.
pub fn nodes_to_grid(graph: &FlowGraph, nodes: &[usize]) -> Result<Raster<i32>> {
    let mut data: Vec<i32> = (0..graph.len())
        .map(|n| if graph.is_valid(n) { 0 } else { -9999 })
        .collect();
    for &n in nodes {
        if n >= data.len() {
            let (row, col) = graph.row_col(n);
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: graph.rows(),
                cols: graph.cols(),
            });
        }
        data[n] = 1;
    }
    graph.raster_from(data, Some(-9999))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::{accumulate, route};

    fn line_graph() -> FlowGraph {
        // Two parallel rows draining east
        let dem = Raster::from_vec(
            vec![5.0, 4.0, 3.0, 2.0, 1.0, 9.0, 9.0, 9.0, 9.0, 9.0],
            2,
            5,
        )
        .unwrap();
        route(&dem).unwrap()
    }

    #[test]
    fn test_sources_are_minimal() {
        let g = line_graph();
        let acc = accumulate(&g).unwrap();
        let sources = sources_by_threshold(&acc, &g, 3).unwrap();
        for &s in &sources {
            assert!(acc.data()[(s / 5, s % 5)] > 3);
            for &d in g.donors(s) {
                assert!(acc.data()[(d / 5, d % 5)] <= 3);
            }
        }
        assert!(!sources.is_empty());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let g = line_graph();
        let acc = accumulate(&g).unwrap();
        assert!(matches!(
            sources_by_threshold(&acc, &g, 11),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(sources_by_threshold(&acc, &g, 0).is_err());
        assert!(sources_by_threshold(&acc, &g, 10).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_accumulation() {
        let g = line_graph();
        let acc: Raster<u32> = Raster::new(3, 3);
        assert!(matches!(
            sources_by_threshold(&acc, &g, 1),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_nodes_to_grid() {
        let g = line_graph();
        let grid = nodes_to_grid(&g, &[0, 7]).unwrap();
        assert_eq!(grid.get(0, 0).unwrap(), 1);
        assert_eq!(grid.get(1, 2).unwrap(), 1);
        assert_eq!(grid.get(0, 1).unwrap(), 0);
        assert!(nodes_to_grid(&g, &[10]).is_err());
    }
}

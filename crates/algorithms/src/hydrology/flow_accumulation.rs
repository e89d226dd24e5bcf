//! Contributing area and downstream distance over a [`FlowGraph`]
//!
//! Both sweeps follow the graph's stack: accumulation walks it backwards so
//! every donor is final before it is added to its receiver, distance walks
//! it forwards so every receiver is final before its donors read it.

use drainnet_core::raster::Raster;
use drainnet_core::{Algorithm, Error, Result};

use super::flow_graph::FlowGraph;

/// Flow accumulation algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulation;

impl Algorithm for FlowAccumulation {
    type Input = FlowGraph;
    type Output = Raster<u32>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation"
    }

    fn description(&self) -> &'static str {
        "Count the cells draining through each cell, itself included"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        accumulate(&input)
    }
}

/// Contributing cell count of every node, the node itself included.
///
/// Valid cells hold at least 1; no-data cells hold 0, which is also the
/// raster's no-data value. For every node the count equals one plus the
/// counts of its donors, and the counts at the outlets sum to the number
/// of valid cells.
pub fn accumulate(graph: &FlowGraph) -> Result<Raster<u32>> {
    let mut acc: Vec<u32> = (0..graph.len())
        .map(|n| u32::from(graph.is_valid(n)))
        .collect();

    for &node in graph.stack().iter().rev() {
        let r = graph.receiver(node);
        if r != node {
            acc[r] += acc[node];
        }
    }

    graph.raster_from(acc, Some(0))
}

/// Length of the flow path from every node to its outlet, in map units.
///
/// Outlets are at distance 0; no-data cells carry -9999.
pub fn distance_from_outlet(graph: &FlowGraph) -> Result<Raster<f64>> {
    let mut dist = vec![-9999.0; graph.len()];

    for &node in graph.stack() {
        let r = graph.receiver(node);
        dist[node] = if r == node {
            0.0
        } else {
            dist[r] + graph.step_length(node)
        };
    }

    graph.raster_from(dist, Some(-9999.0))
}

/// Contributing cells of `node` read from an accumulation raster.
pub fn contributing_cells(accumulation: &Raster<u32>, graph: &FlowGraph, node: usize) -> u32 {
    let (row, col) = graph.row_col(node);
    accumulation.get(row, col).unwrap_or(0)
}

pub(crate) fn ensure_matches(accumulation: &Raster<u32>, graph: &FlowGraph) -> Result<()> {
    let (ar, ac) = accumulation.shape();
    if (ar, ac) != (graph.rows(), graph.cols()) {
        return Err(Error::SizeMismatch {
            er: graph.rows(),
            ec: graph.cols(),
            ar,
            ac,
        });
    }
    Ok(())
}

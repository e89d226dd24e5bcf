//! Turning candidate cells into a clean head list

use tracing::debug;

use crate::hydrology::FlowGraph;
use crate::network::JunctionNetwork;
use drainnet_core::Result;

/// Reduce skeleton endpoints to the upper tips of the network they drain.
///
/// Endpoints are visited from the highest down. Each walks to its outlet,
/// marking the cells it passes; an endpoint that an earlier walk already
/// passed through lies below another tip and is discarded. Survivors keep
/// the visiting order.
pub fn process_endpoints_to_heads(endpoints: &[usize], graph: &FlowGraph) -> Vec<usize> {
    let mut ordered: Vec<usize> = endpoints
        .iter()
        .copied()
        .filter(|&n| graph.is_valid(n))
        .collect();
    ordered.sort_by(|&a, &b| {
        graph
            .elevation(b)
            .total_cmp(&graph.elevation(a))
            .then(a.cmp(&b))
    });

    let mut visited = vec![false; graph.len()];
    let mut heads = Vec::new();
    for start in ordered {
        if visited[start] {
            continue;
        }
        heads.push(start);
        let mut node = start;
        loop {
            visited[node] = true;
            let next = graph.receiver(node);
            if next == node || visited[next] {
                break;
            }
            node = next;
        }
    }
    heads
}

/// Drop heads whose channel is a single cell.
///
/// On the network the heads induce, a head is dropped when it is an
/// outlet, drains straight into an outlet, or drains straight into a
/// junction.
pub fn remove_single_pixel_channels(heads: &[usize], graph: &FlowGraph) -> Result<Vec<usize>> {
    let network = JunctionNetwork::new(heads, graph)?;
    let kept: Vec<usize> = heads
        .iter()
        .copied()
        .filter(|&h| {
            if !graph.is_valid(h) {
                return false;
            }
            let next = graph.receiver(h);
            !(next == h || graph.is_outlet(next) || network.is_junction(next))
        })
        .collect();
    if kept.len() < heads.len() {
        debug!("removed {} single-pixel channels", heads.len() - kept.len());
    }
    Ok(kept)
}

/// Common clean-up applied to every detector's heads.
///
/// Drops no-data cells and repeats (keeping the first occurrence), and
/// heads on the grid edge or next to no-data that have no downstream
/// path because they are outlets themselves.
pub fn finalize_heads(heads: &[usize], graph: &FlowGraph) -> Vec<usize> {
    let mut seen = vec![false; graph.len()];
    heads
        .iter()
        .copied()
        .filter(|&h| graph.is_valid(h))
        .filter(|&h| !std::mem::replace(&mut seen[h], true))
        .filter(|&h| !(graph.is_outlet(h) && graph.is_edge_or_nodata_adjacent(h)))
        .collect()
}

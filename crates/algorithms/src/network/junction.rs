//! Junction network assembly
//!
//! Walking down the flow graph from every head marks the channel cells.
//! A head that another head's walk passes through is not a source. Every
//! channel cell fed by two or more channel cells is a confluence. Sources
//! and confluences together are the junctions. Sources take the first
//! indices in head order. Confluences follow in the order the walks down
//! from the sources reach them.
//!
//! Each junction owns one link: its own cell and the cells below it, up
//! to but excluding the next junction. A link that runs into an outlet
//! keeps the outlet.

use std::collections::VecDeque;

use drainnet_core::raster::Raster;
use drainnet_core::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::hydrology::FlowGraph;

/// Cell value in the order and index rasters for non-channel cells.
pub const NO_JUNCTION: i32 = -9999;

/// One channel cell of an exported network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportRow {
    pub node: usize,
    pub row: usize,
    pub col: usize,
    /// Junction whose link holds this cell
    pub junction: usize,
    pub stream_order: u32,
    pub x: f64,
    pub y: f64,
    /// Downstream cell (itself at an outlet)
    pub receiver: usize,
}

/// Directed forest of links rooted at outlets.
#[derive(Debug, Clone)]
pub struct JunctionNetwork {
    /// Cell of each junction
    junction_nodes: Vec<usize>,
    /// Cells of each junction's link, downstream order
    links: Vec<Vec<usize>>,
    /// Junction at the lower end of each link, `None` when it ends at an outlet
    receiver_junction: Vec<Option<usize>>,
    /// Links ending at each junction, ascending
    upstream: Vec<Vec<usize>>,
    stream_order: Vec<u32>,
    /// Junction located at each cell
    junction_at: Vec<Option<usize>>,
    /// Junction whose link holds each cell
    link_of: Vec<Option<usize>>,
    n_sources: usize,
    export: Vec<ExportRow>,
}

impl JunctionNetwork {
    /// Build the network that `heads` induce on `graph`.
    ///
    /// Heads that are no-data or out of range are skipped, as are repeats.
    /// An empty head list gives an empty network.
    pub fn new(heads: &[usize], graph: &FlowGraph) -> Result<Self> {
        let n = graph.len();

        let mut seen = vec![false; n];
        let heads: Vec<usize> = heads
            .iter()
            .copied()
            .filter(|&h| graph.is_valid(h) && !std::mem::replace(&mut seen[h], true))
            .collect();

        let mut channel = vec![false; n];
        for &h in &heads {
            let mut node = h;
            loop {
                if channel[node] {
                    break;
                }
                channel[node] = true;
                let next = graph.receiver(node);
                if next == node {
                    break;
                }
                node = next;
            }
        }

        let channel_donors =
            |node: usize| graph.donors(node).iter().filter(|&&d| channel[d]).count();
        let sources: Vec<usize> = heads
            .iter()
            .copied()
            .filter(|&h| channel_donors(h) == 0)
            .collect();
        if sources.len() < heads.len() {
            debug!(
                "{} heads lie on another head's channel and are not sources",
                heads.len() - sources.len()
            );
        }

        // Sources first, in head order; confluences follow in walk order
        let mut junction_at: Vec<Option<usize>> = vec![None; n];
        let mut junction_nodes = Vec::with_capacity(sources.len());
        for &s in &sources {
            junction_at[s] = Some(junction_nodes.len());
            junction_nodes.push(s);
        }
        let mut walked = vec![false; n];
        for &s in &sources {
            let mut node = s;
            loop {
                if walked[node] {
                    break;
                }
                walked[node] = true;
                if junction_at[node].is_none() && channel_donors(node) >= 2 {
                    junction_at[node] = Some(junction_nodes.len());
                    junction_nodes.push(node);
                }
                let next = graph.receiver(node);
                if next == node {
                    break;
                }
                node = next;
            }
        }

        // Links
        let nj = junction_nodes.len();
        let mut links = Vec::with_capacity(nj);
        let mut receiver_junction = Vec::with_capacity(nj);
        let mut link_of: Vec<Option<usize>> = vec![None; n];
        for (j, &start) in junction_nodes.iter().enumerate() {
            let mut link = vec![start];
            link_of[start] = Some(j);
            let mut node = start;
            let mut ends_at = None;
            loop {
                let next = graph.receiver(node);
                if next == node {
                    break;
                }
                if let Some(k) = junction_at[next] {
                    ends_at = Some(k);
                    break;
                }
                link.push(next);
                link_of[next] = Some(j);
                node = next;
            }
            links.push(link);
            receiver_junction.push(ends_at);
        }

        let mut upstream = vec![Vec::new(); nj];
        for (j, r) in receiver_junction.iter().enumerate() {
            if let Some(k) = *r {
                upstream[k].push(j);
            }
        }

        let stream_order = strahler(&upstream, &receiver_junction);

        if nj == 0 {
            warn!("junction network is empty");
        }

        let mut network = Self {
            junction_nodes,
            links,
            receiver_junction,
            upstream,
            stream_order,
            junction_at,
            link_of,
            n_sources: sources.len(),
            export: Vec::new(),
        };
        network.export = network.build_rows(graph);
        Ok(network)
    }

    pub fn n_junctions(&self) -> usize {
        self.junction_nodes.len()
    }

    /// Every junction heads exactly one link.
    pub fn n_links(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.junction_nodes.is_empty()
    }

    /// Source cells in head order; source `i` is junction `i`.
    pub fn sources(&self) -> &[usize] {
        &self.junction_nodes[..self.n_sources]
    }

    pub fn is_source(&self, junction: usize) -> bool {
        junction < self.n_sources
    }

    /// Cell of `junction`
    pub fn junction_node(&self, junction: usize) -> Option<usize> {
        self.junction_nodes.get(junction).copied()
    }

    /// Junction located at `node`, if any.
    pub fn junction_at(&self, node: usize) -> Option<usize> {
        self.junction_at.get(node).copied().flatten()
    }

    pub fn is_junction(&self, node: usize) -> bool {
        self.junction_at(node).is_some()
    }

    /// Junction whose link holds `node`; `None` off the network.
    pub fn junction_of(&self, node: usize) -> Option<usize> {
        self.link_of.get(node).copied().flatten()
    }

    pub fn is_channel(&self, node: usize) -> bool {
        self.junction_of(node).is_some()
    }

    /// Cells of `junction`'s link, from the junction downstream.
    pub fn link(&self, junction: usize) -> Option<&[usize]> {
        self.links.get(junction).map(Vec::as_slice)
    }

    /// Junction below `junction`'s link, `None` at the network outlet.
    pub fn receiver_junction(&self, junction: usize) -> Option<usize> {
        self.receiver_junction.get(junction).copied().flatten()
    }

    /// Junctions whose links end at `junction`.
    pub fn upstream_junctions(&self, junction: usize) -> &[usize] {
        self.upstream.get(junction).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stream_order(&self, junction: usize) -> Option<u32> {
        self.stream_order.get(junction).copied()
    }

    /// Last cell of `junction`'s link: the cell just above the next
    /// junction, or the outlet when the link ends there.
    pub fn penultimate_node_of_link(&self, junction: usize) -> Option<usize> {
        self.links.get(junction).and_then(|l| l.last().copied())
    }

    /// Junction `steps` links below `junction`, stopping early at the
    /// network outlet.
    pub fn junction_downstream(&self, junction: usize, steps: usize) -> usize {
        let mut current = junction;
        for _ in 0..steps {
            match self.receiver_junction(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Stream order of every channel cell; other cells hold [`NO_JUNCTION`].
    pub fn stream_order_grid(&self, graph: &FlowGraph) -> Result<Raster<i32>> {
        let data = self
            .link_of
            .iter()
            .map(|j| j.map_or(NO_JUNCTION, |j| self.stream_order[j] as i32))
            .collect();
        graph.raster_from(data, Some(NO_JUNCTION))
    }

    /// Junction index at every junction cell; other cells hold [`NO_JUNCTION`].
    pub fn junction_index_grid(&self, graph: &FlowGraph) -> Result<Raster<i32>> {
        let data = self
            .junction_at
            .iter()
            .map(|j| j.map_or(NO_JUNCTION, |j| j as i32))
            .collect();
        graph.raster_from(data, Some(NO_JUNCTION))
    }

    /// One row per channel cell, by junction and then downstream.
    pub fn export_rows(&self) -> &[ExportRow] {
        &self.export
    }

    fn build_rows(&self, graph: &FlowGraph) -> Vec<ExportRow> {
        let mut rows = Vec::new();
        for (j, link) in self.links.iter().enumerate() {
            for &node in link {
                let (row, col) = graph.row_col(node);
                let (x, y) = graph.coordinates(node);
                rows.push(ExportRow {
                    node,
                    row,
                    col,
                    junction: j,
                    stream_order: self.stream_order[j],
                    x,
                    y,
                    receiver: graph.receiver(node),
                });
            }
        }
        rows
    }
}

/// Strahler order by a Kahn sweep from the sources down.
fn strahler(upstream: &[Vec<usize>], receiver: &[Option<usize>]) -> Vec<u32> {
    let nj = upstream.len();
    let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut order = vec![0u32; nj];
    let mut queue: VecDeque<usize> = (0..nj).filter(|&j| pending[j] == 0).collect();

    while let Some(j) = queue.pop_front() {
        order[j] = match upstream[j].iter().map(|&u| order[u]).max() {
            None => 1,
            Some(top) => {
                let at_top = upstream[j].iter().filter(|&&u| order[u] == top).count();
                if at_top >= 2 {
                    top + 1
                } else {
                    top
                }
            }
        };
        if let Some(k) = receiver[j] {
            pending[k] -= 1;
            if pending[k] == 0 {
                queue.push_back(k);
            }
        }
    }
    order
}

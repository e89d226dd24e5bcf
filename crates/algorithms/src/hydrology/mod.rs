//! Hydrological conditioning and flow routing
//!
//! - Priority-Flood depression filling with an enforced minimum slope
//! - D8 steepest-descent routing into a [`FlowGraph`]
//! - Contributing-cell accumulation and distance to outlet
//! - Threshold channel sources

mod flow_accumulation;
mod flow_graph;
mod priority_flood;
mod stream_network;

pub(crate) use flow_accumulation::ensure_matches;
pub use flow_accumulation::{
    accumulate, contributing_cells, distance_from_outlet, FlowAccumulation,
};
pub use flow_graph::{route, FlowGraph, FlowRouting};
pub use priority_flood::{fill, PriorityFlood, PriorityFloodParams};
pub use stream_network::{nodes_to_grid, sources_by_threshold};

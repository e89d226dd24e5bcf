//! # drainnet algorithms
//!
//! Channel network extraction from gridded elevation.
//!
//! ## Modules
//!
//! - **hydrology**: Priority-Flood fill, D8 flow graph, accumulation, threshold sources
//! - **terrain**: quadratic surface fitting and tangential curvature
//! - **spectral**: Wiener filtering and quantile-quantile channel isolation
//! - **morphology**: component labeling, Zhang-Suen thinning, skeleton endpoints
//! - **network**: junction networks, Strahler order, chi refinement
//! - **heads**: the AreaThreshold, DrEICH, Pelletier and Wiener head detectors
//! - **pipeline**: preparing a DEM and running detectors against it

pub mod config;
pub mod heads;
pub mod hydrology;
pub mod morphology;
pub mod network;
pub mod pipeline;
pub mod spectral;
pub mod terrain;

pub(crate) mod maybe_rayon;

pub use config::{ChiTieBreak, ExtractionConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{ChiTieBreak, ExtractionConfig};
    pub use crate::heads::{ChannelHeadDetector, Detection, DetectorKind, Diagnostics};
    pub use crate::hydrology::{
        accumulate, distance_from_outlet, fill, nodes_to_grid, route, sources_by_threshold,
        FlowGraph,
    };
    pub use crate::morphology::{
        connected_components, filter_by_size, find_endpoints, remove_downstream_endpoints,
        skeletonize,
    };
    pub use crate::network::{ExportRow, JunctionNetwork};
    pub use crate::pipeline::{
        network_from_heads, prepare, run_detector, run_detectors, ChannelExtraction,
        PreparedSurface,
    };
    pub use crate::spectral::{isolate_channels, wiener_filter, ChannelIsolation, QuantileRow};
    pub use crate::terrain::{fit_curvature, surface_fit, SurfaceFit};
    pub use drainnet_core::prelude::*;
}

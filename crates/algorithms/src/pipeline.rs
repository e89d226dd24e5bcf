//! Run orchestration
//!
//! [`prepare`] fills and routes the DEM once. Detectors then run against
//! the shared [`PreparedSurface`], each producing its own head list and
//! network. Detectors are independent, so [`run_detectors`] runs them in
//! parallel and keeps their results apart: one failing detector does not
//! stop the others.

use std::time::Instant;

use drainnet_core::raster::Raster;
use drainnet_core::Result;
use tracing::{debug, info, warn};

use crate::config::{validate_non_negative, ExtractionConfig};
use crate::heads::{finalize_heads, DetectorKind, Diagnostics};
use crate::hydrology::{accumulate, fill, route, FlowGraph};
use crate::maybe_rayon::*;
use crate::network::JunctionNetwork;

/// A DEM with its filled surface, flow graph and accumulation.
#[derive(Debug, Clone)]
pub struct PreparedSurface {
    /// The DEM as given
    pub dem: Raster<f64>,
    pub filled: Raster<f64>,
    pub flow: FlowGraph,
    pub accumulation: Raster<u32>,
}

/// Fill, route and accumulate `dem`.
pub fn prepare(dem: Raster<f64>, config: &ExtractionConfig) -> Result<PreparedSurface> {
    validate_non_negative("min_slope_for_fill", config.min_slope_for_fill)?;

    let start = Instant::now();
    let filled = fill(&dem, config.min_slope_for_fill)?;
    let flow = route(&filled)?;
    let accumulation = accumulate(&flow)?;
    debug!(
        "prepared {}x{} surface in {:.2?}",
        dem.rows(),
        dem.cols(),
        start.elapsed()
    );

    if flow.valid_count() == 0 {
        warn!("DEM holds no valid cells");
    }

    Ok(PreparedSurface {
        dem,
        filled,
        flow,
        accumulation,
    })
}

/// Heads and network of one detector run.
#[derive(Debug, Clone)]
pub struct ChannelExtraction {
    pub detector: DetectorKind,
    pub heads: Vec<usize>,
    pub network: JunctionNetwork,
    /// Flow graph of a detector that routed its own surface
    pub own_flow: Option<FlowGraph>,
    pub diagnostics: Diagnostics,
}

impl ChannelExtraction {
    /// Flow graph that `heads` and `network` refer to.
    pub fn flow<'a>(&'a self, surface: &'a PreparedSurface) -> &'a FlowGraph {
        self.own_flow.as_ref().unwrap_or(&surface.flow)
    }
}

/// Run one detector and build its network.
pub fn run_detector(
    kind: DetectorKind,
    surface: &PreparedSurface,
    config: &ExtractionConfig,
) -> Result<ChannelExtraction> {
    let start = Instant::now();
    let detection = kind.detector().detect(surface, config)?;
    let flow = detection.flow.as_ref().unwrap_or(&surface.flow);
    let network = network_from_heads(&detection.heads, flow)?;

    if detection.heads.is_empty() {
        warn!("{} found no channel heads", kind);
    }
    info!(
        "{}: {} heads, {} junctions in {:.2?}",
        kind,
        detection.heads.len(),
        network.n_junctions(),
        start.elapsed()
    );

    Ok(ChannelExtraction {
        detector: kind,
        heads: detection.heads,
        network,
        own_flow: detection.flow,
        diagnostics: detection.diagnostics,
    })
}

/// Run several detectors in parallel, in the order given.
pub fn run_detectors(
    kinds: &[DetectorKind],
    surface: &PreparedSurface,
    config: &ExtractionConfig,
) -> Vec<(DetectorKind, Result<ChannelExtraction>)> {
    kinds
        .par_iter()
        .map(|&kind| {
            let result = run_detector(kind, surface, config);
            if let Err(e) = &result {
                warn!("{} failed: {}", kind, e);
            }
            (kind, result)
        })
        .collect()
}

/// Network induced by `heads` after the common head clean-up.
pub fn network_from_heads(heads: &[usize], flow: &FlowGraph) -> Result<JunctionNetwork> {
    JunctionNetwork::new(&finalize_heads(heads, flow), flow)
}

/// Snap map coordinates to the cells of `flow`.
///
/// Points outside the grid or on no-data are skipped.
pub fn heads_from_coordinates(points: &[(f64, f64)], flow: &FlowGraph) -> Vec<usize> {
    points
        .iter()
        .filter_map(|&(x, y)| flow.transform().geo_to_cell(x, y, flow.rows(), flow.cols()))
        .map(|(row, col)| flow.node(row, col))
        .filter(|&n| flow.is_valid(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use drainnet_core::raster::GeoTransform;

    fn ramp() -> Raster<f64> {
        let (rows, cols) = (12, 9);
        let z = (0..rows * cols)
            .map(|i| {
                let (r, c) = (i / cols, i % cols);
                100.0 - 2.0 * r as f64 + 3.0 * (c as f64 - 4.0).abs()
            })
            .collect();
        let mut dem = Raster::from_vec(z, rows, cols).unwrap();
        dem.set_transform(GeoTransform::new(1000.0, 2000.0, 1.0, -1.0));
        dem.set_nodata(Some(-9999.0));
        dem
    }

    #[test]
    fn test_prepare_keeps_dem() {
        let dem = ramp();
        let prepared = prepare(dem.clone(), &ExtractionConfig::default()).unwrap();
        assert_eq!(prepared.dem.data(), dem.data());
        assert_eq!(prepared.flow.valid_count(), 108);
        let total: u32 = prepared.flow.outlets().map(|o| {
            let (r, c) = prepared.flow.row_col(o);
            prepared.accumulation.get(r, c).unwrap()
        }).sum();
        assert_eq!(total, 108);
    }

    #[test]
    fn test_area_threshold_run() {
        let prepared = prepare(ramp(), &ExtractionConfig::default()).unwrap();
        let config = ExtractionConfig {
            threshold_contributing_pixels: 5,
            ..Default::default()
        };
        let run = run_detector(DetectorKind::AreaThreshold, &prepared, &config).unwrap();
        assert!(!run.heads.is_empty());
        assert!(!run.network.is_empty());
        assert!(run.own_flow.is_none());
        assert_eq!(run.network.sources().len(), run.heads.len());
    }

    #[test]
    fn test_failures_stay_separate() {
        let prepared = prepare(ramp(), &ExtractionConfig::default()).unwrap();
        // Too many contributing cells for the grid, fine for the rest
        let config = ExtractionConfig {
            threshold_contributing_pixels: 10_000,
            pelletier_border_width: 1,
            pelletier_initial_threshold: 5,
            ..Default::default()
        };
        let results = run_detectors(
            &[DetectorKind::AreaThreshold, DetectorKind::Wiener],
            &prepared,
            &config,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, DetectorKind::AreaThreshold);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
    }

    #[test]
    fn test_snap_coordinates() {
        let prepared = prepare(ramp(), &ExtractionConfig::default()).unwrap();
        let heads = heads_from_coordinates(&[(1004.5, 1999.5), (0.0, 0.0)], &prepared.flow);
        assert_eq!(heads, vec![prepared.flow.node(0, 4)]);
    }
}

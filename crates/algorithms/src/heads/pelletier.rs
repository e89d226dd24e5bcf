//! Pelletier (2013) dual-wavelength curvature heads
//!
//! The DEM is Wiener filtered, framed with no-data, filled and routed
//! again, so the heads refer to a flow graph of their own. A low
//! accumulation threshold seeds provisional sources. Along each source's
//! path, extended upslope through its largest donors, the head is the
//! first cell whose short-wavelength tangential curvature exceeds the
//! curvature threshold while the long-wavelength curvature is convergent.
//! Heads whose link drains less than the minimum area are dropped.

use drainnet_core::raster::Raster;
use drainnet_core::Result;
use tracing::{debug, info};

use super::{finalize_heads, ChannelHeadDetector, Detection, DetectorKind, Diagnostics};
use crate::config::{validate_at_least, validate_finite, validate_non_negative, validate_positive, ExtractionConfig};
use crate::hydrology::{accumulate, ensure_matches, fill, route, sources_by_threshold, FlowGraph};
use crate::network::JunctionNetwork;
use crate::pipeline::PreparedSurface;
use crate::spectral::wiener_filter;
use crate::terrain::fit_curvature;

/// Curvature-based heads on a filtered, re-routed surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pelletier;

impl ChannelHeadDetector for Pelletier {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Pelletier
    }

    fn detect(&self, surface: &PreparedSurface, config: &ExtractionConfig) -> Result<Detection> {
        validate_finite("curvature_threshold", config.curvature_threshold)?;
        validate_positive("surface_fitting_radius", config.surface_fitting_radius)?;
        validate_positive("long_wavelength_radius", config.long_wavelength_radius)?;
        validate_non_negative("minimum_drainage_area", config.minimum_drainage_area)?;
        validate_non_negative("min_slope_for_fill", config.min_slope_for_fill)?;
        validate_at_least(
            "pelletier_initial_threshold",
            config.pelletier_initial_threshold as usize,
            1,
        )?;

        let filtered = wiener_filter(&surface.dem, config.memory_limit_bytes)?;
        let framed = filtered.border_with_nodata(config.pelletier_border_width);

        let flow = route(&fill(&framed, config.min_slope_for_fill)?)?;
        let accumulation = accumulate(&flow)?;
        let seeds = sources_by_threshold(&accumulation, &flow, config.pelletier_initial_threshold)?;
        let seed_network = JunctionNetwork::new(&seeds, &flow)?;

        let short = fit_curvature(&framed, config.surface_fitting_radius)?;
        let long = fit_curvature(&framed, config.long_wavelength_radius)?;

        let candidates = pelletier_heads(
            &seed_network,
            &flow,
            &accumulation,
            &short,
            &long,
            config.curvature_threshold,
        )?;

        let kept = filter_by_drainage_area(
            &candidates,
            &flow,
            &accumulation,
            config.minimum_drainage_area,
        )?;
        debug!(
            "pelletier: removed {} of {} heads below the minimum drainage area",
            candidates.len() - kept.len(),
            candidates.len()
        );

        let heads = finalize_heads(&kept, &flow);
        info!("pelletier: {} seeds, {} heads", seeds.len(), heads.len());

        Ok(Detection {
            heads,
            flow: Some(flow),
            diagnostics: Diagnostics {
                filtered: Some(framed),
                curvature: Some(short),
                ..Default::default()
            },
        })
    }
}

/// Curvature heads along the paths of `network`'s sources.
///
/// Sources whose path has no qualifying cell yield no head. Results are
/// in source order and may repeat.
pub fn pelletier_heads(
    network: &JunctionNetwork,
    graph: &FlowGraph,
    accumulation: &Raster<u32>,
    short: &Raster<f64>,
    long: &Raster<f64>,
    threshold: f64,
) -> Result<Vec<usize>> {
    ensure_matches(accumulation, graph)?;
    accumulation.ensure_same_shape(short)?;
    accumulation.ensure_same_shape(long)?;

    let acc = accumulation.data();
    let mut heads = Vec::new();
    for (j, &source) in network.sources().iter().enumerate() {
        let mut path = upslope_path(source, graph, acc);
        path.reverse();
        if let Some(link) = network.link(j) {
            path.extend_from_slice(&link[1..]);
        }

        let head = path.iter().copied().find(|&n| {
            let rc = graph.row_col(n);
            let ks = short.data()[rc];
            let kl = long.data()[rc];
            ks.is_finite() && kl.is_finite() && ks > threshold && kl > 0.0
        });
        if let Some(h) = head {
            heads.push(h);
        }
    }
    Ok(heads)
}

/// Heads whose link drains at least `minimum_area` (map units squared),
/// measured at the last cell of the link in the network the heads induce.
pub fn filter_by_drainage_area(
    heads: &[usize],
    graph: &FlowGraph,
    accumulation: &Raster<u32>,
    minimum_area: f64,
) -> Result<Vec<usize>> {
    ensure_matches(accumulation, graph)?;
    let network = JunctionNetwork::new(heads, graph)?;
    let cell_area = graph.cell_area();
    let acc = accumulation.data();
    Ok(heads
        .iter()
        .copied()
        .filter(|&h| {
            network
                .junction_of(h)
                .and_then(|j| network.penultimate_node_of_link(j))
                .is_some_and(|p| acc[graph.row_col(p)] as f64 * cell_area >= minimum_area)
        })
        .collect())
}

/// `start` and the cells above it, following the donor with the most
/// accumulation (smallest index on ties), listed downstream first.
fn upslope_path(start: usize, graph: &FlowGraph, acc: &ndarray::Array2<u32>) -> Vec<usize> {
    let mut path = vec![start];
    let mut node = start;
    while let Some(&next) = graph
        .donors(node)
        .iter()
        .max_by(|&&a, &&b| acc[graph.row_col(a)].cmp(&acc[graph.row_col(b)]).then(b.cmp(&a)))
    {
        path.push(next);
        node = next;
    }
    path
}

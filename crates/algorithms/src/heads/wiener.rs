//! Spectral head detection shared by the Wiener and DrEICH strategies

use drainnet_core::Result;
use tracing::{debug, info};

use super::{
    finalize_heads, process_endpoints_to_heads, remove_single_pixel_channels,
    ChannelHeadDetector, Detection, DetectorKind, Diagnostics,
};
use crate::config::{validate_at_least, ExtractionConfig};
use crate::morphology::{
    connected_components, filter_by_size, find_endpoints, remove_downstream_endpoints,
    skeletonize,
};
use crate::pipeline::PreparedSurface;
use crate::spectral::{isolate_channels, ChannelIsolation};

/// Heads from the spectral front end, with the isolation that produced them.
#[derive(Debug, Clone)]
pub struct SpectralHeads {
    pub heads: Vec<usize>,
    pub isolation: ChannelIsolation,
}

impl SpectralHeads {
    pub(crate) fn diagnostics(self) -> Diagnostics {
        let threshold = self.isolation.threshold;
        Diagnostics {
            filtered: Some(self.isolation.filtered),
            curvature: Some(self.isolation.curvature),
            quantiles: self.isolation.quantiles,
            curvature_threshold: threshold.is_finite().then_some(threshold),
        }
    }
}

/// Channel isolation, component filtering, skeleton endpoints, upstream
/// pruning, endpoint-to-head mapping and single-pixel removal.
pub fn spectral_heads(surface: &PreparedSurface, config: &ExtractionConfig) -> Result<SpectralHeads> {
    config.validate_isolation()?;
    validate_at_least(
        "connected_components_threshold",
        config.connected_components_threshold,
        1,
    )?;

    let isolation = isolate_channels(
        &surface.dem,
        config.pruning_drainage_area,
        config.surface_fitting_radius,
        config,
    )?;

    let components = connected_components(&isolation.mask)?;
    let kept = filter_by_size(&components, config.connected_components_threshold)?;
    let kept_components = connected_components(&kept)?;
    debug!(
        "{} of {} channel components have at least {} cells",
        kept_components.count(),
        components.count(),
        config.connected_components_threshold
    );

    let skeleton = skeletonize(&kept)?;
    let endpoints = find_endpoints(&skeleton);
    let tips = remove_downstream_endpoints(&endpoints, &kept_components, &surface.dem)?;

    let candidates = process_endpoints_to_heads(&tips, &surface.flow);
    let heads = remove_single_pixel_channels(&candidates, &surface.flow)?;
    let heads = finalize_heads(&heads, &surface.flow);
    debug!(
        "spectral heads: {} endpoints, {} tips, {} heads",
        endpoints.len(),
        tips.len(),
        heads.len()
    );

    Ok(SpectralHeads { heads, isolation })
}

/// The spectral pipeline without chi refinement.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wiener;

impl ChannelHeadDetector for Wiener {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Wiener
    }

    fn detect(&self, surface: &PreparedSurface, config: &ExtractionConfig) -> Result<Detection> {
        let found = spectral_heads(surface, config)?;
        info!("wiener: {} heads", found.heads.len());
        Ok(Detection {
            heads: found.heads.clone(),
            flow: None,
            diagnostics: found.diagnostics(),
        })
    }
}

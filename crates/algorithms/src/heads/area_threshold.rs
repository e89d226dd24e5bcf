//! Contributing-area threshold heads

use drainnet_core::Result;
use tracing::info;

use super::{finalize_heads, ChannelHeadDetector, Detection, DetectorKind};
use crate::config::ExtractionConfig;
use crate::hydrology::sources_by_threshold;
use crate::pipeline::PreparedSurface;

/// Heads where accumulation first exceeds
/// [`threshold_contributing_pixels`](ExtractionConfig::threshold_contributing_pixels).
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaThreshold;

impl ChannelHeadDetector for AreaThreshold {
    fn kind(&self) -> DetectorKind {
        DetectorKind::AreaThreshold
    }

    fn detect(&self, surface: &PreparedSurface, config: &ExtractionConfig) -> Result<Detection> {
        let sources = sources_by_threshold(
            &surface.accumulation,
            &surface.flow,
            config.threshold_contributing_pixels,
        )?;
        let heads = finalize_heads(&sources, &surface.flow);
        info!(
            "area threshold: {} heads at {} contributing cells",
            heads.len(),
            config.threshold_contributing_pixels
        );
        Ok(Detection::new(heads))
    }
}

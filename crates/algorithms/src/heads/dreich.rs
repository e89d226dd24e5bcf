//! DrEICH: spectral heads refined on chi profiles

use drainnet_core::Result;
use tracing::info;

use super::{finalize_heads, spectral_heads, ChannelHeadDetector, Detection, DetectorKind};
use crate::config::ExtractionConfig;
use crate::network::{refine_heads, JunctionNetwork};
use crate::pipeline::PreparedSurface;

/// Spectral heads moved to the break of their chi profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dreich;

impl ChannelHeadDetector for Dreich {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Dreich
    }

    fn detect(&self, surface: &PreparedSurface, config: &ExtractionConfig) -> Result<Detection> {
        config.validate_chi()?;
        let found = spectral_heads(surface, config)?;

        let network = JunctionNetwork::new(&found.heads, &surface.flow)?;
        let refined = refine_heads(&network, &surface.flow, &surface.accumulation, config)?;
        let heads = finalize_heads(&refined, &surface.flow);
        info!(
            "dreich: {} spectral heads, {} after chi refinement",
            found.heads.len(),
            heads.len()
        );

        Ok(Detection {
            heads,
            flow: None,
            diagnostics: found.diagnostics(),
        })
    }
}

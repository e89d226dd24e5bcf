//! Channel head detection strategies
//!
//! Every strategy turns a [`PreparedSurface`] into a head list through the
//! same [`ChannelHeadDetector`] interface:
//!
//! - **AreaThreshold**: threshold sources of the unfiltered accumulation
//! - **Wiener**: spectral isolation, skeleton endpoints, post-processing
//! - **DrEICH**: the Wiener pipeline followed by chi refinement
//! - **Pelletier**: dual-radius curvature on a filtered, re-routed surface

mod area_threshold;
mod dreich;
mod pelletier;
mod postprocess;
mod wiener;

pub use area_threshold::AreaThreshold;
pub use dreich::Dreich;
pub use pelletier::{filter_by_drainage_area, pelletier_heads, Pelletier};
pub use postprocess::{finalize_heads, process_endpoints_to_heads, remove_single_pixel_channels};
pub use wiener::{spectral_heads, SpectralHeads, Wiener};

use std::fmt;
use std::str::FromStr;

use drainnet_core::raster::Raster;
use drainnet_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::config::ExtractionConfig;
use crate::hydrology::FlowGraph;
use crate::pipeline::PreparedSurface;
use crate::spectral::QuantileRow;

/// The available strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    AreaThreshold,
    Dreich,
    Pelletier,
    Wiener,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::AreaThreshold,
        DetectorKind::Dreich,
        DetectorKind::Pelletier,
        DetectorKind::Wiener,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::AreaThreshold => "area_threshold",
            DetectorKind::Dreich => "dreich",
            DetectorKind::Pelletier => "pelletier",
            DetectorKind::Wiener => "wiener",
        }
    }

    /// Short tag used in output file names
    pub fn tag(self) -> &'static str {
        match self {
            DetectorKind::AreaThreshold => "AT",
            DetectorKind::Dreich => "D",
            DetectorKind::Pelletier => "P",
            DetectorKind::Wiener => "W",
        }
    }

    pub fn detector(self) -> Box<dyn ChannelHeadDetector> {
        match self {
            DetectorKind::AreaThreshold => Box::new(AreaThreshold),
            DetectorKind::Dreich => Box::new(Dreich),
            DetectorKind::Pelletier => Box::new(Pelletier),
            DetectorKind::Wiener => Box::new(Wiener),
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DetectorKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s) || k.tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_parameter("detector", s, "unknown channel head detector"))
    }
}

/// Intermediate products worth keeping for inspection.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Wiener-filtered elevation
    pub filtered: Option<Raster<f64>>,
    /// Tangential curvature used for classification
    pub curvature: Option<Raster<f64>>,
    /// Quantile-quantile rows of the channel isolation
    pub quantiles: Vec<QuantileRow>,
    /// Curvature threshold picked by the channel isolation
    pub curvature_threshold: Option<f64>,
}

/// Output of one detector.
#[derive(Debug, Clone)]
pub struct Detection {
    pub heads: Vec<usize>,
    /// Flow graph the heads refer to, when the detector routed its own
    /// surface. `None` means the prepared surface's graph.
    pub flow: Option<FlowGraph>,
    pub diagnostics: Diagnostics,
}

impl Detection {
    pub fn new(heads: Vec<usize>) -> Self {
        Self {
            heads,
            flow: None,
            diagnostics: Diagnostics::default(),
        }
    }
}

/// A channel head strategy.
pub trait ChannelHeadDetector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Detect heads on `surface`. An empty head list is a valid result.
    fn detect(&self, surface: &PreparedSurface, config: &ExtractionConfig) -> Result<Detection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("dreich".parse::<DetectorKind>().unwrap(), DetectorKind::Dreich);
        assert_eq!("AT".parse::<DetectorKind>().unwrap(), DetectorKind::AreaThreshold);
        assert!("passalacqua".parse::<DetectorKind>().is_err());
        for kind in DetectorKind::ALL {
            assert_eq!(kind.detector().kind(), kind);
            assert_eq!(kind.to_string().parse::<DetectorKind>().unwrap(), kind);
        }
    }
}

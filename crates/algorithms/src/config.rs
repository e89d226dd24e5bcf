//! Run configuration for channel extraction
//!
//! One [`ExtractionConfig`] is built before a run and passed by reference
//! into every stage. Stages check the fields they consume with the
//! `validate_*` helpers, so a bad value fails at the first stage that
//! would have used it.

use drainnet_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the chi refinement picks between splits with equal misfit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChiTieBreak {
    /// Of all splits whose misfit matches the best one, take the one
    /// furthest upstream.
    #[default]
    MostUpstream,
    /// Of the same set, take the first one met while scanning up from the
    /// downstream end.
    FirstBest,
}

/// Parameters shared by every detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum gradient enforced by the depression fill.
    pub min_slope_for_fill: f64,
    /// Contributing cells for the area-threshold detector.
    pub threshold_contributing_pixels: u32,
    /// Smallest connected component, in cells, kept as a channel.
    pub connected_components_threshold: usize,
    /// Junctions examined below a provisional head by the chi refinement.
    pub search_depth: usize,
    /// Short-wavelength curvature window radius, in map units.
    pub surface_fitting_radius: f64,
    /// Long-wavelength curvature window radius, in map units.
    pub long_wavelength_radius: f64,
    /// Drainage area (map units squared) a cell needs to be classified
    /// as channel by the spectral isolation.
    pub pruning_drainage_area: f64,
    /// Short-wavelength tangential curvature a Pelletier head must exceed.
    pub curvature_threshold: f64,
    /// Drainage area (map units squared) below which a Pelletier head is
    /// treated as a false positive.
    pub minimum_drainage_area: f64,
    /// Reference drainage area for chi.
    pub a_0: f64,
    /// Concavity index m/n for chi.
    pub m_over_n: f64,
    /// Minimum number of nodes on each side of a chi split.
    pub min_segment_length: usize,
    /// Width in cells of the no-data frame Pelletier applies after filtering.
    pub pelletier_border_width: usize,
    /// Seed threshold for Pelletier's initial sources.
    pub pelletier_initial_threshold: u32,
    /// Departure from the fitted normal, as a fraction of its spread, at
    /// which the quantile-quantile classification marks channel curvature.
    pub noise_tolerance: f64,
    pub chi_tie_break: ChiTieBreak,
    /// Abort spectral filtering with `ResourceExhaustion` above this.
    pub memory_limit_bytes: Option<u64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_slope_for_fill: 0.0001,
            threshold_contributing_pixels: 1000,
            connected_components_threshold: 100,
            search_depth: 1,
            surface_fitting_radius: 6.0,
            long_wavelength_radius: 25.0,
            pruning_drainage_area: 1000.0,
            curvature_threshold: 0.1,
            minimum_drainage_area: 400.0,
            a_0: 1.0,
            m_over_n: 0.5,
            min_segment_length: 10,
            pelletier_border_width: 100,
            pelletier_initial_threshold: 250,
            noise_tolerance: 0.2,
            chi_tie_break: ChiTieBreak::MostUpstream,
            memory_limit_bytes: None,
        }
    }
}

pub(crate) fn validate_positive(name: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(Error::invalid_parameter(name, value, "must be a positive finite number"));
    }
    Ok(())
}

pub(crate) fn validate_non_negative(name: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(Error::invalid_parameter(name, value, "must be finite and not negative"));
    }
    Ok(())
}

pub(crate) fn validate_at_least(name: &'static str, value: usize, min: usize) -> Result<()> {
    if value < min {
        return Err(Error::invalid_parameter(name, value, format!("must be at least {}", min)));
    }
    Ok(())
}

pub(crate) fn validate_finite(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::invalid_parameter(name, value, "must be finite"));
    }
    Ok(())
}

impl ExtractionConfig {
    /// Check the parameters of the chi refinement.
    pub fn validate_chi(&self) -> Result<()> {
        validate_positive("a_0", self.a_0)?;
        validate_positive("m_over_n", self.m_over_n)?;
        validate_at_least("search_depth", self.search_depth, 1)?;
        validate_at_least("min_segment_length", self.min_segment_length, 2)
    }

    /// Check the parameters of the spectral isolation and morphology stages.
    pub fn validate_isolation(&self) -> Result<()> {
        validate_non_negative("pruning_drainage_area", self.pruning_drainage_area)?;
        validate_positive("surface_fitting_radius", self.surface_fitting_radius)?;
        validate_positive("noise_tolerance", self.noise_tolerance)
    }

    /// Check everything at once; used by front ends before a run starts.
    pub fn validate(&self) -> Result<()> {
        validate_non_negative("min_slope_for_fill", self.min_slope_for_fill)?;
        validate_at_least(
            "threshold_contributing_pixels",
            self.threshold_contributing_pixels as usize,
            1,
        )?;
        validate_at_least(
            "pelletier_initial_threshold",
            self.pelletier_initial_threshold as usize,
            1,
        )?;
        validate_positive("long_wavelength_radius", self.long_wavelength_radius)?;
        validate_finite("curvature_threshold", self.curvature_threshold)?;
        validate_non_negative("minimum_drainage_area", self.minimum_drainage_area)?;
        self.validate_isolation()?;
        self.validate_chi()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ExtractionConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.threshold_contributing_pixels, 1000);
        assert_eq!(cfg.chi_tie_break, ChiTieBreak::MostUpstream);
    }

    #[test]
    fn test_bad_radius_is_rejected() {
        let cfg = ExtractionConfig {
            surface_fitting_radius: 0.0,
            ..Default::default()
        };
        match cfg.validate() {
            Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "surface_fitting_radius"),
            other => panic!("expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_concavity_is_rejected() {
        let cfg = ExtractionConfig {
            m_over_n: -0.5,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate_chi(),
            Err(Error::InvalidParameter { name: "m_over_n", .. })
        ));
    }
}

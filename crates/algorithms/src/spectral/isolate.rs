//! Channel isolation on a Wiener-filtered surface
//!
//! Tangential curvature of the filtered surface is compared against a
//! normal distribution on a quantile-quantile plot. Hillslope curvature
//! behaves like noise and follows the fitted line; channel curvature
//! departs from it in the upper tail. The value where that departure
//! starts and persists becomes the curvature threshold. A cell is channel
//! when its curvature reaches the threshold and its drainage area on the
//! filled, filtered surface reaches the area threshold.

use drainnet_core::raster::Raster;
use drainnet_core::{Error, Result};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

use super::wiener::wiener_filter;
use crate::config::{validate_non_negative, ExtractionConfig};
use crate::hydrology::{accumulate, fill, route};
use crate::terrain::fit_curvature;

/// One point of the quantile-quantile diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileRow {
    /// Standard normal quantile
    pub quantile: f64,
    /// Observed tangential curvature at that quantile
    pub value: f64,
}

/// Result of [`isolate_channels`].
#[derive(Debug, Clone)]
pub struct ChannelIsolation {
    /// 1 for channel cells, 0 elsewhere (no-data included)
    pub mask: Raster<u8>,
    /// Sorted curvature against normal quantiles
    pub quantiles: Vec<QuantileRow>,
    /// Curvature threshold; infinite when no departure was found
    pub threshold: f64,
    /// The Wiener-filtered surface
    pub filtered: Raster<f64>,
    /// Tangential curvature of the filtered surface
    pub curvature: Raster<f64>,
}

/// Fitted line of the central quantiles and the resulting threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QqFit {
    pub mean: f64,
    pub spread: f64,
    pub threshold: f64,
}

/// Pair sorted values with standard normal quantiles.
pub fn quantile_rows(mut values: Vec<f64>) -> Result<Vec<QuantileRow>> {
    values.retain(|v| v.is_finite());
    values.sort_by(f64::total_cmp);
    let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Algorithm(e.to_string()))?;
    let n = values.len() as f64;
    Ok(values
        .into_iter()
        .enumerate()
        .map(|(i, value)| QuantileRow {
            quantile: normal.inverse_cdf((i as f64 + 0.5) / n),
            value,
        })
        .collect())
}

/// Fit `value = mean + spread * quantile` over `|quantile| <= 1` and
/// locate the start of the persistent upper-tail departure.
///
/// The threshold is the value of the first row at or above the median from
/// which every remaining row exceeds the line by more than
/// `tolerance * spread`. Zero spread, or no such row, gives `+inf`.
pub fn qq_threshold(rows: &[QuantileRow], tolerance: f64) -> QqFit {
    let central: Vec<&QuantileRow> = rows.iter().filter(|r| r.quantile.abs() <= 1.0).collect();
    let none = |mean, spread| QqFit {
        mean,
        spread,
        threshold: f64::INFINITY,
    };
    if central.len() < 2 {
        return none(f64::NAN, 0.0);
    }

    let n = central.len() as f64;
    let mq = central.iter().map(|r| r.quantile).sum::<f64>() / n;
    let mv = central.iter().map(|r| r.value).sum::<f64>() / n;
    let sqq: f64 = central.iter().map(|r| (r.quantile - mq).powi(2)).sum();
    let sqv: f64 = central.iter().map(|r| (r.quantile - mq) * (r.value - mv)).sum();
    if sqq <= 0.0 {
        return none(mv, 0.0);
    }
    let spread = sqv / sqq;
    let mean = mv - spread * mq;

    let scale = rows.iter().fold(0.0_f64, |m, r| m.max(r.value.abs()));
    if !(spread.is_finite() && spread > 1e-12 * (1.0 + scale)) {
        return none(mean, spread.max(0.0));
    }

    let limit = tolerance * spread;
    let departs = |r: &QuantileRow| r.value - (mean + spread * r.quantile) > limit;

    let median = rows.len() / 2;
    let tail_start = rows.len() - rows.iter().rev().take_while(|r| departs(r)).count();
    if tail_start == rows.len() {
        return none(mean, spread);
    }

    QqFit {
        mean,
        spread,
        threshold: rows[tail_start.max(median)].value,
    }
}

/// Classify channel cells of `dem`.
///
/// `area_threshold` is in map units squared and `window_radius` in map
/// units. The filtered surface is filled with the configured minimum slope
/// before its drainage area is measured.
pub fn isolate_channels(
    dem: &Raster<f64>,
    area_threshold: f64,
    window_radius: f64,
    config: &ExtractionConfig,
) -> Result<ChannelIsolation> {
    validate_non_negative("pruning_drainage_area", area_threshold)?;

    let filtered = wiener_filter(dem, config.memory_limit_bytes)?;
    let curvature = fit_curvature(&filtered, window_radius)?;

    let flow = route(&fill(&filtered, config.min_slope_for_fill)?)?;
    let accumulation = accumulate(&flow)?;
    let cell_area = flow.cell_area();

    let values: Vec<f64> = curvature.data().iter().copied().collect();
    let quantiles = quantile_rows(values)?;
    let fit = qq_threshold(&quantiles, config.noise_tolerance);
    debug!(
        "channel isolation: normal fit mean {:.3e} spread {:.3e}, threshold {}",
        fit.mean, fit.spread, fit.threshold
    );

    let mut mask = dem.derive(0u8, None);
    let acc = accumulation.data();
    let mut count = 0usize;
    for ((r, c), m) in mask.data_mut().indexed_iter_mut() {
        let k = curvature.data()[[r, c]];
        let area = acc[[r, c]] as f64 * cell_area;
        if k.is_finite() && k >= fit.threshold && area >= area_threshold {
            *m = 1;
            count += 1;
        }
    }

    if count == 0 {
        warn!("channel isolation found no channel cells");
    }

    Ok(ChannelIsolation {
        mask,
        quantiles,
        threshold: fit.threshold,
        filtered,
        curvature,
    })
}

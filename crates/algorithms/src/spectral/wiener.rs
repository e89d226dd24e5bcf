//! Wiener filtering of elevation grids
//!
//! The grid is detrended with a least-squares plane. No-data holes take
//! the residual of their nearest valid cell, then the grid is
//! mirror-padded to power-of-two dimensions and transformed. The radially averaged
//! periodogram gives the signal estimate; white noise is estimated as the
//! mean power above a quarter cycle per cell. Each frequency is scaled by
//! `max(P - N, 0) / P` of its radial bin, the mean (DC) term is kept, and
//! the plane is restored after the inverse transform.

use std::collections::VecDeque;

use drainnet_core::raster::{d8, Raster};
use drainnet_core::{Algorithm, Error, Result};
use tracing::{debug, warn};

use super::fft::{fft_2d, next_pow2, Complex};

/// Radial frequency (cycles per cell) above which power counts as noise
const NOISE_FREQUENCY: f64 = 0.25;

/// Parameters for the Wiener filter
#[derive(Debug, Clone, Default)]
pub struct WienerParams {
    /// Fail with `ResourceExhaustion` instead of allocating more than this.
    pub memory_limit_bytes: Option<u64>,
}

/// Wiener filter as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct WienerFilter;

impl Algorithm for WienerFilter {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = WienerParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Wiener Filter"
    }

    fn description(&self) -> &'static str {
        "Suppress white noise in a DEM with a frequency-domain Wiener filter"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        wiener_filter(&input, params.memory_limit_bytes)
    }
}

/// Peak working memory of [`wiener_filter`] for a `rows x cols` grid:
/// two padded complex buffers plus the spectrum scratch, and the residual
/// and output grids.
pub fn wiener_memory_estimate(rows: usize, cols: usize) -> u64 {
    let padded = (next_pow2(rows) * next_pow2(cols)) as u64;
    padded * 16 * 3 + (rows * cols) as u64 * 8 * 2
}

/// Least-squares plane `z = p0 + p1 col + p2 row` over the valid cells.
/// Degenerate layouts fall back to the mean.
fn fit_plane(dem: &Raster<f64>) -> [f64; 3] {
    let mut s = [[0.0_f64; 3]; 3];
    let mut t = [0.0_f64; 3];
    for ((r, c), &z) in dem.data().indexed_iter() {
        if dem.is_nodata(z) {
            continue;
        }
        let basis = [1.0, c as f64, r as f64];
        for i in 0..3 {
            t[i] += basis[i] * z;
            for j in 0..3 {
                s[i][j] += basis[i] * basis[j];
            }
        }
    }
    if s[0][0] == 0.0 {
        return [0.0; 3];
    }

    let det3 = |m: &[[f64; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let det = det3(&s);
    let scale = s[0][0] * s[1][1].max(1.0) * s[2][2].max(1.0);
    if det.abs() <= 1e-12 * scale {
        return [t[0] / s[0][0], 0.0, 0.0];
    }

    // Cramer's rule
    let mut p = [0.0; 3];
    for (k, coeff) in p.iter_mut().enumerate() {
        let mut m = s;
        for i in 0..3 {
            m[i][k] = t[i];
        }
        *coeff = det3(&m) / det;
    }
    p
}

/// Wiener-filter `dem`, keeping no-data cells as they are.
///
/// Peak memory is logged as a warning on every call; with
/// `memory_limit_bytes` set, a larger estimate aborts with
/// [`Error::ResourceExhaustion`] before anything is allocated.
pub fn wiener_filter(dem: &Raster<f64>, memory_limit_bytes: Option<u64>) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    if rows < 3 || cols < 3 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let required = wiener_memory_estimate(rows, cols);
    let input_bytes = (rows * cols * 8) as u64;
    warn!(
        "wiener filter: peak working memory about {:.1} MiB ({:.0}x the input grid)",
        required as f64 / (1024.0 * 1024.0),
        required as f64 / input_bytes as f64
    );
    if let Some(limit) = memory_limit_bytes {
        if required > limit {
            return Err(Error::ResourceExhaustion {
                stage: "wiener_filter",
                required_bytes: required,
                limit_bytes: limit,
            });
        }
    }

    let plane = fit_plane(dem);
    let trend = |r: usize, c: usize| plane[0] + plane[1] * c as f64 + plane[2] * r as f64;

    let data = dem.data();
    let mut residual = vec![0.0_f64; rows * cols];
    let mut known = vec![false; rows * cols];
    let mut max_value = 0.0_f64;
    for ((r, c), &z) in data.indexed_iter() {
        if !dem.is_nodata(z) {
            residual[r * cols + c] = z - trend(r, c);
            known[r * cols + c] = true;
            max_value = max_value.max(z.abs());
        }
    }

    let max_residual = residual.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if max_residual <= 1e-9 * (1.0 + max_value) {
        debug!("wiener filter: surface is planar, returning input");
        return Ok(dem.clone());
    }
    extend_into_holes(&mut residual, &mut known, rows, cols);

    let nrows = next_pow2(rows);
    let ncols = next_pow2(cols);

    // Mirror padding at the far edges
    let mut grid = vec![Complex::zero(); nrows * ncols];
    for r in 0..nrows {
        let sr = if r < rows { r } else { (2 * rows).saturating_sub(r + 2) };
        for c in 0..ncols {
            let sc = if c < cols { c } else { (2 * cols).saturating_sub(c + 2) };
            let source = sr.min(rows - 1) * cols + sc.min(cols - 1);
            grid[r * ncols + c] = Complex::new(residual[source], 0.0);
        }
    }

    fft_2d(&mut grid, nrows, ncols, false);

    let n_total = (nrows * ncols) as f64;
    let span = nrows.max(ncols) as f64;
    let radial = |r: usize, c: usize| {
        let fr = r.min(nrows - r) as f64 / nrows as f64;
        let fc = c.min(ncols - c) as f64 / ncols as f64;
        (fr * fr + fc * fc).sqrt()
    };
    let bin_of = |f: f64| (f * span).round() as usize;
    let n_bins = bin_of(std::f64::consts::FRAC_1_SQRT_2) + 2;

    let mut bin_power = vec![0.0_f64; n_bins];
    let mut bin_count = vec![0usize; n_bins];
    let mut noise_sum = 0.0;
    let mut noise_count = 0usize;

    for r in 0..nrows {
        for c in 0..ncols {
            let power = grid[r * ncols + c].norm_sqr() / n_total;
            let f = radial(r, c);
            let b = bin_of(f);
            bin_power[b] += power;
            bin_count[b] += 1;
            if f > NOISE_FREQUENCY {
                noise_sum += power;
                noise_count += 1;
            }
        }
    }

    let noise = if noise_count > 0 {
        noise_sum / noise_count as f64
    } else {
        0.0
    };

    let gain: Vec<f64> = bin_power
        .iter()
        .zip(&bin_count)
        .enumerate()
        .map(|(b, (&p, &n))| {
            if b == 0 {
                return 1.0;
            }
            let mean = if n > 0 { p / n as f64 } else { 0.0 };
            if mean > 0.0 {
                (mean - noise).max(0.0) / mean
            } else {
                0.0
            }
        })
        .collect();

    debug!(
        "wiener filter: {}x{} padded to {}x{}, noise power {:.3e}",
        rows, cols, nrows, ncols, noise
    );

    for r in 0..nrows {
        for c in 0..ncols {
            let w = if r == 0 && c == 0 { 1.0 } else { gain[bin_of(radial(r, c))] };
            let cell = &mut grid[r * ncols + c];
            *cell = cell.scale(w);
        }
    }

    fft_2d(&mut grid, nrows, ncols, true);

    let mut output = dem.clone();
    for ((r, c), v) in output.data_mut().indexed_iter_mut() {
        if !dem.is_nodata(*v) {
            *v = grid[r * ncols + c].re + trend(r, c);
        }
    }

    Ok(output)
}

/// Give every no-data cell the residual of its nearest valid cell, taken
/// in 4-connected breadth-first order from the valid cells.
fn extend_into_holes(values: &mut [f64], known: &mut [bool], rows: usize, cols: usize) {
    let mut queue: VecDeque<usize> = (0..values.len()).filter(|&i| known[i]).collect();
    while let Some(i) = queue.pop_front() {
        for dir in [1u8, 3, 5, 7] {
            let Some((nr, nc)) = d8::step(i / cols, i % cols, dir, rows, cols) else {
                continue;
            };
            let j = nr * cols + nc;
            if !known[j] {
                known[j] = true;
                values[j] = values[i];
                queue.push_back(j);
            }
        }
    }
}

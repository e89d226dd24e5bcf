//! Tangential curvature from a least-squares quadratic surface
//!
//! Around every cell a quadratic
//!
//! ```text
//! z = a x² + b y² + c xy + d x + e y + f
//! ```
//!
//! is fitted to the cells whose centres lie within a circular window of
//! the given radius (map units). x points east and y north, both relative
//! to the centre cell. Curvatures are then read from the coefficients:
//!
//! ```text
//! tangential = 2 (a e² + b d² - c d e) / ((d² + e²) sqrt(1 + d² + e²))
//! profile    = 2 (a d² + b e² + c d e) / ((d² + e²) (1 + d² + e²)^1.5)
//! planform   = 2 (a e² + b d² - c d e) / (d² + e²)^1.5
//! mean       = (2a (1 + e²) - 2 c d e + 2b (1 + d²)) / (2 (1 + d² + e²)^1.5)
//! ```
//!
//! With this sign convention valleys (convergent flow) are positive.
//!
//! Windows lying fully inside valid data share one precomputed
//! pseudo-inverse. Windows clipped by the grid edge or by no-data are
//! solved from their own normal equations; fewer than six usable cells
//! leave the output as no-data (NaN).

use drainnet_core::raster::Raster;
use drainnet_core::{Algorithm, Error, Result};
use ndarray::Array2;

use crate::config::validate_positive;
use crate::maybe_rayon::*;

/// Number of quadratic coefficients
const TERMS: usize = 6;

/// Curvatures fitted over one window radius.
#[derive(Debug, Clone)]
pub struct SurfaceFit {
    pub tangential: Raster<f64>,
    pub profile: Raster<f64>,
    pub planform: Raster<f64>,
    pub mean: Raster<f64>,
}

/// Window radius for [`TangentialCurvature`], in map units.
#[derive(Debug, Clone)]
pub struct CurvatureParams {
    pub window_radius: f64,
}

impl Default for CurvatureParams {
    fn default() -> Self {
        Self { window_radius: 6.0 }
    }
}

/// Tangential curvature as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct TangentialCurvature;

impl Algorithm for TangentialCurvature {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = CurvatureParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Tangential Curvature"
    }

    fn description(&self) -> &'static str {
        "Tangential curvature from a quadratic surface fitted over a circular window"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fit_curvature(&input, params.window_radius)
    }
}

/// Tangential curvature of `dem` over a circular window of `window_radius`.
pub fn fit_curvature(dem: &Raster<f64>, window_radius: f64) -> Result<Raster<f64>> {
    let window = Window::new(window_radius, dem.cell_size())?;
    let coefficients = fit_all(dem, &window);
    build_raster(dem, &coefficients, tangential)
}

/// All four curvatures of `dem` over a circular window of `window_radius`.
pub fn surface_fit(dem: &Raster<f64>, window_radius: f64) -> Result<SurfaceFit> {
    let window = Window::new(window_radius, dem.cell_size())?;
    let coefficients = fit_all(dem, &window);
    Ok(SurfaceFit {
        tangential: build_raster(dem, &coefficients, tangential)?,
        profile: build_raster(dem, &coefficients, profile)?,
        planform: build_raster(dem, &coefficients, planform)?,
        mean: build_raster(dem, &coefficients, mean)?,
    })
}

/// Physical coefficients `[a, b, c, d, e, f]`.
type Coefficients = [f64; TERMS];

fn tangential(k: &Coefficients) -> f64 {
    let [a, b, c, d, e, _] = *k;
    let g2 = d * d + e * e;
    if g2 < 1e-20 {
        return 0.0;
    }
    2.0 * (a * e * e + b * d * d - c * d * e) / (g2 * (1.0 + g2).sqrt())
}

fn profile(k: &Coefficients) -> f64 {
    let [a, b, c, d, e, _] = *k;
    let g2 = d * d + e * e;
    if g2 < 1e-20 {
        return 0.0;
    }
    2.0 * (a * d * d + b * e * e + c * d * e) / (g2 * (1.0 + g2).powf(1.5))
}

fn planform(k: &Coefficients) -> f64 {
    let [a, b, c, d, e, _] = *k;
    let g2 = d * d + e * e;
    if g2 < 1e-20 {
        return 0.0;
    }
    2.0 * (a * e * e + b * d * d - c * d * e) / g2.powf(1.5)
}

fn mean(k: &Coefficients) -> f64 {
    let [a, b, c, d, e, _] = *k;
    let g2 = d * d + e * e;
    (2.0 * a * (1.0 + e * e) - 2.0 * c * d * e + 2.0 * b * (1.0 + d * d))
        / (2.0 * (1.0 + g2).powf(1.5))
}

/// Circular fitting window with its design matrix in normalised
/// coordinates (`u = dx / reach`, `v = dy / reach`).
struct Window {
    offsets: Vec<(isize, isize)>,
    design: Vec<Coefficients>,
    pseudo_inverse: Vec<f64>,
    /// Half-width in map units used for normalisation
    length: f64,
}

impl Window {
    fn new(radius: f64, cell_size: f64) -> Result<Self> {
        validate_positive("window_radius", radius)?;
        validate_positive("cell_size", cell_size)?;

        let reach = (radius / cell_size).floor() as isize;
        let limit = (radius / cell_size).powi(2) + 1e-9;

        let offsets: Vec<(isize, isize)> = (-reach..=reach)
            .flat_map(|dr| (-reach..=reach).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| ((dr * dr + dc * dc) as f64) <= limit)
            .collect();

        if offsets.len() < TERMS {
            return Err(Error::invalid_parameter(
                "window_radius",
                radius,
                format!("window holds {} cells, at least {} are needed", offsets.len(), TERMS),
            ));
        }

        let design: Vec<Coefficients> = offsets
            .iter()
            .map(|&(dr, dc)| design_row(dc as f64 / reach as f64, -(dr as f64) / reach as f64))
            .collect();

        let normal = normal_matrix(design.iter());
        let inverse = invert_small(&normal)
            .ok_or_else(|| Error::Algorithm("singular curvature window".into()))?;

        let n = design.len();
        let mut pseudo_inverse = vec![0.0; TERMS * n];
        for i in 0..TERMS {
            for (j, row) in design.iter().enumerate() {
                pseudo_inverse[i * n + j] = (0..TERMS).map(|k| inverse[i * TERMS + k] * row[k]).sum();
            }
        }

        Ok(Self {
            offsets,
            design,
            pseudo_inverse,
            length: reach as f64 * cell_size,
        })
    }

    /// Convert normalised coefficients to map units.
    fn to_physical(&self, k: Coefficients) -> Coefficients {
        let l = self.length;
        let l2 = l * l;
        [k[0] / l2, k[1] / l2, k[2] / l2, k[3] / l, k[4] / l, k[5]]
    }
}

fn design_row(u: f64, v: f64) -> Coefficients {
    [u * u, v * v, u * v, u, v, 1.0]
}

fn normal_matrix<'a>(rows: impl Iterator<Item = &'a Coefficients>) -> Vec<f64> {
    let mut xtx = vec![0.0; TERMS * TERMS];
    for row in rows {
        for i in 0..TERMS {
            for j in 0..TERMS {
                xtx[i * TERMS + j] += row[i] * row[j];
            }
        }
    }
    xtx
}

/// Gauss-Jordan inverse of a `TERMS x TERMS` matrix with partial pivoting.
fn invert_small(mat: &[f64]) -> Option<Vec<f64>> {
    let n = TERMS;
    let w = 2 * n;
    let mut aug = vec![0.0_f64; n * w];
    for i in 0..n {
        aug[i * w..i * w + n].copy_from_slice(&mat[i * n..i * n + n]);
        aug[i * w + n + i] = 1.0;
    }

    let scale = mat.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);

    for col in 0..n {
        let max_row = (col..n)
            .max_by(|&a, &b| aug[a * w + col].abs().total_cmp(&aug[b * w + col].abs()))?;
        if aug[max_row * w + col].abs() < 1e-12 * scale {
            return None;
        }
        if max_row != col {
            for j in 0..w {
                aug.swap(col * w + j, max_row * w + j);
            }
        }

        let pivot = aug[col * w + col];
        for j in 0..w {
            aug[col * w + j] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row * w + col];
            if factor != 0.0 {
                for j in 0..w {
                    aug[row * w + j] -= factor * aug[col * w + j];
                }
            }
        }
    }

    let mut inv = vec![0.0_f64; n * n];
    for i in 0..n {
        inv[i * n..i * n + n].copy_from_slice(&aug[i * w + n..i * w + w]);
    }
    Some(inv)
}

fn fit_all(dem: &Raster<f64>, window: &Window) -> Vec<Option<Coefficients>> {
    let (rows, cols) = dem.shape();

    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| fit_cell(dem, window, row, col))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn fit_cell(dem: &Raster<f64>, window: &Window, row: usize, col: usize) -> Option<Coefficients> {
    if !dem.is_valid(row, col) {
        return None;
    }
    let (rows, cols) = dem.shape();

    let mut values = Vec::with_capacity(window.offsets.len());
    let mut complete = true;
    for &(dr, dc) in &window.offsets {
        let r = row as isize + dr;
        let c = col as isize + dc;
        let value = if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
            None
        } else if dem.is_valid(r as usize, c as usize) {
            Some(unsafe { dem.get_unchecked(r as usize, c as usize) })
        } else {
            None
        };
        complete &= value.is_some();
        values.push(value);
    }

    let n = window.offsets.len();
    let normalised = if complete {
        let mut k = [0.0; TERMS];
        for (i, coeff) in k.iter_mut().enumerate() {
            *coeff = values
                .iter()
                .enumerate()
                .map(|(j, v)| window.pseudo_inverse[i * n + j] * v.unwrap_or(0.0))
                .sum();
        }
        k
    } else {
        let used: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter_map(|(j, v)| v.map(|z| (j, z)))
            .collect();
        if used.len() < TERMS {
            return None;
        }

        let xtx = normal_matrix(used.iter().map(|&(j, _)| &window.design[j]));
        let mut xtz = [0.0; TERMS];
        for &(j, z) in &used {
            for (i, acc) in xtz.iter_mut().enumerate() {
                *acc += window.design[j][i] * z;
            }
        }
        let inverse = invert_small(&xtx)?;
        let mut k = [0.0; TERMS];
        for (i, coeff) in k.iter_mut().enumerate() {
            *coeff = (0..TERMS).map(|m| inverse[i * TERMS + m] * xtz[m]).sum();
        }
        k
    };

    Some(window.to_physical(normalised))
}

fn build_raster(
    dem: &Raster<f64>,
    coefficients: &[Option<Coefficients>],
    metric: fn(&Coefficients) -> f64,
) -> Result<Raster<f64>> {
    let data: Vec<f64> = coefficients
        .iter()
        .map(|k| k.as_ref().map_or(f64::NAN, metric))
        .collect();
    let mut raster = Raster::from_array(
        Array2::from_shape_vec(dem.shape(), data).map_err(|e| Error::Other(e.to_string()))?,
    );
    raster.set_transform(*dem.transform());
    raster.set_nodata(Some(f64::NAN));
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use drainnet_core::GeoTransform;

    fn surface(rows: usize, cols: usize, cs: f64, f: impl Fn(f64, f64) -> f64) -> Raster<f64> {
        let mut dem = Raster::new(rows, cols);
        dem.set_transform(GeoTransform::new(0.0, rows as f64 * cs, cs, -cs));
        let (cr, cc) = (rows as f64 / 2.0, cols as f64 / 2.0);
        for r in 0..rows {
            for c in 0..cols {
                let x = (c as f64 - cc.floor()) * cs;
                let y = (cr.floor() - r as f64) * cs;
                dem.set(r, c, f(x, y)).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_plane_has_zero_curvature() {
        let dem = surface(15, 15, 1.0, |x, y| 0.3 * x + 0.2 * y + 5.0);
        let fit = surface_fit(&dem, 3.0).unwrap();
        assert_relative_eq!(fit.tangential.get(7, 7).unwrap(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(fit.mean.get(7, 7).unwrap(), 0.0, epsilon = 1e-10);
        // Edge cells are fitted from clipped windows
        assert_relative_eq!(fit.profile.get(0, 0).unwrap(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_valley_is_positive() {
        // Channel along y, sloping down toward -y
        let dem = surface(21, 21, 2.0, |x, y| 0.05 * x * x + 0.5 * y + 100.0);
        let tan = fit_curvature(&dem, 6.0).unwrap();
        // Off-axis the fit is exact: a = 0.05, d = 0.1 x, e = 0.5
        let x: f64 = 2.0 * 2.0;
        let (a, d, e) = (0.05, 0.1 * x, 0.5);
        let g2: f64 = d * d + e * e;
        let expected = 2.0 * a * e * e / (g2 * (1.0 + g2).sqrt());
        assert_relative_eq!(tan.get(10, 12).unwrap(), expected, epsilon = 1e-9);
        assert!(tan.get(10, 10).unwrap() > 0.0);
    }

    #[test]
    fn test_ridge_is_negative() {
        let dem = surface(21, 21, 1.0, |x, y| -0.1 * x * x + 0.3 * y);
        let tan = fit_curvature(&dem, 4.0).unwrap();
        assert!(tan.get(10, 10).unwrap() < 0.0);
    }

    #[test]
    fn test_bowl_closed_form() {
        let dem = surface(21, 21, 1.0, |x, y| x * x + y * y);
        let tan = fit_curvature(&dem, 2.5).unwrap();
        // At x = 2, y = 0: d = 4, e = 0, a = b = 1
        assert_relative_eq!(tan.get(10, 12).unwrap(), 2.0 / 17.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_sparse_window_is_nodata() {
        let mut dem = surface(9, 9, 1.0, |x, y| x + y);
        dem.set_nodata(Some(-9999.0));
        for r in 0..9 {
            for c in 0..9 {
                if (r, c) != (4, 4) && (r, c) != (4, 5) {
                    dem.set(r, c, -9999.0).unwrap();
                }
            }
        }
        let tan = fit_curvature(&dem, 2.0).unwrap();
        assert!(tan.get(4, 4).unwrap().is_nan());
        assert!(tan.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_two_radii_do_not_interfere() {
        let dem = surface(31, 31, 1.0, |x, y| 0.02 * x * x + 0.4 * y);
        let short = fit_curvature(&dem, 3.0).unwrap();
        let long = fit_curvature(&dem, 9.0).unwrap();
        let short_again = fit_curvature(&dem, 3.0).unwrap();
        assert_eq!(short.data(), short_again.data());
        // An exact quadratic gives the same answer at any scale
        assert_relative_eq!(
            short.get(15, 15).unwrap(),
            long.get(15, 15).unwrap(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_radius_validation() {
        let dem = surface(5, 5, 1.0, |x, _| x);
        assert!(matches!(
            fit_curvature(&dem, 0.0),
            Err(Error::InvalidParameter { .. })
        ));
        // Radius of one cell is a five-cell cross
        assert!(fit_curvature(&dem, 1.0).is_err());
        assert!(fit_curvature(&dem, 1.5).is_ok());
    }
}

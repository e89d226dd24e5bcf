//! Surface analysis
//!
//! Local quadratic fits over circular windows and the curvatures read
//! from them.

mod curvature;

pub use curvature::{fit_curvature, surface_fit, CurvatureParams, SurfaceFit, TangentialCurvature};

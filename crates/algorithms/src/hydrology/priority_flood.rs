//! Priority-Flood depression filling
//!
//! Processes cells in ascending elevation order from a frontier of
//! grid-edge cells and cells touching no-data. A cell reached from a
//! lower neighbour is raised to at least that neighbour plus `min_slope`,
//! which leaves every filled cell with a strictly descending path out.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). Priority-Flood: An optimal
//! depression-filling and watershed-labeling algorithm for digital elevation
//! models. *Computers & Geosciences*, 62, 117–127.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use drainnet_core::raster::{d8, Raster};
use drainnet_core::{Algorithm, Error, Result};

use crate::config::validate_non_negative;

/// A cell in the priority queue. Ties on elevation are broken by the
/// flattened index so the fill is deterministic.
#[derive(Debug, Clone, Copy)]
struct Cell {
    elevation: f64,
    index: usize,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so BinaryHeap (max-heap) pops the lowest cell first
impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .elevation
            .total_cmp(&self.elevation)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Parameters for Priority-Flood filling
#[derive(Debug, Clone)]
pub struct PriorityFloodParams {
    /// Minimum elevation increment enforced along every flow path.
    /// Zero produces flat filled areas.
    pub min_slope: f64,
}

impl Default for PriorityFloodParams {
    fn default() -> Self {
        Self { min_slope: 0.0001 }
    }
}

/// Priority-Flood fill algorithm
#[derive(Debug, Clone, Default)]
pub struct PriorityFlood;

impl Algorithm for PriorityFlood {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = PriorityFloodParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Priority-Flood"
    }

    fn description(&self) -> &'static str {
        "Fill depressions so every cell drains to the edge or to no-data"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill(&input, params.min_slope)
    }
}

/// Fill depressions in a DEM.
///
/// No-data cells keep their value. Seeds (grid-edge cells and cells with a
/// no-data neighbour) keep their elevation; every other cell ends at
/// `max(original, reaching + min_slope)`, where `reaching` is the filled
/// elevation of the neighbour that first reached it.
///
/// Filling an already filled grid returns it unchanged.
pub fn fill(dem: &Raster<f64>, min_slope: f64) -> Result<Raster<f64>> {
    validate_non_negative("min_slope_for_fill", min_slope)?;

    let (rows, cols) = dem.shape();
    let mut output = dem.clone();
    let mut visited = vec![false; rows * cols];
    let mut heap = BinaryHeap::new();

    for row in 0..rows {
        for col in 0..cols {
            let index = row * cols + col;
            if !dem.is_valid(row, col) {
                visited[index] = true;
                continue;
            }

            let on_edge = row == 0 || col == 0 || row + 1 == rows || col + 1 == cols;
            let touches_nodata = || {
                d8::neighbors(row, col, rows, cols).any(|(_, nr, nc)| !dem.is_valid(nr, nc))
            };

            if on_edge || touches_nodata() {
                let elevation = unsafe { dem.get_unchecked(row, col) };
                heap.push(Cell { elevation, index });
                visited[index] = true;
            }
        }
    }

    let data = output.data_mut();
    while let Some(cell) = heap.pop() {
        let (row, col) = (cell.index / cols, cell.index % cols);

        for (_, nr, nc) in d8::neighbors(row, col, rows, cols) {
            let n_index = nr * cols + nc;
            if visited[n_index] {
                continue;
            }
            visited[n_index] = true;

            let original = data[(nr, nc)];
            let floor = cell.elevation + min_slope;
            let filled = if original < floor { floor } else { original };

            data[(nr, nc)] = filled;
            heap.push(Cell {
                elevation: filled,
                index: n_index,
            });
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drainnet_core::GeoTransform;

    fn dem_with_sink() -> Raster<f64> {
        #[rustfmt::skip]
        let values = vec![
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 3.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 8.5,
        ];
        let mut dem = Raster::from_vec(values, 7, 7).unwrap();
        dem.set_transform(GeoTransform::new(0.0, 7.0, 1.0, -1.0));
        dem
    }

    #[test]
    fn test_fill_raises_sink() {
        let dem = dem_with_sink();
        let filled = fill(&dem, 0.0).unwrap();
        assert!(filled.get(3, 3).unwrap() >= 7.0);
    }

    #[test]
    fn test_fill_keeps_seed_elevations() {
        let dem = dem_with_sink();
        let filled = fill(&dem, 0.001).unwrap();
        for col in 0..7 {
            assert_eq!(filled.get(0, col).unwrap(), dem.get(0, col).unwrap());
            assert_eq!(filled.get(6, col).unwrap(), dem.get(6, col).unwrap());
        }
    }

    #[test]
    fn test_fill_is_idempotent() {
        let dem = dem_with_sink();
        let once = fill(&dem, 0.0001).unwrap();
        let twice = fill(&once, 0.0001).unwrap();
        assert_eq!(once.data(), twice.data());
    }

    #[test]
    fn test_nodata_is_untouched_and_seeds_neighbours() {
        let mut dem = Raster::filled(5, 5, 10.0);
        dem.set_nodata(Some(-9999.0));
        dem.set(2, 2, -9999.0).unwrap();
        dem.set(2, 3, 1.0).unwrap();

        let filled = fill(&dem, 0.01).unwrap();
        assert_eq!(filled.get(2, 2).unwrap(), -9999.0);
        // (2,3) touches no-data, so it is a seed and keeps its elevation
        assert_eq!(filled.get(2, 3).unwrap(), 1.0);
    }

    #[test]
    fn test_negative_slope_is_rejected() {
        let dem = dem_with_sink();
        assert!(matches!(
            fill(&dem, -1.0),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_algorithm_trait() {
        let filled = PriorityFlood.execute_default(dem_with_sink()).unwrap();
        assert!(filled.get(3, 3).unwrap() > 7.0);
    }
}

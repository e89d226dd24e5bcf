//! D8 steepest-descent routing and the resulting flow graph
//!
//! Every valid cell drains to the neighbour with the largest
//! `drop / distance`. Neighbours are scanned in direction-code order
//! (E, NE, N, NW, W, SW, S, SE) and only a strictly larger gradient
//! replaces the current best, so the first neighbour in that order wins
//! exact ties. A cell without a strictly lower valid neighbour is an
//! outlet and drains to itself. Flow never leaves the grid or enters
//! no-data.
//!
//! Nodes are flattened indices `row * cols + col`.

use drainnet_core::raster::{d8, GeoTransform, Raster};
use drainnet_core::{Algorithm, Error, Result};
use ndarray::Array2;

use crate::maybe_rayon::*;

/// Directed single-receiver flow graph over a filled elevation grid.
///
/// Alongside the receivers it keeps donors in compressed form and a
/// topological ordering of valid nodes (the "stack": every node appears
/// after its receiver), so upstream and downstream sweeps need no sort.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    elevation: Vec<f64>,
    valid: Vec<bool>,
    directions: Vec<u8>,
    receivers: Vec<usize>,
    donor_offsets: Vec<usize>,
    donors: Vec<usize>,
    stack: Vec<usize>,
}

/// D8 routing as an [`Algorithm`].
#[derive(Debug, Clone, Default)]
pub struct FlowRouting;

impl Algorithm for FlowRouting {
    type Input = Raster<f64>;
    type Output = FlowGraph;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Routing (D8)"
    }

    fn description(&self) -> &'static str {
        "Route a filled DEM into a single-receiver steepest-descent flow graph"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        route(&input)
    }
}

/// Build the flow graph of a (filled) DEM.
pub fn route(dem: &Raster<f64>) -> Result<FlowGraph> {
    let (rows, cols) = dem.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }
    let cell_size = dem.cell_size();
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(Error::invalid_parameter("cell_size", cell_size, "must be positive"));
    }

    let directions: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];

            for (col, slot) in row_data.iter_mut().enumerate() {
                if !dem.is_valid(row, col) {
                    continue;
                }
                let center = unsafe { dem.get_unchecked(row, col) };

                let mut max_drop = 0.0_f64;
                let mut best_dir: u8 = 0;

                for (dir, nr, nc) in d8::neighbors(row, col, rows, cols) {
                    if !dem.is_valid(nr, nc) {
                        continue;
                    }
                    let neighbor = unsafe { dem.get_unchecked(nr, nc) };
                    let drop = (center - neighbor) / (d8::DISTANCES[dir as usize] * cell_size);

                    if drop > max_drop {
                        max_drop = drop;
                        best_dir = dir;
                    }
                }

                *slot = best_dir;
            }

            row_data
        })
        .collect();

    let n = rows * cols;
    let mut elevation = Vec::with_capacity(n);
    let mut valid = Vec::with_capacity(n);
    for ((row, col), &z) in dem.data().indexed_iter() {
        let ok = dem.is_valid(row, col);
        valid.push(ok);
        elevation.push(if ok { z } else { f64::NAN });
    }

    let receivers: Vec<usize> = directions
        .iter()
        .enumerate()
        .map(|(node, &dir)| {
            let (row, col) = (node / cols, node % cols);
            match d8::step(row, col, dir, rows, cols) {
                Some((r, c)) if dir != 0 => r * cols + c,
                _ => node,
            }
        })
        .collect();

    let (donor_offsets, donors) = build_donors(&receivers);
    let stack = build_stack(&receivers, &valid, &donor_offsets, &donors);

    Ok(FlowGraph {
        rows,
        cols,
        transform: *dem.transform(),
        elevation,
        valid,
        directions,
        receivers,
        donor_offsets,
        donors,
        stack,
    })
}

/// Compressed donor lists: donors of `n` are `donors[offsets[n]..offsets[n + 1]]`,
/// in ascending node order.
fn build_donors(receivers: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let n = receivers.len();
    let mut counts = vec![0usize; n + 1];
    for (node, &r) in receivers.iter().enumerate() {
        if r != node {
            counts[r + 1] += 1;
        }
    }
    for i in 0..n {
        counts[i + 1] += counts[i];
    }
    let offsets = counts.clone();
    let mut cursor = counts;
    let mut donors = vec![0usize; offsets[n]];
    for (node, &r) in receivers.iter().enumerate() {
        if r != node {
            donors[cursor[r]] = node;
            cursor[r] += 1;
        }
    }
    (offsets, donors)
}

/// Braun & Willett (2013) ordering: outlets in row-major order, each
/// followed depth-first by everything that drains to it.
fn build_stack(
    receivers: &[usize],
    valid: &[bool],
    offsets: &[usize],
    donors: &[usize],
) -> Vec<usize> {
    let mut stack = Vec::with_capacity(receivers.len());
    let mut pending = Vec::new();
    for (node, &r) in receivers.iter().enumerate() {
        if r != node || !valid[node] {
            continue;
        }
        pending.push(node);
        while let Some(current) = pending.pop() {
            stack.push(current);
            pending.extend(donors[offsets[current]..offsets[current + 1]].iter().rev());
        }
    }
    stack
}

impl FlowGraph {
    /// Number of rows of the routed grid
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns of the routed grid
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells (valid or not)
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    pub fn cell_area(&self) -> f64 {
        self.transform.cell_area()
    }

    /// Flattened node index of (row, col); the caller keeps it in bounds.
    #[inline]
    pub fn node(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Node index of (row, col), or `None` outside the grid.
    pub fn node_at(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| self.node(row, col))
    }

    #[inline]
    pub fn row_col(&self, node: usize) -> (usize, usize) {
        (node / self.cols, node % self.cols)
    }

    /// Geographic coordinates of a node's cell centre
    pub fn coordinates(&self, node: usize) -> (f64, f64) {
        let (row, col) = self.row_col(node);
        self.transform.pixel_to_geo(col, row)
    }

    /// Whether `node` is inside the grid and holds data
    #[inline]
    pub fn is_valid(&self, node: usize) -> bool {
        self.valid.get(node).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.stack.len()
    }

    /// Downstream neighbour of `node`; an outlet is its own receiver.
    #[inline]
    pub fn receiver(&self, node: usize) -> usize {
        self.receivers[node]
    }

    /// D8 code of `node` (0 for outlets and no-data)
    pub fn direction(&self, node: usize) -> u8 {
        self.directions[node]
    }

    /// Valid node with nowhere lower to drain.
    #[inline]
    pub fn is_outlet(&self, node: usize) -> bool {
        self.is_valid(node) && self.receivers[node] == node
    }

    /// Nodes draining directly into `node`, ascending.
    #[inline]
    pub fn donors(&self, node: usize) -> &[usize] {
        &self.donors[self.donor_offsets[node]..self.donor_offsets[node + 1]]
    }

    /// Valid nodes ordered so that each appears after its receiver.
    pub fn stack(&self) -> &[usize] {
        &self.stack
    }

    pub fn outlets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&n| self.is_outlet(n))
    }

    /// Elevation the graph was routed on
    pub fn elevation(&self, node: usize) -> f64 {
        self.elevation[node]
    }

    /// Planimetric length of the step from `node` to its receiver.
    pub fn step_length(&self, node: usize) -> f64 {
        d8::DISTANCES[self.directions[node] as usize] * self.cell_size()
    }

    /// Nodes from `node` down to and including its outlet.
    pub fn flow_path(&self, node: usize) -> Vec<usize> {
        let mut path = vec![node];
        let mut current = node;
        while self.is_valid(current) && self.receivers[current] != current {
            current = self.receivers[current];
            path.push(current);
        }
        path
    }

    /// Whether `node` sits on the grid edge or next to a no-data cell.
    pub fn is_edge_or_nodata_adjacent(&self, node: usize) -> bool {
        let (row, col) = self.row_col(node);
        if row == 0 || col == 0 || row + 1 == self.rows || col + 1 == self.cols {
            return true;
        }
        d8::neighbors(row, col, self.rows, self.cols).any(|(_, r, c)| !self.valid[self.node(r, c)])
    }

    /// D8 codes as a raster (0 = outlet, 255 = no-data).
    pub fn flow_direction_grid(&self) -> Result<Raster<u8>> {
        let data: Vec<u8> = (0..self.len())
            .map(|n| if self.valid[n] { self.directions[n] } else { 255 })
            .collect();
        self.raster_from(data, Some(255))
    }

    pub(crate) fn raster_from<T: drainnet_core::RasterElement>(
        &self,
        data: Vec<T>,
        nodata: Option<T>,
    ) -> Result<Raster<T>> {
        let array = Array2::from_shape_vec((self.rows, self.cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        let mut raster = Raster::from_array(array);
        raster.set_transform(self.transform);
        raster.set_nodata(nodata);
        Ok(raster)
    }
}

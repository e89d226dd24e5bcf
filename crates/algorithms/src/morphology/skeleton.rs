//! Zhang-Suen thinning
//!
//! Two alternating sub-iterations peel boundary cells whose removal keeps
//! the 8-connectivity of the shape, until neither removes anything. Cells
//! outside the grid count as background, so shapes touching the border
//! are thinned as well.

use drainnet_core::raster::Raster;
use drainnet_core::{Algorithm, Error, Result};

use super::is_set;
use crate::maybe_rayon::*;

/// Skeletonization as an [`Algorithm`].
#[derive(Debug, Clone, Default)]
pub struct Skeletonize;

impl Algorithm for Skeletonize {
    type Input = Raster<u8>;
    type Output = Raster<u8>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Skeletonize"
    }

    fn description(&self) -> &'static str {
        "Zhang-Suen thinning of a binary mask to one-cell-wide centrelines"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        skeletonize(&input)
    }
}

/// Thin `mask` to a one-cell-wide skeleton.
pub fn skeletonize(mask: &Raster<u8>) -> Result<Raster<u8>> {
    let mut current = mask.derive(0u8, None);
    for (out, &v) in current.data_mut().iter_mut().zip(mask.data().iter()) {
        *out = u8::from(v == 1);
    }

    loop {
        let first = thinning_pass(&mut current, Pass::First);
        let second = thinning_pass(&mut current, Pass::Second);
        if first + second == 0 {
            break;
        }
    }

    Ok(current)
}

#[derive(Clone, Copy)]
enum Pass {
    First,
    Second,
}

/// One sub-iteration: mark every deletable cell against the current state,
/// then delete them together. Returns the number of deleted cells.
fn thinning_pass(image: &mut Raster<u8>, pass: Pass) -> usize {
    let (rows, cols) = image.shape();
    let snapshot = &*image;

    let to_remove: Vec<(usize, usize)> = (0..rows)
        .into_par_iter()
        .flat_map(|r| {
            (0..cols)
                .filter(|&c| is_set(snapshot, r, c) && deletable(snapshot, r, c, pass))
                .map(|c| (r, c))
                .collect::<Vec<_>>()
        })
        .collect();

    let data = image.data_mut();
    for &(r, c) in &to_remove {
        data[(r, c)] = 0;
    }
    to_remove.len()
}

fn deletable(image: &Raster<u8>, r: usize, c: usize, pass: Pass) -> bool {
    let p = neighbors_8(image, r, c);
    let b = p.iter().filter(|&&v| v == 1).count();
    if !(2..=6).contains(&b) || transitions_01(&p) != 1 {
        return false;
    }
    match pass {
        // P2 * P4 * P6 = 0 and P4 * P6 * P8 = 0
        Pass::First => p[0] * p[2] * p[4] == 0 && p[2] * p[4] * p[6] == 0,
        // P2 * P4 * P8 = 0 and P2 * P6 * P8 = 0
        Pass::Second => p[0] * p[2] * p[6] == 0 && p[0] * p[4] * p[6] == 0,
    }
}

/// Neighbours clockwise from north: P2(N), P3(NE), P4(E), P5(SE), P6(S),
/// P7(SW), P8(W), P9(NW).
fn neighbors_8(image: &Raster<u8>, r: usize, c: usize) -> [u8; 8] {
    const RING: [(isize, isize); 8] = [
        (-1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
        (1, 0),
        (1, -1),
        (0, -1),
        (-1, -1),
    ];
    let mut p = [0u8; 8];
    for (slot, &(dr, dc)) in p.iter_mut().zip(RING.iter()) {
        let nr = r as isize + dr;
        let nc = c as isize + dc;
        if nr >= 0 && nc >= 0 && is_set(image, nr as usize, nc as usize) {
            *slot = 1;
        }
    }
    p
}

/// Count 0 -> 1 transitions around the ring
fn transitions_01(p: &[u8; 8]) -> usize {
    (0..8).filter(|&i| p[i] == 0 && p[(i + 1) % 8] == 1).count()
}

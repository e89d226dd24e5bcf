//! Connected-component labeling and size filtering

use std::collections::VecDeque;

use drainnet_core::raster::{d8, Raster};
use drainnet_core::Result;

use super::is_set;

/// Component labels of a mask.
///
/// `labels` holds 0 for background and `1..=count` for components,
/// numbered in row-major order of their first cell.
#[derive(Debug, Clone)]
pub struct ComponentLabels {
    pub labels: Raster<i32>,
    /// Cell count per component; `sizes[i]` belongs to label `i + 1`
    pub sizes: Vec<usize>,
}

impl ComponentLabels {
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Label at (row, col), 0 for background or outside the grid.
    pub fn label(&self, row: usize, col: usize) -> i32 {
        self.labels.data().get((row, col)).copied().unwrap_or(0)
    }
}

/// Label the 8-connected components of `mask`.
pub fn connected_components(mask: &Raster<u8>) -> Result<ComponentLabels> {
    let (rows, cols) = mask.shape();
    let mut labels = mask.derive(0i32, None);
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for r in 0..rows {
        for c in 0..cols {
            if !is_set(mask, r, c) || labels.data()[(r, c)] != 0 {
                continue;
            }

            let label = sizes.len() as i32 + 1;
            let mut size = 0usize;
            labels.data_mut()[(r, c)] = label;
            queue.push_back((r, c));

            while let Some((cr, cc)) = queue.pop_front() {
                size += 1;
                for (_, nr, nc) in d8::neighbors(cr, cc, rows, cols) {
                    if is_set(mask, nr, nc) && labels.data()[(nr, nc)] == 0 {
                        labels.data_mut()[(nr, nc)] = label;
                        queue.push_back((nr, nc));
                    }
                }
            }

            sizes.push(size);
        }
    }

    Ok(ComponentLabels { labels, sizes })
}

/// Mask of the components with at least `min_size` cells.
pub fn filter_by_size(components: &ComponentLabels, min_size: usize) -> Result<Raster<u8>> {
    let mut mask = components.labels.derive(0u8, None);
    for (out, &label) in mask.data_mut().iter_mut().zip(components.labels.data().iter()) {
        if label > 0 && components.sizes[(label - 1) as usize] >= min_size {
            *out = 1;
        }
    }
    Ok(mask)
}

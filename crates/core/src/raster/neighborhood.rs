//! Neighborhood operations for raster analysis

use super::{Raster, RasterElement};

/// Defines a neighborhood pattern around a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    /// 3x3 neighborhood (8 neighbors + center)
    Queen3x3,
    /// 3x3 without corners (4 neighbors + center)
    Rook3x3,
    /// Circular neighborhood of given radius (in cells)
    Circle(usize),
}

impl Neighborhood {
    /// Get the radius of the neighborhood
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Queen3x3 | Neighborhood::Rook3x3 => 1,
            Neighborhood::Circle(r) => *r,
        }
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Queen3x3 => dr.abs() <= 1 && dc.abs() <= 1,
            Neighborhood::Rook3x3 => (dr.abs() <= 1 && dc == 0) || (dr == 0 && dc.abs() <= 1),
            Neighborhood::Circle(r) => {
                let r = *r as isize;
                dr * dr + dc * dc <= r * r
            }
        }
    }

    /// Relative positions in this neighborhood, row-major
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        (-r..=r)
            .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| self.contains(dr, dc))
            .collect()
    }
}

/// D8 flow directions.
///
/// Codes 1..=8 walk counter-clockwise from east: E, NE, N, NW, W, SW, S, SE.
/// Code 0 marks an outlet. Routing scans neighbours in code order, so the
/// order of [`OFFSETS`](d8::OFFSETS) is also the tie-break priority.
pub mod d8 {
    /// Direction offsets: (row_offset, col_offset), indexed by code
    pub const OFFSETS: [(isize, isize); 9] = [
        (0, 0),   // 0: outlet
        (0, 1),   // 1: E
        (-1, 1),  // 2: NE
        (-1, 0),  // 3: N
        (-1, -1), // 4: NW
        (0, -1),  // 5: W
        (1, -1),  // 6: SW
        (1, 0),   // 7: S
        (1, 1),   // 8: SE
    ];

    /// Distance multipliers for each direction
    pub const DISTANCES: [f64; 9] = [
        0.0,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
    ];

    /// Get the opposite direction
    pub fn opposite(dir: u8) -> u8 {
        if dir == 0 {
            0
        } else {
            ((dir - 1 + 4) % 8) + 1
        }
    }

    /// Neighbour of (row, col) in direction `dir`, if it lies inside a
    /// `rows x cols` grid.
    #[inline]
    pub fn step(row: usize, col: usize, dir: u8, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (dr, dc) = OFFSETS[dir as usize];
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
            None
        } else {
            Some((nr as usize, nc as usize))
        }
    }

    /// In-bounds 8-neighbours of (row, col) in code order, with their code.
    pub fn neighbors(
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> impl Iterator<Item = (u8, usize, usize)> {
        (1u8..=8).filter_map(move |dir| step(row, col, dir, rows, cols).map(|(r, c)| (dir, r, c)))
    }
}

/// Iterator over neighborhood values for a specific cell
pub struct NeighborhoodIterator<'a, T: RasterElement> {
    raster: &'a Raster<T>,
    center_row: usize,
    center_col: usize,
    offsets: Vec<(isize, isize)>,
    index: usize,
}

impl<'a, T: RasterElement> NeighborhoodIterator<'a, T> {
    pub fn new(raster: &'a Raster<T>, row: usize, col: usize, neighborhood: Neighborhood) -> Self {
        Self {
            raster,
            center_row: row,
            center_col: col,
            offsets: neighborhood
                .offsets()
                .into_iter()
                .filter(|&(dr, dc)| dr != 0 || dc != 0)
                .collect(),
            index: 0,
        }
    }
}

impl<'a, T: RasterElement> Iterator for NeighborhoodIterator<'a, T> {
    /// (row, col, value) or None if out of bounds
    type Item = Option<(usize, usize, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        let &(dr, dc) = self.offsets.get(self.index)?;
        self.index += 1;

        let new_row = self.center_row as isize + dr;
        let new_col = self.center_col as isize + dc;

        if new_row < 0
            || new_col < 0
            || new_row >= self.raster.rows() as isize
            || new_col >= self.raster.cols() as isize
        {
            Some(None)
        } else {
            let r = new_row as usize;
            let c = new_col as usize;
            // Safe because we just checked bounds
            let value = unsafe { self.raster.get_unchecked(r, c) };
            Some(Some((r, c, value)))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.offsets.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a, T: RasterElement> ExactSizeIterator for NeighborhoodIterator<'a, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighborhood_offsets() {
        assert_eq!(Neighborhood::Queen3x3.offsets().len(), 9);
        assert_eq!(Neighborhood::Rook3x3.offsets().len(), 5);
        // r=2 disk: 13 cells
        assert_eq!(Neighborhood::Circle(2).offsets().len(), 13);
    }

    #[test]
    fn test_d8_opposite() {
        assert_eq!(d8::opposite(1), 5); // E -> W
        assert_eq!(d8::opposite(3), 7); // N -> S
        assert_eq!(d8::opposite(2), 6); // NE -> SW
    }

    #[test]
    fn test_d8_neighbors_at_corner() {
        let n: Vec<_> = d8::neighbors(0, 0, 3, 3).collect();
        assert_eq!(n, vec![(1, 0, 1), (7, 1, 0), (8, 1, 1)]);
    }

    #[test]
    fn test_iterator_reports_out_of_bounds() {
        let raster: Raster<u8> = Raster::filled(2, 2, 1);
        let it = NeighborhoodIterator::new(&raster, 0, 0, Neighborhood::Queen3x3);
        assert_eq!(it.len(), 8);
        let inside: Vec<_> = it.flatten().collect();
        assert_eq!(inside.len(), 3);
    }
}

//! Radix-2 FFT on power-of-two grids

use crate::maybe_rayon::*;

/// A complex number for FFT computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn zero() -> Self {
        Self { re: 0.0, im: 0.0 }
    }

    fn mul(self, other: Self) -> Self {
        Self {
            re: self.re * other.re - self.im * other.im,
            im: self.re * other.im + self.im * other.re,
        }
    }

    fn add(self, other: Self) -> Self {
        Self { re: self.re + other.re, im: self.im + other.im }
    }

    fn sub(self, other: Self) -> Self {
        Self { re: self.re - other.re, im: self.im - other.im }
    }

    pub fn scale(self, k: f64) -> Self {
        Self { re: self.re * k, im: self.im * k }
    }

    pub fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }
}

/// Next power of 2 >= n
pub(crate) fn next_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// In-place Cooley-Tukey radix-2 FFT; the inverse divides by n.
/// `data.len()` must be a power of two.
pub(crate) fn fft_1d(data: &mut [Complex], inverse: bool) {
    let n = data.len();
    debug_assert!(n.is_power_of_two(), "FFT length must be power of 2");

    // Bit reversal
    let mut j = 0_usize;
    for i in 0..n {
        if i < j {
            data.swap(i, j);
        }
        let mut m = n >> 1;
        while m > 0 && j & m != 0 {
            j ^= m;
            m >>= 1;
        }
        j |= m;
    }

    let sign = if inverse { 1.0 } else { -1.0 };
    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let angle = sign * 2.0 * std::f64::consts::PI / len as f64;
        let wn = Complex::new(angle.cos(), angle.sin());

        let mut k = 0;
        while k < n {
            let mut w = Complex::new(1.0, 0.0);
            for m in 0..half {
                let u = data[k + m];
                let t = w.mul(data[k + m + half]);
                data[k + m] = u.add(t);
                data[k + m + half] = u.sub(t);
                w = w.mul(wn);
            }
            k += len;
        }
        len <<= 1;
    }

    if inverse {
        let inv_n = 1.0 / n as f64;
        for c in data.iter_mut() {
            *c = c.scale(inv_n);
        }
    }
}

/// Row-major `nrows x ncols` complex grid transformed in place.
///
/// Rows and columns are independent 1-D transforms and run in parallel;
/// the columns go through a transposed scratch buffer.
pub(crate) fn fft_2d(grid: &mut [Complex], nrows: usize, ncols: usize, inverse: bool) {
    grid.par_chunks_mut(ncols).for_each(|row| fft_1d(row, inverse));

    let mut transposed = vec![Complex::zero(); nrows * ncols];
    for r in 0..nrows {
        for c in 0..ncols {
            transposed[c * nrows + r] = grid[r * ncols + c];
        }
    }
    transposed
        .par_chunks_mut(nrows)
        .for_each(|col| fft_1d(col, inverse));
    for c in 0..ncols {
        for r in 0..nrows {
            grid[r * ncols + c] = transposed[c * nrows + r];
        }
    }
}

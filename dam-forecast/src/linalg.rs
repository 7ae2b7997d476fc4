use std::ops::{Index, IndexMut};

/// A small dense row-major matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// A zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// `scale` times the identity
    pub fn scaled_identity(n: usize, scale: f64) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = scale;
        }
        m
    }

    /// The number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `M·v`
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.cols);
        self.data
            .chunks_exact(self.cols)
            .map(|row| dot(row, v))
            .collect()
    }

    /// `vᵀ·M`
    pub fn vec_mul(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.rows);
        let mut out = vec![0.0; self.cols];
        for (row, &scale) in self.data.chunks_exact(self.cols).zip(v) {
            for (o, &m) in out.iter_mut().zip(row) {
                *o += scale * m;
            }
        }
        out
    }

    /// `M ← (M − a·bᵀ) / divisor`
    pub fn rank_one_downdate(&mut self, a: &[f64], b: &[f64], divisor: f64) {
        for (i, &ai) in a.iter().enumerate() {
            let row = &mut self.data[i * self.cols..(i + 1) * self.cols];
            for (m, &bj) in row.iter_mut().zip(b) {
                *m = (*m - ai * bj) / divisor;
            }
        }
    }

    /// Whether every entry is finite
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// The lower-triangular Cholesky factor, or None if the matrix is not
    /// symmetric positive definite (or not square, or not finite).
    pub fn cholesky(&self) -> Option<Matrix> {
        if self.rows != self.cols || !self.is_finite() {
            return None;
        }
        let n = self.rows;
        let mut l = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let mut sum = self[(i, j)];
                for k in 0..j {
                    sum -= l[(i, k)] * l[(j, k)];
                }
                if i == j {
                    if sum <= 0.0 || !sum.is_finite() {
                        return None;
                    }
                    l[(i, j)] = sum.sqrt();
                } else {
                    l[(i, j)] = sum / l[(j, j)];
                }
            }
        }
        Some(l)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        &mut self.data[row * self.cols + col]
    }
}

/// The inner product of two slices
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cholesky_of_spd() {
        let mut m = Matrix::zeros(2, 2);
        m[(0, 0)] = 4.0;
        m[(0, 1)] = 2.0;
        m[(1, 0)] = 2.0;
        m[(1, 1)] = 3.0;
        let l = m.cholesky().unwrap();
        assert_abs_diff_eq!(l[(0, 0)], 2.0);
        assert_abs_diff_eq!(l[(1, 0)], 1.0);
        assert_abs_diff_eq!(l[(1, 1)], 2.0_f64.sqrt());
        assert_eq!(l[(0, 1)], 0.0);
    }

    #[test]
    fn cholesky_rejects_indefinite() {
        let mut m = Matrix::scaled_identity(2, 1.0);
        m[(1, 1)] = -1.0;
        assert!(m.cholesky().is_none());

        m[(1, 1)] = f64::NAN;
        assert!(m.cholesky().is_none());
    }

    #[test]
    fn products() {
        let mut m = Matrix::zeros(2, 3);
        m[(0, 0)] = 1.0;
        m[(0, 2)] = 2.0;
        m[(1, 1)] = 3.0;
        assert_eq!(m.mul_vec(&[1.0, 1.0, 1.0]), vec![3.0, 3.0]);
        assert_eq!(m.vec_mul(&[1.0, 2.0]), vec![1.0, 6.0, 2.0]);
    }
}

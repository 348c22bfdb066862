//! Dense matrix primitives for the WCS least-squares fit
//!
//! A small row-major `f64` matrix type with the handful of operations the
//! normal-equation solver needs: transpose, multiply and Gauss-Jordan
//! inversion with partial pivoting. All operations are pure; inputs are never
//! mutated and every result is a fresh allocation.

use crate::{Result, SolveError};

/// Row-major two-dimensional matrix of `f64`
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a zero-initialized matrix with the given dimensions
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(SolveError::DimError(format!(
                "matrix dimensions must be positive, got {}x{}",
                rows, cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        })
    }

    /// Create a matrix by copying `data` in row-major order
    pub fn from_slice(data: &[f64], rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(SolveError::DimError(format!(
                "expected {} elements for a {}x{} matrix, got {}",
                rows * cols,
                rows,
                cols,
                data.len()
            )));
        }
        let mut m = Self::new(rows, cols)?;
        m.data.copy_from_slice(data);
        Ok(m)
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Bounds-checked element access
    pub fn at(&self, r: usize, c: usize) -> Result<f64> {
        if r >= self.rows || c >= self.cols {
            return Err(SolveError::IndexError(format!(
                "({}, {}) out of bounds for {}x{} matrix",
                r, c, self.rows, self.cols
            )));
        }
        Ok(self.data[r * self.cols + c])
    }

    /// Bounds-checked element assignment
    pub fn set(&mut self, r: usize, c: usize, v: f64) -> Result<()> {
        if r >= self.rows || c >= self.cols {
            return Err(SolveError::IndexError(format!(
                "({}, {}) out of bounds for {}x{} matrix",
                r, c, self.rows, self.cols
            )));
        }
        self.data[r * self.cols + c] = v;
        Ok(())
    }

    /// Return the transpose as a fresh matrix
    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix {
            rows: self.cols,
            cols: self.rows,
            data: vec![0.0; self.data.len()],
        };
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * out.cols + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// Matrix product `self * other`
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(SolveError::DimError(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::new(self.rows, other.cols)?;
        for r in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self.data[r * self.cols + k];
                if lhs == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    out.data[r * out.cols + c] += lhs * other.data[k * other.cols + c];
                }
            }
        }
        Ok(out)
    }

    /// Invert a square matrix by Gauss-Jordan elimination with partial pivoting
    ///
    /// Pivots are chosen by largest absolute value in the remaining column;
    /// a pivot of exactly zero after the row exchange means the matrix is
    /// singular.
    pub fn invert(&self) -> Result<Matrix> {
        if self.rows != self.cols {
            return Err(SolveError::DimError(format!(
                "cannot invert non-square {}x{} matrix",
                self.rows, self.cols
            )));
        }
        let n = self.rows;

        // Augmented system [A | I], reduced in place.
        let mut a = self.data.clone();
        let mut inv = vec![0.0; n * n];
        for i in 0..n {
            inv[i * n + i] = 1.0;
        }

        for col in 0..n {
            // Partial pivot on absolute magnitude.
            let mut pivot_row = col;
            let mut pivot_mag = a[col * n + col].abs();
            for r in (col + 1)..n {
                let mag = a[r * n + col].abs();
                if mag > pivot_mag {
                    pivot_mag = mag;
                    pivot_row = r;
                }
            }
            if pivot_mag == 0.0 {
                return Err(SolveError::SingularError);
            }
            if pivot_row != col {
                for c in 0..n {
                    a.swap(col * n + c, pivot_row * n + c);
                    inv.swap(col * n + c, pivot_row * n + c);
                }
            }

            let pivot = a[col * n + col];
            for c in 0..n {
                a[col * n + c] /= pivot;
                inv[col * n + c] /= pivot;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a[r * n + col];
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    a[r * n + c] -= factor * a[col * n + c];
                    inv[r * n + c] -= factor * inv[col * n + c];
                }
            }
        }

        Ok(Matrix {
            rows: n,
            cols: n,
            data: inv,
        })
    }

    /// Identity matrix of size `n`
    pub fn identity(n: usize) -> Result<Matrix> {
        let mut m = Matrix::new(n, n)?;
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_new_rejects_zero_dimensions() {
        assert!(Matrix::new(0, 3).is_err());
        assert!(Matrix::new(3, 0).is_err());
    }

    #[test]
    fn test_from_slice_length_check() {
        assert!(Matrix::from_slice(&[1.0, 2.0, 3.0], 2, 2).is_err());
        let m = Matrix::from_slice(&[1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        assert_eq!(m.at(1, 0).unwrap(), 3.0);
    }

    #[test]
    fn test_at_set_bounds() {
        let mut m = Matrix::new(2, 3).unwrap();
        assert!(m.set(1, 2, 5.0).is_ok());
        assert_eq!(m.at(1, 2).unwrap(), 5.0);
        assert!(m.at(2, 0).is_err());
        assert!(m.set(0, 3, 1.0).is_err());
    }

    #[test]
    fn test_transpose() {
        let m = Matrix::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        let t = m.transpose();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.cols(), 2);
        assert_eq!(t.at(0, 1).unwrap(), 4.0);
        assert_eq!(t.at(2, 0).unwrap(), 3.0);
        // Original is untouched
        assert_eq!(m.at(0, 2).unwrap(), 3.0);
    }

    #[test]
    fn test_multiply() {
        let a = Matrix::from_slice(&[1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let b = Matrix::from_slice(&[5.0, 6.0, 7.0, 8.0], 2, 2).unwrap();
        let p = a.multiply(&b).unwrap();
        assert_eq!(p.at(0, 0).unwrap(), 19.0);
        assert_eq!(p.at(0, 1).unwrap(), 22.0);
        assert_eq!(p.at(1, 0).unwrap(), 43.0);
        assert_eq!(p.at(1, 1).unwrap(), 50.0);
    }

    #[test]
    fn test_multiply_dimension_mismatch() {
        let a = Matrix::new(2, 3).unwrap();
        let b = Matrix::new(2, 3).unwrap();
        assert!(a.multiply(&b).is_err());
    }

    #[test]
    fn test_invert_known_matrix() {
        let m = Matrix::from_slice(
            &[4.0, 7.0, 2.0, 3.0, 6.0, 1.0, 2.0, 5.0, 1.0],
            3,
            3,
        )
        .unwrap();
        let inv = m.invert().unwrap();

        let expected = [
            [1.0 / 3.0, 1.0, -5.0 / 3.0],
            [-1.0 / 3.0, 0.0, 2.0 / 3.0],
            [1.0, -2.0, 1.0],
        ];
        for (r, row) in expected.iter().enumerate() {
            for (c, want) in row.iter().enumerate() {
                assert_abs_diff_eq!(inv.at(r, c).unwrap(), *want, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_invert_round_trip_is_identity() {
        let m = Matrix::from_slice(
            &[2.0, -1.0, 0.0, -1.0, 2.0, -1.0, 0.0, -1.0, 2.0],
            3,
            3,
        )
        .unwrap();
        let prod = m.multiply(&m.invert().unwrap()).unwrap();
        for r in 0..3 {
            for c in 0..3 {
                let want = if r == c { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(prod.at(r, c).unwrap(), want, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_invert_singular() {
        let m = Matrix::from_slice(&[1.0, 2.0, 2.0, 4.0], 2, 2).unwrap();
        match m.invert() {
            Err(SolveError::SingularError) => {}
            other => panic!("expected SingularError, got {:?}", other),
        }
    }

    #[test]
    fn test_invert_requires_square() {
        let m = Matrix::new(2, 3).unwrap();
        assert!(m.invert().is_err());
    }

    #[test]
    fn test_invert_needs_pivoting() {
        // Zero in the leading position forces a row exchange.
        let m = Matrix::from_slice(&[0.0, 1.0, 1.0, 0.0], 2, 2).unwrap();
        let inv = m.invert().unwrap();
        assert_abs_diff_eq!(inv.at(0, 1).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inv.at(1, 0).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inv.at(0, 0).unwrap(), 0.0, epsilon = 1e-12);
    }
}

//! Glue between the `ndarray` model frame and `nalgebra` factorisations.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2};

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Cholesky factor of a symmetric positive definite matrix
pub struct Factor(Cholesky<f64, Dyn>);

impl Factor {
    /// `None` if `a` is not positive definite or holds a non-finite entry.
    pub fn new(a: &Array2<f64>) -> Option<Self> {
        if a.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Cholesky::new(to_dmatrix(a)).map(Self)
    }

    /// Solves `a x = b`
    pub fn solve(&self, b: &Array1<f64>) -> Array1<f64> {
        let x = self.0.solve(&DVector::from_iterator(b.len(), b.iter().copied()));
        x.iter().copied().collect()
    }

    pub fn inverse(&self) -> Array2<f64> {
        let inv = self.0.inverse();
        Array2::from_shape_fn((inv.nrows(), inv.ncols()), |(i, j)| inv[(i, j)])
    }

    /// `ln |a|`
    pub fn ln_determinant(&self) -> f64 {
        self.0.ln_determinant()
    }
}

/// Indices of the columns of a Gram matrix that are not linear
/// combinations of earlier columns.
///
/// A column is kept when the Cholesky factor of the kept block extended
/// by it has a last pivot above `tol` relative to the column's diagonal.
pub fn independent_columns(gram: &Array2<f64>, tol: f64) -> Vec<usize> {
    let mut kept: Vec<usize> = vec![];
    for k in 0..gram.nrows() {
        let diag = gram[[k, k]];
        if !(diag > 0.0) || !diag.is_finite() {
            continue;
        }
        let mut block = kept.clone();
        block.push(k);
        let m = block.len();
        let sub = DMatrix::from_fn(m, m, |i, j| gram[[block[i], block[j]]]);
        let independent = Cholesky::new(sub).map_or(false, |chol| {
            let pivot = chol.l_dirty()[(m - 1, m - 1)];
            pivot * pivot > tol * diag
        });
        if independent {
            kept.push(k);
        }
    }
    kept
}

//! Extension methods for square matrices, mostly precision and covariance
//! matrices of multivariate normals.

use ndarray_inverse::Inverse;

use crate::{Axis, Float, Matrix};

/// Inverses of matrices with a larger (1-norm) condition number than this are
/// considered numerically useless. The condition number is taken after
/// scaling the matrix to a unit diagonal, so it does not depend on the units
/// of the individual dimensions.
pub const MAX_CONDITION_NUMBER: Float = 1e12;

/// `A⁻¹`, rejected when it is not finite or the condition number exceeds
/// [`MAX_CONDITION_NUMBER`]
fn checked_inverse(matrix: &Matrix<Float>) -> Option<Matrix<Float>> {
    let inverse = matrix.inv()?;
    if inverse.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let condition_number = matrix.one_norm() * inverse.one_norm();
    (condition_number.is_finite() && condition_number <= MAX_CONDITION_NUMBER).then_some(inverse)
}

/// Extension trait for `Matrix<Float>`
pub trait MatrixExt: Sized {
    /// Replace the matrix with `(A + Aᵀ) / 2`.
    /// Used to remove the asymmetric drift that accumulates when precision
    /// matrices are repeatedly added and subtracted.
    fn symmetrise(&mut self);

    /// Copying version of [`MatrixExt::symmetrise`]
    #[must_use]
    fn symmetrised(&self) -> Self;

    /// `|A[i, j] - A[j, i]| <= tolerance` for every element
    fn is_symmetric(&self, tolerance: Float) -> bool;

    /// Maximum absolute column sum
    fn one_norm(&self) -> Float;

    /// Inverse of the matrix, or `None` if the matrix is singular, contains
    /// non-finite values or is too ill-conditioned for the inverse to mean
    /// anything.
    ///
    /// A matrix with a positive diagonal is equilibrated to `D A D` with
    /// `D = diag(1 / √aᵢᵢ)` first, so `diag(1e-7, 1e6)` is as well conditioned
    /// as the identity.
    fn try_inverse(&self) -> Option<Self>;

    /// Lower triangular cholesky factor `L` with `A = L Lᵀ`.
    /// Returns `None` if the matrix is not (numerically) positive definite.
    fn try_cholesky(&self) -> Option<Self>;

    /// Whether `A + tolerance * I` admits a cholesky factorisation.
    fn is_positive_semi_definite(&self, tolerance: Float) -> bool;
}

impl MatrixExt for Matrix<Float> {
    fn symmetrise(&mut self) {
        debug_assert!(self.is_square());
        let n = self.nrows();
        for i in 0..n {
            for j in (i + 1)..n {
                let average = 0.5 * (self[(i, j)] + self[(j, i)]);
                self[(i, j)] = average;
                self[(j, i)] = average;
            }
        }
    }

    fn symmetrised(&self) -> Self {
        let mut copy = self.clone();
        copy.symmetrise();
        copy
    }

    fn is_symmetric(&self, tolerance: Float) -> bool {
        if !self.is_square() {
            return false;
        }
        let n = self.nrows();
        (0..n).all(|i| (i + 1..n).all(|j| (self[(i, j)] - self[(j, i)]).abs() <= tolerance))
    }

    fn one_norm(&self) -> Float {
        self.columns()
            .into_iter()
            .map(|column| column.fold(0.0, |acc: Float, x| acc + x.abs()))
            .fold(0.0, Float::max)
    }

    fn try_inverse(&self) -> Option<Self> {
        if !self.is_square() || self.iter().any(|x| !x.is_finite()) {
            return None;
        }
        if self.is_empty() {
            return Some(self.clone());
        }

        let diagonal = self.diag();
        if diagonal.iter().all(|&d| d > 0.0) {
            let scale = diagonal.mapv(|d| d.sqrt().recip());
            let outer = scale
                .view()
                .insert_axis(Axis(1))
                .dot(&scale.view().insert_axis(Axis(0)));
            let equilibrated = self * &outer;
            let inverse = checked_inverse(&equilibrated)?;
            Some(inverse * outer)
        } else {
            checked_inverse(self)
        }
    }

    fn try_cholesky(&self) -> Option<Self> {
        if !self.is_square() {
            return None;
        }
        let lower = self.cholesky();
        let valid = lower.iter().all(|x| x.is_finite()) && lower.diag().iter().all(|&d| d > 0.0);
        valid.then_some(lower)
    }

    fn is_positive_semi_definite(&self, tolerance: Float) -> bool {
        if !self.is_symmetric(tolerance.max(Float::EPSILON)) {
            return false;
        }
        let shifted = self + &(Self::eye(self.nrows()) * tolerance);
        shifted.try_cholesky().is_some()
    }
}

//! Multivariate normal distribution in information (canonical) form.
//!
//! A distribution `N(μ, Σ)` is stored as the information vector `η = Σ⁻¹μ` and
//! the precision matrix `Λ = Σ⁻¹`. Multiplying two densities is then a sum,
//! which is what makes the representation convenient for belief propagation.
//! A zero precision matrix is allowed and represents "no information".

use gbp_linalg::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MultivariateNormalError {
    #[error("the precision matrix is not square, it has shape {0}x{1}")]
    NonSquarePrecisionMatrix(usize, usize),
    #[error("the covariance matrix is not square, it has shape {0}x{1}")]
    NonSquareCovarianceMatrix(usize, usize),
    #[error(
        "the length of the vector ({0}) is not equal to the number of rows ({1}) or columns ({2}) \
         of the matrix"
    )]
    VectorLengthNotEqualMatrixShape(usize, usize, usize),
    #[error(
        "the covariance matrix is not invertible, which is required to calculate the precision \
         matrix"
    )]
    NonInvertibleCovarianceMatrix,
    #[error(
        "the precision matrix is not invertible, which is required to calculate the covariance \
         matrix"
    )]
    NonInvertiblePrecisionMatrix,
}

pub type Result<T> = std::result::Result<T, MultivariateNormalError>;

fn check_shape(vector: &Vector<Float>, matrix: &Matrix<Float>) -> Result<()> {
    if vector.len() != matrix.nrows() || vector.len() != matrix.ncols() {
        return Err(MultivariateNormalError::VectorLengthNotEqualMatrixShape(
            vector.len(),
            matrix.nrows(),
            matrix.ncols(),
        ));
    }
    Ok(())
}

#[allow(clippy::len_without_is_empty)]
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateNormal {
    information: Vector<Float>,
    precision:   Matrix<Float>,
}

impl MultivariateNormal {
    /// The distribution without any information, i.e. `η = 0` and `Λ = 0`.
    pub fn zeros(dim: usize) -> Self {
        Self {
            information: Vector::zeros(dim),
            precision:   Matrix::zeros((dim, dim)),
        }
    }

    /// Create a new multivariate normal distribution in information form.
    /// The precision matrix does not have to be invertible.
    ///
    /// # Example:
    /// ```
    /// use gbp_multivariate_normal::{MultivariateNormal, Result};
    /// use gbp_linalg::array;
    /// fn main() -> Result<()> {
    ///     let information = array![1.0, 2.0];
    ///     let precision = array![[2.0, 0.0], [0.0, 4.0]];
    ///     let normal = MultivariateNormal::from_information_and_precision(information, precision)?;
    ///     let mean = normal.mean()?;
    ///     assert!((&mean - &array![0.5, 0.5]).iter().all(|x| x.abs() < 1e-12));
    ///     Ok(())
    /// }
    /// ```
    pub fn from_information_and_precision(
        information: Vector<Float>,
        precision: Matrix<Float>,
    ) -> Result<Self> {
        if !precision.is_square() {
            return Err(MultivariateNormalError::NonSquarePrecisionMatrix(
                precision.nrows(),
                precision.ncols(),
            ));
        }
        check_shape(&information, &precision)?;
        Ok(Self {
            information,
            precision,
        })
    }

    /// Create a new multivariate normal distribution from the mean and
    /// covariance matrix
    ///
    /// # Example:
    /// ```
    /// use gbp_multivariate_normal::{MultivariateNormal, Result};
    /// use gbp_linalg::array;
    /// fn main() -> Result<()> {
    ///     let mean = array![1.0, 2.0];
    ///     let covariance = array![[0.5, 0.0], [0.0, 0.25]];
    ///     let normal = MultivariateNormal::from_mean_and_covariance(mean, covariance)?;
    ///     let expected = array![2.0, 8.0];
    ///     assert!((normal.information_vector() - &expected).iter().all(|x| x.abs() < 1e-12));
    ///     Ok(())
    /// }
    /// ```
    pub fn from_mean_and_covariance(mean: Vector<Float>, covariance: Matrix<Float>) -> Result<Self> {
        if !covariance.is_square() {
            return Err(MultivariateNormalError::NonSquareCovarianceMatrix(
                covariance.nrows(),
                covariance.ncols(),
            ));
        }
        check_shape(&mean, &covariance)?;
        let precision = covariance
            .try_inverse()
            .ok_or(MultivariateNormalError::NonInvertibleCovarianceMatrix)?
            .symmetrised();
        let information = precision.dot(&mean);
        Ok(Self {
            information,
            precision,
        })
    }

    /// Returns the "dimension" of the distribution, which is the length of the
    /// information vector
    pub fn len(&self) -> usize {
        self.information.len()
    }

    #[inline(always)]
    pub const fn information_vector(&self) -> &Vector<Float> {
        &self.information
    }

    #[inline(always)]
    pub const fn precision_matrix(&self) -> &Matrix<Float> {
        &self.precision
    }

    /// Split into the information vector and the precision matrix
    pub fn into_parts(self) -> (Vector<Float>, Matrix<Float>) {
        (self.information, self.precision)
    }

    /// Covariance matrix `Λ⁻¹`
    ///
    /// # Errors
    /// [`MultivariateNormalError::NonInvertiblePrecisionMatrix`] if the
    /// precision matrix is singular or too ill-conditioned.
    pub fn covariance(&self) -> Result<Matrix<Float>> {
        self.precision
            .try_inverse()
            .map(|covariance| covariance.symmetrised())
            .ok_or(MultivariateNormalError::NonInvertiblePrecisionMatrix)
    }

    /// Mean vector `Λ⁻¹η`
    pub fn mean(&self) -> Result<Vector<Float>> {
        self.mean_and_covariance().map(|(mean, _)| mean)
    }

    /// Both moments at the cost of a single matrix inversion
    pub fn mean_and_covariance(&self) -> Result<(Vector<Float>, Matrix<Float>)> {
        let covariance = self.covariance()?;
        let mean = covariance.dot(&self.information);
        Ok((mean, covariance))
    }

    /// Enforce `Λ = (Λ + Λᵀ) / 2`
    pub fn symmetrise(&mut self) {
        self.precision.symmetrise();
    }

    /// Both parameters multiplied by `factor`. Scaling the precision and
    /// information by the same factor keeps the mean, but changes the spread.
    #[must_use]
    pub fn scaled(&self, factor: Float) -> Self {
        Self {
            information: &self.information * factor,
            precision:   &self.precision * factor,
        }
    }

    /// Convex combination `damping * previous + (1 - damping) * self` of the
    /// parameters.
    #[must_use]
    pub fn damped(&self, previous: &Self, damping: Float) -> Self {
        debug_assert_eq!(self.len(), previous.len());
        let keep = 1.0 - damping;
        Self {
            information: &previous.information * damping + &self.information * keep,
            precision:   &previous.precision * damping + &self.precision * keep,
        }
    }
}

impl std::ops::Add<&MultivariateNormal> for MultivariateNormal {
    type Output = Self;

    fn add(mut self, rhs: &MultivariateNormal) -> Self::Output {
        self += rhs;
        self
    }
}

impl std::ops::AddAssign<&MultivariateNormal> for MultivariateNormal {
    fn add_assign(&mut self, rhs: &MultivariateNormal) {
        self.information += &rhs.information;
        self.precision += &rhs.precision;
    }
}

impl std::ops::Sub<&MultivariateNormal> for &MultivariateNormal {
    type Output = MultivariateNormal;

    fn sub(self, rhs: &MultivariateNormal) -> Self::Output {
        MultivariateNormal {
            information: &self.information - &rhs.information,
            precision:   &self.precision - &rhs.precision,
        }
    }
}

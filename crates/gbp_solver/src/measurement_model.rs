//! Measurement models map the concatenated states of the variables adjacent to
//! a factor to a predicted measurement `h(x)`.

use gbp_linalg::prelude::*;

use crate::{
    error::{GbpError, Result},
    loss::{Loss, SquaredLoss},
};

/// Covariance of the measurement noise, together with its inverse
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementNoise {
    covariance: Matrix<Float>,
    precision:  Matrix<Float>,
}

impl MeasurementNoise {
    /// # Errors
    /// [`GbpError::InvalidNoise`] if the covariance is not square or not
    /// invertible
    pub fn new(covariance: Matrix<Float>) -> Result<Self> {
        use gbp_multivariate_normal::MultivariateNormalError as E;
        if !covariance.is_square() {
            return Err(GbpError::InvalidNoise(E::NonSquareCovarianceMatrix(
                covariance.nrows(),
                covariance.ncols(),
            )));
        }
        let precision = covariance
            .try_inverse()
            .ok_or(GbpError::InvalidNoise(E::NonInvertibleCovarianceMatrix))?
            .symmetrised();
        Ok(Self {
            covariance,
            precision,
        })
    }

    /// `variance * I`
    pub fn isotropic(dim: usize, variance: Float) -> Result<Self> {
        Self::new(Matrix::eye(dim) * variance)
    }

    /// Independent noise with the given variances
    pub fn diagonal(variances: &Vector<Float>) -> Result<Self> {
        Self::new(Matrix::from_diag(variances))
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.covariance.nrows()
    }

    #[inline]
    pub const fn covariance(&self) -> &Matrix<Float> {
        &self.covariance
    }

    #[inline]
    pub const fn precision(&self) -> &Matrix<Float> {
        &self.precision
    }
}

/// Measurement model of a factor.
///
/// `x` is the concatenation of the states of the adjacent variables, in the
/// order the variables were given when the factor was added.
pub trait MeasurementModel: std::fmt::Debug + Send + Sync {
    /// Predicted measurement `h(x)`
    fn measure(&self, x: &Vector<Float>) -> Vector<Float>;

    /// Jacobian of [`MeasurementModel::measure`] at `x`.
    /// Defaults to [`MeasurementModel::first_order_jacobian`].
    fn jacobian(&self, x: &Vector<Float>) -> Matrix<Float> {
        self.first_order_jacobian(x.clone())
    }

    /// Step size used by [`MeasurementModel::first_order_jacobian`]
    fn jacobian_delta(&self) -> Float {
        1e-8
    }

    /// Forward difference approximation of the jacobian
    fn first_order_jacobian(&self, mut linearisation_point: Vector<Float>) -> Matrix<Float> {
        let h0 = self.measure(&linearisation_point);
        let mut jacobian = Matrix::<Float>::zeros((h0.len(), linearisation_point.len()));

        let delta = self.jacobian_delta();

        for i in 0..linearisation_point.len() {
            linearisation_point[i] += delta;
            let derivatives = (self.measure(&linearisation_point) - &h0) / delta;
            jacobian.column_mut(i).assign(&derivatives);
            linearisation_point[i] -= delta;
        }

        jacobian
    }

    /// `z - h(x)`
    fn residual(&self, x: &Vector<Float>, measurement: &Vector<Float>) -> Vector<Float> {
        measurement - &self.measure(x)
    }

    fn noise(&self) -> &MeasurementNoise;

    #[inline]
    fn noise_covariance(&self) -> &Matrix<Float> {
        self.noise().covariance()
    }

    #[inline]
    fn noise_precision(&self) -> &Matrix<Float> {
        self.noise().precision()
    }

    fn loss(&self) -> &dyn Loss;

    /// Linear models are linearised once, and never relinearised
    fn linear(&self) -> bool {
        false
    }

    /// Short name used when summarising a factorgraph
    fn name(&self) -> &str {
        "measurement model"
    }
}

/// `h(x) = A x + b`
#[derive(Debug)]
pub struct LinearModel {
    a:      Matrix<Float>,
    offset: Vector<Float>,
    noise:  MeasurementNoise,
    loss:   Box<dyn Loss>,
}

impl LinearModel {
    /// # Errors
    /// [`GbpError::DimensionMismatch`] if `a` does not have a row per
    /// dimension of the noise
    pub fn new(a: Matrix<Float>, noise: MeasurementNoise) -> Result<Self> {
        if a.nrows() != noise.dim() {
            return Err(GbpError::dimension_mismatch(
                "rows of the linear measurement matrix",
                noise.dim(),
                a.nrows(),
            ));
        }
        Ok(Self {
            offset: Vector::zeros(a.nrows()),
            a,
            noise,
            loss: Box::new(SquaredLoss),
        })
    }

    /// Set the constant offset `b`
    pub fn with_offset(mut self, offset: Vector<Float>) -> Result<Self> {
        if offset.len() != self.a.nrows() {
            return Err(GbpError::dimension_mismatch(
                "offset of the linear measurement model",
                self.a.nrows(),
                offset.len(),
            ));
        }
        self.offset = offset;
        Ok(self)
    }

    #[must_use]
    pub fn with_loss(mut self, loss: impl Loss + 'static) -> Self {
        self.loss = Box::new(loss);
        self
    }
}

impl MeasurementModel for LinearModel {
    fn measure(&self, x: &Vector<Float>) -> Vector<Float> {
        self.a.dot(x) + &self.offset
    }

    fn jacobian(&self, _x: &Vector<Float>) -> Matrix<Float> {
        self.a.clone()
    }

    fn noise(&self) -> &MeasurementNoise {
        &self.noise
    }

    fn loss(&self) -> &dyn Loss {
        self.loss.as_ref()
    }

    fn linear(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "linear"
    }
}

type MeasureFn = dyn Fn(&Vector<Float>) -> Vector<Float> + Send + Sync;
type JacobianFn = dyn Fn(&Vector<Float>) -> Matrix<Float> + Send + Sync;

/// Measurement model defined by a closure. The jacobian is approximated with
/// finite differences, unless an analytic one is given with
/// [`FnModel::with_jacobian`].
pub struct FnModel {
    name:           String,
    measure:        Box<MeasureFn>,
    jacobian:       Option<Box<JacobianFn>>,
    jacobian_delta: Float,
    noise:          MeasurementNoise,
    loss:           Box<dyn Loss>,
    linear:         bool,
}

impl std::fmt::Debug for FnModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnModel")
            .field("name", &self.name)
            .field("analytic_jacobian", &self.jacobian.is_some())
            .field("jacobian_delta", &self.jacobian_delta)
            .field("noise", &self.noise)
            .field("loss", &self.loss)
            .field("linear", &self.linear)
            .finish()
    }
}

impl FnModel {
    pub fn new<H>(measure: H, noise: MeasurementNoise) -> Self
    where
        H: Fn(&Vector<Float>) -> Vector<Float> + Send + Sync + 'static,
    {
        Self {
            name: String::from("fn"),
            measure: Box::new(measure),
            jacobian: None,
            jacobian_delta: 1e-8,
            noise,
            loss: Box::new(SquaredLoss),
            linear: false,
        }
    }

    #[must_use]
    pub fn with_jacobian<J>(mut self, jacobian: J) -> Self
    where
        J: Fn(&Vector<Float>) -> Matrix<Float> + Send + Sync + 'static,
    {
        self.jacobian = Some(Box::new(jacobian));
        self
    }

    #[must_use]
    pub const fn with_jacobian_delta(mut self, delta: Float) -> Self {
        self.jacobian_delta = delta;
        self
    }

    #[must_use]
    pub fn with_loss(mut self, loss: impl Loss + 'static) -> Self {
        self.loss = Box::new(loss);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declare `h` to be linear, so the factor is never relinearised
    #[must_use]
    pub const fn assume_linear(mut self) -> Self {
        self.linear = true;
        self
    }
}

impl MeasurementModel for FnModel {
    fn measure(&self, x: &Vector<Float>) -> Vector<Float> {
        (self.measure)(x)
    }

    fn jacobian(&self, x: &Vector<Float>) -> Matrix<Float> {
        self.jacobian
            .as_ref()
            .map_or_else(|| self.first_order_jacobian(x.clone()), |jacobian| jacobian(x))
    }

    fn jacobian_delta(&self) -> Float {
        self.jacobian_delta
    }

    fn noise(&self) -> &MeasurementNoise {
        &self.noise
    }

    fn loss(&self) -> &dyn Loss {
        self.loss.as_ref()
    }

    fn linear(&self) -> bool {
        self.linear
    }

    fn name(&self) -> &str {
        &self.name
    }
}

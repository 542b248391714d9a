//! Messages sent from factors to variables.
//!
//! Variable to factor messages are never stored. They are computed on demand
//! as the belief of the variable minus the last message the factor sent to
//! it.

use gbp_linalg::prelude::*;
use gbp_multivariate_normal::MultivariateNormal;

/// Newtype used to make it clear for the caller of `Message::new()`, that the
/// vector argument has to be an information vector, and not a mean.
#[derive(Debug, Clone)]
pub struct InformationVec(pub Vector<Float>);
/// Newtype used to make it clear for the caller of `Message::new()`, that the
/// matrix argument has to be a precision matrix, and not a covariance.
#[derive(Debug, Clone)]
pub struct PrecisionMatrix(pub Matrix<Float>);

/// A gaussian in information form, sized to the receiving variable
#[derive(Debug, Clone, PartialEq, derive_more::Deref, derive_more::From)]
pub struct Message(MultivariateNormal);

impl Message {
    /// # Errors
    /// If the precision matrix is not square, or does not match the length of
    /// the information vector.
    pub fn new(
        information: InformationVec,
        precision: PrecisionMatrix,
    ) -> gbp_multivariate_normal::Result<Self> {
        MultivariateNormal::from_information_and_precision(information.0, precision.0).map(Self)
    }

    /// The message that carries no information. Every edge starts out with it.
    pub fn zeros(dofs: usize) -> Self {
        Self(MultivariateNormal::zeros(dofs))
    }

    #[inline]
    pub const fn gaussian(&self) -> &MultivariateNormal {
        &self.0
    }

    #[inline]
    pub fn dofs(&self) -> usize {
        self.0.len()
    }

    /// Whether both parameters are all zeros
    pub fn is_zero(&self) -> bool {
        self.information_vector().iter().all(|&x| x == 0.0)
            && self.precision_matrix().iter().all(|&x| x == 0.0)
    }

    /// `damping * previous + (1 - damping) * self`, element wise on both
    /// parameters. A damping of `0.0` returns `self` unchanged.
    #[must_use]
    pub fn damped(self, previous: &Self, damping: Float) -> Self {
        if damping == 0.0 {
            return self;
        }
        Self(self.0.damped(&previous.0, damping))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use gbp_linalg::array;
    use gbp_multivariate_normal::MultivariateNormalError;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn zero_message() {
        let message = Message::zeros(2);
        assert!(message.is_zero());
        assert_eq!(message.dofs(), 2);
        assert_eq!(message.precision_matrix().shape(), &[2, 2]);
    }

    #[test]
    fn shapes_have_to_agree() {
        let result = Message::new(InformationVec(array![1.0, 2.0]), PrecisionMatrix(array![[1.0]]));
        assert_eq!(
            result,
            Err(MultivariateNormalError::VectorLengthNotEqualMatrixShape(2, 1, 1))
        );
    }

    #[test]
    fn damping_mixes_previous_and_new() {
        let previous =
            Message::new(InformationVec(array![1.0]), PrecisionMatrix(array![[2.0]])).unwrap();
        let new = Message::new(InformationVec(array![3.0]), PrecisionMatrix(array![[4.0]])).unwrap();

        let undamped = new.clone().damped(&previous, 0.0);
        assert_eq!(undamped, new);

        let damped = new.damped(&previous, 0.1);
        assert_relative_eq!(damped.information_vector()[0], 0.1 * 1.0 + 0.9 * 3.0);
        assert_relative_eq!(damped.precision_matrix()[(0, 0)], 0.1 * 2.0 + 0.9 * 4.0);
        assert!(!damped.is_zero());
    }
}

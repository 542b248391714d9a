//! Variable node of the factorgraph.

use gbp_linalg::prelude::*;
use gbp_multivariate_normal::MultivariateNormal;

use crate::{
    error::{GbpError, Result},
    id::{FactorIndex, VariableIndex},
    message::Message,
};

/// The prior of a variable. Never changes after construction.
#[derive(Debug, Clone)]
pub struct VariablePrior {
    gaussian: MultivariateNormal,
    /// `None` for a variable without a prior
    mean:     Option<Vector<Float>>,
}

impl VariablePrior {
    fn from_mean_and_covariance(mean: Vector<Float>, covariance: Matrix<Float>) -> Result<Self> {
        let gaussian = MultivariateNormal::from_mean_and_covariance(mean.clone(), covariance)
            .map_err(GbpError::InvalidPrior)?;
        Ok(Self {
            gaussian,
            mean: Some(mean),
        })
    }

    fn uninformative(dofs: usize) -> Self {
        Self {
            gaussian: MultivariateNormal::zeros(dofs),
            mean:     None,
        }
    }

    #[inline]
    pub const fn gaussian(&self) -> &MultivariateNormal {
        &self.gaussian
    }

    #[inline]
    pub const fn mean(&self) -> Option<&Vector<Float>> {
        self.mean.as_ref()
    }
}

/// The belief of a variable, with the moments cached whenever the precision
/// matrix is invertible
#[derive(Debug, Clone)]
pub struct VariableBelief {
    gaussian: MultivariateNormal,
    moments:  Option<(Vector<Float>, Matrix<Float>)>,
}

impl VariableBelief {
    fn new(gaussian: MultivariateNormal) -> Self {
        let moments = gaussian.mean_and_covariance().ok();
        Self { gaussian, moments }
    }

    #[inline]
    pub const fn gaussian(&self) -> &MultivariateNormal {
        &self.gaussian
    }

    #[inline]
    pub fn mean(&self) -> Option<&Vector<Float>> {
        self.moments.as_ref().map(|(mean, _)| mean)
    }

    #[inline]
    pub fn covariance(&self) -> Option<&Matrix<Float>> {
        self.moments.as_ref().map(|(_, covariance)| covariance)
    }

    /// Whether the precision matrix is invertible
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.moments.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct VariableNode {
    index: VariableIndex,
    dofs:  usize,
    prior: VariablePrior,
    belief: VariableBelief,
    /// Incident factors, and the position of this variable among the adjacent
    /// variables of each factor
    adjacent_factors: Vec<(FactorIndex, usize)>,
}

impl VariableNode {
    /// A variable with a gaussian prior. The belief starts out as the prior.
    pub(crate) fn new(
        index: VariableIndex,
        dofs: usize,
        prior_mean: Vector<Float>,
        prior_covariance: Matrix<Float>,
    ) -> Result<Self> {
        if prior_mean.len() != dofs {
            return Err(GbpError::dimension_mismatch(
                format!("prior mean of variable {index}"),
                dofs,
                prior_mean.len(),
            ));
        }
        if prior_covariance.nrows() != dofs || prior_covariance.ncols() != dofs {
            return Err(GbpError::dimension_mismatch(
                format!("prior covariance of variable {index}"),
                dofs,
                prior_covariance.nrows().max(prior_covariance.ncols()),
            ));
        }
        if !prior_covariance.is_positive_semi_definite(1e-12) {
            return Err(GbpError::InvalidPrior(
                gbp_multivariate_normal::MultivariateNormalError::NonInvertibleCovarianceMatrix,
            ));
        }

        let prior = VariablePrior::from_mean_and_covariance(prior_mean, prior_covariance)?;
        Ok(Self::with_prior(index, dofs, prior))
    }

    /// A variable without a prior. Its belief is singular until enough
    /// factors constrain it.
    pub(crate) fn without_prior(index: VariableIndex, dofs: usize) -> Self {
        Self::with_prior(index, dofs, VariablePrior::uninformative(dofs))
    }

    fn with_prior(index: VariableIndex, dofs: usize, prior: VariablePrior) -> Self {
        Self {
            index,
            dofs,
            belief: VariableBelief::new(prior.gaussian.clone()),
            prior,
            adjacent_factors: Vec::new(),
        }
    }

    #[inline]
    pub const fn index(&self) -> VariableIndex {
        self.index
    }

    #[inline]
    pub const fn dofs(&self) -> usize {
        self.dofs
    }

    #[inline]
    pub const fn prior(&self) -> &VariablePrior {
        &self.prior
    }

    #[inline]
    pub const fn belief(&self) -> &VariableBelief {
        &self.belief
    }

    #[inline]
    pub fn adjacent_factors(&self) -> &[(FactorIndex, usize)] {
        &self.adjacent_factors
    }

    pub(crate) fn connect(&mut self, factor: FactorIndex, slot: usize) {
        self.adjacent_factors.push((factor, slot));
    }

    /// Mean of the belief
    ///
    /// # Errors
    /// [`GbpError::SingularBelief`] if the precision matrix of the belief is
    /// not invertible
    pub fn mean(&self) -> Result<&Vector<Float>> {
        self.belief
            .mean()
            .ok_or(GbpError::SingularBelief { variable: self.index })
    }

    /// Covariance of the belief
    ///
    /// # Errors
    /// [`GbpError::SingularBelief`] if the precision matrix of the belief is
    /// not invertible
    pub fn covariance(&self) -> Result<&Matrix<Float>> {
        self.belief
            .covariance()
            .ok_or(GbpError::SingularBelief { variable: self.index })
    }

    /// The mean of the belief, or zeros when the belief is singular
    pub(crate) fn mean_or_zeros(&self) -> Vector<Float> {
        self.belief
            .mean()
            .cloned()
            .unwrap_or_else(|| Vector::zeros(self.dofs))
    }

    /// Set the belief to the prior times every incoming message.
    ///
    /// # Errors
    /// [`GbpError::SingularBelief`] if the fused precision matrix is not
    /// invertible, [`GbpError::DimensionMismatch`] if a message is not sized
    /// to the variable. The previous belief is kept in both cases.
    pub fn fuse<'a, I>(&mut self, messages: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let prior = self.prior.gaussian.clone();
        let mut gaussian = messages.into_iter().try_fold(prior, |belief, message| {
            if message.dofs() != self.dofs {
                return Err(GbpError::dimension_mismatch(
                    format!("message to variable {}", self.index),
                    self.dofs,
                    message.dofs(),
                ));
            }
            Ok(belief + message.gaussian())
        })?;
        gaussian.symmetrise();

        let belief = VariableBelief::new(gaussian);
        if !belief.is_valid() {
            return Err(GbpError::SingularBelief { variable: self.index });
        }
        self.belief = belief;
        Ok(())
    }

    /// Overwrite the mean of the belief, keeping its precision matrix
    pub(crate) fn set_mean(&mut self, mean: &Vector<Float>) -> Result<()> {
        if mean.len() != self.dofs {
            return Err(GbpError::dimension_mismatch(
                format!("mean of variable {}", self.index),
                self.dofs,
                mean.len(),
            ));
        }
        if !self.belief.is_valid() {
            return Err(GbpError::SingularBelief { variable: self.index });
        }
        let precision = self.belief.gaussian.precision_matrix().clone();
        let information = precision.dot(mean);
        let gaussian = MultivariateNormal::from_information_and_precision(information, precision)?;
        self.belief = VariableBelief::new(gaussian);
        Ok(())
    }

    /// `½ (μ - μ₀)ᵀ Λ₀ (μ - μ₀)`, `0` for a variable without a prior
    pub fn prior_energy(&self) -> Float {
        let Some(prior_mean) = self.prior.mean.as_ref() else {
            return 0.0;
        };
        let difference = self.mean_or_zeros() - prior_mean;
        0.5 * difference.dot(&self.prior.gaussian.precision_matrix().dot(&difference))
    }

    /// `Λ₀ (μ - μ₀)`, the gradient of [`VariableNode::prior_energy`]
    pub(crate) fn prior_energy_gradient(&self) -> Vector<Float> {
        let Some(prior_mean) = self.prior.mean.as_ref() else {
            return Vector::zeros(self.dofs);
        };
        let difference = self.mean_or_zeros() - prior_mean;
        self.prior.gaussian.precision_matrix().dot(&difference)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use gbp_linalg::array;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::message::{InformationVec, PrecisionMatrix};

    fn variable() -> VariableNode {
        VariableNode::new(VariableIndex(0), 1, array![1.0], array![[2.0]]).unwrap()
    }

    #[test]
    fn belief_starts_as_prior() {
        let v = variable();
        assert_abs_diff_eq!(v.mean().unwrap(), &array![1.0], epsilon = 1e-12);
        assert_abs_diff_eq!(v.covariance().unwrap(), &array![[2.0]], epsilon = 1e-12);
        assert_eq!(v.prior_energy(), 0.0);
    }

    #[test]
    fn fuse_adds_messages_to_prior() {
        let mut v = variable();
        let message =
            Message::new(InformationVec(array![3.0]), PrecisionMatrix(array![[1.5]])).unwrap();
        v.fuse([&message, &Message::zeros(1)]).unwrap();
        // prior: η = 0.5, Λ = 0.5
        assert_abs_diff_eq!(v.belief().gaussian().precision_matrix(), &array![[2.0]]);
        assert_abs_diff_eq!(v.mean().unwrap(), &array![1.75], epsilon = 1e-12);
        assert_abs_diff_eq!(v.prior_energy(), 0.5 * 0.75 * 0.75 * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn singular_fusion_keeps_previous_belief() {
        let mut v = variable();
        let cancelling =
            Message::new(InformationVec(array![0.0]), PrecisionMatrix(array![[-0.5]])).unwrap();
        assert_eq!(
            v.fuse([&cancelling]),
            Err(GbpError::SingularBelief {
                variable: VariableIndex(0)
            })
        );
        assert_abs_diff_eq!(v.mean().unwrap(), &array![1.0], epsilon = 1e-12);
    }

    #[test]
    fn variable_without_prior() {
        let v = VariableNode::without_prior(VariableIndex(3), 2);
        assert!(matches!(v.mean(), Err(GbpError::SingularBelief { .. })));
        assert_eq!(v.mean_or_zeros(), array![0.0, 0.0]);
        assert_eq!(v.prior_energy(), 0.0);
    }

    #[test]
    fn invalid_priors() {
        assert!(matches!(
            VariableNode::new(VariableIndex(0), 2, array![0.0], Matrix::eye(2)),
            Err(GbpError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            VariableNode::new(VariableIndex(0), 1, array![0.0], array![[-1.0]]),
            Err(GbpError::InvalidPrior(_))
        ));
    }

    #[test]
    fn message_of_wrong_size_is_rejected() {
        let mut v = variable();
        let result = v.fuse([&Message::zeros(2)]);
        assert_eq!(
            result,
            Err(GbpError::DimensionMismatch {
                what:     "message to variable v0".to_string(),
                expected: 1,
                actual:   2,
            })
        );
        assert_abs_diff_eq!(v.mean().unwrap(), &array![1.0], epsilon = 1e-12);
    }

    #[test]
    fn set_mean_checks_length() {
        let mut v = variable();
        assert!(matches!(
            v.set_mean(&array![1.0, 2.0]),
            Err(GbpError::DimensionMismatch { expected: 1, actual: 2, .. })
        ));
        let mut unconstrained = VariableNode::without_prior(VariableIndex(1), 1);
        assert_eq!(
            unconstrained.set_mean(&array![1.0]),
            Err(GbpError::SingularBelief {
                variable: VariableIndex(1)
            })
        );
    }

    #[test]
    fn prior_with_mixed_scales() {
        let v = VariableNode::new(VariableIndex(0), 2, array![0.0, 0.0], array![
            [1e-7, 0.0],
            [0.0, 1e6]
        ])
        .unwrap();
        assert_abs_diff_eq!(
            v.belief().gaussian().precision_matrix(),
            &array![[1e7, 0.0], [0.0, 1e-6]],
            epsilon = 1e-6
        );
    }

    #[test]
    fn set_mean_keeps_precision() {
        let mut v = variable();
        v.set_mean(&array![4.0]).unwrap();
        assert_abs_diff_eq!(v.mean().unwrap(), &array![4.0], epsilon = 1e-12);
        assert_abs_diff_eq!(v.covariance().unwrap(), &array![[2.0]], epsilon = 1e-12);
        assert_abs_diff_eq!(v.prior_energy_gradient(), array![1.5], epsilon = 1e-12);
    }
}

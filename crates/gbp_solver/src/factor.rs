//! Factor node of the factorgraph.

use gbp_config::{GbpSettings, RelinearisationDistance};
use gbp_linalg::{prelude::*, s};
use gbp_multivariate_normal::MultivariateNormal;

use crate::{
    error::{GbpError, Result},
    id::{FactorIndex, VariableIndex},
    marginalise::marginalise,
    measurement_model::MeasurementModel,
    message::Message,
    variable::VariableNode,
};

/// The gauss-newton linearisation of a factor at a point `x₀`
#[derive(Debug, Clone)]
struct Linearisation {
    point:     Vector<Float>,
    jacobian:  Matrix<Float>,
    /// `η = Jᵀ N⁻¹ (r₀ + J x₀)` and `Λ = Jᵀ N⁻¹ J`, not yet scaled by the
    /// robust weight
    potential: MultivariateNormal,
}

#[derive(Debug)]
pub struct FactorNode {
    index: FactorIndex,
    adjacent_variables: Vec<VariableIndex>,
    layout: BlockLayout,
    measurement: Vector<Float>,
    model: Box<dyn MeasurementModel>,
    linearisation: Option<Linearisation>,
    /// Robust weight of the potential, computed from the current residual
    weight: Float,
    /// Outgoing message to each adjacent variable
    messages: Vec<Message>,
    iterations_since_relinearisation: usize,
}

/// Messages computed by a factor in the parallel part of a sweep. One entry per
/// adjacent variable.
pub(crate) type CandidateMessages = Vec<Result<Message>>;

impl FactorNode {
    pub(crate) fn new(
        index: FactorIndex,
        adjacent_variables: Vec<VariableIndex>,
        dofs: &[usize],
        measurement: Vector<Float>,
        model: Box<dyn MeasurementModel>,
    ) -> Result<Self> {
        debug_assert_eq!(adjacent_variables.len(), dofs.len());
        let noise_dim = model.noise_covariance().nrows();
        if measurement.len() != noise_dim {
            return Err(GbpError::dimension_mismatch(
                format!("measurement of factor {index}"),
                noise_dim,
                measurement.len(),
            ));
        }

        Ok(Self {
            index,
            layout: BlockLayout::new(dofs),
            messages: dofs.iter().map(|&d| Message::zeros(d)).collect(),
            adjacent_variables,
            measurement,
            model,
            linearisation: None,
            weight: 1.0,
            iterations_since_relinearisation: 0,
        })
    }

    #[inline]
    pub const fn index(&self) -> FactorIndex {
        self.index
    }

    #[inline]
    pub fn adjacent_variables(&self) -> &[VariableIndex] {
        &self.adjacent_variables
    }

    #[inline]
    pub const fn measurement(&self) -> &Vector<Float> {
        &self.measurement
    }

    #[inline]
    pub fn model(&self) -> &dyn MeasurementModel {
        self.model.as_ref()
    }

    #[inline]
    pub const fn weight(&self) -> Float {
        self.weight
    }

    /// Whether the robust loss currently downweights the factor
    #[inline]
    pub fn is_robust(&self) -> bool {
        self.weight < 1.0
    }

    #[inline]
    pub const fn iterations_since_relinearisation(&self) -> usize {
        self.iterations_since_relinearisation
    }

    /// The last message sent to the variable at position `slot`
    #[inline]
    pub fn message(&self, slot: usize) -> &Message {
        &self.messages[slot]
    }

    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn linearisation_point(&self) -> Option<&Vector<Float>> {
        self.linearisation.as_ref().map(|l| &l.point)
    }

    pub fn jacobian(&self) -> Option<&Matrix<Float>> {
        self.linearisation.as_ref().map(|l| &l.jacobian)
    }

    pub(crate) fn increment_iterations_since_relinearisation(&mut self) {
        self.iterations_since_relinearisation += 1;
    }

    pub(crate) fn set_iterations_since_relinearisation(&mut self, iterations: usize) {
        self.iterations_since_relinearisation = iterations;
    }

    /// Concatenated means of the adjacent variables. Variables with a singular
    /// belief contribute zeros.
    pub fn adjacent_means(&self, variables: &[VariableNode]) -> Vector<Float> {
        let means: Vec<Vector<Float>> = self
            .adjacent_variables
            .iter()
            .map(|v| variables[v.index()].mean_or_zeros())
            .collect();
        concatenate(&means)
    }

    fn checked_measure(&self, x: &Vector<Float>) -> Result<Vector<Float>> {
        let h = self.model.measure(x);
        if h.len() != self.measurement.len() {
            return Err(GbpError::dimension_mismatch(
                format!("predicted measurement of factor {}", self.index),
                self.measurement.len(),
                h.len(),
            ));
        }
        Ok(h)
    }

    fn checked_jacobian(&self, x: &Vector<Float>) -> Result<Matrix<Float>> {
        let jacobian = self.model.jacobian(x);
        if jacobian.nrows() != self.measurement.len() {
            return Err(GbpError::dimension_mismatch(
                format!("rows of the jacobian of factor {}", self.index),
                self.measurement.len(),
                jacobian.nrows(),
            ));
        }
        if jacobian.ncols() != self.layout.total() {
            return Err(GbpError::dimension_mismatch(
                format!("columns of the jacobian of factor {}", self.index),
                self.layout.total(),
                jacobian.ncols(),
            ));
        }
        Ok(jacobian)
    }

    fn linearise_at(&self, point: Vector<Float>) -> Result<Linearisation> {
        let residual = &self.measurement - &self.checked_measure(&point)?;
        let jacobian = self.checked_jacobian(&point)?;

        let jt_noise_precision = jacobian.t().dot(self.model.noise_precision());
        let mut precision = jt_noise_precision.dot(&jacobian);
        precision.symmetrise();
        let information = jt_noise_precision.dot(&(jacobian.dot(&point) + residual));

        Ok(Linearisation {
            point,
            jacobian,
            potential: MultivariateNormal::from_information_and_precision(information, precision)?,
        })
    }

    /// Linearise the measurement model at `point`, and reset the
    /// relinearisation counter
    pub(crate) fn linearise(&mut self, point: Vector<Float>) -> Result<()> {
        self.linearisation = Some(self.linearise_at(point)?);
        self.iterations_since_relinearisation = 0;
        Ok(())
    }

    /// Distance between `x` and the linearisation point
    fn distance_from_linearisation_point(
        &self,
        x: &Vector<Float>,
        variables: &[VariableNode],
        metric: RelinearisationDistance,
    ) -> Option<Float> {
        let point = self.linearisation_point()?;
        let difference = x - point;
        let distance = match metric {
            RelinearisationDistance::Euclidean => difference.euclidean_norm(),
            RelinearisationDistance::Mahalanobis => self
                .adjacent_variables
                .iter()
                .enumerate()
                .map(|(slot, v)| {
                    let block = difference.slice(s![self.layout.range(slot)]);
                    let precision = variables[v.index()].belief().gaussian().precision_matrix();
                    block.dot(&precision.dot(&block))
                })
                .sum::<Float>()
                .max(0.0)
                .sqrt(),
        };
        Some(distance)
    }

    /// Nonlinear factors are relinearised when the adjacent means have moved
    /// more than `beta` away from the linearisation point, and the factor has
    /// been linear for at least `minimum_linear_iterations` iterations.
    pub fn needs_relinearisation(
        &self,
        x: &Vector<Float>,
        variables: &[VariableNode],
        settings: &GbpSettings,
    ) -> bool {
        if self.model.linear()
            || self.iterations_since_relinearisation < settings.minimum_linear_iterations
        {
            return false;
        }
        self.distance_from_linearisation_point(x, variables, settings.relinearisation_distance)
            .map_or(true, |distance| distance > settings.beta)
    }

    fn residual(&self, x: &Vector<Float>) -> Result<Vector<Float>> {
        Ok(&self.measurement - &self.checked_measure(x)?)
    }

    /// Squared mahalanobis distance of the residual `rᵀ N⁻¹ r`
    fn mahalanobis_squared(&self, residual: &Vector<Float>) -> Float {
        residual.dot(&self.model.noise_precision().dot(residual))
    }

    /// Update the robust weight from the residual at `x`
    pub(crate) fn robustify(&mut self, x: &Vector<Float>) -> Result<()> {
        let residual = self.residual(x)?;
        self.weight = self.model.loss().weight(self.mahalanobis_squared(&residual));
        Ok(())
    }

    /// The linearised potential scaled by the robust weight
    fn weighted_potential(linearisation: &Linearisation, weight: Float) -> (Vector<Float>, Matrix<Float>) {
        linearisation.potential.scaled(weight).into_parts()
    }

    /// The weighted potential of the factor in information form. Uses the
    /// stored linearisation, or linearises at the current adjacent means if
    /// the factor has not been linearised yet.
    pub fn potential(&self, variables: &[VariableNode]) -> Result<(Vector<Float>, Matrix<Float>)> {
        match &self.linearisation {
            Some(linearisation) => Ok(Self::weighted_potential(linearisation, self.weight)),
            None => {
                let linearisation = self.linearise_at(self.adjacent_means(variables))?;
                Ok(Self::weighted_potential(&linearisation, self.weight))
            }
        }
    }

    /// The part of a sweep that only reads the beliefs of the variables.
    ///
    /// Linearises the factor if needed, updates the robust weight and computes
    /// a new message for every adjacent variable. The messages are not stored,
    /// see [`FactorNode::send`].
    ///
    /// # Errors
    /// Returns a [`GbpError::DimensionMismatch`] if the measurement model
    /// produces values of the wrong size. A failure to marginalise is returned
    /// per message as [`GbpError::IllConditionedFactor`].
    pub(crate) fn compute_messages(
        &mut self,
        variables: &[VariableNode],
        settings: &GbpSettings,
    ) -> Result<CandidateMessages> {
        let x = self.adjacent_means(variables);

        if self.linearisation.is_none() {
            self.linearise(x.clone())?;
        } else if self.needs_relinearisation(&x, variables, settings) {
            tracing::trace!(
                "relinearising factor {} after {} iterations",
                self.index,
                self.iterations_since_relinearisation
            );
            self.linearise(x.clone())?;
        }

        self.robustify(&x)?;
        let (information, precision) = self.potential(variables)?;

        let messages = self
            .adjacent_variables
            .iter()
            .enumerate()
            .map(|(target, &variable)| {
                self.message_to(target, &information, &precision, variables)
                    .ok_or(GbpError::IllConditionedFactor {
                        factor: self.index,
                        variable,
                    })
            })
            .collect();

        Ok(messages)
    }

    /// Add the variable to factor messages of every other adjacent variable to
    /// the potential, and marginalise them out
    fn message_to(
        &self,
        target: usize,
        potential_information: &Vector<Float>,
        potential_precision: &Matrix<Float>,
        variables: &[VariableNode],
    ) -> Option<Message> {
        let mut information = potential_information.clone();
        let mut precision = potential_precision.clone();

        for (slot, variable) in self.adjacent_variables.iter().enumerate() {
            if slot == target {
                continue;
            }
            let range = self.layout.range(slot);
            let belief = variables[variable.index()].belief().gaussian();
            let incoming = belief - self.messages[slot].gaussian();

            let mut block = information.slice_mut(s![range.clone()]);
            block += incoming.information_vector();
            let mut block = precision.slice_mut(s![range.clone(), range]);
            block += incoming.precision_matrix();
        }

        marginalise(&information, &precision, &self.layout, target)
    }

    /// Store a new message to the variable at `slot`, damped with the
    /// previous one
    pub(crate) fn send(&mut self, slot: usize, message: Message, damping: Float) {
        let damped = message.damped(&self.messages[slot], damping);
        self.messages[slot] = damped;
    }

    /// `½ w rᵀ N⁻¹ r` at the current adjacent means, where the robust weight
    /// `w` is computed from the same residual
    pub fn energy(&self, variables: &[VariableNode]) -> Result<Float> {
        let residual = self.residual(&self.adjacent_means(variables))?;
        let mahalanobis_squared = self.mahalanobis_squared(&residual);
        let weight = self.model.loss().weight(mahalanobis_squared);
        Ok(0.5 * weight * mahalanobis_squared)
    }

    /// Gradient of [`FactorNode::energy`] with respect to the concatenated
    /// adjacent means `-w Jᵀ N⁻¹ r`, treating the robust weight as constant
    pub fn energy_gradient(&self, variables: &[VariableNode]) -> Result<Vector<Float>> {
        let x = self.adjacent_means(variables);
        let residual = self.residual(&x)?;
        let jacobian = self.checked_jacobian(&x)?;
        let weight = self.model.loss().weight(self.mahalanobis_squared(&residual));
        Ok(jacobian.t().dot(&self.model.noise_precision().dot(&residual)) * -weight)
    }

    /// Offset and size of the block of the variable at `slot`
    pub fn block(&self, slot: usize) -> std::ops::Range<usize> {
        self.layout.range(slot)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use gbp_linalg::array;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        loss::HuberLoss,
        measurement_model::{FnModel, LinearModel, MeasurementNoise},
    };

    fn variables() -> Vec<VariableNode> {
        vec![
            VariableNode::new(VariableIndex(0), 1, array![0.0], array![[1.0]]).unwrap(),
            VariableNode::new(VariableIndex(1), 1, array![1.0], array![[1.0]]).unwrap(),
        ]
    }

    fn difference_factor() -> FactorNode {
        let noise = MeasurementNoise::isotropic(1, 0.5).unwrap();
        let model = LinearModel::new(array![[-1.0, 1.0]], noise).unwrap();
        FactorNode::new(
            FactorIndex(0),
            vec![VariableIndex(0), VariableIndex(1)],
            &[1, 1],
            array![2.0],
            Box::new(model),
        )
        .unwrap()
    }

    #[test]
    fn measurement_has_to_match_noise() {
        let noise = MeasurementNoise::isotropic(2, 1.0).unwrap();
        let model = LinearModel::new(array![[1.0], [1.0]], noise).unwrap();
        let result = FactorNode::new(
            FactorIndex(0),
            vec![VariableIndex(0)],
            &[1],
            array![1.0],
            Box::new(model),
        );
        assert!(matches!(result, Err(GbpError::DimensionMismatch { .. })));
    }

    #[test]
    fn linear_potential() {
        let vars = variables();
        let mut factor = difference_factor();
        factor.linearise(factor.adjacent_means(&vars)).unwrap();
        let (information, precision) = factor.potential(&vars).unwrap();
        // Jᵀ N⁻¹ J and Jᵀ N⁻¹ z, independent of the linearisation point
        assert_abs_diff_eq!(precision, array![[2.0, -2.0], [-2.0, 2.0]], epsilon = 1e-12);
        assert_abs_diff_eq!(information, array![-4.0, 4.0], epsilon = 1e-12);
    }

    #[test]
    fn messages_of_first_iteration() {
        let vars = variables();
        let mut factor = difference_factor();
        let messages = factor.compute_messages(&vars, &GbpSettings::default()).unwrap();
        assert_eq!(messages.len(), 2);

        // Λ = 2 - 2 * 2 / (2 + 1) and η = 4 - (-2) / (2 + 1) * (-4 + 0)
        let to_second = messages[1].as_ref().unwrap();
        assert_abs_diff_eq!(to_second.precision_matrix()[(0, 0)], 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(to_second.information_vector()[0], 4.0 / 3.0, epsilon = 1e-12);

        let to_first = messages[0].as_ref().unwrap();
        assert_abs_diff_eq!(to_first.precision_matrix()[(0, 0)], 2.0 / 3.0, epsilon = 1e-12);
        // η = -4 - (-2) / (2 + 1) * (4 + 1)
        assert_abs_diff_eq!(to_first.information_vector()[0], -4.0 + 10.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn energy_of_residual() {
        let vars = variables();
        let factor = difference_factor();
        // r = 2 - (1 - 0) = 1, N⁻¹ = 2
        assert_abs_diff_eq!(factor.energy(&vars).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            factor.energy_gradient(&vars).unwrap(),
            array![2.0, -2.0],
            epsilon = 1e-12
        );
    }

    #[test]
    fn robust_factor_is_downweighted() {
        let vars = variables();
        let noise = MeasurementNoise::isotropic(1, 0.01).unwrap();
        let model = LinearModel::new(array![[-1.0, 1.0]], noise)
            .unwrap()
            .with_loss(HuberLoss::new(1.0).unwrap());
        let mut factor = FactorNode::new(
            FactorIndex(0),
            vec![VariableIndex(0), VariableIndex(1)],
            &[1, 1],
            array![10.0],
            Box::new(model),
        )
        .unwrap();
        factor.compute_messages(&vars, &GbpSettings::default()).unwrap();
        assert!(factor.is_robust());
        assert!(factor.weight() < 0.1);
    }

    #[test]
    fn nonlinear_factor_relinearises_after_moving() {
        let mut vars = vec![VariableNode::new(VariableIndex(0), 1, array![1.0], array![[1.0]]).unwrap()];
        let noise = MeasurementNoise::isotropic(1, 0.1).unwrap();
        let model = FnModel::new(|x| array![x[0] * x[0]], noise);
        let mut factor =
            FactorNode::new(FactorIndex(0), vec![VariableIndex(0)], &[1], array![4.0], Box::new(model))
                .unwrap();
        let settings = GbpSettings::builder()
            .beta(0.1)
            .minimum_linear_iterations(2)
            .build();

        factor.compute_messages(&vars, &settings).unwrap();
        assert_abs_diff_eq!(factor.linearisation_point().unwrap()[0], 1.0);

        vars[0].set_mean(&array![1.5]).unwrap();
        let x = factor.adjacent_means(&vars);
        assert!(!factor.needs_relinearisation(&x, &vars, &settings));

        factor.increment_iterations_since_relinearisation();
        factor.increment_iterations_since_relinearisation();
        assert!(factor.needs_relinearisation(&x, &vars, &settings));

        factor.compute_messages(&vars, &settings).unwrap();
        assert_abs_diff_eq!(factor.linearisation_point().unwrap()[0], 1.5);
        assert_eq!(factor.iterations_since_relinearisation(), 0);
    }

    #[test]
    fn damped_send() {
        let vars = variables();
        let mut factor = difference_factor();
        let messages = factor.compute_messages(&vars, &GbpSettings::default()).unwrap();
        let message = messages[1].clone().unwrap();
        factor.send(1, message, 0.5);
        assert_abs_diff_eq!(factor.message(1).information_vector()[0], 2.0 / 3.0, epsilon = 1e-12);
        assert!(factor.message(0).is_zero());
    }
}

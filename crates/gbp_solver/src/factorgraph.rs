//! The factorgraph and the synchronous gaussian belief propagation schedule.

use gbp_config::{GbpSettings, SolveSettings};
use gbp_linalg::{prelude::*, s};
use gbp_multivariate_normal::MultivariateNormal;
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::{
    error::{GbpError, Result},
    factor::{CandidateMessages, FactorNode},
    id::{FactorIndex, VariableIndex},
    measurement_model::MeasurementModel,
    message::Message,
    summary::GraphSummary,
    variable::VariableNode,
};

/// Lifecycle of a factorgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum SolverState {
    /// No variables have been added
    #[default]
    Uninitialized,
    /// Nodes have been added since the last solve
    Built,
    /// At least one sweep has run, but no solve has finished
    Iterating,
    Converged,
    MaxIterationsReached,
}

/// Numerical degeneracies the solver recovered from, by keeping the previous
/// belief or message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Recoveries {
    /// Variables whose fused precision matrix was singular
    pub singular_beliefs:        usize,
    /// Messages that could not be computed, because the factor could not
    /// marginalise out the other variables
    pub ill_conditioned_factors: usize,
}

impl Recoveries {
    pub const fn total(&self) -> usize {
        self.singular_beliefs + self.ill_conditioned_factors
    }
}

impl std::ops::AddAssign for Recoveries {
    fn add_assign(&mut self, rhs: Self) {
        self.singular_beliefs += rhs.singular_beliefs;
        self.ill_conditioned_factors += rhs.ill_conditioned_factors;
    }
}

/// Outcome of [`FactorGraph::solve`]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub state:      SolverState,
    /// Number of sweeps run
    pub iterations: usize,
    /// Energy after the last sweep
    pub energy:     Float,
    /// Energy before the first sweep, followed by the energy after each sweep
    pub energy_log: Vec<Float>,
    pub recoveries: Recoveries,
}

impl SolveReport {
    #[inline]
    pub fn converged(&self) -> bool {
        self.state == SolverState::Converged
    }
}

/// Random number generator for dropout, remembering the seed it was created
/// from
#[derive(Debug)]
struct DropoutRng {
    seed: Option<u64>,
    rng:  ChaCha8Rng,
}

fn dropout_rng(slot: &mut Option<DropoutRng>, seed: Option<u64>) -> &mut ChaCha8Rng {
    if slot.as_ref().map_or(false, |existing| existing.seed != seed) {
        *slot = None;
    }
    &mut slot
        .get_or_insert_with(|| DropoutRng {
            seed,
            rng: seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64),
        })
        .rng
}

/// A factor graph is a bipartite graph consisting of two types of nodes:
/// factors and variables. Nodes are stored in insertion order, and are never
/// removed.
#[derive(Debug, Default)]
pub struct FactorGraph {
    variables:  Vec<VariableNode>,
    factors:    Vec<FactorNode>,
    state:      SolverState,
    /// Number of sweeps run since the graph was created
    iteration:  usize,
    energy_log: Vec<Float>,
    recoveries: Recoveries,
    rng:        Option<DropoutRng>,
}

impl FactorGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable with a gaussian prior.
    ///
    /// # Errors
    /// - [`GbpError::DimensionMismatch`] if the mean or covariance do not have
    ///   `dofs` dimensions.
    /// - [`GbpError::InvalidPrior`] if the covariance is not symmetric
    ///   positive definite.
    pub fn add_variable(
        &mut self,
        dofs: usize,
        prior_mean: Vector<Float>,
        prior_covariance: Matrix<Float>,
    ) -> Result<VariableIndex> {
        let index = VariableIndex(self.variables.len());
        let variable = VariableNode::new(index, dofs, prior_mean, prior_covariance)?;
        self.variables.push(variable);
        self.state = SolverState::Built;
        Ok(index)
    }

    /// Add a variable without a prior. Its belief stays singular until enough
    /// factors constrain it.
    pub fn add_variable_without_prior(&mut self, dofs: usize) -> VariableIndex {
        let index = VariableIndex(self.variables.len());
        self.variables.push(VariableNode::without_prior(index, dofs));
        self.state = SolverState::Built;
        index
    }

    /// Add a factor between `adjacent_variables`. The measurement model sees
    /// the states of the variables concatenated in the given order.
    ///
    /// # Errors
    /// - [`GbpError::NoAdjacentVariables`] if `adjacent_variables` is empty.
    /// - [`GbpError::InvalidReference`] if a variable does not exist.
    /// - [`GbpError::DuplicateAdjacentVariable`] if a variable is given twice.
    /// - [`GbpError::DimensionMismatch`] if the measurement does not match the
    ///   measurement noise.
    pub fn add_factor<M>(
        &mut self,
        adjacent_variables: &[VariableIndex],
        measurement: Vector<Float>,
        model: M,
    ) -> Result<FactorIndex>
    where
        M: MeasurementModel + 'static,
    {
        if adjacent_variables.is_empty() {
            return Err(GbpError::NoAdjacentVariables);
        }
        if let Some(&index) = adjacent_variables
            .iter()
            .find(|v| v.index() >= self.variables.len())
        {
            return Err(GbpError::InvalidReference {
                index,
                variables: self.variables.len(),
            });
        }
        if let Some(&duplicate) = adjacent_variables.iter().duplicates().next() {
            return Err(GbpError::DuplicateAdjacentVariable(duplicate));
        }

        let dofs = adjacent_variables
            .iter()
            .map(|v| self.variables[v.index()].dofs())
            .collect::<Vec<_>>();

        let index = FactorIndex(self.factors.len());
        let factor = FactorNode::new(
            index,
            adjacent_variables.to_vec(),
            &dofs,
            measurement,
            Box::new(model),
        )?;

        for (slot, v) in adjacent_variables.iter().enumerate() {
            self.variables[v.index()].connect(index, slot);
        }
        self.factors.push(factor);
        self.state = SolverState::Built;

        Ok(index)
    }

    #[inline]
    pub fn variable(&self, index: VariableIndex) -> Option<&VariableNode> {
        self.variables.get(index.index())
    }

    #[inline]
    pub fn factor(&self, index: FactorIndex) -> Option<&FactorNode> {
        self.factors.get(index.index())
    }

    #[inline]
    pub fn variables(&self) -> &[VariableNode] {
        &self.variables
    }

    #[inline]
    pub fn factors(&self) -> &[FactorNode] {
        &self.factors
    }

    #[inline]
    pub const fn state(&self) -> SolverState {
        self.state
    }

    /// Number of sweeps run since the graph was created
    #[inline]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }

    /// Energy log of the last solve
    #[inline]
    pub fn energy_log(&self) -> &[Float] {
        &self.energy_log
    }

    /// Recoveries since the graph was created
    #[inline]
    pub const fn recoveries(&self) -> Recoveries {
        self.recoveries
    }

    /// Total number of degrees of freedom
    pub fn joint_dim(&self) -> usize {
        self.variables.iter().map(VariableNode::dofs).sum()
    }

    fn layout(&self) -> BlockLayout {
        let dofs = self.variables.iter().map(VariableNode::dofs).collect::<Vec<_>>();
        BlockLayout::new(&dofs)
    }

    /// One synchronous sweep:
    /// 1. every factor computes its messages from the current beliefs, in
    ///    parallel
    /// 2. dropout and damping are applied to the new messages
    /// 3. every variable fuses its prior with the incoming messages, in
    ///    parallel
    ///
    /// Returns the numerical degeneracies recovered from during the sweep.
    pub fn synchronous_iteration(&mut self, settings: &GbpSettings) -> Result<Recoveries> {
        settings.validate()?;
        let mut recoveries = Recoveries::default();
        if self.variables.is_empty() {
            return Ok(recoveries);
        }
        self.state = SolverState::Iterating;

        let variables = &self.variables;
        let candidates = self
            .factors
            .par_iter_mut()
            .map(|factor| factor.compute_messages(variables, settings))
            .collect::<Result<Vec<CandidateMessages>>>()?;

        let dropout = settings.dropout.get();
        let rng = dropout_rng(&mut self.rng, settings.seed);
        for (factor, messages) in self.factors.iter_mut().zip(candidates) {
            let damping = settings.damping(factor.iterations_since_relinearisation());
            for (slot, message) in messages.into_iter().enumerate() {
                if dropout > 0.0 && !rng.gen_bool(1.0 - dropout) {
                    continue;
                }
                match message {
                    Ok(message) => factor.send(slot, message, damping),
                    Err(err) if err.is_recoverable() => {
                        tracing::warn!("{err}, keeping the previous message");
                        recoveries.ill_conditioned_factors += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
            factor.increment_iterations_since_relinearisation();
        }

        let factors = &self.factors;
        let fused = self
            .variables
            .par_iter_mut()
            .map(|variable| {
                let messages = variable
                    .adjacent_factors()
                    .iter()
                    .map(|&(factor, slot)| factors[factor.index()].message(slot))
                    .collect::<Vec<&Message>>();
                variable.fuse(messages)
            })
            .collect::<Vec<_>>();
        for result in fused {
            match result {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    tracing::warn!("{err}, keeping the previous belief");
                    recoveries.singular_beliefs += 1;
                }
                Err(err) => return Err(err),
            }
        }

        if settings
            .reset_iterations_since_relinearisation
            .contains(&self.iteration)
        {
            tracing::debug!(
                "resetting iterations since relinearisation after iteration {}",
                self.iteration
            );
            for factor in &mut self.factors {
                factor.set_iterations_since_relinearisation(1);
            }
        }

        self.iteration += 1;
        self.recoveries += recoveries;
        Ok(recoveries)
    }

    /// Solve with the default [`SolveSettings`], except for the maximum
    /// number of iterations
    pub fn gbp_solve(&mut self, settings: &GbpSettings, max_iterations: usize) -> Result<SolveReport> {
        let solve_settings = SolveSettings::builder().max_iterations(max_iterations).build();
        self.solve(settings, &solve_settings)
    }

    /// Run sweeps until the energy changes less than
    /// `convergence_threshold` for `convergence_patience` consecutive sweeps,
    /// or `max_iterations` sweeps have been run.
    pub fn solve(
        &mut self,
        settings: &GbpSettings,
        solve_settings: &SolveSettings,
    ) -> Result<SolveReport> {
        settings.validate()?;
        solve_settings.validate()?;

        let include_priors = solve_settings.include_priors;
        let mut previous_energy = self.energy(include_priors)?;
        self.energy_log = vec![previous_energy];

        let mut recoveries = Recoveries::default();
        if self.variables.is_empty() {
            return Ok(self.report(0, recoveries));
        }

        let mut unchanged = 0;
        for i in 0..solve_settings.max_iterations {
            recoveries += self.synchronous_iteration(settings)?;
            let energy = self.energy(include_priors)?;
            self.energy_log.push(energy);

            if solve_settings.log {
                tracing::info!("iteration: {}\tenergy: {:.5}", i + 1, energy);
            } else {
                tracing::debug!("iteration: {}\tenergy: {:.5}", i + 1, energy);
            }

            if (previous_energy - energy).abs() < solve_settings.convergence_threshold {
                unchanged += 1;
                if unchanged >= solve_settings.convergence_patience {
                    self.state = SolverState::Converged;
                    return Ok(self.report(i + 1, recoveries));
                }
            } else {
                unchanged = 0;
            }
            previous_energy = energy;
        }

        self.state = SolverState::MaxIterationsReached;
        Ok(self.report(solve_settings.max_iterations, recoveries))
    }

    fn report(&self, iterations: usize, recoveries: Recoveries) -> SolveReport {
        SolveReport {
            state: self.state,
            iterations,
            energy: self.energy_log.last().copied().unwrap_or_default(),
            energy_log: self.energy_log.clone(),
            recoveries,
        }
    }

    /// Sum of the factor energies `½ w rᵀ N⁻¹ r`, and optionally the prior
    /// energies `½ (μ - μ₀)ᵀ Λ₀ (μ - μ₀)`, at the current belief means
    pub fn energy(&self, include_priors: bool) -> Result<Float> {
        let factor_energy = self
            .factors
            .iter()
            .map(|factor| factor.energy(&self.variables))
            .sum::<Result<Float>>()?;

        let prior_energy = if include_priors {
            self.variables.iter().map(VariableNode::prior_energy).sum::<Float>()
        } else {
            0.0
        };

        Ok(factor_energy + prior_energy)
    }

    /// Belief means in variable order
    pub fn belief_means(&self) -> impl Iterator<Item = Result<Vector<Float>>> + '_ {
        self.variables
            .iter()
            .map(|variable| variable.mean().cloned())
    }

    /// Belief covariances in variable order
    pub fn belief_covariances(&self) -> impl Iterator<Item = Result<Matrix<Float>>> + '_ {
        self.variables
            .iter()
            .map(|variable| variable.covariance().cloned())
    }

    /// The joint distribution over all variables in information form. Factors
    /// contribute their current (robustly weighted) linearisation, factors
    /// that have not been linearised yet are linearised at the current
    /// belief means.
    pub fn joint_distribution(&self) -> Result<MultivariateNormal> {
        let layout = self.layout();
        let dim = layout.total();
        let mut information = Vector::<Float>::zeros(dim);
        let mut precision = Matrix::<Float>::zeros((dim, dim));

        for (i, variable) in self.variables.iter().enumerate() {
            let range = layout.range(i);
            let prior = variable.prior().gaussian();
            let mut block = information.slice_mut(s![range.clone()]);
            block += prior.information_vector();
            let mut block = precision.slice_mut(s![range.clone(), range]);
            block += prior.precision_matrix();
        }

        for factor in &self.factors {
            let (factor_information, factor_precision) = factor.potential(&self.variables)?;
            let adjacent = factor.adjacent_variables();
            for (a, va) in adjacent.iter().enumerate() {
                let joint_a = layout.range(va.index());
                let mut block = information.slice_mut(s![joint_a.clone()]);
                block += &factor_information.slice(s![factor.block(a)]);

                for (b, vb) in adjacent.iter().enumerate() {
                    let joint_b = layout.range(vb.index());
                    let mut block = precision.slice_mut(s![joint_a.clone(), joint_b]);
                    block += &factor_precision.slice(s![factor.block(a), factor.block(b)]);
                }
            }
        }

        precision.symmetrise();
        Ok(MultivariateNormal::from_information_and_precision(information, precision)?)
    }

    /// Maximum a posteriori estimate, i.e. the mean of the joint distribution
    pub fn map(&self) -> Result<Vector<Float>> {
        self.joint_distribution()?
            .mean()
            .map_err(|_| GbpError::SingularJointDistribution)
    }

    /// Euclidean distance between the MAP estimate and the concatenated
    /// belief means
    pub fn distance_from_map(&self) -> Result<Float> {
        let map = self.map()?;
        let means = self.belief_means().collect::<Result<Vec<_>>>()?;
        Ok((map - concatenate(&means)).euclidean_norm())
    }

    /// Gradient of [`FactorGraph::energy`] with respect to the concatenated
    /// belief means
    pub fn gradient(&self, include_priors: bool) -> Result<Vector<Float>> {
        let layout = self.layout();
        let mut gradient = Vector::<Float>::zeros(layout.total());

        if include_priors {
            for (i, variable) in self.variables.iter().enumerate() {
                let mut block = gradient.slice_mut(s![layout.range(i)]);
                block += &variable.prior_energy_gradient();
            }
        }

        for factor in &self.factors {
            let factor_gradient = factor.energy_gradient(&self.variables)?;
            for (slot, v) in factor.adjacent_variables().iter().enumerate() {
                let mut block = gradient.slice_mut(s![layout.range(v.index())]);
                block += &factor_gradient.slice(s![factor.block(slot)]);
            }
        }

        Ok(gradient)
    }

    /// Move every belief mean a step of `learning_rate` against the gradient
    /// of the energy, keeping the belief precisions, and relinearise every
    /// factor at the new means.
    ///
    /// # Errors
    /// [`GbpError::SingularBelief`] if a belief has no mean to move.
    pub fn gradient_descent_step(&mut self, learning_rate: Float) -> Result<()> {
        let layout = self.layout();
        let gradient = self.gradient(true)?;

        for (i, variable) in self.variables.iter_mut().enumerate() {
            let step = gradient.slice(s![layout.range(i)]).to_owned() * learning_rate;
            let mean = variable.mean()? - &step;
            variable.set_mean(&mean)?;
        }

        for factor in &mut self.factors {
            let x = factor.adjacent_means(&self.variables);
            factor.linearise(x)?;
        }

        Ok(())
    }

    /// Summary of the graph, see [`GraphSummary`]
    pub const fn summary(&self, verbose: bool) -> GraphSummary<'_> {
        GraphSummary::new(self, verbose)
    }
}

impl std::fmt::Display for FactorGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary(false))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use gbp_linalg::array;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::measurement_model::{LinearModel, MeasurementNoise};

    fn difference_model() -> LinearModel {
        LinearModel::new(array![[-1.0, 1.0]], MeasurementNoise::isotropic(1, 0.1).unwrap()).unwrap()
    }

    #[test]
    fn states_follow_the_lifecycle() {
        let mut graph = FactorGraph::new();
        assert_eq!(graph.state(), SolverState::Uninitialized);

        let a = graph.add_variable(1, array![0.0], array![[1.0]]).unwrap();
        let b = graph.add_variable(1, array![1.0], array![[1.0]]).unwrap();
        graph.add_factor(&[a, b], array![0.5], difference_model()).unwrap();
        assert_eq!(graph.state(), SolverState::Built);

        graph.synchronous_iteration(&GbpSettings::default()).unwrap();
        assert_eq!(graph.state(), SolverState::Iterating);
        assert_eq!(graph.iteration(), 1);

        let report = graph.gbp_solve(&GbpSettings::default(), 50).unwrap();
        assert_eq!(report.state, SolverState::Converged);
        assert_eq!(graph.state(), SolverState::Converged);

        graph.add_variable_without_prior(1);
        assert_eq!(graph.state(), SolverState::Built);
    }

    #[test]
    fn invalid_factors_are_rejected() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(1, array![0.0], array![[1.0]]).unwrap();

        assert_eq!(
            graph.add_factor(&[], array![0.0], difference_model()),
            Err(GbpError::NoAdjacentVariables)
        );
        assert_eq!(
            graph.add_factor(&[a, VariableIndex(7)], array![0.0], difference_model()),
            Err(GbpError::InvalidReference {
                index:     VariableIndex(7),
                variables: 1,
            })
        );
        assert_eq!(
            graph.add_factor(&[a, a], array![0.0], difference_model()),
            Err(GbpError::DuplicateAdjacentVariable(a))
        );
        assert!(graph.factors().is_empty());
        assert!(graph.variable(a).unwrap().adjacent_factors().is_empty());
    }

    #[test]
    fn seeded_dropout_is_reproducible() {
        let build = || {
            let mut graph = FactorGraph::new();
            let vs: Vec<_> = (0..5)
                .map(|i| graph.add_variable(1, array![Float::from(i)], array![[1.0]]).unwrap())
                .collect();
            for pair in vs.windows(2) {
                graph.add_factor(pair, array![0.0], difference_model()).unwrap();
            }
            graph
        };
        let settings = GbpSettings::builder()
            .dropout(gbp_config::UnitInterval::new(0.5).unwrap())
            .seed(7)
            .build();

        let mut first = build();
        let mut second = build();
        for _ in 0..4 {
            first.synchronous_iteration(&settings).unwrap();
            second.synchronous_iteration(&settings).unwrap();
        }
        let first_means = first.belief_means().collect::<Result<Vec<_>>>().unwrap();
        let second_means = second.belief_means().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(first_means, second_means);
    }

    #[test]
    fn empty_graph_solves_trivially() {
        let mut graph = FactorGraph::new();
        let report = graph.gbp_solve(&GbpSettings::default(), 10).unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.energy, 0.0);
        assert_eq!(graph.joint_dim(), 0);
    }

    #[test]
    fn recoveries_accumulate() {
        let mut total = Recoveries::default();
        total += Recoveries {
            singular_beliefs:        2,
            ill_conditioned_factors: 1,
        };
        total += Recoveries {
            singular_beliefs:        0,
            ill_conditioned_factors: 3,
        };
        assert_eq!(total.total(), 6);
    }
}

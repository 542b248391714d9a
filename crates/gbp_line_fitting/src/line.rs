//! The line fitting problem: a piecewise linear function with evenly spaced
//! anchors on an interval, fitted to noisy height measurements.

use gbp_linalg::{array, Float, Vector};
use gbp_solver::{
    id::VariableIndex, loss::HuberLoss, measurement_model::MeasurementNoise, FactorGraph, GbpError,
    Result,
};
use itertools::Itertools;

use crate::models::{HeightModel, SmoothnessModel};

/// Noisy samples of a wavy function on `[0, 10]`
pub const MEASUREMENTS: [(Float, Float); 15] = [
    (2.3184, 0.3872),
    (6.0120, 0.1248),
    (4.0925, -0.6335),
    (6.1231, 0.1158),
    (5.3754, -1.0122),
    (1.3485, 0.8969),
    (1.7960, 0.8861),
    (8.4883, 0.9530),
    (1.2685, 0.9156),
    (9.3003, 0.2199),
    (1.9147, 0.7894),
    (6.1845, -0.3240),
    (8.0064, 1.2007),
    (1.0738, 0.9846),
    (7.4615, 0.6048),
];

#[derive(Debug, Clone)]
pub struct LineFitting {
    /// Positions of the anchors, in increasing order
    pub anchors:             Vector<Float>,
    pub prior_variance:      Float,
    pub smoothness_variance: Float,
    pub height_variance:     Float,
    /// Robust loss of the height measurements, squared loss if `None`
    pub huber:               Option<HuberLoss>,
}

impl Default for LineFitting {
    fn default() -> Self {
        Self {
            anchors:             Vector::linspace(0.0, 10.0, 20),
            prior_variance:      10.0,
            smoothness_variance: 0.1,
            height_variance:     0.05,
            huber:               None,
        }
    }
}

impl LineFitting {
    /// The two anchors around `x` and the relative position of `x` between
    /// them. `None` if `x` is not strictly inside the anchors.
    pub fn interpolation(&self, x: Float) -> Option<(usize, usize, Float)> {
        let right = self.anchors.iter().position(|&anchor| anchor > x)?;
        let left = right.checked_sub(1)?;
        let gamma = (x - self.anchors[left]) / (self.anchors[right] - self.anchors[left]);
        Some((left, right, gamma))
    }

    /// Build the factorgraph with one variable per anchor, a smoothness factor
    /// between every pair of neighbouring anchors, and a height factor per
    /// measurement.
    ///
    /// # Errors
    /// [`GbpError::InvalidNoise`] if one of the variances is not positive,
    /// [`GbpError::InvalidPrior`] if the prior variance is not positive.
    pub fn build(&self, measurements: &[(Float, Float)]) -> Result<FactorGraph> {
        let mut graph = FactorGraph::new();
        let anchors = self
            .anchors
            .iter()
            .map(|_| graph.add_variable(1, array![0.0], array![[self.prior_variance]]))
            .collect::<Result<Vec<VariableIndex>>>()?;

        for (&left, &right) in anchors.iter().tuple_windows() {
            let noise = MeasurementNoise::isotropic(1, self.smoothness_variance)?;
            graph.add_factor(&[left, right], array![0.0], SmoothnessModel::new(noise))?;
        }

        for &(x, y) in measurements {
            let Some((left, right, gamma)) = self.interpolation(x) else {
                tracing::warn!("skipping measurement at x = {x}, outside of the anchors");
                continue;
            };
            let noise = MeasurementNoise::isotropic(1, self.height_variance)?;
            let model = match self.huber {
                Some(huber) => HeightModel::new(gamma, noise).with_loss(huber),
                None => HeightModel::new(gamma, noise),
            };
            graph.add_factor(&[anchors[left], anchors[right]], array![y], model)?;
        }

        tracing::debug!(
            "built line fitting graph with {} anchors and {} factors",
            graph.variables().len(),
            graph.factors().len()
        );

        Ok(graph)
    }

    /// Fitted height and its standard deviation at every anchor
    pub fn fitted(graph: &FactorGraph) -> Result<Vec<(Float, Float)>> {
        graph
            .belief_means()
            .zip(graph.belief_covariances())
            .map(|(mean, covariance)| Ok((mean?[0], covariance?[(0, 0)].sqrt())))
            .collect::<std::result::Result<Vec<_>, GbpError>>()
    }
}

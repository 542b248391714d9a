//! Measurement models of the line fitting problem.
//! Both are linear in the heights of the anchors.

use gbp_linalg::{array, Float, Matrix, Vector};
use gbp_solver::{
    loss::{Loss, SquaredLoss},
    measurement_model::{MeasurementModel, MeasurementNoise},
};

/// Height of the line at a point between two neighbouring anchors, by linear
/// interpolation of the anchor heights.
/// `gamma` is the relative position of the point, `0` at the left anchor and
/// `1` at the right anchor.
#[derive(Debug)]
pub struct HeightModel {
    gamma: Float,
    noise: MeasurementNoise,
    loss:  Box<dyn Loss>,
}

impl HeightModel {
    pub fn new(gamma: Float, noise: MeasurementNoise) -> Self {
        Self {
            gamma,
            noise,
            loss: Box::new(SquaredLoss),
        }
    }

    #[must_use]
    pub fn with_loss(mut self, loss: impl Loss + 'static) -> Self {
        self.loss = Box::new(loss);
        self
    }
}

impl MeasurementModel for HeightModel {
    fn measure(&self, x: &Vector<Float>) -> Vector<Float> {
        array![(1.0 - self.gamma) * x[0] + self.gamma * x[1]]
    }

    fn jacobian(&self, _x: &Vector<Float>) -> Matrix<Float> {
        array![[1.0 - self.gamma, self.gamma]]
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
        "height"
    }
}

/// Difference in height between two neighbouring anchors, measured as `0` to
/// keep the line smooth
#[derive(Debug)]
pub struct SmoothnessModel {
    noise: MeasurementNoise,
}

impl SmoothnessModel {
    pub const fn new(noise: MeasurementNoise) -> Self {
        Self { noise }
    }
}

impl MeasurementModel for SmoothnessModel {
    fn measure(&self, x: &Vector<Float>) -> Vector<Float> {
        array![x[1] - x[0]]
    }

    fn jacobian(&self, _x: &Vector<Float>) -> Matrix<Float> {
        array![[-1.0, 1.0]]
    }

    fn noise(&self) -> &MeasurementNoise {
        &self.noise
    }

    fn loss(&self) -> &dyn Loss {
        &SquaredLoss
    }

    fn linear(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "smoothness"
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    use super::*;

    fn noise() -> MeasurementNoise {
        MeasurementNoise::isotropic(1, 0.05).unwrap()
    }

    #[test]
    fn height_interpolates_between_anchors() {
        let model = HeightModel::new(0.25, noise());
        let x = array![1.0, 3.0];
        assert_abs_diff_eq!(model.measure(&x), array![1.5]);
        assert_eq!(model.name(), "height");
        assert!(model.linear());
    }

    #[test]
    fn analytic_jacobians_match_finite_differences() {
        let x = array![0.3, -1.2];

        let height = HeightModel::new(0.7, noise());
        assert_abs_diff_eq!(
            height.jacobian(&x),
            height.first_order_jacobian(x.clone()),
            epsilon = 1e-6
        );

        let smoothness = SmoothnessModel::new(noise());
        assert_abs_diff_eq!(
            smoothness.jacobian(&x),
            smoothness.first_order_jacobian(x.clone()),
            epsilon = 1e-6
        );
    }
}

//! Robust losses.
//!
//! A robust loss is implemented by scaling the gaussian potential of a factor
//! with a weight `w ∈ (0, 1]`, which is the same as inflating the measurement
//! covariance by `1 / w`. The weight is a function of the squared Mahalanobis
//! distance `m² = rᵀ N⁻¹ r` of the residual `r`.

use gbp_linalg::Float;

pub trait Loss: std::fmt::Debug + Send + Sync {
    /// Weight of the potential for a residual with squared Mahalanobis
    /// distance `mahalanobis_squared`. Must be in `(0, 1]`.
    fn weight(&self, mahalanobis_squared: Float) -> Float;

    /// Short name used when summarising a factorgraph
    fn name(&self) -> &'static str;
}

/// Squared loss, corresponding to a plain gaussian
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredLoss;

impl Loss for SquaredLoss {
    #[inline]
    fn weight(&self, _mahalanobis_squared: Float) -> Float {
        1.0
    }

    fn name(&self) -> &'static str {
        "squared"
    }
}

/// Quadratic close to the measurement, linear when the residual is more than
/// `transition` standard deviations away.
#[derive(Debug, Clone, Copy)]
pub struct HuberLoss {
    transition: Float,
}

/// Quadratic close to the measurement, constant when the residual is more than
/// `transition` standard deviations away.
#[derive(Debug, Clone, Copy)]
pub struct TukeyLoss {
    transition: Float,
}

macro_rules! transition_constructor {
    ($loss:ident) => {
        impl $loss {
            /// `transition` is measured in standard deviations. Returns `None`
            /// unless it is positive and finite.
            pub fn new(transition: Float) -> Option<Self> {
                (transition.is_finite() && transition > 0.0).then_some(Self { transition })
            }

            #[inline]
            pub const fn transition(&self) -> Float {
                self.transition
            }
        }
    };
}

transition_constructor!(HuberLoss);
transition_constructor!(TukeyLoss);

/// Distances past `transition`, or `None` if the quadratic regime applies
fn beyond_transition(mahalanobis_squared: Float, transition: Float) -> Option<Float> {
    let distance = mahalanobis_squared.sqrt();
    (distance.is_finite() && distance > transition).then_some(distance)
}

impl Loss for HuberLoss {
    fn weight(&self, mahalanobis_squared: Float) -> Float {
        let k = self.transition;
        beyond_transition(mahalanobis_squared, k)
            .map_or(1.0, |m| ((2.0 * k).mul_add(m, -k * k) / (m * m)).min(1.0))
    }

    fn name(&self) -> &'static str {
        "huber"
    }
}

impl Loss for TukeyLoss {
    fn weight(&self, mahalanobis_squared: Float) -> Float {
        let k = self.transition;
        beyond_transition(mahalanobis_squared, k).map_or(1.0, |m| (k * k) / (m * m))
    }

    fn name(&self) -> &'static str {
        "tukey"
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use arbtest::arbtest;
    use paste::paste;

    use super::*;

    #[test]
    fn squared_loss_never_downweights() {
        assert_eq!(SquaredLoss.weight(0.0), 1.0);
        assert_eq!(SquaredLoss.weight(1e12), 1.0);
    }

    #[test]
    fn huber_weight() {
        let huber = HuberLoss::new(2.0).unwrap();
        assert_eq!(huber.weight(4.0), 1.0);
        // m = 4, k = 2: (2 * 2 * 4 - 4) / 16
        assert_relative_eq!(huber.weight(16.0), 0.75);
    }

    #[test]
    fn tukey_weight() {
        let tukey = TukeyLoss::new(1.0).unwrap();
        assert_eq!(tukey.weight(0.25), 1.0);
        assert_relative_eq!(tukey.weight(9.0), 1.0 / 9.0);
    }

    #[test]
    fn invalid_transitions() {
        assert!(HuberLoss::new(0.0).is_none());
        assert!(TukeyLoss::new(-1.0).is_none());
        assert!(HuberLoss::new(Float::NAN).is_none());
    }

    macro_rules! weight_in_unit_interval {
        ($loss:ident) => {
            paste! {
                #[test]
                fn [<$loss:snake _weight_is_in_half_open_unit_interval>]() {
                    arbtest(|u| {
                        let transition: u16 = u.arbitrary()?;
                        let m2: u32 = u.arbitrary()?;
                        let loss = $loss::new(Float::from(transition) / 100.0 + 0.01).unwrap();
                        let w = loss.weight(Float::from(m2) / 10.0);
                        assert!(w > 0.0 && w <= 1.0, "w = {w}");
                        Ok(())
                    });
                }

                #[test]
                fn [<$loss:snake _weight_is_monotone>]() {
                    let loss = $loss::new(1.5).unwrap();
                    let weights: Vec<Float> = (0..100).map(|i| loss.weight(Float::from(i))).collect();
                    assert!(weights.windows(2).all(|w| w[1] <= w[0]));
                }
            }
        };
    }

    weight_in_unit_interval!(HuberLoss);
    weight_in_unit_interval!(TukeyLoss);
}

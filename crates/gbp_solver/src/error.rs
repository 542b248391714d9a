use gbp_config::SettingsError;
use gbp_multivariate_normal::MultivariateNormalError;

use crate::id::{FactorIndex, VariableIndex};

/// Errors of the gaussian belief propagation solver.
///
/// `SingularBelief` and `IllConditionedFactor` are recovered from while
/// iterating, see [`crate::Recoveries`]. They are only returned directly by
/// accessors such as [`crate::FactorGraph::belief_means`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GbpError {
    #[error("variable {index} does not exist, the factorgraph has {variables} variables")]
    InvalidReference {
        index:     VariableIndex,
        variables: usize,
    },
    #[error("the belief of variable {variable} has a singular precision matrix")]
    SingularBelief { variable: VariableIndex },
    #[error(
        "factor {factor} cannot marginalise out the other variables, when computing the message \
         to variable {variable}"
    )]
    IllConditionedFactor {
        factor:   FactorIndex,
        variable: VariableIndex,
    },
    #[error("dimension mismatch of {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what:     String,
        expected: usize,
        actual:   usize,
    },
    #[error("a factor has to be adjacent to at least one variable")]
    NoAdjacentVariables,
    #[error("variable {0} appears more than once in the adjacent variables of a factor")]
    DuplicateAdjacentVariable(VariableIndex),
    #[error("invalid prior: {0}")]
    InvalidPrior(MultivariateNormalError),
    #[error("invalid measurement noise: {0}")]
    InvalidNoise(MultivariateNormalError),
    #[error(transparent)]
    Gaussian(#[from] MultivariateNormalError),
    #[error("the joint distribution has a singular precision matrix")]
    SingularJointDistribution,
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),
}

impl GbpError {
    pub(crate) fn dimension_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Whether the solver recovers from this error while iterating
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SingularBelief { .. } | Self::IllConditionedFactor { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GbpError>;

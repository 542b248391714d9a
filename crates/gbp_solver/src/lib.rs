//! Gaussian belief propagation on factor graphs.
//!
//! A [`FactorGraph`] holds continuous variables with gaussian beliefs, and
//! factors that relate them through (possibly nonlinear) measurement models
//! with (possibly robust) losses. Solving runs synchronous sweeps of message
//! passing until the energy of the graph stops changing.
//!
//! ```
//! use gbp_linalg::array;
//! use gbp_solver::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut graph = FactorGraph::new();
//!     let a = graph.add_variable(1, array![0.0], array![[10.0]])?;
//!     let b = graph.add_variable(1, array![0.0], array![[10.0]])?;
//!
//!     let noise = MeasurementNoise::isotropic(1, 0.01)?;
//!     let difference = LinearModel::new(array![[-1.0, 1.0]], noise)?;
//!     graph.add_factor(&[a, b], array![2.0], difference)?;
//!
//!     let report = graph.gbp_solve(&GbpSettings::default(), 20)?;
//!     assert!(report.converged());
//!
//!     let means = graph.belief_means().collect::<Result<Vec<_>>>()?;
//!     assert!((means[1][0] - means[0][0] - 2.0).abs() < 1e-2);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod factor;
pub mod factorgraph;
pub mod id;
pub mod loss;
mod marginalise;
pub mod measurement_model;
pub mod message;
pub mod summary;
pub mod variable;

pub use error::{GbpError, Result};
pub use factorgraph::{FactorGraph, Recoveries, SolveReport, SolverState};
pub use gbp_config::{GbpSettings, RelinearisationDistance, SolveSettings};

pub mod prelude {
    pub use gbp_config::{
        GbpSettings, HalfOpenUnitInterval, RelinearisationDistance, SolveSettings, UnitInterval,
    };

    pub use super::{
        error::{GbpError, Result},
        factorgraph::{FactorGraph, Recoveries, SolveReport, SolverState},
        id::{FactorIndex, VariableIndex},
        loss::{HuberLoss, Loss, SquaredLoss, TukeyLoss},
        measurement_model::{FnModel, LinearModel, MeasurementModel, MeasurementNoise},
        message::Message,
    };
}

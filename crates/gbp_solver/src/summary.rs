//! Human readable summary of a factorgraph.

use std::fmt::{self, Display, Formatter};

use gbp_linalg::prelude::*;
use itertools::Itertools;

use crate::factorgraph::FactorGraph;

/// Summary of a [`FactorGraph`], written with [`Display`].
///
/// The brief summary lists the number of nodes, the state of the solver and
/// the energy of every iteration of the last solve. The verbose summary also
/// lists every node, with its prior, belief and measurement.
#[derive(Debug, Clone, Copy)]
pub struct GraphSummary<'a> {
    graph:   &'a FactorGraph,
    verbose: bool,
}

impl<'a> GraphSummary<'a> {
    pub const fn new(graph: &'a FactorGraph, verbose: bool) -> Self {
        Self { graph, verbose }
    }

    fn write_variables(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for variable in self.graph.variables() {
            let factors = variable
                .adjacent_factors()
                .iter()
                .map(|(factor, _)| factor)
                .join(", ");
            writeln!(
                f,
                "variable {}: dofs {}, connects to factors [{}]",
                variable.index(),
                variable.dofs(),
                factors
            )?;
            match variable.prior().mean() {
                Some(mean) => writeln!(f, "{}", mean.pretty_format(Some("prior mean")))?,
                None => writeln!(f, "no prior")?,
            }
            match (variable.belief().mean(), variable.belief().covariance()) {
                (Some(mean), Some(covariance)) => {
                    writeln!(f, "{}", mean.pretty_format(Some("belief mean")))?;
                    writeln!(f, "{}", covariance.pretty_format(Some("belief covariance")))?;
                }
                _ => writeln!(f, "singular belief")?,
            }
        }
        Ok(())
    }

    fn write_factors(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for factor in self.graph.factors() {
            let model = factor.model();
            writeln!(
                f,
                "{} factor {}: connects to variables [{}]",
                if model.linear() { "linear" } else { "nonlinear" },
                factor.index(),
                factor.adjacent_variables().iter().join(", ")
            )?;
            writeln!(
                f,
                "    measurement model: {}, loss: {}, robust weight: {:.3}",
                model.name(),
                model.loss().name(),
                factor.weight()
            )?;
            writeln!(f, "{}", factor.measurement().pretty_format(Some("measurement")))?;
            let sigma = model.noise_covariance().diag().to_owned();
            writeln!(f, "{}", sigma.pretty_format(Some("noise variances")))?;
        }
        Ok(())
    }
}

impl Display for GraphSummary<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let graph = self.graph;
        let nonlinear = graph
            .factors()
            .iter()
            .filter(|factor| !factor.model().linear())
            .count();
        let robust = graph.factors().iter().filter(|factor| factor.is_robust()).count();
        let recoveries = graph.recoveries();

        writeln!(f, "Factorgraph")?;
        writeln!(f, "  state:      {}", graph.state())?;
        writeln!(f, "  iterations: {}", graph.iteration())?;
        writeln!(
            f,
            "  variables:  {} ({} degrees of freedom)",
            graph.variables().len(),
            graph.joint_dim()
        )?;
        writeln!(
            f,
            "  factors:    {} ({} nonlinear, {} robust)",
            graph.factors().len(),
            nonlinear,
            robust
        )?;
        writeln!(
            f,
            "  recoveries: {} singular beliefs, {} ill-conditioned factors",
            recoveries.singular_beliefs, recoveries.ill_conditioned_factors
        )?;
        if let Some(energy) = graph.energy_log().last() {
            writeln!(f, "  energy:     {energy:.5}")?;
            writeln!(
                f,
                "  energy log: [{}]",
                graph.energy_log().iter().map(|e| format!("{e:.5}")).join(", ")
            )?;
        }

        if self.verbose {
            writeln!(f)?;
            self.write_variables(f)?;
            writeln!(f)?;
            self.write_factors(f)?;
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use gbp_linalg::array;

    use super::*;
    use crate::{
        measurement_model::{LinearModel, MeasurementNoise},
        GbpSettings,
    };

    fn graph() -> FactorGraph {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(1, array![0.0], array![[1.0]]).unwrap();
        let b = graph.add_variable_without_prior(1);
        let noise = MeasurementNoise::isotropic(1, 0.1).unwrap();
        let model = LinearModel::new(array![[-1.0, 1.0]], noise).unwrap();
        graph.add_factor(&[a, b], array![1.0], model).unwrap();
        graph
    }

    #[test]
    fn brief_summary() {
        let mut graph = graph();
        graph.gbp_solve(&GbpSettings::default(), 10).unwrap();
        let summary = graph.to_string();
        assert!(summary.contains("variables:  2 (2 degrees of freedom)"), "{summary}");
        assert!(summary.contains("factors:    1 (0 nonlinear, 0 robust)"), "{summary}");
        assert!(summary.contains("energy log: ["), "{summary}");
        assert!(!summary.contains("belief mean"));
    }

    #[test]
    fn verbose_summary_lists_nodes() {
        let graph = graph();
        let summary = graph.summary(true).to_string();
        assert!(summary.contains("variable v0: dofs 1, connects to factors [f0]"), "{summary}");
        assert!(summary.contains("no prior"), "{summary}");
        assert!(summary.contains("singular belief"), "{summary}");
        assert!(summary.contains("linear factor f0: connects to variables [v0, v1]"), "{summary}");
        assert!(summary.contains("loss: squared"), "{summary}");
    }
}

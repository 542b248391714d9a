//! Settings for the gaussian belief propagation solver, and reading them from
//! a TOML file.
//!
//! ```toml
//! [gbp]
//! damping = 0.1
//! beta = 0.01
//! number-of-undamped-iterations = 1
//! minimum-linear-iterations = 1
//! dropout = 0.0
//! relinearisation-distance = "euclidean"
//!
//! [solve]
//! max-iterations = 50
//! convergence-threshold = 1e-6
//! ```

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
pub use unit_interval::{HalfOpenUnitInterval, UnitInterval};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(#[from] SettingsError),
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("beta must be positive and finite, but is {0}")]
    NonPositiveBeta(f64),
    #[error("the convergence threshold must be positive and finite, but is {0}")]
    NonPositiveConvergenceThreshold(f64),
    #[error("the convergence patience must be at least 1")]
    ZeroConvergencePatience,
}

/// How the distance between the current adjacent belief means and the
/// linearisation point of a factor is measured, when deciding whether the
/// factor should be relinearised.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RelinearisationDistance {
    /// `‖x - x₀‖₂`
    #[default]
    Euclidean,
    /// `sqrt((x - x₀)ᵀ Λ (x - x₀))` where `Λ` is the block diagonal of the
    /// adjacent belief precisions
    Mahalanobis,
}

/// Settings that control a single sweep of the message passing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "kebab-case")]
pub struct GbpSettings {
    /// Weight of the previous message when damping, `0.0` disables damping
    #[builder(default)]
    #[serde(default)]
    pub damping: HalfOpenUnitInterval,
    /// Distance threshold between the linearisation point and the adjacent
    /// belief means for relinearisation
    #[builder(default = 0.1)]
    #[serde(default = "GbpSettings::default_beta")]
    pub beta: f64,
    /// Number of undamped iterations after relinearisation before damping is
    /// applied
    #[builder(default = 5)]
    #[serde(default = "GbpSettings::default_number_of_undamped_iterations")]
    pub number_of_undamped_iterations: usize,
    /// Minimum number of iterations between two relinearisations of a factor
    #[builder(default = 10)]
    #[serde(default = "GbpSettings::default_minimum_linear_iterations")]
    pub minimum_linear_iterations: usize,
    /// Probability that a factor keeps the previous message on an edge instead
    /// of sending a new one
    #[builder(default)]
    #[serde(default)]
    pub dropout: UnitInterval,
    /// Sweeps after which the relinearisation counter of every factor is reset
    #[builder(default)]
    #[serde(default)]
    pub reset_iterations_since_relinearisation: Vec<usize>,
    #[builder(default)]
    #[serde(default)]
    pub relinearisation_distance: RelinearisationDistance,
    /// Seed for the random number generator used for dropout. A random seed is
    /// used if not set.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GbpSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GbpSettings {
    const fn default_beta() -> f64 {
        0.1
    }

    const fn default_number_of_undamped_iterations() -> usize {
        5
    }

    const fn default_minimum_linear_iterations() -> usize {
        10
    }

    /// The damping to use for a factor, that was (re)linearised
    /// `iterations_since_relinearisation` iterations ago
    pub fn damping(&self, iterations_since_relinearisation: usize) -> f64 {
        if iterations_since_relinearisation > self.number_of_undamped_iterations {
            self.damping.get()
        } else {
            0.0
        }
    }

    /// Check the invariants that are not enforced by the types
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(SettingsError::NonPositiveBeta(self.beta));
        }
        Ok(())
    }
}

/// Settings for a full solve, i.e. repeated sweeps until convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "kebab-case")]
pub struct SolveSettings {
    #[builder(default = 20)]
    #[serde(default = "SolveSettings::default_max_iterations")]
    pub max_iterations: usize,
    /// The solve has converged when the energy changes less than this
    #[builder(default = 1e-6)]
    #[serde(default = "SolveSettings::default_convergence_threshold")]
    pub convergence_threshold: f64,
    /// ... for this many consecutive iterations
    #[builder(default = 3)]
    #[serde(default = "SolveSettings::default_convergence_patience")]
    pub convergence_patience: usize,
    /// Whether the energy includes the prior terms of the variables
    #[builder(default = true)]
    #[serde(default = "SolveSettings::default_include_priors")]
    pub include_priors: bool,
    /// Log the energy of every iteration at info level, instead of debug
    #[builder(default = true)]
    #[serde(default = "SolveSettings::default_log")]
    pub log: bool,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SolveSettings {
    const fn default_max_iterations() -> usize {
        20
    }

    const fn default_convergence_threshold() -> f64 {
        1e-6
    }

    const fn default_convergence_patience() -> usize {
        3
    }

    const fn default_include_priors() -> bool {
        true
    }

    const fn default_log() -> bool {
        true
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold > 0.0) {
            return Err(SettingsError::NonPositiveConvergenceThreshold(
                self.convergence_threshold,
            ));
        }
        if self.convergence_patience == 0 {
            return Err(SettingsError::ZeroConvergencePatience);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// **GBP section:**
    /// Contains the parameters of a single message passing sweep
    #[serde(default)]
    pub gbp:   GbpSettings,
    /// **Solve section:**
    /// Contains the stopping criteria of the solver
    #[serde(default)]
    pub solve: SolveSettings,
}

impl Config {
    /// Parse a config file from a given path
    pub fn from_file<P>(path: P) -> Result<Self, ParseError>
    where
        P: AsRef<std::path::Path>,
    {
        std::fs::read_to_string(path)
            .map_err(Into::into)
            .and_then(|contents| Self::parse(contents.as_str()))
    }

    /// Parse a config file
    /// Returns a `ParseError` if the file cannot be parsed, or the settings
    /// are invalid
    pub fn parse(contents: &str) -> Result<Self, ParseError> {
        let config: Self = toml::from_str(contents)?;
        config.gbp.validate()?;
        config.solve.validate()?;
        Ok(config)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.solve.convergence_patience, 3);
        assert_eq!(config.gbp.relinearisation_distance, RelinearisationDistance::Euclidean);
        assert_eq!(config.gbp.seed, None);
    }

    #[test]
    fn parse_all_fields() {
        let contents = r#"
            [gbp]
            damping = 0.1
            beta = 0.01
            number-of-undamped-iterations = 1
            minimum-linear-iterations = 2
            dropout = 0.25
            reset-iterations-since-relinearisation = [5, 10]
            relinearisation-distance = "mahalanobis"
            seed = 42

            [solve]
            max-iterations = 50
            convergence-threshold = 1e-8
            convergence-patience = 4
            include-priors = false
            log = false
        "#;
        let config = Config::parse(contents).unwrap();

        let expected_gbp = GbpSettings::builder()
            .damping(HalfOpenUnitInterval::new(0.1).unwrap())
            .beta(0.01)
            .number_of_undamped_iterations(1)
            .minimum_linear_iterations(2)
            .dropout(UnitInterval::new(0.25).unwrap())
            .reset_iterations_since_relinearisation(vec![5, 10])
            .relinearisation_distance(RelinearisationDistance::Mahalanobis)
            .seed(42)
            .build();
        assert_eq!(config.gbp, expected_gbp);

        let expected_solve = SolveSettings::builder()
            .max_iterations(50)
            .convergence_threshold(1e-8)
            .convergence_patience(4)
            .include_priors(false)
            .log(false)
            .build();
        assert_eq!(config.solve, expected_solve);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            Config::parse("[gbp]\ndamping = 1.0"),
            Err(ParseError::Toml(_))
        ));
        assert!(matches!(
            Config::parse("[gbp]\ndropout = -0.5"),
            Err(ParseError::Toml(_))
        ));
        assert!(matches!(
            Config::parse("[gbp]\nbeta = 0.0"),
            Err(ParseError::Invalid(SettingsError::NonPositiveBeta(_)))
        ));
        assert!(matches!(
            Config::parse("[solve]\nconvergence-patience = 0"),
            Err(ParseError::Invalid(SettingsError::ZeroConvergencePatience))
        ));
    }

    #[test]
    fn damping_starts_after_undamped_iterations() {
        let settings = GbpSettings::builder()
            .damping(HalfOpenUnitInterval::new(0.5).unwrap())
            .number_of_undamped_iterations(2)
            .build();
        assert_eq!(settings.damping(0), 0.0);
        assert_eq!(settings.damping(2), 0.0);
        assert_eq!(settings.damping(3), 0.5);
    }

    #[test]
    fn default_config_roundtrips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), config);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file("/this/path/does/not/exist.toml"),
            Err(ParseError::Io(_))
        ));
    }

    #[test]
    fn relinearisation_distance_display() {
        use strum::IntoEnumIterator;
        let names: Vec<String> = RelinearisationDistance::iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec!["euclidean", "mahalanobis"]);
    }
}

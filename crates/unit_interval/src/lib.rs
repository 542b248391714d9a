#![warn(missing_docs)]
//! Newtypes for probabilities and mixing factors.
//!
//! - [`UnitInterval`] is a value in the closed interval [0.0, 1.0], e.g. the
//!   dropout probability of a message.
//! - [`HalfOpenUnitInterval`] is a value in [0.0, 1.0), e.g. a damping factor,
//!   where 1.0 would mean that messages are never updated.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An error that can occur when creating an interval value.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum IntervalError {
    /// The value is not a number
    #[error("value is NaN")]
    NaN,
    /// The value is outside of the interval
    #[error("value {value} is out of bounds, expected a value in {interval}")]
    OutOfBounds {
        /// The rejected value
        value:    f64,
        /// Mathematical notation of the interval
        interval: &'static str,
    },
}

/// A type alias for `Result<T, IntervalError>`.
pub type Result<T> = std::result::Result<T, IntervalError>;

macro_rules! interval_newtype {
    ($(#[$attr:meta])* $name:ident, $notation:literal, |$v:ident| $contains:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
        pub struct $name(f64);

        impl $name {
            #[doc = concat!("Lower bound of ", $notation)]
            pub const MIN: Self = Self(0.0);

            #[doc = concat!("Creates a new value, returns an error if it is not in ", $notation)]
            pub fn new(value: f64) -> Result<Self> {
                let $v = value;
                if value.is_nan() {
                    Err(IntervalError::NaN)
                } else if $contains {
                    Ok(Self(value))
                } else {
                    Err(IntervalError::OutOfBounds {
                        value,
                        interval: $notation,
                    })
                }
            }

            /// Returns the inner value
            #[inline]
            pub const fn get(self) -> f64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<f64> for $name {
            type Error = IntervalError;

            fn try_from(value: f64) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for f64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = f64;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_f64(self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let value = f64::deserialize(deserializer)?;
                Self::new(value).map_err(serde::de::Error::custom)
            }
        }
    };
}

interval_newtype!(
    /// A value in the closed interval [0.0, 1.0].
    UnitInterval,
    "[0.0, 1.0]",
    |v| (0.0..=1.0).contains(&v)
);

interval_newtype!(
    /// A value in the half open interval [0.0, 1.0).
    HalfOpenUnitInterval,
    "[0.0, 1.0)",
    |v| (0.0..1.0).contains(&v)
);

impl UnitInterval {
    /// Upper bound of [0.0, 1.0]
    pub const MAX: Self = Self(1.0);

    /// `1.0 - self`, which is also in the unit interval
    #[must_use]
    pub fn complement(self) -> Self {
        Self(1.0 - self.0)
    }
}

impl From<HalfOpenUnitInterval> for UnitInterval {
    fn from(value: HalfOpenUnitInterval) -> Self {
        Self(value.0)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn closed_interval_bounds() {
        assert_eq!(UnitInterval::new(0.0).unwrap().get(), 0.0);
        assert_eq!(UnitInterval::new(0.5).unwrap().get(), 0.5);
        assert_eq!(UnitInterval::new(1.0).unwrap().get(), 1.0);
        assert_eq!(
            UnitInterval::new(-0.1),
            Err(IntervalError::OutOfBounds {
                value:    -0.1,
                interval: "[0.0, 1.0]",
            })
        );
        assert!(UnitInterval::new(1.1).is_err());
        assert_eq!(UnitInterval::new(f64::NAN), Err(IntervalError::NaN));
    }

    #[test]
    fn half_open_interval_excludes_one() {
        assert_eq!(HalfOpenUnitInterval::new(0.0).unwrap().get(), 0.0);
        assert_eq!(HalfOpenUnitInterval::new(0.99).unwrap().get(), 0.99);
        assert!(HalfOpenUnitInterval::new(1.0).is_err());
        assert!(HalfOpenUnitInterval::new(-f64::EPSILON).is_err());
    }

    #[test]
    fn conversions() {
        let unit: UnitInterval = 0.25.try_into().unwrap();
        assert_eq!(f64::from(unit), 0.25);
        assert_eq!(*unit, 0.25);
        assert_eq!(unit.complement().get(), 0.75);

        let half_open = HalfOpenUnitInterval::new(0.5).unwrap();
        assert_eq!(UnitInterval::from(half_open).get(), 0.5);
    }

    #[test]
    fn display_and_error_messages() {
        assert_eq!(UnitInterval::new(0.5).unwrap().to_string(), "0.5");
        let err = HalfOpenUnitInterval::new(2.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value 2 is out of bounds, expected a value in [0.0, 1.0)"
        );
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Settings {
        dropout: UnitInterval,
        damping: HalfOpenUnitInterval,
    }

    #[test]
    fn deserialization_validates_values() {
        let settings: Settings = toml::from_str("dropout = 1.0\ndamping = 0.5").unwrap();
        assert_eq!(settings.dropout, UnitInterval::MAX);
        assert_eq!(settings.damping.get(), 0.5);

        assert!(toml::from_str::<Settings>("dropout = 1.5\ndamping = 0.5").is_err());
        assert!(toml::from_str::<Settings>("dropout = 0.5\ndamping = 1.0").is_err());
    }

    #[test]
    fn serialization_roundtrips_through_toml() {
        let settings = Settings {
            dropout: UnitInterval::new(0.2).unwrap(),
            damping: HalfOpenUnitInterval::MIN,
        };
        let text = toml::to_string(&settings).unwrap();
        assert_eq!(toml::from_str::<Settings>(&text).unwrap(), settings);
    }
}

//! Value validators attached to schema fields.
//!
//! Validators run on the application side before a value is written. The
//! Postgres backend additionally turns the numeric bounds into a `CHECK`
//! constraint so that writers outside this codebase are held to the same range.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A value failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Value is below the inclusive lower bound.
    #[error("Ensure this value is greater than or equal to {limit} (got {value})")]
    BelowMinimum {
        /// Rejected value
        value: f64,
        /// Inclusive lower bound
        limit: f64,
    },

    /// Value is above the inclusive upper bound.
    #[error("Ensure this value is less than or equal to {limit} (got {value})")]
    AboveMaximum {
        /// Rejected value
        value: f64,
        /// Inclusive upper bound
        limit: f64,
    },

    /// `NaN` never satisfies a range.
    #[error("Value is not a number")]
    NotANumber,

    /// Null written to a non-nullable field.
    #[error("This field cannot be null")]
    Null,

    /// `updated_at` earlier than `created_at`.
    #[error("updated_at ({updated_at}) precedes created_at ({created_at})")]
    TimestampOrder {
        /// Creation timestamp
        created_at: DateTime<Utc>,
        /// Offending update timestamp
        updated_at: DateTime<Utc>,
    },
}

/// Numeric validator, mirroring min/max value validators on float fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validator {
    /// Inclusive lower bound.
    MinValue(f64),
    /// Inclusive upper bound.
    MaxValue(f64),
}

impl Validator {
    /// Check a single value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the value is `NaN` or out of bounds.
    pub fn check(&self, value: f64) -> Result<(), ValidationError> {
        if value.is_nan() {
            return Err(ValidationError::NotANumber);
        }

        match *self {
            Self::MinValue(limit) if value < limit => {
                Err(ValidationError::BelowMinimum { value, limit })
            }
            Self::MaxValue(limit) if value > limit => {
                Err(ValidationError::AboveMaximum { value, limit })
            }
            _ => Ok(()),
        }
    }
}

/// Tightest `(min, max)` pair implied by a validator list.
#[must_use]
pub fn bounds(validators: &[Validator]) -> (Option<f64>, Option<f64>) {
    validators
        .iter()
        .fold((None, None), |(min, max), validator| match *validator {
            Validator::MinValue(limit) => (Some(min.map_or(limit, |m: f64| m.max(limit))), max),
            Validator::MaxValue(limit) => (min, Some(max.map_or(limit, |m: f64| m.min(limit)))),
        })
}

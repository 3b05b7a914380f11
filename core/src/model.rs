//! Domain records exposed by the backend.
//!
//! `Event` and `Chunk` are read through the repository traits in
//! [`crate::repository`]. `ProjectHealthMetrics` carries the bounded health
//! score; the bound lives in [`HealthScore`] so an out-of-range score cannot be
//! constructed at all.

use crate::validation::{ValidationError, Validator};
use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw primary key.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Raw primary key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

record_id!(
    /// Primary key of an [`Event`].
    EventId
);
record_id!(
    /// Primary key of a [`Chunk`].
    ChunkId
);
record_id!(
    /// Primary key of a [`ProjectHealthMetrics`] row.
    HealthMetricsId
);
record_id!(
    /// Primary key of an OWASP project.
    ProjectId
);
record_id!(
    /// Primary key of a GitHub repository.
    RepositoryId
);

/// An OWASP event, as written by the ingestion process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Primary key
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Free text description
    pub description: String,
    /// Event homepage
    pub url: String,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time, never earlier than `created_at`
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Build an event, enforcing `updated_at >= created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TimestampOrder`] when the timestamps are inverted.
    pub fn new(
        id: EventId,
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if updated_at < created_at {
            return Err(ValidationError::TimestampOrder {
                created_at,
                updated_at,
            });
        }

        Ok(Self {
            id,
            name: name.into(),
            description: description.into(),
            url: url.into(),
            created_at,
            updated_at,
        })
    }
}

/// A chunk of text extracted for the AI pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Primary key
    pub id: ChunkId,
    /// Chunk body, searchable from the admin console
    pub text: String,
    /// Surrounding context the chunk was cut from
    pub context: String,
}

impl Chunk {
    /// Build a chunk.
    #[must_use]
    pub fn new(id: ChunkId, text: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            context: context.into(),
        }
    }
}

/// Project health score in the closed interval `[0.0, 100.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct HealthScore(f64);

impl HealthScore {
    /// Lowest valid score.
    pub const MIN: f64 = 0.0;
    /// Highest valid score.
    pub const MAX: f64 = 100.0;
    /// Validators carried by the `score` field once the bound is in place.
    pub const VALIDATORS: [Validator; 2] =
        [Validator::MinValue(Self::MIN), Validator::MaxValue(Self::MAX)];

    /// Validate and wrap a raw score.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for `NaN` or values outside `[0, 100]`.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        for validator in &Self::VALIDATORS {
            validator.check(value)?;
        }
        Ok(Self(value))
    }

    /// Raw score.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for HealthScore {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for HealthScore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

/// Computed health metrics for a project.
///
/// `score` is `None` until the scoring job has run; absence is not zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectHealthMetrics {
    /// Primary key
    pub id: HealthMetricsId,
    /// Owning project
    pub project_id: ProjectId,
    /// Health score, `None` while not yet computed
    pub score: Option<HealthScore>,
}

impl ProjectHealthMetrics {
    /// Metrics row without a computed score.
    #[must_use]
    pub const fn pending(id: HealthMetricsId, project_id: ProjectId) -> Self {
        Self {
            id,
            project_id,
            score: None,
        }
    }

    /// Whether the score has been computed.
    #[must_use]
    pub const fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

//! Experiment Record - named grouping of training runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of a soft-deleted experiment.
pub const LIFECYCLE_DELETED: &str = "deleted";

/// Experiment Record represents a tracked experiment.
///
/// Experiments are looked up by name once at startup and then referred to
/// only by their opaque `experiment_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    name: String,
    lifecycle_stage: String,
    created_at: Option<DateTime<Utc>>,
}

impl ExperimentRecord {
    /// Create a new active experiment record with the given ID and name.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            lifecycle_stage: "active".to_string(),
            created_at: Some(Utc::now()),
        }
    }

    /// Create a builder for constructing an experiment record with optional fields.
    #[must_use]
    pub fn builder(
        experiment_id: impl Into<String>,
        name: impl Into<String>,
    ) -> ExperimentRecordBuilder {
        ExperimentRecordBuilder::new(experiment_id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the lifecycle stage (`active` or `deleted`).
    #[must_use]
    pub fn lifecycle_stage(&self) -> &str {
        &self.lifecycle_stage
    }

    /// Whether the experiment has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.lifecycle_stage == LIFECYCLE_DELETED
    }

    /// Get the creation timestamp, if the tracking service reported one.
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// Builder for `ExperimentRecord`.
#[derive(Debug)]
pub struct ExperimentRecordBuilder {
    experiment_id: String,
    name: String,
    lifecycle_stage: String,
    created_at: Option<DateTime<Utc>>,
}

impl ExperimentRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            lifecycle_stage: "active".to_string(),
            created_at: None,
        }
    }

    /// Set the lifecycle stage.
    #[must_use]
    pub fn lifecycle_stage(mut self, stage: impl Into<String>) -> Self {
        self.lifecycle_stage = stage.into();
        self
    }

    /// Set a creation timestamp (used when decoding tracking responses).
    #[must_use]
    pub const fn created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the `ExperimentRecord`.
    #[must_use]
    pub fn build(self) -> ExperimentRecord {
        ExperimentRecord {
            experiment_id: self.experiment_id,
            name: self.name,
            lifecycle_stage: self.lifecycle_stage,
            created_at: self.created_at,
        }
    }
}

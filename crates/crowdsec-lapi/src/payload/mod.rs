//! Outgoing payloads and their shape checks.
//!
//! Payloads are validated once, at construction, and are immutable
//! afterwards. A failed check never reaches the transport.

pub mod alert;
pub mod metrics;

pub use alert::{Alert, AlertProperties, Decision, Event, Meta, Source};
pub use metrics::{MetricItem, MetricsMeta, MetricsProperties, OsInfo, UsageMetrics};

use crate::error::{ValidationError, Violation};

/// Collects rule violations for one entity.
pub(crate) struct Checker<'a> {
    entity: String,
    violations: &'a mut Vec<Violation>,
}

impl<'a> Checker<'a> {
    pub(crate) fn new(entity: impl Into<String>, violations: &'a mut Vec<Violation>) -> Self {
        Self {
            entity: entity.into(),
            violations,
        }
    }

    pub(crate) fn fail(&mut self, field: &str, reason: impl Into<String>) {
        self.violations.push(Violation {
            entity: self.entity.clone(),
            field: field.to_owned(),
            reason: reason.into(),
        });
    }

    pub(crate) fn required(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.fail(field, "cannot contain an empty value");
        }
    }

    pub(crate) fn optional(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.required(field, value);
        }
    }

    pub(crate) fn non_negative(&mut self, field: &str, value: i64) {
        if value < 0 {
            self.fail(field, format!("should be greater than or equal to 0, got {value}"));
        }
    }

    pub(crate) fn within(&mut self, field: &str, value: Option<f64>, min: f64, max: f64) {
        if let Some(value) = value {
            if !(min..=max).contains(&value) {
                self.fail(field, format!("must be between {min} and {max}, got {value}"));
            }
        }
    }
}

pub(crate) fn into_result(violations: Vec<Violation>) -> Result<(), ValidationError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(violations))
    }
}

/// A JSON value that could not even be read into the payload shape.
pub(crate) fn shape_error(entity: &str, err: &serde_json::Error) -> ValidationError {
    ValidationError::new(vec![Violation {
        entity: entity.to_owned(),
        field: String::new(),
        reason: err.to_string(),
    }])
}

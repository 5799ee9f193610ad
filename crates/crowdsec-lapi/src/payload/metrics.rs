// ── Usage metrics payload ──
//
// LAPI expects one remediation component per push:
// {"remediation_components":[{...properties, "metrics":[{"meta":..,"items":[..]}]}]}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Checker, into_result};
use crate::error::{ValidationError, Violation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
}

/// Describes the reporting component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsProperties {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub version: String,
    pub feature_flags: Vec<String>,
    pub utc_startup_timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pull: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsInfo>,
}

impl MetricsProperties {
    fn check(&self, violations: &mut Vec<Violation>) {
        let mut c = Checker::new("metrics", violations);
        c.required("name", &self.name);
        c.optional("type", self.kind.as_deref());
        c.required("version", &self.version);
        c.non_negative("utc_startup_timestamp", self.utc_startup_timestamp);
        if let Some(last_pull) = self.last_pull {
            c.non_negative("last_pull", last_pull);
        }
        if let Some(os) = &self.os {
            let mut c = Checker::new("os", violations);
            c.required("name", &os.name);
            c.required("version", &os.version);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsMeta {
    pub window_size_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_now_timestamp: Option<i64>,
}

impl MetricsMeta {
    fn check(&self, violations: &mut Vec<Violation>) {
        let mut c = Checker::new("meta", violations);
        c.non_negative("window_size_seconds", self.window_size_seconds);
        if let Some(now) = self.utc_now_timestamp {
            c.non_negative("utc_now_timestamp", now);
        }
    }
}

/// One measured value, e.g. `dropped` requests over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricItem {
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl MetricItem {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    fn check(&self, entity: String, violations: &mut Vec<Violation>) {
        let mut c = Checker::new(entity, violations);
        c.required("name", &self.name);
        c.required("unit", &self.unit);
        if self.value.is_nan() || self.value < 0.0 {
            c.fail("value", format!("should be greater than or equal to 0, got {}", self.value));
        }
    }
}

/// A validated usage-metrics report.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageMetrics {
    properties: MetricsProperties,
    meta: MetricsMeta,
    items: Vec<MetricItem>,
}

impl UsageMetrics {
    pub fn new(
        properties: MetricsProperties,
        meta: MetricsMeta,
        items: Vec<MetricItem>,
    ) -> Result<Self, ValidationError> {
        let mut violations = Vec::new();
        properties.check(&mut violations);
        meta.check(&mut violations);
        for (i, item) in items.iter().enumerate() {
            item.check(format!("items[{i}]"), &mut violations);
        }
        into_result(violations)?;

        Ok(Self {
            properties,
            meta,
            items,
        })
    }

    pub fn properties(&self) -> &MetricsProperties {
        &self.properties
    }

    pub fn meta(&self) -> &MetricsMeta {
        &self.meta
    }

    pub fn items(&self) -> &[MetricItem] {
        &self.items
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    remediation_components: [Component<'a>; 1],
}

#[derive(Serialize)]
struct Component<'a> {
    #[serde(flatten)]
    properties: &'a MetricsProperties,
    metrics: [Window<'a>; 1],
}

#[derive(Serialize)]
struct Window<'a> {
    meta: &'a MetricsMeta,
    items: &'a [MetricItem],
}

impl Serialize for UsageMetrics {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Envelope {
            remediation_components: [Component {
                properties: &self.properties,
                metrics: [Window {
                    meta: &self.meta,
                    items: &self.items,
                }],
            }],
        }
        .serialize(serializer)
    }
}

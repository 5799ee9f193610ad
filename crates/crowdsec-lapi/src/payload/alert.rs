// ── Alert payload ──
//
// Wire shape: properties flattened at the top level, then `source` (only
// when present), `events` (always), and `decisions` / `meta` / `labels`
// (only when non-empty). Unknown keys are dropped on input.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::{Checker, into_result, shape_error};
use crate::error::{ValidationError, Violation};

/// Fixed-shape header of an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertProperties {
    pub scenario: String,
    pub scenario_hash: String,
    pub scenario_version: String,
    pub message: String,
    pub events_count: i64,
    pub start_at: String,
    pub stop_at: String,
    pub capacity: i64,
    pub leakspeed: String,
    pub simulated: bool,
    pub remediation: bool,
}

impl AlertProperties {
    fn check(&self, violations: &mut Vec<Violation>) {
        let mut c = Checker::new("alert", violations);
        c.required("scenario", &self.scenario);
        c.required("scenario_hash", &self.scenario_hash);
        c.required("scenario_version", &self.scenario_version);
        c.required("message", &self.message);
        c.non_negative("events_count", self.events_count);
        c.required("start_at", &self.start_at);
        c.required("stop_at", &self.stop_at);
        c.non_negative("capacity", self.capacity);
        c.required("leakspeed", &self.leakspeed);
    }
}

/// Origin of the offending traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub scope: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,
    /// Kept as given so `48` does not come back as `48.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Number>,
}

impl Source {
    /// Source with only the required `scope` and `value`.
    pub fn new(scope: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            value: value.into(),
            ip: None,
            range: None,
            as_number: None,
            as_name: None,
            cn: None,
            latitude: None,
            longitude: None,
        }
    }

    fn check(&self, violations: &mut Vec<Violation>) {
        let mut c = Checker::new("source", violations);
        c.required("scope", &self.scope);
        c.required("value", &self.value);
        c.optional("ip", self.ip.as_deref());
        c.optional("range", self.range.as_deref());
        c.optional("as_number", self.as_number.as_deref());
        c.optional("as_name", self.as_name.as_deref());
        c.optional("cn", self.cn.as_deref());
        c.within("latitude", self.latitude.as_ref().and_then(Number::as_f64), -90.0, 90.0);
        c.within("longitude", self.longitude.as_ref().and_then(Number::as_f64), -180.0, 180.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub origin: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub scope: String,
    pub value: String,
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    pub scenario: String,
}

impl Decision {
    fn check(&self, entity: String, violations: &mut Vec<Violation>) {
        let mut c = Checker::new(entity, violations);
        c.required("origin", &self.origin);
        c.required("type", &self.kind);
        c.required("scope", &self.scope);
        c.required("value", &self.value);
        c.required("duration", &self.duration);
        c.optional("until", self.until.as_deref());
        c.required("scenario", &self.scenario);
    }
}

/// A key/value pair attached to an alert or an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub key: String,
    pub value: String,
}

impl Meta {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn check(&self, entity: String, violations: &mut Vec<Violation>) {
        let mut c = Checker::new(entity, violations);
        c.required("key", &self.key);
        c.required("value", &self.value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub meta: Vec<Meta>,
    pub timestamp: String,
}

impl Event {
    fn check(&self, entity: &str, violations: &mut Vec<Violation>) {
        Checker::new(entity, violations).required("timestamp", &self.timestamp);
        for (i, meta) in self.meta.iter().enumerate() {
            meta.check(format!("{entity}.meta[{i}]"), violations);
        }
    }
}

// ── Alert ────────────────────────────────────────────────────────────

/// A validated alert, ready to push.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(flatten)]
    properties: AlertProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<Source>,
    events: Vec<Event>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    decisions: Vec<Decision>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    meta: Vec<Meta>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct RawAlert {
    #[serde(flatten)]
    properties: AlertProperties,
    #[serde(default)]
    source: Option<Source>,
    #[serde(default)]
    events: Vec<Event>,
    #[serde(default)]
    decisions: Vec<Decision>,
    #[serde(default)]
    meta: Vec<Meta>,
    #[serde(default)]
    labels: Vec<String>,
}

impl Alert {
    /// Build an alert, checking every part. One bad list element fails
    /// the whole alert; all violations are reported.
    pub fn new(
        properties: AlertProperties,
        source: Option<Source>,
        events: Vec<Event>,
        decisions: Vec<Decision>,
        meta: Vec<Meta>,
        labels: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let mut violations = Vec::new();
        properties.check(&mut violations);
        if let Some(source) = &source {
            source.check(&mut violations);
        }
        for (i, decision) in decisions.iter().enumerate() {
            decision.check(format!("decisions[{i}]"), &mut violations);
        }
        for (i, event) in events.iter().enumerate() {
            event.check(&format!("events[{i}]"), &mut violations);
        }
        for (i, m) in meta.iter().enumerate() {
            m.check(format!("meta[{i}]"), &mut violations);
        }
        into_result(violations)?;

        Ok(Self {
            properties,
            source,
            events,
            decisions,
            meta,
            labels,
        })
    }

    /// Read an alert from its flat JSON form.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let raw: RawAlert = serde_json::from_value(value).map_err(|e| shape_error("alert", &e))?;
        raw.into_alert()
    }

    /// Flat JSON form, as sent to LAPI.
    pub fn to_value(&self) -> Value {
        // Plain derived structs with string keys always serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn properties(&self) -> &AlertProperties {
        &self.properties
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn meta(&self) -> &[Meta] {
        &self.meta
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl RawAlert {
    fn into_alert(self) -> Result<Alert, ValidationError> {
        Alert::new(
            self.properties,
            self.source,
            self.events,
            self.decisions,
            self.meta,
            self.labels,
        )
    }
}

impl<'de> Deserialize<'de> for Alert {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawAlert::deserialize(deserializer)?;
        raw.into_alert().map_err(serde::de::Error::custom)
    }
}

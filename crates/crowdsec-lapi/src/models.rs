// ── LAPI response and query models ──
//
// Responses keep unmodelled fields in `extra`. LAPI answers `null` for an
// empty list, so list-shaped fields decode `null` as empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Answer to `POST /v1/watchers/login`.
///
/// `code` mirrors the HTTP outcome; only `200` carries a usable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LoginResponse {
    pub(crate) fn rejected(code: u16, message: Option<String>) -> Self {
        Self {
            code,
            expire: None,
            token: None,
            message,
        }
    }
}

/// Alert source as stored by LAPI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSource {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// A decision as returned by the decisions endpoints or nested in alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub origin: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulated: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// An alert as stored by LAPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAlert {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub events_count: i64,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub stop_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub simulated: bool,
    #[serde(default)]
    pub source: AlertSource,
    #[serde(default, deserialize_with = "null_as_default")]
    pub decisions: Vec<DecisionRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Answer to `GET /v1/decisions/stream`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStream {
    #[serde(default, deserialize_with = "null_as_default")]
    pub new: Vec<DecisionRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deleted: Vec<DecisionRecord>,
}

/// Answer to `DELETE /v1/alerts`. LAPI sends the count as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAlertsResponse {
    #[serde(rename = "nbDeleted")]
    pub nb_deleted: String,
}

/// AppSec verdict. Blocking verdicts arrive with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSecDecision {
    pub action: String,
    pub http_status: u16,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AppSecDecision {
    pub fn is_allowed(&self) -> bool {
        self.action == "allow"
    }
}

// ── Queries ──────────────────────────────────────────────────────────

/// Filter for `GET /v1/alerts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSearchQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    /// Duration string, e.g. `4h`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_active_decision: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Filter for `DELETE /v1/alerts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDeleteQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_active_decision: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_source: Option<String>,
}

/// Filter for `GET /v1/decisions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    /// Also match ranges containing the given IP or range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub origins: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scenarios_containing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scenarios_not_containing: Vec<String>,
}

/// Filter for `GET /v1/decisions/stream`. `startup` is passed separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFilter {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub origins: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scenarios_containing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scenarios_not_containing: Vec<String>,
}

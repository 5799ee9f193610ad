//! Watcher command handlers.

use std::sync::Arc;

use serde_json::Value;
use tabled::Tabled;

use crowdsec_lapi::{
    Alert, AlertDeleteQuery, AlertSearchQuery, LoginResponse, StoredAlert, TokenCache,
    WatcherClient,
};

use crate::cli::{AlertDeleteArgs, AlertSearchArgs, GlobalOpts, WatcherArgs, WatcherCommand};
use crate::config::{Resolved, token_cache_path};
use crate::error::CliError;
use crate::output;
use crate::token_cache::FileTokenCache;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Scenario")]
    scenario: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Events")]
    events: i64,
    #[tabled(rename = "Decisions")]
    decisions: usize,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&StoredAlert> for AlertRow {
    fn from(a: &StoredAlert) -> Self {
        Self {
            id: alert_id(a),
            scenario: a.scenario.clone(),
            source: format!("{}:{}", a.source.scope, a.source.value),
            events: a.events_count,
            decisions: a.decisions.len(),
            created_at: a.created_at.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct IdRow {
    #[tabled(rename = "Alert ID")]
    id: String,
}

fn alert_id(a: &StoredAlert) -> String {
    a.id.map(|id| id.to_string()).unwrap_or_default()
}

fn alert_detail(a: &StoredAlert) -> String {
    output::detail_block(&[
        ("ID", alert_id(a)),
        ("Scenario", a.scenario.clone()),
        ("Message", a.message.clone()),
        ("Source", format!("{}:{}", a.source.scope, a.source.value)),
        ("Country", a.source.cn.clone().unwrap_or_default()),
        ("AS", a.source.as_name.clone().unwrap_or_default()),
        ("Events", a.events_count.to_string()),
        ("Decisions", a.decisions.len().to_string()),
        ("Started", a.start_at.clone().unwrap_or_default()),
        ("Stopped", a.stop_at.clone().unwrap_or_default()),
        ("Created", a.created_at.clone().unwrap_or_default()),
        ("Simulated", a.simulated.to_string()),
    ])
}

fn login_detail(resp: &LoginResponse) -> String {
    output::detail_block(&[
        ("Code", resp.code.to_string()),
        ("Expire", resp.expire.clone().unwrap_or_default()),
        ("Token", resp.token.as_ref().map(|_| "****".to_owned()).unwrap_or_default()),
        ("Message", resp.message.clone().unwrap_or_default()),
    ])
}

// ── Query builders ──────────────────────────────────────────────────

impl From<AlertSearchArgs> for AlertSearchQuery {
    fn from(a: AlertSearchArgs) -> Self {
        Self {
            scope: a.scope,
            value: a.value,
            scenario: a.scenario,
            ip: a.ip,
            range: a.range,
            since: a.since,
            until: a.until,
            simulated: a.simulated,
            has_active_decision: a.has_active_decision,
            decision_type: a.decision_type,
            limit: a.limit,
            origin: a.origin,
        }
    }
}

impl From<AlertDeleteArgs> for AlertDeleteQuery {
    fn from(a: AlertDeleteArgs) -> Self {
        Self {
            scope: a.scope,
            value: a.value,
            scenario: a.scenario,
            ip: a.ip,
            range: a.range,
            since: a.since,
            until: a.until,
            has_active_decision: a.has_active_decision,
            alert_source: a.alert_source,
        }
    }
}

/// Alerts from a JSON document: one object or an array of them.
fn alerts_from_json(doc: Value) -> Result<Vec<Alert>, CliError> {
    let docs = match doc {
        Value::Array(items) => items,
        other => vec![other],
    };
    docs.into_iter()
        .map(|v| Alert::from_value(v).map_err(|e| CliError::from(crowdsec_lapi::Error::from(e))))
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: WatcherArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let scenarios = if args.scenarios.is_empty() {
        resolved.scenarios.clone()
    } else {
        args.scenarios
    };
    let cache: Arc<dyn TokenCache> = Arc::new(FileTokenCache::new(token_cache_path(
        &resolved.profile_name,
    )));
    let client = WatcherClient::new(&resolved.settings, cache, scenarios)?;

    match args.command {
        WatcherCommand::Login => {
            let resp = client.login(&[]).await?;
            let out = output::render_single(&global.output, &resp, login_detail, |r| {
                r.token.clone().unwrap_or_default()
            });
            output::print_output(&out, global.quiet);
            if resp.code == 200 {
                Ok(())
            } else {
                Err(CliError::AuthFailed)
            }
        }

        WatcherCommand::PushAlerts { from_file } => {
            let alerts = alerts_from_json(util::read_json_file(&from_file)?)?;
            let ids = client.push_alerts(&alerts).await?;
            let out = output::render_list(
                &global.output,
                &ids,
                |id| IdRow { id: id.clone() },
                String::clone,
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        WatcherCommand::Search(search) => {
            let alerts = client.search_alerts(&search.into()).await?;
            let out = output::render_list(&global.output, &alerts, |a| AlertRow::from(a), alert_id);
            output::print_output(&out, global.quiet);
            Ok(())
        }

        WatcherCommand::Delete(delete) => {
            if !util::confirm(
                "Delete every alert matching this filter? This is destructive.",
                "watcher delete",
                global.yes,
            )? {
                return Ok(());
            }
            let resp = client.delete_alerts(&delete.into()).await?;
            let out = output::render_single(
                &global.output,
                &resp,
                |r| format!("Deleted {} alert(s)", r.nb_deleted),
                |r| r.nb_deleted.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        WatcherCommand::Get { id } => {
            let alert = client
                .get_alert_by_id(id)
                .await?
                .ok_or_else(|| CliError::NotFound {
                    resource: "alert".into(),
                    identifier: id.to_string(),
                })?;
            let out = output::render_single(&global.output, &alert, alert_detail, alert_id);
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn alert_json(ip: &str) -> Value {
        json!({
            "scenario": "crowdsecurity/ssh-bf",
            "scenario_hash": "abc",
            "scenario_version": "0.1",
            "message": "ssh bruteforce",
            "events_count": 1,
            "start_at": "2024-01-01T00:00:00Z",
            "stop_at": "2024-01-01T00:00:01Z",
            "capacity": 5,
            "leakspeed": "10s",
            "simulated": false,
            "remediation": true,
            "source": {"scope": "Ip", "value": ip},
            "events": [],
        })
    }

    #[test]
    fn single_object_and_array_both_load() {
        assert_eq!(alerts_from_json(alert_json("1.2.3.4")).unwrap().len(), 1);
        let many = json!([alert_json("1.2.3.4"), alert_json("5.6.7.8")]);
        assert_eq!(alerts_from_json(many).unwrap().len(), 2);
    }

    #[test]
    fn invalid_alert_is_a_payload_error() {
        let mut doc = alert_json("1.2.3.4");
        doc["scenario"] = json!("");
        let err = alerts_from_json(doc).unwrap_err();
        assert!(matches!(err, CliError::InvalidPayload { .. }));
    }
}

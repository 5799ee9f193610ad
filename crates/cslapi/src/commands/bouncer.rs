//! Bouncer command handlers.

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tabled::Tabled;

use crowdsec_lapi::payload::{MetricItem, MetricsMeta, MetricsProperties};
use crowdsec_lapi::{
    AppSecDecision, AppSecHeaders, BouncerClient, DecisionFilter, DecisionRecord, DecisionStream,
    StreamFilter,
};

use crate::cli::{
    AppSecArgs, BouncerArgs, BouncerCommand, DecisionsArgs, GlobalOpts, MetricsArgs, OutputFormat,
    StreamArgs,
};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DecisionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Scope:Value")]
    target: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Scenario")]
    scenario: String,
}

impl From<&DecisionRecord> for DecisionRow {
    fn from(d: &DecisionRecord) -> Self {
        Self {
            id: decision_id(d),
            origin: d.origin.clone(),
            kind: d.kind.clone(),
            target: format!("{}:{}", d.scope, d.value),
            duration: d.duration.clone(),
            scenario: d.scenario.clone(),
        }
    }
}

#[derive(Tabled)]
struct StreamRow {
    #[tabled(rename = "Change")]
    change: &'static str,
    #[tabled(inline)]
    decision: DecisionRow,
}

fn decision_id(d: &DecisionRecord) -> String {
    d.id.map(|id| id.to_string()).unwrap_or_default()
}

fn stream_table(stream: &DecisionStream) -> String {
    let rows: Vec<StreamRow> = stream
        .new
        .iter()
        .map(|d| ("new", d))
        .chain(stream.deleted.iter().map(|d| ("deleted", d)))
        .map(|(change, d)| StreamRow {
            change,
            decision: d.into(),
        })
        .collect();
    tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string()
}

fn stream_plain(stream: &DecisionStream) -> String {
    stream
        .new
        .iter()
        .map(|d| format!("+{}", d.value))
        .chain(stream.deleted.iter().map(|d| format!("-{}", d.value)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn appsec_detail(d: &AppSecDecision) -> String {
    output::detail_block(&[
        ("Action", d.action.clone()),
        ("HTTP status", d.http_status.to_string()),
    ])
}

// ── Request builders ────────────────────────────────────────────────

impl From<DecisionsArgs> for DecisionFilter {
    fn from(a: DecisionsArgs) -> Self {
        Self {
            scope: a.scope,
            value: a.value,
            kind: a.kind,
            ip: a.ip,
            range: a.range,
            contains: a.contains,
            origins: a.origins,
            scenarios_containing: a.scenarios_containing,
            scenarios_not_containing: a.scenarios_not_containing,
        }
    }
}

impl From<StreamArgs> for StreamFilter {
    fn from(a: StreamArgs) -> Self {
        Self {
            scopes: a.scopes,
            origins: a.origins,
            scenarios_containing: a.scenarios_containing,
            scenarios_not_containing: a.scenarios_not_containing,
        }
    }
}

/// AppSec headers for the inspected request plus any `-H` extras.
fn appsec_request(args: &AppSecArgs) -> Result<(HeaderMap, String), CliError> {
    let body = match (&args.body, &args.body_file) {
        (Some(body), _) => body.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => String::new(),
    };
    let verb = args.verb.clone().unwrap_or_else(|| {
        let verb = if body.is_empty() { "GET" } else { "POST" };
        verb.to_owned()
    });

    let mut builder = AppSecHeaders::new()
        .ip(&args.ip)
        .uri(&args.uri)
        .host(&args.host)
        .verb(&verb)
        .http_version(&args.http_version);
    if let Some(ua) = &args.user_agent {
        builder = builder.user_agent(ua);
    }
    let mut headers = builder.build()?;

    for raw in &args.headers {
        let (name, value) = util::split_pair(raw, ':', "header")?;
        let invalid = |reason: String| CliError::Validation {
            field: "header".into(),
            reason,
        };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.append(name, value);
    }
    Ok((headers, body))
}

/// `NAME=VALUE[:UNIT]`, unit defaulting to `request`.
fn parse_item(raw: &str) -> Result<MetricItem, CliError> {
    let (name, rest) = util::split_pair(raw, '=', "item")?;
    let (value, unit) = rest.split_once(':').unwrap_or((rest, "request"));
    let value: f64 = value.trim().parse().map_err(|_| CliError::Validation {
        field: "item".into(),
        reason: format!("'{value}' is not a number"),
    })?;
    Ok(MetricItem::new(name, value, unit.trim()))
}

fn metrics_items(args: &MetricsArgs) -> Result<Vec<MetricItem>, CliError> {
    let labels = args
        .labels
        .iter()
        .map(|raw| util::split_pair(raw, '=', "label"))
        .collect::<Result<Vec<_>, _>>()?;
    args.items
        .iter()
        .map(|raw| -> Result<MetricItem, CliError> {
            let item = parse_item(raw)?;
            Ok(labels
                .iter()
                .fold(item, |item, (k, v)| item.with_label(*k, *v)))
        })
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: BouncerArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = BouncerClient::new(&resolved.settings)?;

    match args.command {
        BouncerCommand::Decisions(filter) => {
            let decisions = client.get_filtered_decisions(&filter.into()).await?;
            let out = output::render_list(
                &global.output,
                &decisions,
                |d| DecisionRow::from(d),
                |d| d.value.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BouncerCommand::Stream(stream) => {
            let startup = stream.startup;
            let changes = client
                .get_stream_decisions(startup, &stream.into())
                .await?;
            let out =
                output::render_single(&global.output, &changes, stream_table, stream_plain);
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BouncerCommand::Appsec(appsec) => {
            let (headers, body) = appsec_request(&appsec)?;
            let decision = client.get_app_sec_decision(headers, &body).await?;
            let out = output::render_single(&global.output, &decision, appsec_detail, |d| {
                d.action.clone()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BouncerCommand::Metrics(metrics) => {
            let items = metrics_items(&metrics)?;
            let properties = MetricsProperties {
                name: metrics.name,
                kind: metrics.kind,
                version: metrics.component_version,
                utc_startup_timestamp: metrics
                    .startup_timestamp
                    .unwrap_or_else(|| Utc::now().timestamp()),
                last_pull: metrics.last_pull,
                ..MetricsProperties::default()
            };
            let meta = MetricsMeta {
                window_size_seconds: metrics.window,
                utc_now_timestamp: None,
            };
            let report = client.build_usage_metrics(properties, meta, items)?;

            if metrics.dry_run {
                let compact = matches!(global.output, OutputFormat::JsonCompact);
                output::print_output(&output::render_json(&report, compact), global.quiet);
                return Ok(());
            }

            let resp = client.push_usage_metrics(&report).await?;
            let out = output::render_single(
                &global.output,
                &resp,
                |_| "Usage metrics sent".to_owned(),
                |_| String::new(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

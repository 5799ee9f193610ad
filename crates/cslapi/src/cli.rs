//! Clap derive structures for the `cslapi` CLI.
//!
//! Defines the command tree and global flags. Kept free of crate-internal
//! imports so `build.rs` can compile it for man page generation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cslapi -- talk to a CrowdSec Local API as a watcher or a bouncer
#[derive(Debug, Parser)]
#[command(
    name = "cslapi",
    version,
    about = "Query and feed a CrowdSec Local API from the command line",
    long_about = "A client for the CrowdSec Local API (LAPI).\n\n\
        Watcher commands log in with machine credentials or a client\n\
        certificate and manage alerts. Bouncer commands use an API key\n\
        to read decisions, ask the AppSec component for a verdict, and\n\
        report usage metrics.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config profile to use
    #[arg(long, short = 'p', env = "CSLAPI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// LAPI base URL (overrides profile)
    #[arg(long, env = "CSLAPI_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bouncer API key
    #[arg(long, env = "CSLAPI_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Watcher machine id
    #[arg(long, env = "CSLAPI_MACHINE_ID", global = true)]
    pub machine_id: Option<String>,

    /// Watcher password
    #[arg(long, env = "CSLAPI_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// AppSec component URL (overrides profile)
    #[arg(long, env = "CSLAPI_APPSEC_URL", global = true)]
    pub appsec_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CSLAPI_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "CSLAPI_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watcher operations: login and alerts
    #[command(alias = "w")]
    Watcher(WatcherArgs),

    /// Bouncer operations: decisions, AppSec and usage metrics
    #[command(alias = "b")]
    Bouncer(BouncerArgs),

    /// Inspect CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCHER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatcherArgs {
    /// Scenario announced on login (repeatable, overrides profile)
    #[arg(long = "scenario", global = true)]
    pub scenarios: Vec<String>,

    #[command(subcommand)]
    pub command: WatcherCommand,
}

#[derive(Debug, Subcommand)]
pub enum WatcherCommand {
    /// Log in and print LAPI's answer (token is not cached)
    Login,

    /// Push alerts read from a JSON file (one object or an array)
    PushAlerts {
        /// Path to the JSON file
        #[arg(long, short = 'F')]
        from_file: PathBuf,
    },

    /// Search alerts
    #[command(alias = "ls")]
    Search(AlertSearchArgs),

    /// Delete alerts (LAPI only accepts this from the local machine)
    #[command(alias = "rm")]
    Delete(AlertDeleteArgs),

    /// Fetch one alert by id
    Get {
        /// Alert id
        id: u64,
    },
}

#[derive(Debug, Args)]
pub struct AlertSearchArgs {
    /// Source scope (e.g. Ip, Range)
    #[arg(long)]
    pub scope: Option<String>,

    /// Source value matching `--scope`
    #[arg(long)]
    pub value: Option<String>,

    /// Scenario name
    #[arg(long = "alert-scenario")]
    pub scenario: Option<String>,

    /// Source IP
    #[arg(long)]
    pub ip: Option<String>,

    /// Source range (CIDR)
    #[arg(long)]
    pub range: Option<String>,

    /// Only alerts newer than this duration (e.g. 4h)
    #[arg(long)]
    pub since: Option<String>,

    /// Only alerts older than this duration
    #[arg(long)]
    pub until: Option<String>,

    /// Include simulated alerts
    #[arg(long)]
    pub simulated: Option<bool>,

    /// Only alerts with (or without) an active decision
    #[arg(long)]
    pub has_active_decision: Option<bool>,

    /// Decision type (e.g. ban)
    #[arg(long)]
    pub decision_type: Option<String>,

    /// Maximum number of alerts
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,

    /// Decision origin
    #[arg(long)]
    pub origin: Option<String>,
}

#[derive(Debug, Args)]
pub struct AlertDeleteArgs {
    #[arg(long)]
    pub scope: Option<String>,

    #[arg(long)]
    pub value: Option<String>,

    #[arg(long = "alert-scenario")]
    pub scenario: Option<String>,

    #[arg(long)]
    pub ip: Option<String>,

    #[arg(long)]
    pub range: Option<String>,

    #[arg(long)]
    pub since: Option<String>,

    #[arg(long)]
    pub until: Option<String>,

    #[arg(long)]
    pub has_active_decision: Option<bool>,

    /// Alert source (e.g. cscli, crowdsec)
    #[arg(long)]
    pub alert_source: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  BOUNCER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct BouncerArgs {
    #[command(subcommand)]
    pub command: BouncerCommand,
}

#[derive(Debug, Subcommand)]
pub enum BouncerCommand {
    /// List active decisions matching a filter
    #[command(alias = "ls")]
    Decisions(DecisionsArgs),

    /// Read the decision stream
    Stream(StreamArgs),

    /// Ask the AppSec component for a verdict on a request
    Appsec(AppSecArgs),

    /// Build (and push) a usage metrics report
    Metrics(MetricsArgs),
}

#[derive(Debug, Args)]
pub struct DecisionsArgs {
    #[arg(long)]
    pub scope: Option<String>,

    #[arg(long)]
    pub value: Option<String>,

    /// Decision type (e.g. ban, captcha)
    #[arg(long = "type")]
    pub kind: Option<String>,

    #[arg(long)]
    pub ip: Option<String>,

    #[arg(long)]
    pub range: Option<String>,

    /// With --range: match decisions contained in the range
    #[arg(long)]
    pub contains: Option<bool>,

    /// Origins, comma separated
    #[arg(long, value_delimiter = ',')]
    pub origins: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub scenarios_containing: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub scenarios_not_containing: Vec<String>,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Return every active decision instead of changes since the last call
    #[arg(long)]
    pub startup: bool,

    /// Scopes, comma separated (e.g. Ip,Range)
    #[arg(long, value_delimiter = ',')]
    pub scopes: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub origins: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub scenarios_containing: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub scenarios_not_containing: Vec<String>,
}

#[derive(Debug, Args)]
pub struct AppSecArgs {
    /// Client IP of the inspected request
    #[arg(long)]
    pub ip: String,

    /// Request URI
    #[arg(long, default_value = "/")]
    pub uri: String,

    /// Host header
    #[arg(long)]
    pub host: String,

    /// HTTP method; defaults to POST with a body, GET without
    #[arg(long)]
    pub verb: Option<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// HTTP version as LAPI expects it (e.g. 11, 20)
    #[arg(long, default_value = "11")]
    pub http_version: String,

    /// Extra header to forward, as NAME:VALUE (repeatable)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// Raw request body
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the raw request body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Remediation component name
    #[arg(long)]
    pub name: String,

    /// Remediation component version
    #[arg(long = "component-version", default_value = env!("CARGO_PKG_VERSION"))]
    pub component_version: String,

    /// Component type (defaults to crowdsec-rust-bouncer)
    #[arg(long = "type")]
    pub kind: Option<String>,

    /// Unix timestamp the component started at (defaults to now)
    #[arg(long)]
    pub startup_timestamp: Option<i64>,

    /// Unix timestamp of the last decision pull
    #[arg(long)]
    pub last_pull: Option<i64>,

    /// Window covered by the items, in seconds
    #[arg(long, default_value = "900")]
    pub window: i64,

    /// Metric item as NAME=VALUE[:UNIT] (repeatable)
    #[arg(long = "item")]
    pub items: Vec<String>,

    /// Label added to every item, as KEY=VALUE (repeatable)
    #[arg(long = "label")]
    pub labels: Vec<String>,

    /// Print the payload instead of sending it
    #[arg(long)]
    pub dry_run: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the configuration with secrets masked
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a secret for the active profile in the system keyring
    SetSecret {
        /// Which secret to store
        #[arg(value_enum)]
        kind: SecretKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SecretKind {
    /// Bouncer API key
    ApiKey,
    /// Watcher password
    Password,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

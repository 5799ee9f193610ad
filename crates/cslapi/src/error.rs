//! CLI error types with miette diagnostics.
//!
//! Maps `crowdsec_lapi::Error` and `ConfigError` into user-facing errors
//! with help text and a stable exit code per category.

use miette::Diagnostic;
use thiserror::Error;

use crowdsec_lapi::Error as LapiError;
use crowdsec_lapi_config::ConfigError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("LAPI request failed: {message}")]
    #[diagnostic(
        code(cslapi::request_failed),
        help(
            "Check that LAPI is running and that --api-url points at it.\n\
             Run with -vv to see the request that failed."
        )
    )]
    RequestFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Request timed out: {message}")]
    #[diagnostic(
        code(cslapi::timeout),
        help("Increase the timeout with --timeout or check LAPI responsiveness.")
    )]
    Timeout { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(cslapi::auth_failed),
        help(
            "Verify the machine id and password (or client certificate).\n\
             The machine must be validated on LAPI: cscli machines list"
        )
    )]
    AuthFailed,

    // ── LAPI ─────────────────────────────────────────────────────────
    #[error("LAPI error ({status}): {message}")]
    #[diagnostic(code(cslapi::api_error))]
    Api { status: u16, message: String },

    #[error("{resource} '{identifier}' not found")]
    #[diagnostic(code(cslapi::not_found))]
    NotFound {
        resource: String,
        identifier: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(cslapi::configuration),
        help("Set the missing values in your profile, via flags, or CSLAPI_* variables.")
    )]
    Configuration { message: String },

    #[error("{message}")]
    #[diagnostic(code(cslapi::validation))]
    InvalidPayload { message: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cslapi::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(cslapi::config),
        help("Check the config file: cslapi config path")
    )]
    Config(#[from] ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(cslapi::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(cslapi::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RequestFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed => exit_code::AUTH,
            Self::Api {
                status: 401 | 403,
                ..
            } => exit_code::AUTH,
            Self::Api { status: 404, .. } | Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Configuration { .. }
            | Self::InvalidPayload { .. }
            | Self::Validation { .. }
            | Self::Config(_)
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── LAPI error → CliError mapping ────────────────────────────────────

impl From<LapiError> for CliError {
    fn from(err: LapiError) -> Self {
        match err {
            LapiError::Configuration(e) => Self::Configuration {
                message: e.to_string(),
            },
            LapiError::Validation(e) => Self::InvalidPayload {
                message: e.to_string(),
            },
            LapiError::Timeout { message, .. } => Self::Timeout { message },
            LapiError::Authentication => Self::AuthFailed,
            LapiError::Client {
                message,
                status: Some(status),
                ..
            } => Self::Api { status, message },
            LapiError::Client {
                message,
                status: None,
                source,
            } => Self::RequestFailed { message, source },
        }
    }
}

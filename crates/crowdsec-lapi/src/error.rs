use std::fmt;

use thiserror::Error;

/// Boxed source error kept in the cause chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the `crowdsec-lapi` crate.
///
/// Every public operation returns one of these. Configuration and validation
/// failures happen before any request is attempted; the remaining variants
/// come from the transport or from LAPI itself.
#[derive(Debug, Error)]
pub enum Error {
    // ── Pre-flight ──────────────────────────────────────────────────
    /// Bad or missing connection settings. Raised at client construction.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A payload (alert, metrics, ...) failed its shape checks.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ── Transport ───────────────────────────────────────────────────
    /// The HTTP handler gave up waiting for LAPI.
    #[error("Request timed out: {message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Any other transport or protocol failure, including non-JSON bodies
    /// and unexpected HTTP statuses.
    #[error("{message}")]
    Client {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    // ── Authentication ──────────────────────────────────────────────
    /// Watcher login did not yield a token.
    #[error("Authentication failed")]
    Authentication,
}

impl Error {
    pub(crate) fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Returns `true` if the transport deadline was exceeded.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the watcher could not obtain a token.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication)
    }

    /// HTTP status attached to a client error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } => *status,
            _ => None,
        }
    }
}

// ── Configuration errors ─────────────────────────────────────────────

/// Category of a configuration rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    MissingField,
    InvalidValue,
    CrossFieldConstraint,
}

/// One broken configuration rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    pub kind: ConfigErrorKind,
    pub field: &'static str,
    pub message: String,
}

/// All configuration rules that failed, in declaration order.
///
/// The rendered message is the first violation's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    violations: Vec<ConfigViolation>,
}

impl ConfigurationError {
    pub(crate) fn new(violations: Vec<ConfigViolation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }

    pub(crate) fn single(kind: ConfigErrorKind, field: &'static str, message: String) -> Self {
        Self::new(vec![ConfigViolation {
            kind,
            field,
            message,
        }])
    }

    pub fn violations(&self) -> &[ConfigViolation] {
        &self.violations
    }

    /// Kind of the first violated rule.
    pub fn kind(&self) -> ConfigErrorKind {
        self.violations
            .first()
            .map_or(ConfigErrorKind::InvalidValue, |v| v.kind)
    }

    pub fn message(&self) -> &str {
        self.violations.first().map_or("", |v| v.message.as_str())
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid configuration: {}", self.message())
    }
}

impl std::error::Error for ConfigurationError {}

// ── Payload validation errors ────────────────────────────────────────

/// One field that failed its payload rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Entity name, e.g. `alert`, `source`, `decisions[1]`.
    pub entity: String,
    pub field: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "Invalid {}: {}", self.entity, self.reason)
        } else {
            write!(
                f,
                "Invalid {} \"{}\": {}",
                self.entity, self.field, self.reason
            )
        }
    }
}

/// Payload shape errors collected before serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub(crate) fn new(violations: Vec<Violation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.violations.split_first() {
            Some((first, [])) => write!(f, "{first}"),
            Some((first, rest)) => write!(f, "{first} (and {} more)", rest.len()),
            None => f.write_str("Invalid payload"),
        }
    }
}

impl std::error::Error for ValidationError {}

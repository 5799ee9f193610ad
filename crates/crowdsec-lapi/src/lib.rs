// crowdsec-lapi: Async Rust client for the CrowdSec Local API (watcher + bouncer)

pub mod bouncer;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod payload;
pub mod token;
pub mod transport;
pub mod watcher;

pub use bouncer::{AppSecHeaders, BouncerClient};
pub use client::BaseClient;
pub use config::{AuthType, ClientRole, ConnectionConfig, ConnectionSettings, Endpoints};
pub use error::{ConfigErrorKind, ConfigurationError, Error, ValidationError, Violation};
pub use models::{
    AlertDeleteQuery, AlertSearchQuery, AppSecDecision, DecisionFilter, DecisionRecord,
    DecisionStream, DeleteAlertsResponse, LoginResponse, StoredAlert, StreamFilter,
};
pub use payload::{Alert, UsageMetrics};
pub use token::{MemoryTokenCache, Token, TokenCache, TokenStore};
pub use transport::{
    HttpRequest, HttpResponse, ReqwestHandler, RequestHandler, Service, TransportError,
};
pub use watcher::WatcherClient;

// Watcher client: machine login and alert management.
//
// Every authenticated call goes through the token store first. The token is
// resolved per call; there is no session state beyond the shared cache.

use std::sync::Arc;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::client::{BaseClient, decode, ensure_success};
use crate::config::{AuthType, ClientRole, ConnectionConfig, ConnectionSettings};
use crate::error::{Error, ValidationError, Violation};
use crate::models::{
    AlertDeleteQuery, AlertSearchQuery, DeleteAlertsResponse, LoginResponse, StoredAlert,
};
use crate::payload::Alert;
use crate::token::{TokenCache, TokenStore};
use crate::transport::{ReqwestHandler, RequestHandler};

#[derive(Serialize)]
struct LoginRequest<'a> {
    scenarios: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

/// Client for the watcher side of LAPI.
#[derive(Debug)]
pub struct WatcherClient<H = ReqwestHandler> {
    base: BaseClient<H>,
    tokens: TokenStore,
    scenarios: Vec<String>,
}

impl WatcherClient<ReqwestHandler> {
    /// Validate `settings` and build a client over the default `reqwest`
    /// handler. `scenarios` is sent on login when the call gives none.
    pub fn new(
        settings: &ConnectionSettings,
        cache: Arc<dyn TokenCache>,
        scenarios: Vec<String>,
    ) -> Result<Self, Error> {
        let config = settings.validate(ClientRole::Watcher)?;
        let handler = ReqwestHandler::from_config(&config)?;
        Self::from_parts(config, cache, scenarios, handler)
    }
}

impl<H: RequestHandler> WatcherClient<H> {
    /// Like [`WatcherClient::new`], with a caller-supplied transport.
    pub fn with_handler(
        settings: &ConnectionSettings,
        cache: Arc<dyn TokenCache>,
        scenarios: Vec<String>,
        handler: H,
    ) -> Result<Self, Error> {
        let config = settings.validate(ClientRole::Watcher)?;
        Self::from_parts(config, cache, scenarios, handler)
    }

    fn from_parts(
        config: ConnectionConfig,
        cache: Arc<dyn TokenCache>,
        scenarios: Vec<String>,
        handler: H,
    ) -> Result<Self, Error> {
        Ok(Self {
            base: BaseClient::new(config, handler)?,
            tokens: TokenStore::new(cache),
            scenarios,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.base.config()
    }

    /// Log in and return LAPI's answer as-is.
    ///
    /// An empty `scenarios` falls back to the list given at construction.
    /// A 401 or 403 comes back as a `LoginResponse` carrying that code.
    pub async fn login(&self, scenarios: &[String]) -> Result<LoginResponse, Error> {
        let config = self.base.config();
        let password = config.password().map(ExposeSecret::expose_secret);
        let request = LoginRequest {
            scenarios: if scenarios.is_empty() {
                &self.scenarios
            } else {
                scenarios
            },
            machine_id: (config.auth_type() == AuthType::ApiKey)
                .then(|| config.machine_id().unwrap_or_default()),
            password: (config.auth_type() == AuthType::ApiKey).then(|| password.unwrap_or_default()),
        };

        let resp = self
            .base
            .send(
                Method::POST,
                &config.endpoints().watcher_login,
                Some(&request),
                None,
            )
            .await?;

        if resp.status == 401 || resp.status == 403 {
            let message = decode::<Value>(&resp)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from));
            return Ok(LoginResponse::rejected(resp.status, message));
        }
        ensure_success(&resp)?;

        let mut login: LoginResponse = decode(&resp)?;
        if login.code == 0 {
            login.code = resp.status;
        }
        Ok(login)
    }

    /// Push alerts; returns the ids LAPI assigned.
    pub async fn push_alerts(&self, alerts: &[Alert]) -> Result<Vec<String>, Error> {
        let token = self.ensure_authenticated().await?;
        let ids: Option<Vec<String>> = self
            .base
            .request(
                Method::POST,
                &self.base.config().endpoints().alerts,
                Some(alerts),
                Some(&token),
            )
            .await?;
        Ok(ids.unwrap_or_default())
    }

    pub async fn search_alerts(&self, query: &AlertSearchQuery) -> Result<Vec<StoredAlert>, Error> {
        let token = self.ensure_authenticated().await?;
        let alerts: Option<Vec<StoredAlert>> = self
            .base
            .request(
                Method::GET,
                &self.base.config().endpoints().alerts,
                Some(query),
                Some(&token),
            )
            .await?;
        Ok(alerts.unwrap_or_default())
    }

    /// Delete alerts matching `query`.
    ///
    /// LAPI only honours this from a watcher on the same host, so it is
    /// meant for local maintenance tooling.
    pub async fn delete_alerts(&self, query: &AlertDeleteQuery) -> Result<DeleteAlertsResponse, Error> {
        let token = self.ensure_authenticated().await?;
        self.base
            .request(
                Method::DELETE,
                &self.base.config().endpoints().alerts,
                Some(query),
                Some(&token),
            )
            .await
    }

    /// Fetch one alert.
    ///
    /// LAPI may answer a missing alert with a success status, so the body
    /// decides: no `id` field means `None`, whatever the status.
    pub async fn get_alert_by_id(&self, id: u64) -> Result<Option<StoredAlert>, Error> {
        if id == 0 {
            return Err(ValidationError::new(vec![Violation {
                entity: "alert".into(),
                field: "id".into(),
                reason: "must be a positive integer".into(),
            }])
            .into());
        }
        let token = self.ensure_authenticated().await?;
        let endpoint = format!("{}/{id}", self.base.config().endpoints().alerts);
        let resp = self
            .base
            .send::<()>(Method::GET, &endpoint, None, Some(&token))
            .await?;

        let body: Value = match decode(&resp) {
            Ok(body) => body,
            Err(err) if resp.is_success() => return Err(err),
            Err(_) => {
                ensure_success(&resp)?;
                Value::Null
            }
        };
        if body.get("id").is_none_or(Value::is_null) {
            debug!(id, status = resp.status, "alert not found");
            return Ok(None);
        }

        serde_json::from_value(body).map(Some).map_err(|e| Error::Client {
            message: format!("Unable to decode alert {id}: {e}"),
            status: Some(resp.status),
            source: Some(Box::new(e)),
        })
    }

    async fn ensure_authenticated(&self) -> Result<SecretString, Error> {
        self.tokens
            .retrieve_token(|| self.login(&[]))
            .await?
            .ok_or(Error::Authentication)
    }
}

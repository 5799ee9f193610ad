// Shared request plumbing for the watcher and bouncer clients.
//
// Every request carries the User-Agent and, when configured, the API key.
// GET and DELETE parameters go into the query string (booleans as
// `true`/`false`, lists comma-joined); other methods send them as JSON.

use std::borrow::Cow;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ConnectionConfig;
use crate::constants;
use crate::error::{ConfigErrorKind, ConfigurationError, Error};
use crate::transport::{HttpRequest, HttpResponse, RequestHandler, Service};

/// Longest raw body prefix written to logs.
pub(crate) const LOG_BODY_MAX_BYTES: usize = 200;
const TRUNCATED_MARKER: &str = "...[TRUNCATED]";
const REDACTED: &str = "***";

/// Connection config, transport handler, and the headers sent on every call.
#[derive(Debug)]
pub struct BaseClient<H> {
    config: ConnectionConfig,
    handler: H,
    headers: HeaderMap,
}

impl<H: RequestHandler> BaseClient<H> {
    pub(crate) fn new(config: ConnectionConfig, handler: H) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent()).map_err(|e| {
            ConfigurationError::single(
                ConfigErrorKind::InvalidValue,
                "user_agent_version",
                format!("Invalid user agent: {e}"),
            )
        })?;
        headers.insert(USER_AGENT, user_agent);

        if let Some(key) = config.api_key() {
            headers.insert(constants::HEADER_API_KEY, secret_header("api_key", key)?);
        }

        Ok(Self {
            config,
            handler,
            headers,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Headers sent with every request.
    pub(crate) fn default_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn endpoint_url(&self, endpoint: &str) -> Result<Url, Error> {
        self.config.endpoint_url(endpoint).map_err(|e| Error::Client {
            message: format!("Invalid endpoint {endpoint}: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
    }

    /// Build and send a LAPI request without interpreting the status.
    pub(crate) async fn send<P>(
        &self,
        method: Method,
        endpoint: &str,
        params: Option<&P>,
        bearer: Option<&SecretString>,
    ) -> Result<HttpResponse, Error>
    where
        P: Serialize + Sync + ?Sized,
    {
        let mut url = self.endpoint_url(endpoint)?;
        let mut headers = self.headers.clone();
        if let Some(token) = bearer {
            let value = format!("Bearer {}", token.expose_secret());
            let mut value = HeaderValue::from_str(&value)
                .map_err(|e| Error::client(format!("Invalid bearer token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let params = params
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::Client {
                message: format!("Unable to encode request parameters: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        let mut body = None;
        if let Some(params) = params {
            if method == Method::GET || method == Method::DELETE {
                append_query(&mut url, &params);
                debug!("{method} {url}");
            } else {
                debug!("{method} {url} params={}", redact_params(&params));
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                body = Some(params.to_string());
            }
        } else {
            debug!("{method} {url}");
        }

        self.dispatch(HttpRequest {
            service: Service::Lapi,
            method,
            url,
            headers,
            body,
            timeout: None,
        })
        .await
    }

    /// Send, require a 2xx status, and decode the JSON body.
    pub(crate) async fn request<T, P>(
        &self,
        method: Method,
        endpoint: &str,
        params: Option<&P>,
        bearer: Option<&SecretString>,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        P: Serialize + Sync + ?Sized,
    {
        let resp = self.send(method, endpoint, params, bearer).await?;
        ensure_success(&resp)?;
        decode(&resp)
    }

    pub(crate) async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        Ok(self.handler.handle(request).await?)
    }
}

fn secret_header(field: &'static str, secret: &SecretString) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(secret.expose_secret()).map_err(|e| {
        ConfigurationError::single(
            ConfigErrorKind::InvalidValue,
            field,
            format!("Invalid {field}: {e}"),
        )
    })?;
    value.set_sensitive(true);
    Ok(value)
}

// ── Query encoding ───────────────────────────────────────────────────

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_owned()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(query_value).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

pub(crate) fn append_query(url: &mut Url, params: &Value) {
    let Value::Object(map) = params else {
        return;
    };
    let pairs: Vec<(&String, String)> = map
        .iter()
        .filter_map(|(k, v)| query_value(v).map(|v| (k, v)))
        .collect();
    if pairs.is_empty() {
        return;
    }
    let mut query = url.query_pairs_mut();
    for (key, value) in pairs {
        query.append_pair(key, &value);
    }
}

// ── Response handling ────────────────────────────────────────────────

/// Non-2xx answers become a client error carrying status and body.
pub(crate) fn ensure_success(resp: &HttpResponse) -> Result<(), Error> {
    if resp.is_success() {
        return Ok(());
    }
    Err(Error::Client {
        message: format!(
            "Unexpected response status code: {}. Body was: {}",
            resp.status,
            resp.body.replace('\n', "")
        ),
        status: Some(resp.status),
        source: None,
    })
}

/// Decode a JSON body. An empty body reads as `null`.
pub(crate) fn decode<T: DeserializeOwned>(resp: &HttpResponse) -> Result<T, Error> {
    let body = resp.body.trim();
    let body = if body.is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| Error::Client {
        message: format!(
            "Unable to decode response body: {e} (body preview: {:?})",
            truncate_for_log(&resp.body)
        ),
        status: Some(resp.status),
        source: Some(Box::new(e)),
    })
}

// ── Log sanitizing ───────────────────────────────────────────────────

/// First `LOG_BODY_MAX_BYTES` of `body` (on a char boundary), marked when cut.
pub(crate) fn truncate_for_log(body: &str) -> Cow<'_, str> {
    if body.len() <= LOG_BODY_MAX_BYTES {
        return Cow::Borrowed(body);
    }
    let mut end = LOG_BODY_MAX_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}{TRUNCATED_MARKER}", &body[..end]))
}

/// Request parameters for logging, with credentials masked.
pub(crate) fn redact_params(params: &Value) -> Value {
    let mut shown = params.clone();
    if let Value::Object(map) = &mut shown {
        if let Some(password) = map.get_mut("password") {
            *password = Value::String(REDACTED.to_owned());
        }
    }
    shown
}

/// Header pairs for logging, with the AppSec key masked.
pub(crate) fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == constants::HEADER_APPSEC_API_KEY
                || name == constants::HEADER_API_KEY
                || name == AUTHORIZATION
            {
                REDACTED.to_owned()
            } else {
                value.to_str().unwrap_or("<binary>").to_owned()
            };
            (name.as_str().to_owned(), shown)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[test]
    fn query_encodes_bools_and_lists() {
        let mut url = Url::parse("http://lapi/v1/decisions").unwrap();
        append_query(
            &mut url,
            &json!({
                "startup": true,
                "scopes": ["Ip", "Range"],
                "limit": 10,
                "ip": null,
                "origins": []
            }),
        );

        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        pairs.sort();
        assert_eq!(
            pairs,
            [
                ("limit".to_owned(), "10".to_owned()),
                ("scopes".to_owned(), "Ip,Range".to_owned()),
                ("startup".to_owned(), "true".to_owned()),
            ]
        );
    }

    #[test]
    fn empty_params_leave_url_untouched() {
        let mut url = Url::parse("http://lapi/v1/alerts").unwrap();
        append_query(&mut url, &json!({}));
        assert_eq!(url.as_str(), "http://lapi/v1/alerts");
    }

    #[test]
    fn non_success_status_is_client_error() {
        let err = ensure_success(&response(403, r#"{"message":"forbidden"}"#)).unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(
            err.to_string(),
            r#"Unexpected response status code: 403. Body was: {"message":"forbidden"}"#
        );
    }

    #[test]
    fn malformed_json_is_client_error() {
        let err = decode::<Value>(&response(200, "<html>")).unwrap_err();
        assert!(matches!(err, Error::Client { .. }));
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let list: Option<Vec<Value>> = decode(&response(200, "")).unwrap();
        assert!(list.is_none());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "a".repeat(250);
        let shown = truncate_for_log(&body);
        assert_eq!(shown.len(), 200 + TRUNCATED_MARKER.len());
        assert!(shown.ends_with("...[TRUNCATED]"));

        assert_eq!(truncate_for_log("short"), "short");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = format!("{}é{}", "a".repeat(199), "b".repeat(10));
        let shown = truncate_for_log(&body);
        assert!(shown.starts_with(&"a".repeat(199)));
        assert!(!shown.contains('é'));
    }

    #[test]
    fn password_is_masked_in_logged_params() {
        let shown = redact_params(&json!({ "machine_id": "m", "password": "hunter2" }));
        assert_eq!(shown, json!({ "machine_id": "m", "password": "***" }));
    }

    #[test]
    fn appsec_key_is_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(constants::HEADER_APPSEC_API_KEY, HeaderValue::from_static("secret"));
        headers.insert(constants::HEADER_APPSEC_IP, HeaderValue::from_static("1.2.3.4"));

        let shown = redact_headers(&headers);
        assert!(shown.contains(&("x-crowdsec-appsec-api-key".to_owned(), "***".to_owned())));
        assert!(shown.contains(&("x-crowdsec-appsec-ip".to_owned(), "1.2.3.4".to_owned())));
    }
}

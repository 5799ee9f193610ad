// HTTP transport seam.
//
// Clients build an `HttpRequest` and hand it to a `RequestHandler`. The
// default handler wraps two `reqwest::Client`s configured from the validated
// connection settings, one per service, since reqwest only sets the connect
// timeout per client.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Certificate, Identity, Method};
use tracing::trace;
use url::Url;

use crate::config::{AuthType, ConnectionConfig};
use crate::error::{BoxError, ConfigErrorKind, ConfigurationError, Error};

/// Which CrowdSec component a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Service {
    #[default]
    Lapi,
    AppSec,
}

/// A fully-built request: query parameters are already in `url`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub service: Service,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Overrides the handler's default total timeout.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { message, source } => Self::Timeout { message, source },
            TransportError::Other { message, source } => Self::Client {
                message,
                status: None,
                source,
            },
        }
    }
}

/// Sends one request and returns the raw response.
///
/// Any HTTP status is a successful `handle`; status interpretation belongs
/// to the clients.
pub trait RequestHandler: Send + Sync {
    fn handle(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

// ── reqwest handler ──────────────────────────────────────────────────

/// Default handler backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestHandler {
    lapi: reqwest::Client,
    appsec: reqwest::Client,
}

impl ReqwestHandler {
    /// Build the underlying clients from validated settings.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, Error> {
        let tls = TlsMaterial::load(config)?;

        let mut lapi = tls.apply(reqwest::Client::builder().timeout(config.api_timeout()));
        if let Some(connect) = config.api_connect_timeout() {
            lapi = lapi.connect_timeout(connect);
        }
        let appsec = tls.apply(
            reqwest::Client::builder()
                .timeout(config.appsec_timeout())
                .connect_timeout(config.appsec_connect_timeout()),
        );

        Ok(Self {
            lapi: build_client(lapi)?,
            appsec: build_client(appsec)?,
        })
    }

    /// Wrap an already-configured client, used for both services.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            lapi: client.clone(),
            appsec: client,
        }
    }

    fn client(&self, service: Service) -> &reqwest::Client {
        match service {
            Service::Lapi => &self.lapi,
            Service::AppSec => &self.appsec,
        }
    }
}

/// Client certificate and trust settings shared by both clients.
struct TlsMaterial {
    identity: Option<Identity>,
    root: Option<Certificate>,
    accept_invalid_certs: bool,
}

impl TlsMaterial {
    fn load(config: &ConnectionConfig) -> Result<Self, ConfigurationError> {
        let mut tls = Self {
            identity: None,
            root: None,
            accept_invalid_certs: false,
        };
        if config.auth_type() != AuthType::Tls {
            return Ok(tls);
        }

        if let (Some(cert), Some(key)) = (config.tls_cert_path(), config.tls_key_path()) {
            let mut pem = read_pem("tls_cert_path", cert)?;
            pem.push(b'\n');
            pem.extend(read_pem("tls_key_path", key)?);
            let identity = Identity::from_pem(&pem).map_err(|e| {
                ConfigurationError::single(
                    ConfigErrorKind::InvalidValue,
                    "tls_cert_path",
                    format!("Invalid client certificate or key: {e}"),
                )
            })?;
            tls.identity = Some(identity);
        }

        if config.tls_verify_peer() {
            if let Some(ca) = config.tls_ca_cert_path() {
                let cert = Certificate::from_pem(&read_pem("tls_ca_cert_path", ca)?).map_err(|e| {
                    ConfigurationError::single(
                        ConfigErrorKind::InvalidValue,
                        "tls_ca_cert_path",
                        format!("Invalid CA certificate: {e}"),
                    )
                })?;
                tls.root = Some(cert);
            }
        } else {
            tls.accept_invalid_certs = true;
        }
        Ok(tls)
    }

    fn apply(&self, mut builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        if let Some(identity) = &self.identity {
            builder = builder.identity(identity.clone());
        }
        if let Some(root) = &self.root {
            builder = builder.add_root_certificate(root.clone());
        }
        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder
    }
}

fn build_client(builder: reqwest::ClientBuilder) -> Result<reqwest::Client, Error> {
    builder.build().map_err(|e| Error::Client {
        message: format!("Failed to build HTTP client: {e}"),
        status: None,
        source: Some(Box::new(e)),
    })
}

fn read_pem(field: &'static str, path: &std::path::Path) -> Result<Vec<u8>, ConfigurationError> {
    std::fs::read(path).map_err(|e| {
        ConfigurationError::single(
            ConfigErrorKind::InvalidValue,
            field,
            format!("Failed to read {}: {e}", path.display()),
        )
    })
}

fn map_reqwest_error(context: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            message: context.to_owned(),
            source: Some(Box::new(err)),
        }
    } else {
        TransportError::Other {
            message: format!("{context}: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl RequestHandler for ReqwestHandler {
    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let context = format!("{} {}", request.method, request.url);
        let mut builder = self
            .client(request.service)
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&context, e))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| map_reqwest_error(&context, e))?;
        trace!(%status, bytes = body.len(), "{context}");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

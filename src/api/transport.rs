//! Purpose: Issue signed admin requests against one storage endpoint.
//! Exports: `Transport`, `ADMIN_PREFIX`.
//! Role: The only module that talks HTTP; clients build operations on top of it.
//! Invariants: Exactly one round trip per call; no retries, no caching.
//! Invariants: Every failure maps to one `ErrorKind` and carries the host alias.
//! Invariants: Service error envelopes (`Code`/`Message`) decide the kind, not message text.
#![allow(clippy::result_large_err)]

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use url::Url;

use crate::core::error::{EntityKind, Error, ErrorKind};
use crate::core::registry::{HostEntry, ensure_endpoint_url};
use crate::core::sign::{
    self, Credentials, DEFAULT_REGION, SERVICE, SigningRequest, SigningTime,
};

pub type ApiResult<T> = Result<T, Error>;

/// Path prefix of the admin API on the storage endpoint.
pub const ADMIN_PREFIX: [&str; 3] = ["minio", "admin", "v3"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Method {
    Get,
    Put,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    host: String,
    endpoint: Url,
    credentials: Credentials,
    region: String,
    timeout: Option<Duration>,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

impl Transport {
    /// `host` is the alias used for error context; `endpoint` is the service base url.
    pub fn new(
        host: impl Into<String>,
        endpoint: &str,
        credentials: Credentials,
    ) -> ApiResult<Self> {
        let host = host.into();
        let mut endpoint = ensure_endpoint_url(endpoint).map_err(|err| err.with_host(host.clone()))?;
        endpoint.set_path("/");
        endpoint.set_query(None);
        endpoint.set_fragment(None);
        Ok(Self {
            inner: Arc::new(TransportInner {
                host,
                endpoint,
                credentials,
                region: DEFAULT_REGION.to_string(),
                timeout: None,
                agent: build_agent(None),
            }),
        })
    }

    pub fn from_entry(entry: &HostEntry) -> ApiResult<Self> {
        Self::new(
            entry.alias.clone(),
            &entry.url,
            Credentials::new(entry.access_key.clone(), entry.secret_key.clone()),
        )
    }

    /// Bounds each round trip; a timed-out call fails with `ErrorKind::Transport`.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.rebuild(|inner| {
            inner.timeout = Some(timeout);
            inner.agent = build_agent(Some(timeout));
        })
    }

    pub fn with_region(self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.rebuild(move |inner| inner.region = region)
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub(crate) fn encode<T: Serialize + ?Sized>(&self, value: &T) -> ApiResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("failed to encode request json")
                .with_host(self.host())
                .with_source(err)
        })
    }

    pub(crate) fn call_json<R>(
        &self,
        method: Method,
        operation: &str,
        query: &[(&str, &str)],
        body: &[u8],
    ) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let text = self.call(method, operation, query, body)?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message(format!("invalid response json for {operation}"))
                .with_host(self.host())
                .with_source(err)
        })
    }

    /// Performs one signed round trip and returns the raw success body.
    pub(crate) fn call(
        &self,
        method: Method,
        operation: &str,
        query: &[(&str, &str)],
        body: &[u8],
    ) -> ApiResult<String> {
        let url = self.admin_url(operation, query)?;
        let at = SigningTime::now().map_err(|err| err.with_host(self.host()))?;
        let payload_sha256 = sign::payload_hash(body);
        let host_header = sign::host_header(&url);
        let headers = vec![
            ("host".to_string(), host_header.clone()),
            ("x-amz-content-sha256".to_string(), payload_sha256.clone()),
            ("x-amz-date".to_string(), at.amz_date.clone()),
        ];
        let authorization = sign::authorization(
            &SigningRequest {
                method: method.as_str(),
                url: &url,
                headers: &headers,
                payload_sha256: &payload_sha256,
            },
            &self.inner.credentials,
            &self.inner.region,
            SERVICE,
            &at,
        );

        let request = self
            .inner
            .agent
            .request_url(method.as_str(), &url)
            .set("Host", &host_header)
            .set("Accept", "application/json")
            .set("Authorization", &authorization)
            .set("x-amz-content-sha256", &payload_sha256)
            .set("x-amz-date", &at.amz_date);
        let response = match method {
            Method::Get | Method::Delete if body.is_empty() => request.call(),
            _ => request
                .set("Content-Type", "application/json")
                .send_bytes(body),
        };

        match response {
            Ok(resp) => {
                tracing::debug!(
                    host = self.host(),
                    method = method.as_str(),
                    operation,
                    status = resp.status(),
                    "admin call"
                );
                resp.into_string().map_err(|err| {
                    Error::new(ErrorKind::Transport)
                        .with_message("failed to read response body")
                        .with_host(self.host())
                        .with_source(err)
                })
            }
            Err(ureq::Error::Status(code, resp)) => {
                tracing::debug!(
                    host = self.host(),
                    method = method.as_str(),
                    operation,
                    status = code,
                    "admin call failed"
                );
                let body = resp.into_string().unwrap_or_default();
                Err(error_from_response(code, &body).with_host(self.host()))
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message("request failed")
                .with_host(self.host())
                .with_hint("Check that the endpoint is reachable and the url is correct.")
                .with_source(err)),
        }
    }

    fn admin_url(&self, operation: &str, query: &[(&str, &str)]) -> ApiResult<Url> {
        let mut url = self.inner.endpoint.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::new(ErrorKind::Transport)
                    .with_message("endpoint url cannot be a base")
                    .with_host(self.host())
            })?;
            path.clear();
            path.extend(ADMIN_PREFIX);
            path.push(operation);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn rebuild(mut self, apply: impl FnOnce(&mut TransportInner)) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            apply(inner);
            return self;
        }
        let mut inner = TransportInner {
            host: self.inner.host.clone(),
            endpoint: self.inner.endpoint.clone(),
            credentials: self.inner.credentials.clone(),
            region: self.inner.region.clone(),
            timeout: self.inner.timeout,
            agent: self.inner.agent.clone(),
        };
        apply(&mut inner);
        self.inner = Arc::new(inner);
        self
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("host", &self.inner.host)
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("credentials", &self.inner.credentials)
            .field("region", &self.inner.region)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

fn build_agent(timeout: Option<Duration>) -> ureq::Agent {
    let mut builder = ureq::AgentBuilder::new();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Entity the service names in a not-found/conflict code, if any.
pub(crate) fn code_entity(code: &str) -> Option<EntityKind> {
    match code {
        "XMinioAdminNoSuchUser" => Some(EntityKind::User),
        "XMinioAdminNoSuchGroup" | "XMinioAdminGroupNotEmpty" => Some(EntityKind::Group),
        "XMinioAdminNoSuchPolicy" | "XMinioAdminPolicyProtected" => Some(EntityKind::Policy),
        _ => None,
    }
}

fn error_kind_from_code(code: &str) -> ErrorKind {
    match code {
        "XMinioAdminNoSuchUser" | "XMinioAdminNoSuchGroup" | "XMinioAdminNoSuchPolicy" => {
            ErrorKind::NotFound
        }
        "XMinioAdminGroupNotEmpty" => ErrorKind::NotEmpty,
        "XMinioAdminPolicyProtected" => ErrorKind::ProtectedPolicy,
        _ => ErrorKind::Transport,
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        404 => ErrorKind::NotFound,
        _ => ErrorKind::Transport,
    }
}

pub(crate) fn error_from_response(status: u16, body: &str) -> Error {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let message = envelope
            .message
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("service error {}", envelope.code));
        let mut err = Error::new(error_kind_from_code(&envelope.code))
            .with_message(message)
            .with_status(status)
            .with_code(envelope.code.clone());
        if matches!(status, 401 | 403) {
            err = err.with_hint("Check the access key and secret key registered for this host.");
        }
        return err;
    }
    Error::new(error_kind_from_status(status))
        .with_message(format!("admin api error status {status}"))
        .with_status(status)
}

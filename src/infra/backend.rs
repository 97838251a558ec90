//! HTTP client for the edge provider's zone API.
//!
//! Speaks the Cloudflare v4 envelope: every response is
//! `{ "success": bool, "errors": [{ "code", "message" }], "result": ... }`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use crate::purge::backend::{BackendError, PurgeBackend, Zone, ZoneAccess};
use crate::purge::config::Credentials;

use super::error::InfraError;

/// Provider limit on URLs per purge request.
pub const DEFAULT_BATCH_SIZE: usize = 30;

const ZONES_PAGE_SIZE: &str = "50";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Clone, Debug)]
pub struct HttpPurgeBackend {
    client: Client,
    base: Url,
    batch_size: usize,
}

impl HttpPurgeBackend {
    pub fn new(base: Url, timeout: Duration, batch_size: usize) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        // `join` drops the last segment of a base without a trailing slash.
        let base = if base.path().ends_with('/') {
            base
        } else {
            let mut base = base;
            let path = format!("{}/", base.path());
            base.set_path(&path);
            base
        };
        Ok(Self {
            client,
            base,
            batch_size: batch_size.max(1),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("edgepurge/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|err| BackendError::Malformed(format!("invalid endpoint `{path}`: {err}")))
    }

    fn authorize(request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        match credentials {
            Credentials::ApiToken { token } => request.bearer_auth(token),
            Credentials::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        credentials: &Credentials,
    ) -> Result<T, BackendError> {
        let response = Self::authorize(request, credentials)
            .send()
            .await
            .map_err(network_error)?;
        Self::handle(response).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let bytes = response.bytes().await.map_err(network_error)?;
        let envelope = serde_json::from_slice::<Envelope<T>>(&bytes);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(BackendError::Authentication(first_message(
                    envelope.as_ref().ok(),
                    status,
                )));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(BackendError::RateLimited {
                    retry_after_seconds: retry_after,
                });
            }
            _ => {}
        }

        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => return Err(BackendError::Malformed(err.to_string())),
            Err(_) => {
                return Err(BackendError::Rejected {
                    status: status.as_u16(),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
        };
        if !status.is_success() || !envelope.success {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message: first_message(Some(&envelope), status),
            });
        }
        envelope
            .result
            .ok_or_else(|| BackendError::Malformed("response carried no result".to_string()))
    }
}

fn network_error(err: reqwest::Error) -> BackendError {
    BackendError::Network(err.to_string())
}

fn first_message<T>(envelope: Option<&Envelope<T>>, status: StatusCode) -> String {
    envelope
        .and_then(|envelope| envelope.errors.first())
        .map(|error| format!("{} (code {})", error.message, error.code))
        .unwrap_or_else(|| status.to_string())
}

#[async_trait]
impl PurgeBackend for HttpPurgeBackend {
    #[instrument(skip_all, fields(zone = %access.zone_id, urls = urls.len()))]
    async fn purge_urls(&self, access: &ZoneAccess, urls: &[String]) -> Result<(), BackendError> {
        let endpoint = self.url(&format!("zones/{}/purge_cache", access.zone_id))?;
        for chunk in urls.chunks(self.batch_size) {
            let request = self
                .client
                .post(endpoint.clone())
                .json(&json!({ "files": chunk }));
            let _: serde_json::Value = self.send(request, &access.credentials).await?;
            debug!(batch = chunk.len(), "Purge batch accepted");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(zone = %access.zone_id))]
    async fn purge_all(&self, access: &ZoneAccess) -> Result<(), BackendError> {
        let endpoint = self.url(&format!("zones/{}/purge_cache", access.zone_id))?;
        let request = self
            .client
            .post(endpoint)
            .json(&json!({ "purge_everything": true }));
        let _: serde_json::Value = self.send(request, &access.credentials).await?;
        Ok(())
    }

    async fn list_zones(&self, credentials: &Credentials) -> Result<Vec<Zone>, BackendError> {
        let mut endpoint = self.url("zones")?;
        endpoint
            .query_pairs_mut()
            .append_pair("per_page", ZONES_PAGE_SIZE);
        self.send(self.client.get(endpoint), credentials).await
    }

    async fn zone_by_id(
        &self,
        credentials: &Credentials,
        zone_id: &str,
    ) -> Result<Option<Zone>, BackendError> {
        let endpoint = self.url(&format!("zones/{zone_id}"))?;
        match self.send(self.client.get(endpoint), credentials).await {
            Ok(zone) => Ok(Some(zone)),
            Err(BackendError::Rejected { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let backend = HttpPurgeBackend::new(
            Url::parse("https://api.example.com/client/v4").unwrap(),
            Duration::from_secs(5),
            DEFAULT_BATCH_SIZE,
        )
        .unwrap();

        assert_eq!(
            backend.url("zones").unwrap().as_str(),
            "https://api.example.com/client/v4/zones"
        );
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert!(HttpPurgeBackend::user_agent().starts_with("edgepurge/"));
    }
}

//! Purge backend boundary.
//!
//! The backend is the edge cache's management API. The engine only needs four
//! calls; the HTTP client lives in `infra::backend`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{Credentials, TenantCacheConfig};
use super::error::ConfigurationError;

/// Credentials plus the zone they act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneAccess {
    pub credentials: Credentials,
    pub zone_id: String,
}

impl ZoneAccess {
    /// Extract access from a tenant's configuration, checking availability first.
    pub fn from_config(config: &TenantCacheConfig) -> Result<Self, ConfigurationError> {
        if let Some(err) = ConfigurationError::from_availability(config.availability()) {
            return Err(err);
        }
        match (&config.credentials, &config.zone_id) {
            (Some(credentials), Some(zone_id)) => Ok(Self {
                credentials: credentials.clone(),
                zone_id: zone_id.trim().to_string(),
            }),
            (None, _) => Err(ConfigurationError::MissingCredentials),
            (_, None) => Err(ConfigurationError::MissingZone),
        }
    }
}

/// A cache zone as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("authentication rejected: {0}")]
    Authentication(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("rate limited by backend")]
    RateLimited { retry_after_seconds: Option<u64> },
    #[error("backend rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Authentication(_) => "authentication",
            BackendError::Network(_) => "network",
            BackendError::RateLimited { .. } => "rate_limited",
            BackendError::Rejected { .. } => "rejected",
            BackendError::Malformed(_) => "malformed",
        }
    }
}

/// Edge cache management API.
#[async_trait]
pub trait PurgeBackend: Send + Sync {
    /// Purge the given URLs as one logical batch.
    async fn purge_urls(&self, access: &ZoneAccess, urls: &[String]) -> Result<(), BackendError>;
    /// Purge everything cached for the zone.
    async fn purge_all(&self, access: &ZoneAccess) -> Result<(), BackendError>;
    async fn list_zones(&self, credentials: &Credentials) -> Result<Vec<Zone>, BackendError>;
    async fn zone_by_id(
        &self,
        credentials: &Credentials,
        zone_id: &str,
    ) -> Result<Option<Zone>, BackendError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// A call the fake backend received.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Urls { zone: String, urls: Vec<String> },
        All { zone: String },
    }

    /// Records purge calls; zones listed in `failing_zones` fail with a network error.
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub calls: Mutex<Vec<Call>>,
        pub failing_zones: Mutex<HashSet<String>>,
    }

    impl RecordingBackend {
        pub(crate) fn fail_zone(&self, zone: &str) {
            self.failing_zones.lock().unwrap().insert(zone.to_string());
        }

        pub(crate) fn heal(&self) {
            self.failing_zones.lock().unwrap().clear();
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, zone: &str) -> Result<(), BackendError> {
            if self.failing_zones.lock().unwrap().contains(zone) {
                return Err(BackendError::Network("operation timed out".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PurgeBackend for RecordingBackend {
        async fn purge_urls(&self, access: &ZoneAccess, urls: &[String]) -> Result<(), BackendError> {
            self.check(&access.zone_id)?;
            self.calls.lock().unwrap().push(Call::Urls {
                zone: access.zone_id.clone(),
                urls: urls.to_vec(),
            });
            Ok(())
        }

        async fn purge_all(&self, access: &ZoneAccess) -> Result<(), BackendError> {
            self.check(&access.zone_id)?;
            self.calls.lock().unwrap().push(Call::All {
                zone: access.zone_id.clone(),
            });
            Ok(())
        }

        async fn list_zones(&self, _credentials: &Credentials) -> Result<Vec<Zone>, BackendError> {
            Ok(vec![Zone {
                id: "zone-1".to_string(),
                name: "example.com".to_string(),
            }])
        }

        async fn zone_by_id(
            &self,
            credentials: &Credentials,
            zone_id: &str,
        ) -> Result<Option<Zone>, BackendError> {
            Ok(self
                .list_zones(credentials)
                .await?
                .into_iter()
                .find(|zone| zone.id == zone_id))
        }
    }
}

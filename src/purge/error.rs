use thiserror::Error;

use super::backend::BackendError;
use super::config::Availability;
use super::options::StoreError;

/// The purge feature cannot run for a tenant. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("cache purge is disabled for this site")]
    Disabled,
    #[error("no backend credentials are configured")]
    MissingCredentials,
    #[error("no zone is selected for this site")]
    MissingZone,
}

impl ConfigurationError {
    /// `None` when the tenant is ready.
    pub fn from_availability(availability: Availability) -> Option<Self> {
        match availability {
            Availability::Ready => None,
            Availability::Disabled => Some(Self::Disabled),
            Availability::MissingCredentials => Some(Self::MissingCredentials),
            Availability::MissingZone => Some(Self::MissingZone),
        }
    }
}

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("purge backend failed: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PurgeError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PurgeError::Configuration(_) => "configuration",
            PurgeError::Backend(err) => err.kind(),
            PurgeError::Store(_) => "store",
        }
    }
}

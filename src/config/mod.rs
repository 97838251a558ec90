//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::infra::backend::DEFAULT_BATCH_SIZE;
use crate::purge::TenantId;
use crate::purge::schedule::{DEFAULT_DRAIN_CRON, drain_schedule};

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgepurge";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_PORT: u16 = 3101;
const DEFAULT_STORE_PATH: &str = "state/options.json";
const DEFAULT_CONTENT_DIR: &str = "content";
const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4/";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUEUE_DISPLAY_LIMIT: usize = 100;
const DEFAULT_SITE: u64 = 1;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub content: ContentSettings,
    pub backend: BackendSettings,
    pub scheduler: SchedulerSettings,
    pub cache: CacheSettings,
    pub sites: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub admin_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub api_base: Url,
    pub timeout: Duration,
    pub batch_size: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub cron: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Operator TTL used when no site-level TTL applies.
    pub ttl_override_seconds: Option<u32>,
    pub queue_display_limit: usize,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub default: TenantId,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("EDGEPURGE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Drain(args)) => raw.apply_common_overrides(&args.overrides),
        Some(Command::Purge(args)) => raw.apply_common_overrides(&args.overrides),
        Some(Command::Queue(args)) => raw.apply_common_overrides(&args.overrides),
        Some(Command::Site(args)) => raw.apply_common_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    content: RawContentSettings,
    backend: RawBackendSettings,
    scheduler: RawSchedulerSettings,
    cache: RawCacheSettings,
    sites: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_common_overrides(&overrides.common);

        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(cron) = overrides.scheduler_cron.as_ref() {
            self.scheduler.cron = Some(cron.clone());
        }
        if let Some(enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_ttl_override_seconds {
            self.cache.ttl_override_seconds = Some(ttl);
        }
    }

    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(path) = overrides.store_path.as_ref() {
            self.store.path = Some(path.clone());
        }
        if let Some(dir) = overrides.content_directory.as_ref() {
            self.content.directory = Some(dir.clone());
        }
        if let Some(base) = overrides.backend_api_base.as_ref() {
            self.backend.api_base = Some(base.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            store,
            content,
            backend,
            scheduler,
            cache,
            sites,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            store: build_store_settings(store)?,
            content: ContentSettings {
                directory: content
                    .directory
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR)),
            },
            backend: build_backend_settings(backend)?,
            scheduler: build_scheduler_settings(scheduler)?,
            cache: build_cache_settings(cache)?,
            sites: build_site_settings(sites)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    Ok(ServerSettings { admin_addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let path = store
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid("store.path", "path must not be empty"));
    }
    Ok(StoreSettings { path })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let raw_base = backend
        .api_base
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let api_base = Url::parse(raw_base.trim())
        .map_err(|err| LoadError::invalid("backend.api_base", format!("invalid URL: {err}")))?;
    if !matches!(api_base.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "backend.api_base",
            "scheme must be http or https",
        ));
    }

    let timeout_secs = backend
        .timeout_seconds
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "backend.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let batch_size = NonZeroUsize::new(backend.batch_size.unwrap_or(DEFAULT_BATCH_SIZE))
        .ok_or_else(|| LoadError::invalid("backend.batch_size", "must be greater than zero"))?;

    Ok(BackendSettings {
        api_base,
        timeout: Duration::from_secs(timeout_secs),
        batch_size,
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let cron = scheduler
        .cron
        .map(|cron| cron.trim().to_string())
        .unwrap_or_else(|| DEFAULT_DRAIN_CRON.to_string());
    drain_schedule(&cron).map_err(|reason| LoadError::invalid("scheduler.cron", reason))?;

    Ok(SchedulerSettings {
        enabled: scheduler.enabled.unwrap_or(true),
        cron,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    if cache.ttl_override_seconds == Some(0) {
        return Err(LoadError::invalid(
            "cache.ttl_override_seconds",
            "must be greater than zero",
        ));
    }
    let queue_display_limit = cache
        .queue_display_limit
        .unwrap_or(DEFAULT_QUEUE_DISPLAY_LIMIT);
    if queue_display_limit == 0 {
        return Err(LoadError::invalid(
            "cache.queue_display_limit",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        ttl_override_seconds: cache.ttl_override_seconds,
        queue_display_limit,
    })
}

fn build_site_settings(sites: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let default = sites.default.unwrap_or(DEFAULT_SITE);
    if default == 0 {
        return Err(LoadError::invalid("sites.default", "must be greater than zero"));
    }
    Ok(SiteSettings {
        default: TenantId(default),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    admin_host: Option<String>,
    admin_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    api_base: Option<String>,
    timeout_seconds: Option<u64>,
    batch_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    enabled: Option<bool>,
    cron: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_override_seconds: Option<u32>,
    queue_display_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    default: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the edgepurge binary.
#[derive(Debug, Parser)]
#[command(name = "edgepurge", version, about = "Edge cache invalidation service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "EDGEPURGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the admin API and the scheduled queue drain.
    Serve(Box<ServeArgs>),
    /// Drain purge queues once and exit.
    Drain(DrainArgs),
    /// Purge cached content.
    Purge(PurgeArgs),
    /// Inspect or edit a site's purge queue.
    Queue(QueueArgs),
    /// Manage a site's purge configuration.
    Site(SiteArgs),
}

/// Overrides accepted by every command.
#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the option store file.
    #[arg(long = "store-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub store_path: Option<PathBuf>,

    /// Override the directory holding per-site content snapshots.
    #[arg(long = "content-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub content_directory: Option<PathBuf>,

    /// Override the edge provider API base URL.
    #[arg(long = "backend-api-base", value_name = "URL")]
    pub backend_api_base: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the admin listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the admin listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the drain schedule (six-field cron, seconds first).
    #[arg(long = "scheduler-cron", value_name = "CRON")]
    pub scheduler_cron: Option<String>,

    /// Enable or disable the scheduled drain.
    #[arg(
        long = "scheduler-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub scheduler_enabled: Option<bool>,

    /// Override the operator TTL applied when no site setting matches.
    #[arg(long = "cache-ttl-override-seconds", value_name = "SECONDS")]
    pub cache_ttl_override_seconds: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct DrainArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Drain only this site; every site when omitted.
    #[arg(long, value_name = "ID")]
    pub site: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Site to purge; defaults to `sites.default`.
    #[arg(long, global = true, value_name = "ID")]
    pub site: Option<u64>,

    #[command(subcommand)]
    pub command: PurgeCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PurgeCommand {
    /// Purge one URL.
    Url {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Purge several URLs.
    Urls {
        #[arg(value_name = "URL", required = true, num_args = 1..)]
        urls: Vec<String>,
    },
    /// Purge a post by id.
    Post {
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// Purge a taxonomy term archive.
    Term {
        #[arg(value_name = "ID")]
        id: u64,
        #[arg(value_name = "TAXONOMY")]
        taxonomy: String,
    },
    /// Purge the site's whole zone.
    All,
    /// Purge every site of the network.
    Network,
}

#[derive(Debug, Args, Clone)]
pub struct QueueArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Site whose queue to use; defaults to `sites.default`.
    #[arg(long, global = true, value_name = "ID")]
    pub site: Option<u64>,

    #[command(subcommand)]
    pub command: QueueCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum QueueCommand {
    /// Show queued items.
    List {
        /// Maximum number of items to print; defaults to `cache.queue_display_limit`.
        #[arg(long, value_name = "COUNT")]
        limit: Option<usize>,
    },
    /// Remove every queued item.
    Clear,
    /// Remove items by key (`42`, `term:category:7`, a URL, `purge_all`, or `all`).
    Remove {
        #[arg(value_name = "KEY", required = true, num_args = 1..)]
        keys: Vec<String>,
    },
}

#[derive(Debug, Args, Clone)]
pub struct SiteArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Site to manage; defaults to `sites.default`.
    #[arg(long, global = true, value_name = "ID")]
    pub site: Option<u64>,

    #[command(subcommand)]
    pub command: SiteCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum SiteCommand {
    /// Print the site's configuration with secrets redacted.
    Show,
    /// Replace the site's configuration from a JSON or TOML file.
    Set {
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    /// List zones visible to the site's credentials.
    Zones,
    /// Check that the configured zone is reachable.
    Verify,
    /// List every registered site.
    List,
}

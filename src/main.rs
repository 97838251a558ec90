use std::{io::Write, path::Path, process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::{CronStream, Schedule};
use edgepurge::{
    application::{
        error::AppError,
        operations::{OperatorResult, PurgeOperations},
    },
    config::{self, Command, PurgeCommand, QueueCommand, SiteCommand},
    infra::{
        backend::HttpPurgeBackend,
        content::SnapshotLibrary,
        error::InfraError,
        http::{self, AdminState},
        store::FileOptionStore,
        telemetry,
        tenants::StoreTenantDirectory,
    },
    purge::{
        DecisionEngine, OptionStore, PurgeBackend, TenantCacheConfig, TenantDirectory, TenantId,
        schedule::{DrainContext, drain_schedule, process_drain_job},
    },
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    let runtime = Runtime::build(&settings)?;

    match command {
        Command::Serve(_) => run_serve(&settings, runtime).await,
        Command::Drain(args) => {
            let result = match args.site {
                Some(site) => runtime.operations.drain(TenantId(site)).await?,
                None => runtime.operations.drain_all().await?,
            };
            finish(result)
        }
        Command::Purge(args) => {
            let site = args.site.map(TenantId).unwrap_or(settings.sites.default);
            run_purge(&runtime.operations, site, args.command).await
        }
        Command::Queue(args) => {
            let site = args.site.map(TenantId).unwrap_or(settings.sites.default);
            run_queue(&runtime.operations, &settings, site, args.command)
        }
        Command::Site(args) => {
            let site = args.site.map(TenantId).unwrap_or(settings.sites.default);
            run_site(&runtime.operations, site, args.command).await
        }
    }
}

/// Shared wiring for every command.
struct Runtime {
    operations: PurgeOperations,
    directory: Arc<dyn TenantDirectory>,
}

impl Runtime {
    fn build(settings: &config::Settings) -> Result<Self, AppError> {
        let store: Arc<dyn OptionStore> = Arc::new(FileOptionStore::open(&settings.store.path)?);
        let backend: Arc<dyn PurgeBackend> = Arc::new(HttpPurgeBackend::new(
            settings.backend.api_base.clone(),
            settings.backend.timeout,
            settings.backend.batch_size.get(),
        )?);
        let directory: Arc<dyn TenantDirectory> = Arc::new(StoreTenantDirectory::with_snapshots(
            store.clone(),
            SnapshotLibrary::new(settings.content.directory.clone()),
            backend.clone(),
        ));
        let operations = PurgeOperations::new(directory.clone(), store, backend)
            .with_decision_engine(DecisionEngine::new(settings.cache.ttl_override_seconds));

        info!(
            store = %settings.store.path.display(),
            content = %settings.content.directory.display(),
            backend = %settings.backend.api_base,
            "Runtime initialised"
        );
        Ok(Self {
            operations,
            directory,
        })
    }
}

async fn run_serve(settings: &config::Settings, runtime: Runtime) -> Result<(), AppError> {
    let monitor_handle = if settings.scheduler.enabled {
        let schedule = drain_schedule(&settings.scheduler.cron).map_err(AppError::unexpected)?;
        Some(spawn_drain_monitor(runtime.directory.clone(), schedule))
    } else {
        info!("Scheduled drain disabled");
        None
    };

    let router = http::build_admin_router(AdminState {
        operations: runtime.operations,
        queue_display_limit: settings.cache.queue_display_limit,
    });
    let listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.admin_addr, "Admin API listening");

    let result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    if let Some(handle) = monitor_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

fn spawn_drain_monitor(
    directory: Arc<dyn TenantDirectory>,
    schedule: Schedule,
) -> tokio::task::JoinHandle<()> {
    let worker = WorkerBuilder::new("purge-queue-drain")
        .data(DrainContext { directory })
        .backend(CronStream::new(schedule))
        .build_fn(process_drain_job);

    let monitor = Monitor::new().register(worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown requested");
}

async fn run_purge(
    operations: &PurgeOperations,
    site: TenantId,
    command: PurgeCommand,
) -> Result<(), AppError> {
    let result = match command {
        PurgeCommand::Url { url } => operations.purge_url(site, &url).await?,
        PurgeCommand::Urls { urls } => operations.purge_urls(site, &urls).await?,
        PurgeCommand::Post { id } => operations.purge_post(site, id).await?,
        PurgeCommand::Term { id, taxonomy } => operations.purge_term(site, id, &taxonomy).await?,
        PurgeCommand::All => operations.purge_all(site).await?,
        PurgeCommand::Network => operations.purge_all_network().await?,
    };
    finish(result)
}

fn run_queue(
    operations: &PurgeOperations,
    settings: &config::Settings,
    site: TenantId,
    command: QueueCommand,
) -> Result<(), AppError> {
    match command {
        QueueCommand::List { limit } => {
            let limit = limit.unwrap_or(settings.cache.queue_display_limit);
            print_json(&operations.queue_items(site, limit)?)
        }
        QueueCommand::Clear => finish(operations.clear_queue(site)?),
        QueueCommand::Remove { keys } => finish(operations.remove_queue_items(site, &keys)?),
    }
}

async fn run_site(
    operations: &PurgeOperations,
    site: TenantId,
    command: SiteCommand,
) -> Result<(), AppError> {
    match command {
        SiteCommand::Show => print_json(&operations.get_config(site)?),
        SiteCommand::Set { file } => {
            let config = read_site_config(&file).await?;
            finish(operations.set_config(site, config)?)
        }
        SiteCommand::Zones => print_json(&operations.zones(site).await?),
        SiteCommand::Verify => finish(operations.verify_zone(site).await?),
        SiteCommand::List => {
            let sites: Vec<u64> = operations.sites()?.into_iter().map(|site| site.0).collect();
            print_json(&sites)
        }
    }
}

async fn read_site_config(path: &Path) -> Result<TenantCacheConfig, AppError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let is_toml = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&source)
            .map_err(|err| AppError::validation(format!("invalid site config: {err}")))
    } else {
        serde_json::from_str(&source)
            .map_err(|err| AppError::validation(format!("invalid site config: {err}")))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(|err| AppError::from(InfraError::from(err)))
}

/// Print the result; error results fail the process.
fn finish(result: OperatorResult) -> Result<(), AppError> {
    print_json(&result)?;
    if result.is_error() {
        return Err(AppError::unexpected(result.message));
    }
    Ok(())
}

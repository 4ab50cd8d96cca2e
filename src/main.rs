use std::{process, sync::Arc};

use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use vellum::{
    application::{
        content::{ContentCaches, ContentManager, ContentOptions, ContentPorts},
        error::{AppError, ErrorReport},
        repos::ContentStructureRepo,
        widgets::BuiltinWidgets,
    },
    cache::{CacheConfig, DistributedCache, MemoryDistributedCache},
    config,
    domain::category::outline,
    infra::{
        db::PostgresRepositories, error::InfraError, fs::LocalSchemaSource,
        memory::InMemoryContentStore, telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(i32::from(error.exit_code()));
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("vellum", error);
    if dispatcher::has_been_set() {
        error!(source = report.source, chain = %report.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, chain = %report.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let manager = build_manager(&settings).await?;
    manager.initialize().await?;

    match cli_args.command {
        config::Command::Reload(args) => {
            let snapshot = if args.recompile {
                manager.update_collections(true).await?
            } else {
                manager.get_collection_data()
            };
            info!(
                collections = snapshot.collections.len(),
                recompile = args.recompile,
                "Reload finished"
            );
            print_json(&snapshot.report)
        }
        config::Command::Tree => {
            let snapshot = manager.get_collection_data();
            print!("{}", outline(&snapshot.tree));
            Ok(())
        }
        config::Command::Collection(args) => {
            let record = manager
                .get_collection(&args.path)
                .ok_or(AppError::NotFound)?;
            print_json(&record)
        }
        config::Command::Load(args) => {
            let record = manager.load_collection(&args.name).await?;
            print_json(&record)
        }
    }
}

async fn build_manager(settings: &config::Settings) -> Result<ContentManager, AppError> {
    let repo = init_repository(settings).await?;
    let source = Arc::new(LocalSchemaSource::new(
        settings.content.extensions.iter().cloned(),
    ));
    let widgets = Arc::new(BuiltinWidgets::new());

    let cache_config = CacheConfig::from(&settings.cache);
    let remote: Option<Arc<dyn DistributedCache>> = settings
        .cache
        .distributed_enabled
        .then(|| Arc::new(MemoryDistributedCache::new()) as Arc<dyn DistributedCache>);

    Ok(ContentManager::new(
        ContentOptions::from(settings),
        ContentPorts {
            source,
            repo,
            widgets,
        },
        ContentCaches::build(&cache_config, remote),
    ))
}

async fn init_repository(
    settings: &config::Settings,
) -> Result<Arc<dyn ContentStructureRepo>, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        info!("No database configured; content structure is kept in memory");
        return Ok(Arc::new(InMemoryContentStore::new()));
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

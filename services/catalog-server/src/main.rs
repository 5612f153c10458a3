//! netCDF catalog service.
//!
//! Keeps a SQLite catalog of netCDF metadata in step with:
//! - Files uploaded through the HTTP API
//! - An optional watched directory tree (with startup re-synchronization)
//!
//! and serves slice queries against those files.

mod config;
mod server;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ingestion::{spawn_error_supervisor, spawn_sync_loop, DirectoryWatcher, WorkerPool};
use netcdf_reader::{silence_hdf5_errors, NetcdfOpener};
use storage::{CatalogStore, FileService, SqliteCatalog};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "catalog-server")]
#[command(about = "Catalog, query and storage service for netCDF files")]
struct Args {
    /// Port for the HTTP API
    #[arg(long, env = "CATALOG_PORT", default_value = "8080")]
    port: u16,

    /// SQLite catalog database
    #[arg(long, env = "CATALOG_DB", default_value = "data/catalog.db")]
    catalog_db: PathBuf,

    /// Directory for uploaded files
    #[arg(long, env = "UPLOAD_DIR", default_value = "data/uploads")]
    upload_dir: PathBuf,

    /// Directory tree to watch and keep catalogued
    #[arg(long, env = "WATCH_DIR")]
    watch_dir: Option<PathBuf>,

    /// YAML file with sync tuning (workers, queue sizes, index mode)
    #[arg(long, env = "SYNC_CONFIG")]
    sync_config: Option<PathBuf>,

    /// Worker count, overriding the sync config
    #[arg(long)]
    workers: Option<usize>,

    /// "background" or "inline"
    #[arg(long)]
    index_mode: Option<String>,

    /// Skip re-synchronizing the watched tree at startup
    #[arg(long)]
    no_rewatch: bool,

    /// Attempts per slice query
    #[arg(long, default_value = "5")]
    query_retries: u32,

    /// Largest accepted upload, in megabytes
    #[arg(long, default_value = "512")]
    max_upload_mb: usize,

    /// Print the catalog as JSON and exit
    #[arg(long)]
    dump: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    silence_hdf5_errors();

    let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalog::open(&args.catalog_db).await?);

    if args.dump {
        let entries = store.query_all_distinct().await?;
        let records: Vec<catalog_common::CatalogRecord> = entries.iter().map(Into::into).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    info!("Starting catalog server");

    let index_mode = args
        .index_mode
        .as_deref()
        .map(config::parse_index_mode)
        .transpose()?;
    let sync_config = config::load_sync_config(
        args.sync_config.as_deref(),
        args.workers,
        index_mode,
        args.no_rewatch.then_some(false),
    )?;
    info!(
        workers = sync_config.workers,
        queue_capacity = sync_config.queue_capacity,
        index_mode = ?sync_config.index_mode,
        "Sync configuration"
    );

    let uploads = FileService::content_addressed(&args.upload_dir);
    uploads.ensure_root().await?;

    let pool = Arc::new(WorkerPool::from_config(&sync_config));
    let supervisor = pool.take_errors().map(spawn_error_supervisor);

    // Shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let watcher = match &args.watch_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            Some(DirectoryWatcher::start(dir, sync_config.watch_buffer)?)
        }
        None => None,
    };
    let watch_files = watcher
        .as_ref()
        .map(|(watcher, _)| FileService::mirrored(watcher.root()));

    let state = Arc::new(AppState::new(
        uploads,
        watch_files,
        store,
        Arc::new(NetcdfOpener),
        pool.clone(),
        sync_config.index_mode,
        args.query_retries,
    ));

    // Keep the watcher alive until shutdown.
    let _watcher = watcher.map(|(watcher, events)| {
        spawn_sync_loop(
            watcher.root().to_path_buf(),
            events,
            state.sync.clone(),
            sync_config.rewatch,
            shutdown_tx.subscribe(),
        );
        watcher
    });

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(()).ok();
    });

    let mut server_shutdown = shutdown_tx.subscribe();
    server::run_server(
        state.clone(),
        args.port,
        args.max_upload_mb * 1024 * 1024,
        async move {
            server_shutdown.recv().await.ok();
        },
    )
    .await?;

    // Closing joins the workers, which hold the only error senders, so the
    // supervisor drains what they reported and then ends.
    pool.close().await;
    if let Some(supervisor) = supervisor {
        if let Err(e) = supervisor.await {
            warn!(error = %e, "Error supervisor ended abnormally");
        }
    }

    info!("Catalog server stopped");
    Ok(())
}

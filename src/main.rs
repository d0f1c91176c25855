//! # Remote Media Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Merge di file di configurazione e flag CLI
//! - Collegamento di backend, cache, ottimizzatore, pipeline e tracker
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI e carica la configurazione
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Si connette alla root e apre la cache delle directory
//! 4. Trova i file media e avvia la pipeline
//! 5. Consuma gli eventi fino alla fine della run (Ctrl-C = cancellazione)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! remote-optimizer /srv/photos --dir albums --recursive --quality 85 -w 8 --ttl 5m
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use remote_media_optimizer::{
    audit::AuditLogger,
    config::{parse_size, parse_ttl, ConfigPaths},
    file_manager::FileManager,
    json_output::JsonMessage,
    progress::ProgressManager,
    Config, ConnectionConfig, DirectoryCache, ImageOptimizer, LocalFs, Orchestrator, PipelineError,
    ProgressTracker, RemoteFs,
};

#[derive(Parser)]
#[command(name = "remote-optimizer")]
#[command(about = "Optimize images in a remote tree, in place, with cached directory browsing")]
struct Args {
    /// Root of the remote tree; every path is confined to it
    root: String,

    /// Directory to process, relative to the root
    #[arg(long, default_value = ".")]
    dir: String,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// JPEG quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Max output width (0 = unlimited)
    #[arg(long)]
    max_width: Option<u32>,

    /// Max output height (0 = unlimited)
    #[arg(long)]
    max_height: Option<u32>,

    /// Size threshold (keep if new size < original * threshold)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Minimum file size to process (e.g. 500KB, 2MB)
    #[arg(long)]
    min_size: Option<String>,

    /// Files processed concurrently
    #[arg(short = 'w', long)]
    concurrency: Option<usize>,

    /// Directory cache TTL (e.g. 90s, 2m, 1h)
    #[arg(long)]
    ttl: Option<String>,

    /// Always list directories from the remote
    #[arg(long)]
    skip_cache: bool,

    /// Write a JSON audit of every processed file
    #[arg(long)]
    audit: Option<PathBuf>,

    /// Output progress and status as JSON for programmatic use
    #[arg(long)]
    json: bool,

    /// Configuration file (default: user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the effective configuration and continue
    #[arg(long)]
    save_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Applica i flag CLI sopra la configurazione caricata
    fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(quality) = self.quality {
            config.jpeg_quality = quality;
        }
        if let Some(max_width) = self.max_width {
            config.max_width = max_width;
        }
        if let Some(max_height) = self.max_height {
            config.max_height = max_height;
        }
        if let Some(threshold) = self.threshold {
            config.size_threshold = threshold;
        }
        if let Some(ref min_size) = self.min_size {
            config.min_file_size = parse_size(min_size)?;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(ref ttl) = self.ttl {
            config.cache_ttl_secs = parse_ttl(ttl)?.as_secs();
        }
        if self.audit.is_some() {
            config.audit = self.audit.clone();
        }
        config.recursive |= self.recursive;
        config.skip_cache |= self.skip_cache;
        config.json_output |= self.json;
        config.validate()?;
        Ok(config)
    }
}

/// Apre la cache delle directory; uno store non apribile è un errore di setup
fn open_cache(config: &Config, path: &Path) -> Result<Option<DirectoryCache>, PipelineError> {
    if config.skip_cache {
        return Ok(None);
    }
    DirectoryCache::open(path, config.cache_ttl()).map(Some).map_err(|e| {
        PipelineError::Configuration(format!("cannot open directory cache {}: {}", path.display(), e))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let connection = ConnectionConfig {
        host: "localhost".to_string(),
        user: std::env::var("USER").unwrap_or_default(),
        remote_path: args.root.clone(),
        ..Default::default()
    };
    let paths = ConfigPaths::resolve(&connection)?;
    let config_path = args.config.clone().unwrap_or_else(|| paths.config_file.clone());
    let config = args.apply(Config::from_file(&config_path).await?)?;

    if args.save_config {
        config.save_to_file(&config_path).await?;
        info!("Configuration saved to {}", config_path.display());
    }

    let fs = Arc::new(LocalFs::new());
    fs.connect(&connection)
        .await
        .with_context(|| format!("Cannot open remote root {}", args.root))?;

    let cache = match open_cache(&config, &paths.cache_file) {
        Ok(cache) => cache,
        Err(e) => {
            error!("{} (use --skip-cache to list from the remote)", e);
            fs.close().await?;
            return Err(e.into());
        }
    };

    // Discovery
    let spinner = (!config.json_output).then(|| ProgressManager::spinner("Listing remote files..."));
    let entries =
        FileManager::find_media_files(fs.as_ref(), cache.as_ref(), &args.dir, config.recursive).await?;
    let tasks = FileManager::select_tasks(entries, config.min_file_size);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let dir = fs.resolve(&args.dir);
    info!("Found {} media files to process in {}", tasks.len(), dir);
    if config.json_output {
        JsonMessage::start(fs.root(), dir.clone(), tasks.len(), (&config).into()).emit();
    }

    let audit = config.audit.as_deref().map(AuditLogger::create).transpose()?;
    let mut tracker = ProgressTracker::new(tasks.len(), config.json_output, audit);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting in-flight files finish");
            let _ = cancel_tx.send(true);
        }
    });

    let optimizer = Arc::new(ImageOptimizer::new(config.size_threshold));
    let orchestrator = Orchestrator::new(fs.clone(), optimizer)
        .with_concurrency(config.concurrency)
        .with_params(config.optimize_params());

    let start = Instant::now();
    let (mut events, mut errors) = orchestrator.run(tasks, cancel_rx);
    tracker.consume(&mut events).await;

    let mut failed_run = None;
    if let Some(err) = errors.recv().await {
        tracker.handle_run_error(&err);
        failed_run = Some(err);
    }

    let stats = tracker.finish(start.elapsed())?;
    info!("{}", stats.format_summary());

    if let Some(cache) = cache {
        cache.close()?;
    }
    fs.close().await?;

    match failed_run {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use futures_util::future::join_all;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use oxiload::application::StateSubscription;
use oxiload::domain::{LoadErrorKind, LoadedImage};
use oxiload::infrastructure::{AppConfig, CliArgs, HttpImageFetcher, MemoryImageCache, StorageManager};
use oxiload::presentation::{SlotHost, SlotRenderer, render_state};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<(AppConfig, PathBuf)> {
    let storage = StorageManager::new().wrap_err("failed to locate config directory")?;
    let path = storage.config_path(args.config.as_deref());
    let mut config = storage
        .load_config(args.config.as_deref())
        .wrap_err_with(|| format!("failed to load config from {}", path.display()))?;
    config.merge_with_args(args);
    Ok((config, path))
}

struct ConsoleRenderer;

impl SlotRenderer for ConsoleRenderer {
    type Output = String;

    fn placeholder(&self, progress: Option<f64>) -> String {
        match progress {
            Some(p) => format!("loading {:>3.0}%", p * 100.0),
            None => "idle".to_string(),
        }
    }

    fn image(&self, image: &LoadedImage) -> String {
        format!(
            "{}x{} ({})",
            image.image.width(),
            image.image.height(),
            image.source
        )
    }

    fn error(&self, kind: LoadErrorKind, message: &str) -> String {
        format!("failed [{kind}]: {message}")
    }
}

/// Prints every state of one slot until it settles. Returns true on success.
async fn watch_slot(index: usize, url: String, mut states: StateSubscription) -> bool {
    while let Some(state) = states.next().await {
        println!("[{index}] {url}: {}", render_state(&state, &ConsoleRenderer));
        if state.is_loaded() || state.is_failed() {
            return state.is_loaded();
        }
    }
    false
}

async fn run_pass(host: &mut SlotHost<usize>, urls: &[String], pass: usize) -> usize {
    let mut watchers = Vec::with_capacity(urls.len());
    for (index, url) in urls.iter().enumerate() {
        let slot = host.bind(index, url.clone());
        if pass > 0 {
            slot.on_appear();
        }
        watchers.push(watch_slot(index, url.clone(), slot.subscribe()));
    }

    join_all(watchers)
        .await
        .into_iter()
        .filter(|loaded| !loaded)
        .count()
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let (config, config_path) = load_config(&args)?;
    init_logging(&config)?;

    info!(
        version = oxiload::VERSION,
        config = %config_path.display(),
        "Starting oxiload"
    );

    let cache = Arc::new(MemoryImageCache::new(
        config.cache.max_count,
        config.cache.max_cost,
    ));
    let fetcher = Arc::new(HttpImageFetcher::new(&config.network.fetcher_config())?);
    let mut host = SlotHost::new(cache.clone(), fetcher);

    let passes = if args.twice { 2 } else { 1 };
    let mut failed = 0;
    for pass in 0..passes {
        failed = run_pass(&mut host, &args.urls, pass).await;
    }

    println!("{}", cache.stats());

    if failed > 0 {
        return Err(eyre!("{failed} of {} images failed to load", args.urls.len()));
    }
    Ok(())
}

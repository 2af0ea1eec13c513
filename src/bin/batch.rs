use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use image::ImageFormat;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use stockmeta::config::AppConfig;
use stockmeta::models::job::NewImage;
use stockmeta::services::analysis::GeminiClient;
use stockmeta::services::scheduler::{Scheduler, SchedulerConfig};

/// Generate Adobe Stock metadata for every image in a directory.
#[derive(Debug, Parser)]
#[command(name = "stockmeta-batch", version)]
struct Args {
    /// Directory containing the images to analyze
    input: PathBuf,

    /// Write the CSV here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override MAX_CONCURRENT_REQUESTS
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    let files = collect_images(&args.input).await?;
    if files.is_empty() {
        tracing::warn!(dir = %args.input.display(), "No images found");
        return Ok(());
    }
    tracing::info!(count = files.len(), dir = %args.input.display(), "Loading images");

    let mut uploads = Vec::with_capacity(files.len());
    for (path, format) in files {
        let bytes = tokio::fs::read(&path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        uploads.push((filename, format.to_mime_type().to_string(), bytes));
    }

    let images = tokio::task::spawn_blocking(move || {
        uploads
            .into_iter()
            .map(|(filename, content_type, bytes)| NewImage::new(filename, content_type, bytes))
            .collect::<Vec<_>>()
    })
    .await?;

    let mut scheduler_config = SchedulerConfig::from(&config);
    if let Some(concurrency) = args.concurrency {
        scheduler_config.max_concurrent = concurrency;
    }
    scheduler_config.auto_start = true;

    let gemini = Arc::new(GeminiClient::from_config(&config));
    let (scheduler, settlement_loop) = Scheduler::new(scheduler_config, gemini);
    let shutdown = CancellationToken::new();
    let loop_handle = tokio::spawn(settlement_loop.run(shutdown.clone()));

    let started = Instant::now();
    scheduler.submit(images);
    scheduler.wait_drained().await;
    shutdown.cancel();
    loop_handle.await?;

    let stats = scheduler.stats();
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        elapsed_s = started.elapsed().as_secs(),
        "Batch finished"
    );

    for job in scheduler.jobs().iter().filter(|job| job.error.is_some()) {
        tracing::warn!(
            filename = %job.filename,
            error = job.error.as_deref().unwrap_or_default(),
            "Image failed"
        );
    }

    let csv = scheduler.export_csv();
    match args.output {
        Some(path) => {
            tokio::fs::write(&path, csv).await?;
            tracing::info!(path = %path.display(), "CSV written");
        }
        None => println!("{csv}"),
    }

    Ok(())
}

/// Image files directly inside `dir`, sorted by name.
async fn collect_images(dir: &Path) -> std::io::Result<Vec<(PathBuf, ImageFormat)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match ImageFormat::from_path(&path) {
            Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)) => {
                files.push((path, format))
            }
            _ => tracing::debug!(path = %path.display(), "Skipping non-image file"),
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

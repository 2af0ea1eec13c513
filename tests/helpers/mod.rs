//! Shared fakes for scheduler and API tests.
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use tokio::sync::Semaphore;

use stockmeta::models::job::NewImage;
use stockmeta::models::metadata::{ImagePayload, StockMetadata};
use stockmeta::services::analysis::{AnalysisClient, AnalysisError};
use stockmeta::services::scheduler::{Scheduler, SchedulerConfig, SettlementLoop};

/// Payloads starting with this prefix make the fakes fail.
pub const FAIL_PREFIX: &[u8] = b"fail";

fn respond(image: &ImagePayload) -> Result<StockMetadata, AnalysisError> {
    if image.bytes.starts_with(FAIL_PREFIX) {
        return Err(AnalysisError::Rejected("model rejected image".to_string()));
    }
    Ok(StockMetadata {
        title: format!("Analyzed {}", String::from_utf8_lossy(&image.bytes)),
        tags: vec!["stock".to_string(), "photo".to_string()],
    })
}

/// Answers immediately.
#[derive(Default)]
pub struct InstantClient {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AnalysisClient for InstantClient {
    async fn analyze(&self, image: &ImagePayload) -> Result<StockMetadata, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        respond(image)
    }
}

/// Holds every call until the test releases it.
pub struct GatedClient {
    gate: Semaphore,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Lets `n` waiting (or future) calls settle.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were inside `analyze` at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisClient for GatedClient {
    async fn analyze(&self, image: &ImagePayload) -> Result<StockMetadata, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AnalysisError::Rejected(e.to_string()))?;
        permit.forget();

        self.active.fetch_sub(1, Ordering::SeqCst);
        respond(image)
    }
}

pub fn scheduler_with(
    client: Arc<dyn AnalysisClient>,
    max_concurrent: usize,
) -> (Scheduler, SettlementLoop) {
    let config = SchedulerConfig {
        max_concurrent,
        ..SchedulerConfig::default()
    };
    Scheduler::new(config, client)
}

/// Submissions whose bytes are just their names; no previews.
pub fn named_images(names: &[&str]) -> Vec<NewImage> {
    names
        .iter()
        .map(|name| NewImage::without_preview(*name, "image/jpeg", name.as_bytes().to_vec()))
        .collect()
}

/// A small solid-colour PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([30u8, 144, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

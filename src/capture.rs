use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp", "gif", "tif", "tiff"];

/// Supplies the frame for one tick. An error means "no tick".
#[async_trait]
pub trait CaptureSource: Send + Sync {
    fn describe(&self) -> String;

    async fn capture(&self) -> Result<Frame>;
}

/// Re-reads a single image path every tick, for screenshot tools that
/// overwrite the same file.
pub struct FileCaptureSource {
    path: PathBuf,
}

impl FileCaptureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaptureSource for FileCaptureSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn capture(&self) -> Result<Frame> {
        read_frame(&self.path).await
    }
}

/// Picks the most recently modified image in a directory.
pub struct DirectoryCaptureSource {
    dir: PathBuf,
}

impl DirectoryCaptureSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn newest_image(&self) -> Result<PathBuf> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_image_path(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
                newest = Some((modified, path));
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| anyhow!("no image files in {}", self.dir.display()))
    }
}

#[async_trait]
impl CaptureSource for DirectoryCaptureSource {
    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }

    async fn capture(&self) -> Result<Frame> {
        let path = self.newest_image().await?;
        read_frame(&path).await
    }
}

async fn read_frame(path: &Path) -> Result<Frame> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let captured_at = tokio::fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let frame = tokio::task::spawn_blocking(move || Frame::from_encoded(bytes))
        .await
        .context("frame decode worker failed")?
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok(frame.with_captured_at(captured_at))
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

//! Screenshot persistence
//!
//! The analyzer hands back an opaque image handle; a sink decides where it
//! goes. The orchestrator never decodes image data.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

/// Opaque screenshot payload returned by the analyzer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenshotHandle {
    pub name: String,
    pub data: Vec<u8>,
}

/// External persistence for screenshots
pub trait ScreenshotSink: Send + Sync {
    /// Store the screenshot, returning where it went
    fn store(&self, handle: &ScreenshotHandle) -> Result<String>;
}

/// Writes screenshots as files into a directory
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create screenshot directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ScreenshotSink for DirectorySink {
    fn store(&self, handle: &ScreenshotHandle) -> Result<String> {
        let path = self.dir.join(handle.name.replace(':', "-"));
        std::fs::write(&path, &handle.data)
            .with_context(|| format!("Failed to write screenshot: {}", path.display()))?;
        info!("Screenshot saved under {}", path.display());
        Ok(path.display().to_string())
    }
}

/// Builds screenshot file names: `<date>_<project>_<condition>_<measurement>.jpg`
#[derive(Clone, Debug)]
pub struct ScreenshotNaming {
    prefix: String,
}

impl ScreenshotNaming {
    pub fn new(project: Option<&str>, date: DateTime<Utc>) -> Self {
        let date = date.format("%Y-%m-%d").to_string();
        let prefix = match project {
            Some(p) if !p.trim().is_empty() => {
                format!("{}_{}", date, p.trim().replace([' ', '/'], "-"))
            }
            _ => date,
        };
        Self { prefix }
    }

    pub fn file_name(&self, condition: &str, measurement: &str) -> String {
        format!("{}_{}_{}.jpg", self.prefix, condition, measurement)
    }
}

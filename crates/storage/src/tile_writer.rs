//! Atomic tile persistence.
//!
//! Tiles are written to a sibling temporary file, size-checked, then
//! renamed into place, so the canonical path only ever holds a complete
//! tile. Undersized output is moved to the quarantine directory together
//! with a JSON record describing why.

use crate::error::SaveError;
use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const RENAME_ATTEMPTS: u32 = 3;
const RENAME_BACKOFF: Duration = Duration::from_millis(50);

/// A tile that reached its canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTile {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
struct QuarantineRecord<'a> {
    reason: &'a str,
    path: String,
    bytes: u64,
    min_bytes: u64,
    quarantined_at: String,
}

#[derive(Debug, Clone)]
pub struct TileWriter {
    min_bytes: u64,
    quarantine_dir: Option<PathBuf>,
    rename_attempts: u32,
    rename_backoff: Duration,
}

impl TileWriter {
    /// `min_bytes == 0` disables the size check.
    pub fn new(min_bytes: u64) -> Self {
        Self {
            min_bytes,
            quarantine_dir: None,
            rename_attempts: RENAME_ATTEMPTS,
            rename_backoff: RENAME_BACKOFF,
        }
    }

    /// Quarantine location. Defaults to `_bad_tiles` next to the tile.
    pub fn with_quarantine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.quarantine_dir = Some(dir.into());
        self
    }

    pub fn min_bytes(&self) -> u64 {
        self.min_bytes
    }

    #[instrument(skip(self, data), fields(path = %dest.display(), bytes = data.len()))]
    pub async fn save(&self, data: &[u8], dest: &Path) -> Result<SavedTile, SaveError> {
        let write_failed = |message: String| SaveError::WriteFailed {
            path: dest.to_path_buf(),
            message,
        };

        let parent = dest
            .parent()
            .ok_or_else(|| write_failed("destination has no parent directory".to_string()))?;
        ensure_dir(parent)
            .await
            .map_err(|e| write_failed(format!("create {}: {}", parent.display(), e)))?;

        let tmp = temp_sibling(dest);
        if let Err(e) = write_file(&tmp, data).await {
            remove_quietly(&tmp).await;
            return Err(write_failed(e.to_string()));
        }

        let size = match tokio::fs::metadata(&tmp).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                remove_quietly(&tmp).await;
                return Err(write_failed(e.to_string()));
            }
        };

        if self.min_bytes > 0 && size < self.min_bytes {
            let quarantined = self.quarantine(&tmp, dest, size).await;
            counter!("tiles_quarantined_total").increment(1);
            warn!(size, min_bytes = self.min_bytes, "Tile below minimum size, quarantined");
            return Err(SaveError::TooSmall {
                path: dest.to_path_buf(),
                actual: size,
                minimum: self.min_bytes,
                quarantined,
            });
        }

        let mut last_error = None;
        for attempt in 0..self.rename_attempts {
            match tokio::fs::rename(&tmp, dest).await {
                Ok(()) => {
                    debug!(size, "Tile saved");
                    return Ok(SavedTile {
                        path: dest.to_path_buf(),
                        bytes: size,
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Rename failed");
                    last_error = Some(e);
                    if attempt + 1 < self.rename_attempts {
                        tokio::time::sleep(self.rename_backoff * (attempt + 1)).await;
                    }
                }
            }
        }

        remove_quietly(&tmp).await;
        Err(write_failed(format!(
            "rename failed after {} attempts: {}",
            self.rename_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Move `tmp` into quarantine with a diagnostic record. Returns the new
    /// location, or `None` if the move failed (the temp file is then removed).
    async fn quarantine(&self, tmp: &Path, dest: &Path, size: u64) -> Option<PathBuf> {
        let dir = match &self.quarantine_dir {
            Some(dir) => dir.clone(),
            None => dest.parent()?.join(crate::layout::QUARANTINE_DIR),
        };
        if let Err(e) = ensure_dir(&dir).await {
            warn!(dir = %dir.display(), error = %e, "Cannot create quarantine dir");
            remove_quietly(tmp).await;
            return None;
        }

        let stamp = Utc::now();
        let target = dir.join(format!(
            "{}_{}",
            stamp.format("%Y%m%dT%H%M%S%.3f"),
            flatten_tile_name(dest)
        ));
        if let Err(e) = tokio::fs::rename(tmp, &target).await {
            warn!(error = %e, "Cannot move tile into quarantine");
            remove_quietly(tmp).await;
            return None;
        }

        let record = QuarantineRecord {
            reason: "too_small",
            path: dest.display().to_string(),
            bytes: size,
            min_bytes: self.min_bytes,
            quarantined_at: stamp.to_rfc3339(),
        };
        let mut record_path = target.clone().into_os_string();
        record_path.push(".json");
        if let Ok(json) = serde_json::to_vec_pretty(&record) {
            if let Err(e) = tokio::fs::write(&record_path, json).await {
                warn!(error = %e, "Cannot write quarantine record");
            }
        }
        Some(target)
    }
}

/// Create a directory tree, tolerating concurrent creation.
pub async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::create_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tile".to_string());
    dest.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// `.../<storage>/<z>/<x>/<y>.png` becomes `storage_z_x_y.png`.
fn flatten_tile_name(dest: &Path) -> String {
    let parts: Vec<String> = dest
        .components()
        .rev()
        .take(4)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.into_iter().rev().collect::<Vec<_>>().join("_")
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Temp file cleanup failed");
        }
    }
}

//! Registry for transient files created during speech synthesis.
//!
//! Every synthesized audio file is registered at creation and removed
//! exactly once: by explicit release after playback, or by the teardown
//! sweep when the registry drops. Releasing a path twice is a no-op.

use crate::error::{AssistantError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Tracks temp files so none outlive the process.
#[derive(Debug, Default)]
pub struct TempRegistry {
    files: Mutex<HashSet<PathBuf>>,
}

impl TempRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh temp file with the given suffix.
    pub fn create(&self, suffix: &str) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix("vesper-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| AssistantError::Speech(format!("temp file creation failed: {e}")))?;
        let (_, path) = file
            .keep()
            .map_err(|e| AssistantError::Speech(format!("temp file persist failed: {e}")))?;
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.clone());
        Ok(path)
    }

    /// Release a registered file. Unknown or already-released paths are
    /// ignored.
    pub fn release(&self, path: &Path) {
        let tracked = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
        if !tracked {
            return;
        }
        if let Err(e) = std::fs::remove_file(path) {
            debug!("temp file already gone: {} ({e})", path.display());
        }
    }

    /// Remove every file still registered.
    pub fn cleanup_all(&self) {
        let paths: Vec<PathBuf> = {
            let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
            files.drain().collect()
        };
        for path in paths {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("failed to remove temp file {}: {e}", path.display());
            }
        }
    }

    /// Number of currently tracked files.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for TempRegistry {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

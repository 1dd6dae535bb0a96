use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::RgbaFrame;
use crate::document::PageInfo;
use crate::engine::RenderingEngine;
use crate::error::{AppError, AppResult};
use crate::transform::Quality;

impl RenderingEngine {
    /// Writes the current page list to disk at full quality and returns the
    /// path written. Only single-file sessions with changes can be saved.
    pub async fn save(&mut self) -> AppResult<PathBuf> {
        if self.document.is_multi_file() {
            return Err(AppError::operation_not_supported(
                "saving a session opened from several files",
            ));
        }
        if !self.document.has_changes() {
            return Err(AppError::NoChangesFound);
        }

        let started = Instant::now();
        let pages = self.document.pages().to_vec();
        let mut frames = Vec::with_capacity(pages.len());
        for page in &pages {
            frames.push(self.frame_for_save(page).await?);
            self.drain_completions();
        }

        let writer = Arc::clone(&self.backends.writer);
        let bytes = tokio::task::spawn_blocking(move || writer.write(&frames)).await??;

        let original = self
            .document
            .files()
            .first()
            .map(|file| file.path().to_path_buf())
            .ok_or_else(|| AppError::invalid_argument("session has no source file"))?;
        let target = self.config.save.target_path(&original);
        let written = target.clone();
        tokio::task::spawn_blocking(move || write_atomically(&written, &bytes)).await??;

        self.stats.record_save(started.elapsed());
        log::info!(
            "saved {} pages to {} in {:.1}ms",
            pages.len(),
            target.display(),
            self.stats.save_ms
        );
        Ok(target)
    }

    async fn frame_for_save(&mut self, page: &PageInfo) -> AppResult<RgbaFrame> {
        if let Some(frame) = self
            .cache
            .entry(page.id())
            .filter(|entry| entry.page().renders_same_as(page))
            .and_then(|entry| entry.frame())
        {
            return Ok(frame.clone());
        }

        if page.is_edited() {
            let (_, frame) = self.load_edited(page, Quality::Normal).await?;
            return Ok(frame);
        }
        self.worker
            .render(page, Quality::Normal)
            .await?
            .into_frame()
    }
}

/// Writes next to `target` first so a failed save never truncates the
/// original.
fn write_atomically(target: &Path, bytes: &[u8]) -> AppResult<()> {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            AppError::invalid_argument(format!("save target has no file name: {}", target.display()))
        })?;
    let temp = target.with_file_name(format!(".{name}.tmp"));

    let result = fs::write(&temp, bytes)
        .and_then(|()| fs::rename(&temp, target))
        .map_err(|source| {
            AppError::io_with_context(source, format!("failed to write {}", target.display()))
        });
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

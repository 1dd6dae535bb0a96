use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::backend::{
    FsImageLoader, HayroPdfLoader, ImageLoader, ImagePdfWriter, PdfLoader, PdfWriter, RgbaFrame,
};
use crate::config::Config;
use crate::document::{DocumentModel, EditData, PageId, PageInfo, SourceFile};
use crate::error::{AppError, AppResult};
use crate::perf::PerfStats;
use crate::render::{
    RasterizerGateway, RenderCompletion, RenderState, RenderWorker, RenderedPage,
    SlidingWindowCache, load_edited_page,
};
use crate::transform::{Quality, RotateDirection};

/// External capabilities the engine drives.
#[derive(Clone)]
pub struct Backends {
    pub pdf: Arc<dyn PdfLoader>,
    pub images: Arc<dyn ImageLoader>,
    pub writer: Arc<dyn PdfWriter>,
}

impl Backends {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pdf: Arc::new(HayroPdfLoader),
            images: Arc::new(FsImageLoader::new(config.cache.image_cache_entries)),
            writer: Arc::new(ImagePdfWriter::new(config.save.compression_level)),
        }
    }
}

/// One editing session: the page list, the window cache around the viewed
/// page and the render worker feeding it.
pub struct RenderingEngine {
    pub(super) config: Config,
    pub(super) backends: Backends,
    pub(super) document: DocumentModel,
    pub(super) cache: SlidingWindowCache,
    pub(super) worker: RenderWorker,
    results: broadcast::Receiver<RenderCompletion>,
    viewed: usize,
    pub(super) stats: PerfStats,
}

impl RenderingEngine {
    /// Opens every file, failing if any of them cannot be parsed. The first
    /// file stays open on the render worker.
    pub fn open<P: AsRef<Path>>(files: &[P], config: Config, backends: Backends) -> AppResult<Self> {
        if files.is_empty() {
            return Err(AppError::invalid_argument("at least one document is required"));
        }

        let mut sources = Vec::with_capacity(files.len());
        let mut first = None;
        for path in files {
            let path = path.as_ref();
            let backend = backends.pdf.open(path)?;
            let page_count = backend.page_count();
            if page_count == 0 {
                return Err(AppError::invalid_argument(format!(
                    "{} has no pages",
                    path.display()
                )));
            }
            sources.push(Arc::new(SourceFile::new(path, page_count)));
            if first.is_none() {
                first = Some(backend);
            }
        }
        let gateway = match first {
            Some(backend) => RasterizerGateway::with_open(Arc::clone(&backends.pdf), backend),
            None => RasterizerGateway::new(Arc::clone(&backends.pdf)),
        };

        let worker = RenderWorker::spawn(
            gateway,
            Arc::clone(&backends.images),
            config.render.viewport(),
            config.render.result_channel_capacity,
        )?;
        let results = worker.subscribe();
        let document = DocumentModel::new(sources);
        let cache = SlidingWindowCache::new(config.cache.window());
        log::info!(
            "opened {} file(s) with {} pages",
            document.files().len(),
            document.len()
        );

        Ok(Self {
            config,
            backends,
            document,
            cache,
            worker,
            results,
            viewed: 0,
            stats: PerfStats::default(),
        })
    }

    /// Ends the session; the worker closes the rasterizer handle on its way out.
    pub fn close(mut self) {
        self.cache.clear();
        self.worker.shutdown();
        log::info!("closed editing session");
    }

    pub fn pages(&self) -> &[PageInfo] {
        self.document.pages()
    }

    pub fn page_count(&self) -> usize {
        self.document.len()
    }

    pub fn has_changes(&self) -> bool {
        self.document.has_changes()
    }

    pub fn index_of(&self, id: PageId) -> Option<usize> {
        self.document.index_of(id)
    }

    pub fn files(&self) -> &[Arc<SourceFile>] {
        self.document.files()
    }

    pub fn cache(&self) -> &SlidingWindowCache {
        &self.cache
    }

    pub fn viewed_index(&self) -> usize {
        self.viewed
    }

    pub fn stats(&self) -> PerfStats {
        let mut stats = self.stats.clone();
        stats.absorb_cache_counters(self.cache.counters());
        stats.set_queue_depth(self.worker.queue_depth());
        stats
    }

    /// Normal quality goes through the window cache; preview tiers are
    /// rendered directly and never cached.
    pub async fn get_page(&mut self, index: usize, quality: Quality) -> AppResult<RenderedPage> {
        log::debug!("get page {index} ({quality:?})");
        match quality {
            Quality::Normal => self.provide_via_cache(index).await,
            _ => self.provide_direct(index, quality).await,
        }
    }

    /// Appends an edited page showing `image`. Returns whether the document
    /// now differs from the opened files.
    pub fn add_page(&mut self, image: impl Into<PathBuf>) -> bool {
        let page = self.document.add_page(EditData::new(image));
        log::info!("added page {} at {}", page.id(), page.global_index());
        self.document.has_changes()
    }

    pub fn remove_page(&mut self, index: usize) -> AppResult<()> {
        let removed = self.document.remove_page(index)?;
        self.cache.remove(removed.id());
        self.viewed = self.viewed.min(self.document.len().saturating_sub(1));
        log::info!("removed page {} from {index}", removed.id());
        Ok(())
    }

    pub fn rearrange_page(&mut self, from: usize, to: usize) -> AppResult<()> {
        self.document.move_page(from, to)?;
        self.cache.clear();
        log::info!("moved page {from} to {to}");
        Ok(())
    }

    /// Reorders by stable id; pages left out of `ids` are dropped.
    pub fn update_order(&mut self, ids: &[PageId]) -> AppResult<()> {
        self.document.reorder(ids)?;
        if !ids.is_empty() {
            self.cache.clear();
            self.viewed = self.viewed.min(self.document.len().saturating_sub(1));
            log::info!("applied new order of {} pages", ids.len());
        }
        Ok(())
    }

    pub async fn rotate_page(
        &mut self,
        index: usize,
        direction: RotateDirection,
    ) -> AppResult<RenderedPage> {
        let page = self.document.page(index)?;
        let rotated = page.with_rotation(page.rotation().rotated(direction));
        log::info!("rotating page {} to {}", rotated.id(), rotated.rotation());

        if rotated.is_edited() {
            return self.commit_edited(index, rotated).await;
        }
        self.document.set_page(index, rotated.clone())?;
        self.cache.invalidate(&rotated);
        self.get_page(index, Quality::Normal).await
    }

    /// Rotates every page, then re-renders only the viewed one; the rest
    /// follow as the window slides.
    pub async fn rotate_all_pages(&mut self, direction: RotateDirection) -> AppResult<RenderedPage> {
        for index in 0..self.document.len() {
            let page = self.document.page(index)?;
            let rotated = page.with_rotation(page.rotation().rotated(direction));
            self.document.set_page(index, rotated)?;
        }
        self.cache.clear();
        log::info!("rotated all {} pages {direction:?}", self.document.len());

        let viewed = self.viewed.min(self.document.len().saturating_sub(1));
        self.get_page(viewed, Quality::Normal).await
    }

    /// Swaps a page's content for `image` (crop result or picked file).
    pub async fn replace_page(
        &mut self,
        index: usize,
        image: impl Into<PathBuf>,
    ) -> AppResult<RenderedPage> {
        let replaced = self.document.page(index)?.with_edit(EditData::new(image));
        log::info!("replacing content of page {}", replaced.id());
        self.commit_edited(index, replaced).await
    }

    /// Loads the image behind an edited page and only then stores the page,
    /// so an unreadable image leaves the document as it was.
    async fn commit_edited(&mut self, index: usize, page: PageInfo) -> AppResult<RenderedPage> {
        let (page, frame) = self.load_edited(&page, Quality::Normal).await?;
        self.document.set_page(index, page.clone())?;
        if !self.cache.store(&page, frame.clone()) {
            log::trace!("page {} is outside the window, not shelved", page.id());
        }
        Ok(RenderedPage::complete(page, Quality::Normal, frame))
    }

    pub(super) async fn load_edited(
        &self,
        page: &PageInfo,
        quality: Quality,
    ) -> AppResult<(PageInfo, RgbaFrame)> {
        let images = Arc::clone(&self.backends.images);
        let page = page.clone();
        let viewport = self.config.render.viewport();
        tokio::task::spawn_blocking(move || {
            load_edited_page(images.as_ref(), &page, viewport, quality)
        })
        .await?
    }

    async fn provide_direct(&mut self, index: usize, quality: Quality) -> AppResult<RenderedPage> {
        let page = self.document.page(index)?.clone();
        let completion = self.worker.render(&page, quality).await?;
        let rendered = completion.page.clone();
        let frame = completion.into_frame()?;
        Ok(RenderedPage::complete(rendered, quality, frame))
    }

    async fn provide_via_cache(&mut self, index: usize) -> AppResult<RenderedPage> {
        self.viewed = index;
        self.drain_completions();
        self.align_window(index)?;

        loop {
            let entry = self
                .cache
                .entry_at(index)
                .cloned()
                .ok_or(AppError::out_of_range(index, self.document.len()))?;
            let ticket = match entry.state() {
                RenderState::Complete(_) => return Ok(entry),
                RenderState::Rendering { ticket } => *ticket,
                RenderState::Wait => {
                    self.align_window(index)?;
                    continue;
                }
            };
            let id = entry.page().id();

            match self.results.recv().await {
                Ok(completion) => {
                    let awaited = completion.page.id() == id && completion.ticket == ticket;
                    let failure = completion.result.as_ref().err().map(Arc::clone);
                    self.apply_completion(completion);
                    if awaited && let Some(source) = failure {
                        return Err(AppError::render_failed(id, source));
                    }
                }
                Err(RecvError::Lagged(skipped)) => self.recover_lost_completions(index, skipped)?,
                Err(RecvError::Closed) => return Err(AppError::WorkerUnavailable),
            }
        }
    }

    fn align_window(&mut self, index: usize) -> AppResult<()> {
        let worker = &self.worker;
        self.cache
            .align(index, self.document.pages(), |page| {
                worker.submit(page, Quality::Normal)
            })
    }

    /// Applies every completion that arrived since the last call.
    pub(super) fn drain_completions(&mut self) {
        loop {
            match self.results.try_recv() {
                Ok(completion) => self.apply_completion(completion),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("dropped {skipped} completions while idle");
                    self.cache.reset_rendering();
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn recover_lost_completions(&mut self, index: usize, skipped: u64) -> AppResult<()> {
        let reset = self.cache.reset_rendering();
        log::warn!("result channel lagged by {skipped}, resubmitting {reset} pages");
        self.align_window(index)
    }

    fn apply_completion(&mut self, completion: RenderCompletion) {
        match &completion.result {
            Ok(_) => self.stats.record_render(completion.elapsed),
            Err(_) => self.stats.record_failure(),
        }
        // preview tiers never land in the window
        if completion.quality != Quality::Normal || self.cache.entry(completion.page.id()).is_none()
        {
            return;
        }
        match completion.result {
            Ok(frame) => {
                self.cache.complete(&completion.page, completion.ticket, frame);
            }
            Err(_) => {
                self.cache.fail(completion.page.id(), completion.ticket);
            }
        }
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use kurbo::Size;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::backend::{ImageLoader, RgbaFrame};
use crate::config::MAX_RESULT_CHANNEL_CAPACITY;
use crate::document::{NativeAttributes, PageAttributes, PageId, PageInfo};
use crate::error::{AppError, AppResult};
use crate::render::gateway::RasterizerGateway;
use crate::transform::{PageTransform, Quality};

enum RenderWorkerRequest {
    Task(RenderJob),
    Shutdown,
}

#[derive(Debug, Clone)]
struct RenderJob {
    ticket: u64,
    page: PageInfo,
    quality: Quality,
}

/// Broadcast to every subscriber once the worker finishes a request.
#[derive(Debug, Clone)]
pub struct RenderCompletion {
    pub ticket: u64,
    /// The requested page, with geometry attributes filled in on success.
    pub page: PageInfo,
    pub quality: Quality,
    pub result: Result<RgbaFrame, Arc<AppError>>,
    pub elapsed: Duration,
}

impl RenderCompletion {
    pub fn matches(&self, id: PageId, quality: Quality) -> bool {
        self.page.id() == id && self.quality == quality
    }

    pub fn into_frame(self) -> AppResult<RgbaFrame> {
        let page_id = self.page.id();
        self.result
            .map_err(|source| AppError::render_failed(page_id, source))
    }
}

struct RenderWorkerRuntime {
    _owned: Option<Runtime>,
    handle: Handle,
}

impl RenderWorkerRuntime {
    fn new() -> AppResult<Self> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self {
                _owned: None,
                handle,
            });
        }

        let runtime = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(1)
            .thread_name("pged-render")
            .build()
            .map_err(|err| AppError::io_with_context(err, "failed to start render runtime"))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            _owned: Some(runtime),
            handle,
        })
    }

    fn spawn_blocking<F>(&self, task: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.spawn_blocking(task)
    }
}

/// Single consumer render queue. Requests run strictly in submission order on
/// one blocking thread that owns the rasterizer handle.
pub struct RenderWorker {
    request_tx: UnboundedSender<RenderWorkerRequest>,
    result_tx: broadcast::Sender<RenderCompletion>,
    next_ticket: AtomicU64,
    queued: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
    _runtime: RenderWorkerRuntime,
}

impl RenderWorker {
    pub fn spawn(
        gateway: RasterizerGateway,
        images: Arc<dyn ImageLoader>,
        viewport: Size,
        channel_capacity: usize,
    ) -> AppResult<Self> {
        let runtime = RenderWorkerRuntime::new()?;
        let (request_tx, request_rx) = unbounded_channel();
        let capacity = channel_capacity.clamp(1, MAX_RESULT_CHANNEL_CAPACITY);
        let (result_tx, _) = broadcast::channel(capacity);
        let queued = Arc::new(AtomicUsize::new(0));

        let worker = {
            let result_tx = result_tx.clone();
            let queued = Arc::clone(&queued);
            runtime.spawn_blocking(move || {
                render_worker_main(gateway, images, viewport, request_rx, result_tx, queued)
            })
        };

        Ok(Self {
            request_tx,
            result_tx,
            next_ticket: AtomicU64::new(1),
            queued,
            worker: Some(worker),
            _runtime: runtime,
        })
    }

    /// Queues a render and returns its ticket.
    pub fn submit(&self, page: &PageInfo, quality: Quality) -> AppResult<u64> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.queued.fetch_add(1, Ordering::Relaxed);
        let job = RenderJob {
            ticket,
            page: page.clone(),
            quality,
        };
        if self
            .request_tx
            .send(RenderWorkerRequest::Task(job))
            .is_err()
        {
            self.queued.fetch_sub(1, Ordering::Relaxed);
            return Err(AppError::WorkerUnavailable);
        }
        log::trace!("queued page {} ({quality:?}) as ticket {ticket}", page.id());
        Ok(ticket)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderCompletion> {
        self.result_tx.subscribe()
    }

    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Submits `page` and waits for the completion of that very request, so
    /// an older render of the same page is never mistaken for it. Lost
    /// completions are resubmitted.
    pub async fn render(&self, page: &PageInfo, quality: Quality) -> AppResult<RenderCompletion> {
        loop {
            let mut results = self.subscribe();
            let ticket = self.submit(page, quality)?;
            match wait_for_ticket(&mut results, ticket).await {
                Ok(completion) => return Ok(completion),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "result channel lagged by {skipped}, resubmitting page {}",
                        page.id()
                    );
                }
                Err(RecvError::Closed) => return Err(AppError::WorkerUnavailable),
            }
        }
    }

    pub fn shutdown(&mut self) {
        let _ = self.request_tx.send(RenderWorkerRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Takes the first completion for (`id`, `quality`). Anything else on the
/// channel belongs to other waiters and is skipped.
pub async fn wait_for(
    results: &mut broadcast::Receiver<RenderCompletion>,
    id: PageId,
    quality: Quality,
) -> Result<RenderCompletion, RecvError> {
    loop {
        let completion = results.recv().await?;
        if completion.matches(id, quality) {
            return Ok(completion);
        }
    }
}

async fn wait_for_ticket(
    results: &mut broadcast::Receiver<RenderCompletion>,
    ticket: u64,
) -> Result<RenderCompletion, RecvError> {
    loop {
        let completion = results.recv().await?;
        if completion.ticket == ticket {
            return Ok(completion);
        }
    }
}

/// Loads the replacement image of an edited page, turned and fitted the same
/// way a rasterized page would be.
pub fn load_edited_page(
    images: &dyn ImageLoader,
    page: &PageInfo,
    viewport: Size,
    quality: Quality,
) -> AppResult<(PageInfo, RgbaFrame)> {
    let edit = page.edit().ok_or_else(|| {
        AppError::invalid_argument(format!("page {} has no replacement image", page.id()))
    })?;
    let image_size = images.image_size(edit.image())?;
    let rotation = page.rotation();
    let transform = PageTransform::compute(image_size, viewport, rotation, quality)?;
    let (width, height) = transform.bitmap_size();
    let frame = images.load(edit.image(), rotation, width, height)?;

    let updated = page.with_attributes(PageAttributes::Native(NativeAttributes {
        viewport,
        page_size: image_size,
        rotation,
    }));
    Ok((updated, frame))
}

fn render_worker_main(
    mut gateway: RasterizerGateway,
    images: Arc<dyn ImageLoader>,
    viewport: Size,
    mut request_rx: UnboundedReceiver<RenderWorkerRequest>,
    result_tx: broadcast::Sender<RenderCompletion>,
    queued: Arc<AtomicUsize>,
) {
    while let Some(request) = request_rx.blocking_recv() {
        let job = match request {
            RenderWorkerRequest::Task(job) => job,
            RenderWorkerRequest::Shutdown => break,
        };

        let started = Instant::now();
        let rendered = if job.page.is_edited() {
            load_edited_page(images.as_ref(), &job.page, viewport, job.quality)
        } else {
            gateway.render(&job.page, viewport, job.quality)
        };
        queued.fetch_sub(1, Ordering::Relaxed);

        let (page, result) = match rendered {
            Ok((page, frame)) => (page, Ok(frame)),
            Err(err) => {
                log::warn!("render of page {} failed: {err}", job.page.id());
                (job.page, Err(Arc::new(err)))
            }
        };
        let completion = RenderCompletion {
            ticket: job.ticket,
            page,
            quality: job.quality,
            result,
            elapsed: started.elapsed(),
        };
        log::trace!(
            "ticket {} done in {:.1}ms",
            completion.ticket,
            completion.elapsed.as_secs_f64() * 1000.0
        );

        // no subscribers is fine: nobody is waiting for this page any more
        let _ = result_tx.send(completion);
    }
    gateway.close();
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use kurbo::Size;

    use super::{RenderWorker, wait_for};
    use crate::backend::testing::{FAKE_IMAGE, FakeImageLoader, FakePdfLoader, IMAGE_MARKER, marker};
    use crate::document::{DocumentModel, EditData, PageAttributes, PageInfo, SourceFile};
    use crate::error::AppError;
    use crate::render::RasterizerGateway;
    use crate::transform::{Quality, Rotation};

    const VIEWPORT: Size = Size::new(1080.0, 1920.0);

    fn spawn(loader: &Arc<FakePdfLoader>, images: &Arc<FakeImageLoader>) -> RenderWorker {
        let gateway = RasterizerGateway::new(Arc::clone(loader) as _);
        RenderWorker::spawn(gateway, Arc::clone(images) as _, VIEWPORT, 16)
            .expect("worker should start")
    }

    fn pages(files: &[(&str, usize)]) -> Vec<PageInfo> {
        let files = files
            .iter()
            .map(|(path, count)| Arc::new(SourceFile::new(*path, *count)))
            .collect();
        DocumentModel::new(files).pages().to_vec()
    }

    #[tokio::test]
    async fn render_fills_attributes_and_bitmap() {
        let loader = Arc::new(FakePdfLoader::new().with_doc("a.pdf", 3));
        let images = Arc::new(FakeImageLoader::default());
        let worker = spawn(&loader, &images);
        let pages = pages(&[("a.pdf", 3)]);

        let completion = worker
            .render(&pages[2], Quality::Normal)
            .await
            .expect("render should complete");

        assert_eq!(completion.page.id(), pages[2].id());
        assert!(matches!(
            completion.page.attributes(),
            Some(PageAttributes::PixelSpace(attrs)) if attrs.viewport == VIEWPORT
        ));
        let frame = completion.into_frame().expect("frame should be present");
        assert_eq!((frame.width, frame.height), (1080, 1440));
        assert_eq!(marker(&frame), (2, 0));
    }

    #[tokio::test]
    async fn oversized_result_capacity_is_capped() {
        let loader = Arc::new(FakePdfLoader::new().with_doc("a.pdf", 1));
        let images: Arc<FakeImageLoader> = Arc::new(FakeImageLoader::default());
        let gateway = RasterizerGateway::new(Arc::clone(&loader) as _);
        let worker = RenderWorker::spawn(gateway, images as _, VIEWPORT, usize::MAX)
            .expect("worker should start");
        let pages = pages(&[("a.pdf", 1)]);

        let completion = worker
            .render(&pages[0], Quality::Normal)
            .await
            .expect("render should complete");
        assert!(completion.result.is_ok());
    }

    #[tokio::test]
    async fn every_waiter_receives_the_same_completion() {
        let loader = Arc::new(
            FakePdfLoader::new()
                .with_doc("a.pdf", 2)
                .with_delay(Duration::from_millis(20)),
        );
        let images = Arc::new(FakeImageLoader::default());
        let worker = spawn(&loader, &images);
        let pages = pages(&[("a.pdf", 2)]);

        let mut first = worker.subscribe();
        let mut second = worker.subscribe();
        let ticket = worker
            .submit(&pages[1], Quality::Normal)
            .expect("submit should succeed");

        let (a, b) = tokio::join!(
            wait_for(&mut first, pages[1].id(), Quality::Normal),
            wait_for(&mut second, pages[1].id(), Quality::Normal),
        );
        let a = a.expect("first waiter should be served");
        let b = b.expect("second waiter should be served");
        assert_eq!(a.ticket, ticket);
        assert_eq!(b.ticket, ticket);
        assert_eq!(loader.renders().len(), 1);
    }

    #[tokio::test]
    async fn waiters_filter_by_quality() {
        let loader = Arc::new(FakePdfLoader::new().with_doc("a.pdf", 1));
        let images = Arc::new(FakeImageLoader::default());
        let worker = spawn(&loader, &images);
        let pages = pages(&[("a.pdf", 1)]);

        let mut results = worker.subscribe();
        worker
            .submit(&pages[0], Quality::Normal)
            .expect("submit should succeed");
        let preview_ticket = worker
            .submit(&pages[0], Quality::Preview)
            .expect("submit should succeed");

        let preview = wait_for(&mut results, pages[0].id(), Quality::Preview)
            .await
            .expect("preview should arrive");
        assert_eq!(preview.ticket, preview_ticket);
        let frame = preview.into_frame().expect("preview frame");
        assert_eq!((frame.width, frame.height), (216, 288));
    }

    #[tokio::test]
    async fn requests_run_in_submission_order_and_switch_files() {
        let loader = Arc::new(FakePdfLoader::new().with_doc("a.pdf", 2).with_doc("b.pdf", 2));
        let images = Arc::new(FakeImageLoader::default());
        let worker = spawn(&loader, &images);
        let pages = pages(&[("a.pdf", 2), ("b.pdf", 2)]);

        let mut results = worker.subscribe();
        let order = [0, 2, 1, 3];
        let mut tickets = Vec::new();
        for index in order {
            tickets.push(
                worker
                    .submit(&pages[index], Quality::Normal)
                    .expect("submit should succeed"),
            );
        }
        let mut seen = Vec::new();
        for _ in 0..order.len() {
            seen.push(results.recv().await.expect("completion").ticket);
        }

        assert_eq!(seen, tickets);
        assert_eq!(
            loader.opened(),
            vec![
                PathBuf::from("a.pdf"),
                PathBuf::from("b.pdf"),
                PathBuf::from("a.pdf"),
                PathBuf::from("b.pdf"),
            ]
        );
    }

    #[tokio::test]
    async fn rasterizer_failure_reaches_the_waiter() {
        let loader = Arc::new(
            FakePdfLoader::new()
                .with_doc("a.pdf", 2)
                .with_failing_page("a.pdf", 1),
        );
        let images = Arc::new(FakeImageLoader::default());
        let worker = spawn(&loader, &images);
        let pages = pages(&[("a.pdf", 2)]);

        let completion = worker
            .render(&pages[1], Quality::Normal)
            .await
            .expect("completion should arrive");
        let err = completion.into_frame().expect_err("render should fail");
        assert!(matches!(err, AppError::RenderFailed { page_id, .. } if page_id == pages[1].id()));
        assert_eq!(worker.queue_depth(), 0);
    }

    #[tokio::test]
    async fn edited_pages_bypass_the_rasterizer() {
        let loader = Arc::new(FakePdfLoader::new().with_doc("a.pdf", 1));
        let images = Arc::new(FakeImageLoader::default());
        let worker = spawn(&loader, &images);
        let page = PageInfo::inserted(EditData::new("scan.png"), 1)
            .with_rotation(Rotation::from_degrees(90).expect("valid rotation"));

        let completion = worker
            .render(&page, Quality::Normal)
            .await
            .expect("render should complete");

        assert!(matches!(
            completion.page.attributes(),
            Some(PageAttributes::Native(attrs)) if attrs.page_size == FAKE_IMAGE
        ));
        let frame = completion.into_frame().expect("frame should be present");
        // 300x400 after the turn, fitted into the viewport width
        assert_eq!((frame.width, frame.height), (1080, 1440));
        assert_eq!(marker(&frame), (IMAGE_MARKER, 1));
        assert!(loader.renders().is_empty());
        assert!(loader.opened().is_empty());
        assert_eq!(images.loads().len(), 1);
    }
}

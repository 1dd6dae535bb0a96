use std::path::Path;
use std::sync::Arc;

use kurbo::Size;

use crate::backend::{PdfBackend, PdfLoader, RgbaFrame};
use crate::document::{PageAttributes, PageInfo, SourceFile};
use crate::error::{AppError, AppResult};
use crate::transform::{PageTransform, Quality};

/// Owns the single open rasterizer handle. Lives on the render worker.
pub struct RasterizerGateway {
    loader: Arc<dyn PdfLoader>,
    current: Option<Box<dyn PdfBackend>>,
    switches: u64,
}

impl RasterizerGateway {
    pub fn new(loader: Arc<dyn PdfLoader>) -> Self {
        Self {
            loader,
            current: None,
            switches: 0,
        }
    }

    /// Starts with `backend` already open, avoiding a second parse of the
    /// first file.
    pub fn with_open(loader: Arc<dyn PdfLoader>, backend: Box<dyn PdfBackend>) -> Self {
        Self {
            loader,
            current: Some(backend),
            switches: 0,
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|backend| backend.path())
    }

    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Rasterizes a source page, returning the page with its geometry
    /// attributes filled in for `viewport`.
    pub fn render(
        &mut self,
        page: &PageInfo,
        viewport: Size,
        quality: Quality,
    ) -> AppResult<(PageInfo, RgbaFrame)> {
        let source = page.source().ok_or_else(|| {
            AppError::invalid_argument(format!(
                "page {} has no source file to rasterize",
                page.id()
            ))
        })?;
        let index = page.index_in_file();
        let backend = self.ensure_open(source)?;

        let page_size = match page.attributes() {
            Some(PageAttributes::PixelSpace(attrs)) if attrs.viewport == viewport => {
                attrs.page_size
            }
            _ => backend.page_size(index)?,
        };
        let rotation = page.rotation();
        let transform = PageTransform::compute(page_size, viewport, rotation, quality)?;
        let (width, height) = transform.bitmap_size();

        let frame = backend
            .render_page(index, transform.affine(), width, height)
            .map_err(|err| AppError::pdf_render(index, err))?;

        let fitted = if quality == Quality::Normal {
            transform
        } else {
            PageTransform::compute(page_size, viewport, rotation, Quality::Normal)?
        };
        let updated =
            page.with_attributes(PageAttributes::pixel_space(viewport, page_size, &fitted));
        Ok((updated, frame))
    }

    pub fn close(&mut self) {
        if let Some(backend) = self.current.take() {
            log::debug!("closed {}", backend.path().display());
        }
    }

    fn ensure_open(&mut self, source: &SourceFile) -> AppResult<&dyn PdfBackend> {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|backend| backend.path() == source.path());
        if !is_current {
            self.close();
            let backend = self.loader.open(source.path())?;
            log::info!("switched rasterizer to {}", source.path().display());
            self.switches += 1;
            self.current = Some(backend);
        }
        self.current.as_deref().ok_or(AppError::WorkerUnavailable)
    }
}

impl Drop for RasterizerGateway {
    fn drop(&mut self) {
        self.close();
    }
}

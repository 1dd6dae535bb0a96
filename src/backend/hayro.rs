use std::path::{Path, PathBuf};
use std::sync::Arc;

use hayro::hayro_interpret::InterpreterSettings;
use hayro::hayro_syntax::Pdf;
use hayro::vello_cpu::color::palette::css::WHITE;
use hayro::{RenderSettings, render};
use kurbo::{Affine, Size};

use crate::error::{AppError, AppResult};
use crate::transform::decompose;

use super::image_ops::{resize_frame_simd, rotate_frame};
use super::traits::{PdfBackend, PdfLoader, RgbaFrame};

pub struct PdfDoc {
    path: PathBuf,
    pdf: Pdf,
}

impl PdfBackend for PdfDoc {
    fn path(&self) -> &Path {
        PdfDoc::path(self)
    }

    fn page_count(&self) -> usize {
        PdfDoc::page_count(self)
    }

    fn page_size(&self, page: usize) -> AppResult<Size> {
        PdfDoc::page_size(self, page)
    }

    fn render_page(
        &self,
        page: usize,
        transform: Affine,
        width: u32,
        height: u32,
    ) -> AppResult<RgbaFrame> {
        PdfDoc::render_page(self, page, transform, width, height)
    }
}

#[derive(Debug, Default)]
pub struct HayroPdfLoader;

impl PdfLoader for HayroPdfLoader {
    fn open(&self, path: &Path) -> AppResult<Box<dyn PdfBackend>> {
        PdfDoc::open(path).map(|doc| Box::new(doc) as Box<dyn PdfBackend>)
    }
}

impl PdfDoc {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(AppError::invalid_argument("pdf path must not be empty"));
        }
        if !path.exists() {
            return Err(AppError::io_with_context(
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
                format!("pdf file not found: {}", path.display()),
            ));
        }
        if !path.is_file() {
            return Err(AppError::invalid_argument("pdf path must be a regular file"));
        }

        let bytes = std::fs::read(path)?;
        if !bytes.starts_with(b"%PDF-") {
            return Err(AppError::invalid_argument("input is not a valid PDF header"));
        }
        let pdf = Pdf::new(Arc::new(bytes))
            .map_err(|_| AppError::invalid_argument("failed to parse PDF with hayro"))?;
        if pdf.pages().len() == 0 {
            return Err(AppError::invalid_argument("pdf has no pages"));
        }

        log::debug!("opened {} ({} pages)", path.display(), pdf.pages().len());
        Ok(Self {
            path: path.to_path_buf(),
            pdf,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.pdf.pages().len()
    }

    pub fn page_size(&self, page: usize) -> AppResult<Size> {
        let page_ref = self
            .pdf
            .pages()
            .get(page)
            .ok_or(AppError::out_of_range(page, self.page_count()))?;
        let (width, height) = page_ref.render_dimensions();
        Ok(Size::new(f64::from(width), f64::from(height)))
    }

    /// Renders at the transform's scale, then turns and fits the pixmap to
    /// the requested buffer. Only quarter-turn transforms are accepted.
    pub fn render_page(
        &self,
        page: usize,
        transform: Affine,
        width: u32,
        height: u32,
    ) -> AppResult<RgbaFrame> {
        let page_ref = self
            .pdf
            .pages()
            .get(page)
            .ok_or(AppError::out_of_range(page, self.page_count()))?;
        if width == 0 || height == 0 {
            return Err(AppError::invalid_argument("target size must be non-zero"));
        }
        let Some((rotation, scale)) = decompose(transform) else {
            return Err(AppError::unsupported(
                "only quarter-turn page transforms can be rasterized",
            ));
        };

        let render_settings = RenderSettings {
            x_scale: scale as f32,
            y_scale: scale as f32,
            bg_color: WHITE,
            ..Default::default()
        };
        let interpreter_settings = InterpreterSettings::default();
        let pixmap = render(page_ref, &interpreter_settings, &render_settings);

        let frame = RgbaFrame::new(
            pixmap.width() as u32,
            pixmap.height() as u32,
            pixmap.data_as_u8_slice().to_vec(),
        )
        .map_err(|err| AppError::pdf_render(page, err))?;
        let frame = rotate_frame(frame, rotation)?;
        resize_frame_simd(frame, width, height)
    }
}

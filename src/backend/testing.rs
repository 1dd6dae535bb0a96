//! In-memory stand-ins for the rasterizer, image loader and PDF writer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use kurbo::{Affine, Size};

use crate::backend::{ImageLoader, PdfBackend, PdfLoader, PdfWriter, RgbaFrame};
use crate::error::{AppError, AppResult};
use crate::transform::{Rotation, decompose};

pub(crate) const FAKE_PAGE: Size = Size::new(600.0, 800.0);
pub(crate) const FAKE_IMAGE: Size = Size::new(400.0, 300.0);
pub(crate) const IMAGE_MARKER: u8 = 200;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderCall {
    pub path: PathBuf,
    pub page: usize,
    pub rotation: Rotation,
    pub width: u32,
    pub height: u32,
}

#[derive(Default)]
struct PdfLog {
    opened: Vec<PathBuf>,
    renders: Vec<RenderCall>,
}

/// Pixels of a fake render: red channel is the page index, green the number
/// of quarter turns.
pub(crate) fn marker(frame: &RgbaFrame) -> (u8, u8) {
    (frame.pixels[0], frame.pixels[1])
}

fn filled(width: u32, height: u32, red: u8, green: u8) -> RgbaFrame {
    let pixels = [red, green, 0, 0xff].repeat(width as usize * height as usize);
    RgbaFrame {
        width,
        height,
        pixels: pixels.into(),
    }
}

#[derive(Default)]
pub(crate) struct FakePdfLoader {
    docs: HashMap<PathBuf, usize>,
    failing: HashSet<(PathBuf, usize)>,
    delay: Duration,
    log: Arc<Mutex<PdfLog>>,
}

impl FakePdfLoader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_doc(mut self, path: &str, pages: usize) -> Self {
        self.docs.insert(PathBuf::from(path), pages);
        self
    }

    pub(crate) fn with_failing_page(mut self, path: &str, page: usize) -> Self {
        self.failing.insert((PathBuf::from(path), page));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn opened(&self) -> Vec<PathBuf> {
        self.log
            .lock()
            .map(|log| log.opened.clone())
            .unwrap_or_default()
    }

    pub(crate) fn renders(&self) -> Vec<RenderCall> {
        self.log
            .lock()
            .map(|log| log.renders.clone())
            .unwrap_or_default()
    }
}

impl PdfLoader for FakePdfLoader {
    fn open(&self, path: &Path) -> AppResult<Box<dyn PdfBackend>> {
        let pages = *self.docs.get(path).ok_or_else(|| {
            AppError::invalid_argument(format!("no such document: {}", path.display()))
        })?;
        if let Ok(mut log) = self.log.lock() {
            log.opened.push(path.to_path_buf());
        }
        let failing = self
            .failing
            .iter()
            .filter(|(failing_path, _)| failing_path == path)
            .map(|(_, page)| *page)
            .collect();
        Ok(Box::new(FakeBackend {
            path: path.to_path_buf(),
            pages,
            failing,
            delay: self.delay,
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeBackend {
    path: PathBuf,
    pages: usize,
    failing: HashSet<usize>,
    delay: Duration,
    log: Arc<Mutex<PdfLog>>,
}

impl PdfBackend for FakeBackend {
    fn path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_size(&self, page: usize) -> AppResult<Size> {
        if page >= self.pages {
            return Err(AppError::out_of_range(page, self.pages));
        }
        Ok(FAKE_PAGE)
    }

    fn render_page(
        &self,
        page: usize,
        transform: Affine,
        width: u32,
        height: u32,
    ) -> AppResult<RgbaFrame> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if page >= self.pages {
            return Err(AppError::out_of_range(page, self.pages));
        }
        if self.failing.contains(&page) {
            return Err(AppError::invalid_argument("corrupt page stream"));
        }
        let (rotation, _) = decompose(transform)
            .ok_or_else(|| AppError::unsupported("fake backend only handles quarter turns"))?;
        if let Ok(mut log) = self.log.lock() {
            log.renders.push(RenderCall {
                path: self.path.clone(),
                page,
                rotation,
                width,
                height,
            });
        }
        Ok(filled(
            width,
            height,
            page as u8,
            (rotation.degrees() / 90) as u8,
        ))
    }
}

#[derive(Default)]
pub(crate) struct FakeImageLoader {
    loads: Mutex<Vec<(PathBuf, Rotation)>>,
}

impl FakeImageLoader {
    pub(crate) fn loads(&self) -> Vec<(PathBuf, Rotation)> {
        self.loads
            .lock()
            .map(|loads| loads.clone())
            .unwrap_or_default()
    }
}

impl ImageLoader for FakeImageLoader {
    fn load(
        &self,
        image: &Path,
        rotation: Rotation,
        width: u32,
        height: u32,
    ) -> AppResult<RgbaFrame> {
        if image.to_string_lossy().contains("missing") {
            return Err(AppError::image_load(
                image,
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing image"),
            ));
        }
        if let Ok(mut loads) = self.loads.lock() {
            loads.push((image.to_path_buf(), rotation));
        }
        Ok(filled(
            width,
            height,
            IMAGE_MARKER,
            (rotation.degrees() / 90) as u8,
        ))
    }

    fn image_size(&self, image: &Path) -> AppResult<Size> {
        if image.to_string_lossy().contains("missing") {
            return Err(AppError::image_load(
                image,
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing image"),
            ));
        }
        Ok(FAKE_IMAGE)
    }
}

#[derive(Default)]
pub(crate) struct FakePdfWriter {
    written: Mutex<Vec<Vec<(u32, u32, (u8, u8))>>>,
}

impl FakePdfWriter {
    /// Per write call: each page's size and render marker.
    pub(crate) fn written(&self) -> Vec<Vec<(u32, u32, (u8, u8))>> {
        self.written
            .lock()
            .map(|written| written.clone())
            .unwrap_or_default()
    }
}

impl PdfWriter for FakePdfWriter {
    fn write(&self, pages: &[RgbaFrame]) -> AppResult<Vec<u8>> {
        let summary = pages
            .iter()
            .map(|frame| (frame.width, frame.height, marker(frame)))
            .collect();
        if let Ok(mut written) = self.written.lock() {
            written.push(summary);
        }
        Ok(format!("%PDF-fake {} pages", pages.len()).into_bytes())
    }
}

use std::path::Path;
use std::sync::Arc;

use kurbo::{Affine, Size};

use crate::error::{AppError, AppResult};
use crate::transform::Rotation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> AppResult<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(AppError::invalid_argument(
                "rgba frame pixels length does not match dimensions",
            ));
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels_to_vec(&self) -> Vec<u8> {
        self.pixels.as_ref().to_vec()
    }

    pub fn is_portrait(&self) -> bool {
        self.height >= self.width
    }
}

/// One open document of the rasterizer. Not reentrant: callers serialize access.
pub trait PdfBackend: Send {
    fn path(&self) -> &Path;
    fn page_count(&self) -> usize;
    fn page_size(&self, page: usize) -> AppResult<Size>;
    /// Draws `page` through `transform` into a `width` x `height` buffer.
    fn render_page(
        &self,
        page: usize,
        transform: Affine,
        width: u32,
        height: u32,
    ) -> AppResult<RgbaFrame>;
}

pub trait PdfLoader: Send + Sync {
    fn open(&self, path: &Path) -> AppResult<Box<dyn PdfBackend>>;
}

/// Loads replacement images for edited pages, turned by `rotation` and fitted
/// into a `width` x `height` box.
pub trait ImageLoader: Send + Sync {
    fn load(&self, image: &Path, rotation: Rotation, width: u32, height: u32)
    -> AppResult<RgbaFrame>;

    fn image_size(&self, image: &Path) -> AppResult<Size>;
}

/// Turns an ordered list of page bitmaps into PDF bytes, one page per frame.
pub trait PdfWriter: Send + Sync {
    fn write(&self, pages: &[RgbaFrame]) -> AppResult<Vec<u8>>;
}

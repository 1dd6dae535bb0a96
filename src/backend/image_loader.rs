use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use kurbo::Size;
use lru::LruCache;

use crate::error::{AppError, AppResult};
use crate::transform::Rotation;

use super::image_ops::{image_to_frame, resize_frame_simd, rotate_image};
use super::traits::{ImageLoader, RgbaFrame};

pub const DEFAULT_DECODED_ENTRIES: usize = 8;

/// Reads replacement images from disk, keeping the most recent decodes.
pub struct FsImageLoader {
    decoded: Mutex<LruCache<PathBuf, Arc<RgbaImage>>>,
}

impl Default for FsImageLoader {
    fn default() -> Self {
        Self::new(DEFAULT_DECODED_ENTRIES)
    }
}

impl FsImageLoader {
    pub fn new(entries: usize) -> Self {
        let entries = NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            decoded: Mutex::new(LruCache::new(entries)),
        }
    }

    fn decode(&self, image: &Path) -> AppResult<Arc<RgbaImage>> {
        let mut decoded = self
            .decoded
            .lock()
            .map_err(|_| AppError::Background("decoded image cache lock poisoned".to_string()))?;
        if let Some(hit) = decoded.get(image) {
            return Ok(Arc::clone(hit));
        }

        let rgba = image::open(image)
            .map_err(|err| AppError::image_load(image, err))?
            .to_rgba8();
        log::debug!(
            "decoded {} ({}x{})",
            image.display(),
            rgba.width(),
            rgba.height()
        );
        let rgba = Arc::new(rgba);
        decoded.put(image.to_path_buf(), Arc::clone(&rgba));
        Ok(rgba)
    }
}

impl ImageLoader for FsImageLoader {
    fn load(
        &self,
        image: &Path,
        rotation: Rotation,
        width: u32,
        height: u32,
    ) -> AppResult<RgbaFrame> {
        let decoded = self.decode(image)?;
        let rotated = rotate_image(decoded.as_ref().clone(), rotation);
        resize_frame_simd(image_to_frame(rotated), width, height)
    }

    fn image_size(&self, image: &Path) -> AppResult<Size> {
        let decoded = self.decode(image)?;
        Ok(Size::new(
            f64::from(decoded.width()),
            f64::from(decoded.height()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgba, RgbaImage};
    use kurbo::Size;

    use super::FsImageLoader;
    use crate::backend::{ImageLoader, unique_temp_path};
    use crate::error::AppError;
    use crate::transform::Rotation;

    fn write_png(width: u32, height: u32) -> std::path::PathBuf {
        let path = unique_temp_path("image.png");
        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.save(&path).expect("png should be written");
        path
    }

    #[test]
    fn reports_decoded_size() {
        let path = write_png(40, 20);
        let loader = FsImageLoader::default();

        let size = loader.image_size(&path).expect("image should decode");
        assert_eq!(size, Size::new(40.0, 20.0));

        fs::remove_file(&path).expect("test file should be removed");
    }

    #[test]
    fn load_rotates_then_fits_target() {
        let path = write_png(40, 20);
        let loader = FsImageLoader::new(2);

        let rotation = Rotation::from_degrees(90).expect("valid rotation");
        let frame = loader
            .load(&path, rotation, 20, 40)
            .expect("image should load");
        assert_eq!((frame.width, frame.height), (20, 40));
        // red corner moved from top-left to top-right
        let offset = (frame.width as usize - 1) * 4;
        assert_eq!(&frame.pixels[offset..offset + 4], &[255, 0, 0, 255]);

        let small = loader
            .load(&path, Rotation::NONE, 10, 5)
            .expect("cached image should load");
        assert_eq!((small.width, small.height), (10, 5));

        fs::remove_file(&path).expect("test file should be removed");
    }

    #[test]
    fn missing_image_reports_location() {
        let path = unique_temp_path("missing.png");
        let err = FsImageLoader::default()
            .image_size(&path)
            .expect_err("missing file should fail");
        assert!(matches!(err, AppError::ImageLoad { location, .. } if location == path));
    }
}

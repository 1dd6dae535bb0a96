use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref};

use crate::error::{AppError, AppResult};

use super::traits::{PdfWriter, RgbaFrame};

pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;
const IMAGE_NAME: Name<'static> = Name(b"Im0");

/// Writes each frame as a full-page image; page size in points equals the
/// bitmap size in pixels.
#[derive(Debug, Clone, Copy)]
pub struct ImagePdfWriter {
    compression_level: u8,
}

impl Default for ImagePdfWriter {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl ImagePdfWriter {
    pub fn new(compression_level: u8) -> Self {
        Self {
            compression_level: compression_level.min(10),
        }
    }
}

impl PdfWriter for ImagePdfWriter {
    fn write(&self, pages: &[RgbaFrame]) -> AppResult<Vec<u8>> {
        if pages.is_empty() {
            return Err(AppError::invalid_argument("cannot write a PDF without pages"));
        }

        let mut next_id = 1;
        let mut alloc = || {
            let id = Ref::new(next_id);
            next_id += 1;
            id
        };

        let catalog_id = alloc();
        let pages_id = alloc();
        let page_refs: Vec<(Ref, Ref, Ref)> =
            pages.iter().map(|_| (alloc(), alloc(), alloc())).collect();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_refs.iter().map(|(page_id, _, _)| *page_id))
            .count(pages.len() as i32);

        for (frame, (page_id, image_id, content_id)) in pages.iter().zip(&page_refs) {
            if frame.byte_len() != frame.width as usize * frame.height as usize * 4 {
                return Err(AppError::invalid_argument(
                    "rgba frame pixels length does not match dimensions",
                ));
            }
            let (width, height) = (frame.width as f32, frame.height as f32);

            let rgb: Vec<u8> = frame
                .pixels
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let compressed =
                miniz_oxide::deflate::compress_to_vec_zlib(&rgb, self.compression_level);
            {
                let mut image = pdf.image_xobject(*image_id, &compressed);
                image.filter(Filter::FlateDecode);
                image.width(frame.width as i32);
                image.height(frame.height as i32);
                image.color_space().device_rgb();
                image.bits_per_component(8);
            }

            let mut content = Content::new();
            content.save_state();
            content.transform([width, 0.0, 0.0, height, 0.0, 0.0]);
            content.x_object(IMAGE_NAME);
            content.restore_state();
            let raw = content.finish();
            let compressed =
                miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), self.compression_level);
            pdf.stream(*content_id, &compressed)
                .filter(Filter::FlateDecode);

            let mut page = pdf.page(*page_id);
            page.media_box(Rect::new(0.0, 0.0, width, height))
                .parent(pages_id)
                .contents(*content_id);
            page.resources().x_objects().pair(IMAGE_NAME, *image_id);
        }

        let bytes = pdf.finish();
        log::debug!("encoded {} pages into {} bytes", pages.len(), bytes.len());
        Ok(bytes)
    }
}

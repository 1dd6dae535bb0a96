mod hayro;
mod image_loader;
pub(crate) mod image_ops;
#[cfg(test)]
pub(crate) mod testing;
mod traits;
mod writer;

pub use hayro::{HayroPdfLoader, PdfDoc};
pub use image_loader::{DEFAULT_DECODED_ENTRIES, FsImageLoader};
pub use traits::{ImageLoader, PdfBackend, PdfLoader, PdfWriter, RgbaFrame};
pub use writer::{DEFAULT_COMPRESSION_LEVEL, ImagePdfWriter};

#[cfg(test)]
pub(crate) use hayro::tests::unique_temp_path;

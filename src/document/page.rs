use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kurbo::{Affine, Size};

use crate::transform::{PageTransform, Rotation};

static NEXT_PAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a logical page; survives reordering and list edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(u64);

impl PageId {
    pub fn next() -> Self {
        Self(NEXT_PAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    page_count: usize,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, page_count: usize) -> Self {
        Self {
            path: path.into(),
            page_count,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }
}

/// Replacement content for a page whose pixels no longer come from the
/// rasterizer (inserted images, crop results).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditData {
    image: PathBuf,
}

impl EditData {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
        }
    }

    pub fn image(&self) -> &Path {
        &self.image
    }
}

/// Geometry measured in output pixels, with the composed page transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSpaceAttributes {
    pub viewport: Size,
    pub page_size: Size,
    pub rotation: Rotation,
    pub transform: Affine,
}

/// Geometry without a composed transform: pages not rendered yet and pages
/// drawn by the image loader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeAttributes {
    pub viewport: Size,
    pub page_size: Size,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageAttributes {
    PixelSpace(PixelSpaceAttributes),
    Native(NativeAttributes),
}

impl PageAttributes {
    pub fn pixel_space(viewport: Size, page_size: Size, transform: &PageTransform) -> Self {
        Self::PixelSpace(PixelSpaceAttributes {
            viewport,
            page_size,
            rotation: transform.rotation(),
            transform: transform.affine(),
        })
    }

    pub fn unrendered(rotation: Rotation) -> Self {
        Self::Native(NativeAttributes {
            viewport: Size::ZERO,
            page_size: Size::ZERO,
            rotation,
        })
    }

    pub fn rotation(&self) -> Rotation {
        match self {
            Self::PixelSpace(attrs) => attrs.rotation,
            Self::Native(attrs) => attrs.rotation,
        }
    }

    pub fn page_size(&self) -> Size {
        match self {
            Self::PixelSpace(attrs) => attrs.page_size,
            Self::Native(attrs) => attrs.page_size,
        }
    }

    pub fn viewport(&self) -> Size {
        match self {
            Self::PixelSpace(attrs) => attrs.viewport,
            Self::Native(attrs) => attrs.viewport,
        }
    }

    pub fn is_portrait(&self) -> bool {
        let size = self.page_size();
        if self.rotation().swaps_axes() {
            size.width >= size.height
        } else {
            size.height >= size.width
        }
    }

    /// A transform is reusable only while page size, viewport and rotation agree.
    pub fn transform_for(&self, viewport: Size, rotation: Rotation) -> Option<Affine> {
        match self {
            Self::PixelSpace(attrs) if attrs.viewport == viewport && attrs.rotation == rotation => {
                Some(attrs.transform)
            }
            _ => None,
        }
    }

    fn with_rotation(self, rotation: Rotation) -> Self {
        match self {
            Self::PixelSpace(attrs) => Self::Native(NativeAttributes {
                viewport: attrs.viewport,
                page_size: attrs.page_size,
                rotation,
            }),
            Self::Native(attrs) => Self::Native(NativeAttributes { rotation, ..attrs }),
        }
    }
}

/// One logical page slot of the edit session. Updates produce new values.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    id: PageId,
    source: Option<Arc<SourceFile>>,
    index_in_file: usize,
    global_index: usize,
    attributes: Option<PageAttributes>,
    edit: Option<EditData>,
}

impl PageInfo {
    pub fn from_source(source: Arc<SourceFile>, index_in_file: usize, global_index: usize) -> Self {
        Self {
            id: PageId::next(),
            source: Some(source),
            index_in_file,
            global_index,
            attributes: None,
            edit: None,
        }
    }

    pub fn inserted(edit: EditData, global_index: usize) -> Self {
        Self {
            id: PageId::next(),
            source: None,
            index_in_file: 0,
            global_index,
            attributes: Some(PageAttributes::unrendered(Rotation::NONE)),
            edit: Some(edit),
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn source(&self) -> Option<&Arc<SourceFile>> {
        self.source.as_ref()
    }

    pub fn index_in_file(&self) -> usize {
        self.index_in_file
    }

    pub fn global_index(&self) -> usize {
        self.global_index
    }

    pub fn attributes(&self) -> Option<&PageAttributes> {
        self.attributes.as_ref()
    }

    pub fn edit(&self) -> Option<&EditData> {
        self.edit.as_ref()
    }

    pub fn is_edited(&self) -> bool {
        self.edit.is_some()
    }

    pub fn rotation(&self) -> Rotation {
        self.attributes
            .as_ref()
            .map_or(Rotation::NONE, PageAttributes::rotation)
    }

    pub fn with_rotation(&self, rotation: Rotation) -> Self {
        let attributes = match self.attributes {
            Some(attrs) => attrs.with_rotation(rotation),
            None => PageAttributes::unrendered(rotation),
        };
        Self {
            attributes: Some(attributes),
            ..self.clone()
        }
    }

    pub fn with_global_index(&self, global_index: usize) -> Self {
        Self {
            global_index,
            ..self.clone()
        }
    }

    pub fn with_attributes(&self, attributes: PageAttributes) -> Self {
        Self {
            attributes: Some(attributes),
            ..self.clone()
        }
    }

    /// Switches the page to replacement content, dropping any rotation since
    /// the new image already shows the page as the user sees it.
    pub fn with_edit(&self, edit: EditData) -> Self {
        Self {
            attributes: Some(PageAttributes::unrendered(Rotation::NONE)),
            edit: Some(edit),
            ..self.clone()
        }
    }

    /// Whether a render of `self` would produce the same pixels as one of `other`.
    pub fn renders_same_as(&self, other: &PageInfo) -> bool {
        self.id == other.id
            && self.index_in_file == other.index_in_file
            && self.source == other.source
            && self.edit == other.edit
            && self.rotation() == other.rotation()
    }
}

mod model;
mod page;

pub use model::DocumentModel;
pub use page::{
    EditData, NativeAttributes, PageAttributes, PageId, PageInfo, PixelSpaceAttributes,
    SourceFile,
};

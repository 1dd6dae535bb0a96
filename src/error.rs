use std::path::PathBuf;
use std::sync::Arc;

use crate::document::PageId;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("PDF render failed for page {page}")]
    PdfRender {
        page: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to load image {}", location.display())]
    ImageLoad {
        location: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("page index {index} is out of range for {len} pages")]
    PageIndexOutOfRange { index: usize, len: usize },
    #[error("the last remaining page cannot be removed")]
    LastPageCannotBeRemoved,
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),
    #[error("no changes found")]
    NoChangesFound,
    #[error("page {0} not found")]
    PageNotFound(PageId),
    #[error("new order lists {requested} pages but only {available} exist")]
    NewOrderCapacityMoreThanInitial { requested: usize, available: usize },
    #[error("render failed for page {page_id}")]
    RenderFailed {
        page_id: PageId,
        #[source]
        source: Arc<AppError>,
    },
    #[error("render worker is not running")]
    WorkerUnavailable,
    #[error("background task failed: {0}")]
    Background(String),
}

impl From<std::io::Error> for AppError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            context: "I/O operation failed".to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::Background(source.to_string())
    }
}

impl AppError {
    pub fn io_with_context(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn pdf_render(page: usize, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::PdfRender {
            page,
            source: Box::new(source),
        }
    }

    pub fn image_load(
        location: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ImageLoad {
            location: location.into(),
            source: Box::new(source),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn operation_not_supported(message: impl Into<String>) -> Self {
        Self::OperationNotSupported(message.into())
    }

    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::PageIndexOutOfRange { index, len }
    }

    pub fn render_failed(page_id: PageId, source: Arc<AppError>) -> Self {
        Self::RenderFailed { page_id, source }
    }
}

mod cache;
mod gateway;
mod worker;

pub use cache::{
    CacheCounters, DEFAULT_WINDOW_SIZE, RenderState, RenderStatus, RenderedPage,
    SlidingWindowCache, WindowConfig,
};
pub use gateway::RasterizerGateway;
pub use worker::{RenderCompletion, RenderWorker, load_edited_page, wait_for};

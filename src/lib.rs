pub mod backend;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod perf;
pub mod render;
pub mod transform;

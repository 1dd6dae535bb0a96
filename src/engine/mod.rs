mod core;
mod save;
#[cfg(test)]
mod tests;

pub use core::{Backends, RenderingEngine};

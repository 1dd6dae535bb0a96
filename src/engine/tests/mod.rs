use std::sync::Arc;

use crate::backend::testing::{FakeImageLoader, FakePdfLoader, FakePdfWriter};
use crate::config::Config;
use crate::engine::{Backends, RenderingEngine};


struct Harness {
    engine: RenderingEngine,
    loader: Arc<FakePdfLoader>,
    images: Arc<FakeImageLoader>,
    writer: Arc<FakePdfWriter>,
}

fn open(loader: FakePdfLoader, files: &[&str]) -> Harness {
    open_with_config(loader, files, Config::default())
}

fn open_with_config(loader: FakePdfLoader, files: &[&str], config: Config) -> Harness {
    let loader = Arc::new(loader);
    let images = Arc::new(FakeImageLoader::default());
    let writer = Arc::new(FakePdfWriter::default());
    let backends = Backends {
        pdf: Arc::clone(&loader) as _,
        images: Arc::clone(&images) as _,
        writer: Arc::clone(&writer) as _,
    };
    let engine = RenderingEngine::open(files, config, backends).expect("engine should open");
    Harness {
        engine,
        loader,
        images,
        writer,
    }
}

fn single(pages: usize) -> Harness {
    open(FakePdfLoader::new().with_doc("a.pdf", pages), &["a.pdf"])
}

mod async_generator;
mod sync_function;

use core::future::Future;
use std::time::{Duration, Instant};

use waterfall_memory::{MemoryDom, NodeRef};

use crate::{Child, Completion, LocalRuntime, Renderer};

/// A renderer over a fresh in-memory document.
pub(crate) struct Page {
    pub(crate) runtime: LocalRuntime,
    pub(crate) dom: MemoryDom,
    pub(crate) root: NodeRef,
    pub(crate) renderer: Renderer<MemoryDom>,
}

impl Page {
    pub(crate) fn new() -> Self {
        let runtime = LocalRuntime::new();
        let dom = MemoryDom::new();
        let root = dom.create_root();
        let renderer = runtime.renderer(dom.clone());
        Self {
            runtime,
            dom,
            root,
            renderer,
        }
    }

    pub(crate) fn render(&self, child: impl Into<Child>) -> Completion {
        self.renderer.render(child, &self.root)
    }

    pub(crate) fn html(&self) -> String {
        self.dom.inner_html(self.root)
    }

    pub(crate) fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        self.runtime.block_on(future)
    }
}

pub(crate) async fn sleep(ms: u64) {
    smol::Timer::after(Duration::from_millis(ms)).await;
}

/// Asserts that roughly `ms` milliseconds passed since `started`, never less.
#[track_caller]
pub(crate) fn assert_elapsed(started: Instant, ms: u64) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(ms) && elapsed < Duration::from_millis(ms + 90),
        "expected about {ms}ms, took {elapsed:?}"
    );
}

/// Component bodies end with this so `async` blocks know their error type.
pub(crate) fn rendered(child: impl Into<Child>) -> anyhow::Result<Child> {
    Ok(child.into())
}

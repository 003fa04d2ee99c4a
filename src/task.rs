//! Running the engine's background work on a single-threaded executor.

use core::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use smol::LocalExecutor;
use waterfall_core::{Adapter, Renderer, RendererBuilder, Spawner};

/// A thread-local executor that renderers hand their tasks to.
///
/// Tasks only make progress while the runtime is driven, either through
/// [`block_on`](Self::block_on) or [`try_tick`](Self::try_tick).
///
/// ```ignore
/// let runtime = LocalRuntime::new();
/// let renderer = runtime.renderer(dom.clone());
/// runtime.block_on(renderer.render(app.element(), &root))?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalRuntime {
    executor: Rc<LocalExecutor<'static>>,
}

impl LocalRuntime {
    /// Creates an idle runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A spawner feeding this runtime.
    #[must_use]
    pub fn spawner(&self) -> impl Spawner + 'static {
        let executor = self.executor.clone();
        move |task: LocalBoxFuture<'static, ()>| executor.spawn(task).detach()
    }

    /// A renderer whose async work runs on this runtime.
    #[must_use]
    pub fn renderer<A: Adapter>(&self, adapter: A) -> Renderer<A> {
        Renderer::new(adapter, self.spawner())
    }

    /// A renderer builder whose async work runs on this runtime.
    #[must_use]
    pub fn builder<A: Adapter>(&self, adapter: A) -> RendererBuilder<A> {
        Renderer::builder(adapter, self.spawner())
    }

    /// Drives spawned tasks until `future` completes.
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.executor.run(future))
    }

    /// Runs one ready task, if any. Returns `false` when nothing was ready.
    pub fn try_tick(&self) -> bool {
        self.executor.try_tick()
    }

    /// Runs ready tasks until none is left.
    pub fn run_until_stalled(&self) {
        while self.try_tick() {}
    }
}

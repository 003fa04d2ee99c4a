//! The public entry point: rendering descriptor trees into root nodes.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context as TaskContext, Poll};
use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};
use tracing::debug;

use crate::adapter::{Adapter, arrange};
use crate::config::{Config, DuplicateKeys};
use crate::element::Child;
use crate::engine::{Engine, Reconciled};
use crate::error::RenderError;
use crate::record::NodeId;
use crate::scheduler::Output;

/// Runs the engine's background work: async component calls, async generator
/// streams and pending refreshes.
///
/// Implemented for every `Fn(LocalBoxFuture<'static, ()>)`, so a closure handing
/// tasks to a local executor is enough.
pub trait Spawner {
    /// Starts `task` on the host executor.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

impl<F> Spawner for F
where
    F: Fn(LocalBoxFuture<'static, ()>),
{
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self(task);
    }
}

/// Resolves once a render or refresh request, or a newer one, is visible.
///
/// Dropping a completion does not cancel anything.
#[must_use = "a completion reports when and whether the render committed"]
pub struct Completion(LocalBoxFuture<'static, Result<(), RenderError>>);

impl Completion {
    pub(crate) fn ready(result: Result<(), RenderError>) -> Self {
        Self(future::ready(result).boxed_local())
    }

    pub(crate) fn from_receiver(rx: oneshot::Receiver<Result<(), RenderError>>) -> Self {
        Self(rx.map(|result| result.unwrap_or(Ok(()))).boxed_local())
    }
}

impl Future for Completion {
    type Output = Result<(), RenderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// Renders element trees into platform roots through an [`Adapter`].
pub struct Renderer<A: Adapter> {
    engine: Rc<Engine<A>>,
    roots: RefCell<Vec<(A::Node, NodeId)>>,
}

impl<A: Adapter> fmt::Debug for Renderer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.roots.borrow().len())
            .field("records", &self.engine.records.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Renderer`].
pub struct RendererBuilder<A: Adapter> {
    adapter: A,
    spawner: Box<dyn Spawner>,
    config: Config,
}

impl<A: Adapter> fmt::Debug for RendererBuilder<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<A: Adapter> RendererBuilder<A> {
    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the duplicate key policy.
    #[must_use]
    pub const fn duplicate_keys(mut self, policy: DuplicateKeys) -> Self {
        self.config.duplicate_keys = policy;
        self
    }

    /// Finishes the renderer.
    #[must_use]
    pub fn build(self) -> Renderer<A> {
        Renderer {
            engine: Engine::new(self.adapter, self.spawner, self.config),
            roots: RefCell::default(),
        }
    }
}

impl<A: Adapter> Renderer<A> {
    /// Creates a renderer with the default configuration.
    pub fn new(adapter: A, spawner: impl Spawner + 'static) -> Self {
        Self::builder(adapter, spawner).build()
    }

    /// Starts configuring a renderer.
    pub fn builder(adapter: A, spawner: impl Spawner + 'static) -> RendererBuilder<A> {
        RendererBuilder {
            adapter,
            spawner: Box::new(spawner),
            config: Config::default(),
        }
    }

    /// The adapter output goes through.
    pub fn adapter(&self) -> &A {
        &self.engine.adapter
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.engine.config
    }

    /// Renders `child` into `root`, diffing against whatever was rendered there
    /// before.
    ///
    /// Synchronous trees are committed before this returns. The completion resolves
    /// once this request, or a newer one for the same root, is visible; awaiting it
    /// is only needed when async components are involved. Rendering
    /// [`Child::Empty`] unmounts the root.
    pub fn render(&self, child: impl Into<Child>, root: &A::Node) -> Completion {
        let child = child.into();
        let existing = self
            .roots
            .borrow()
            .iter()
            .find(|(node, _)| node == root)
            .map(|(_, id)| *id);

        if child.is_empty() {
            if let Some(id) = existing {
                self.roots.borrow_mut().retain(|(_, root_id)| *root_id != id);
                return Completion::ready(self.unmount_root(id));
            }
            return Completion::ready(Ok(()));
        }

        let id = existing.unwrap_or_else(|| {
            let id = self.engine.create_root(root.clone());
            self.roots.borrow_mut().push((root.clone(), id));
            id
        });
        self.update_root(id, child)
    }

    /// Unmounts whatever is rendered into `root`.
    pub fn unmount(&self, root: &A::Node) -> Completion {
        self.render(Child::Empty, root)
    }

    fn update_root(&self, id: NodeId, child: Child) -> Completion {
        let engine = &self.engine;
        let (seq, attempt, Reconciled { output, fault }) = match engine.update_root(id, child) {
            Ok(update) => update,
            Err(error) => return Completion::ready(Err(error)),
        };
        let faulted = move || fault.map_or(Ok(()), Err);
        match output {
            Output::Ready(nodes) => {
                Completion::ready(engine.commit_host(id, attempt, seq, &nodes).and_then(|()| faulted()))
            }
            Output::Pending(pending) => {
                let rx = engine
                    .records
                    .borrow_mut()
                    .get_mut(id)
                    .map(|record| record.schedule.wait(seq));
                let this = Rc::downgrade(engine);
                engine.spawn(async move {
                    let result = pending.await;
                    let Some(engine) = this.upgrade() else { return };
                    let committed = result.and_then(|nodes| engine.commit_host(id, attempt, seq, &nodes));
                    if let Err(error) = committed {
                        engine.fail(id, seq, &error);
                    }
                });
                match rx {
                    Some(rx) => Completion(
                        async move {
                            match rx.await {
                                Ok(settled) => settled.map(drop)?,
                                Err(oneshot::Canceled) => {}
                            }
                            faulted()
                        }
                        .boxed_local(),
                    ),
                    None => Completion::ready(faulted()),
                }
            }
        }
    }

    /// Destroys a root's records, detaches its nodes and settles every outstanding
    /// completion.
    fn unmount_root(&self, id: NodeId) -> Result<(), RenderError> {
        let engine = &self.engine;
        let children = engine
            .records
            .borrow_mut()
            .get_mut(id)
            .map(|record| core::mem::take(&mut record.children))
            .unwrap_or_default();
        for child in children {
            engine.destroy(child);
        }

        let root = engine
            .records
            .borrow()
            .get(id)
            .and_then(|record| record.node.clone().map(|node| (node, record.arranged.clone())));
        let detached = match root {
            Some((node, arranged)) => arrange(&engine.adapter, &node, &arranged, &[]),
            None => Ok(()),
        };
        engine.free(id);
        debug!(%id, "unmounted root");
        detached.map_err(RenderError::from)
    }
}

impl<A: Adapter> Drop for Renderer<A> {
    fn drop(&mut self) {
        let roots = core::mem::take(self.roots.get_mut());
        for (_, id) in roots {
            let children = self
                .engine
                .records
                .borrow_mut()
                .get_mut(id)
                .map(|record| core::mem::take(&mut record.children))
                .unwrap_or_default();
            for child in children {
                self.engine.destroy(child);
            }
            self.engine.free(id);
        }
    }
}

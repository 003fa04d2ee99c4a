//! Writing asynchronous generator bodies as plain `async` blocks.
//!
//! [`coroutine`] turns an `async` closure into a [`GeneratorStream`]. The body
//! yields intermediate outputs through [`Co::yield_`] and its return value becomes
//! the final [`Step::Return`].

use core::future::Future;
use core::pin::Pin;
use core::task::{Context as TaskContext, Poll};
use std::cell::RefCell;
use std::rc::Rc;

use futures::Stream;
use futures::future::LocalBoxFuture;

use crate::component::{GeneratorStream, Step};
use crate::element::Child;

type Slot = Rc<RefCell<Option<Child>>>;

/// Yield handle passed to a [`coroutine`] body.
#[derive(Debug, Clone)]
pub struct Co {
    slot: Slot,
}

impl Co {
    /// Emits an intermediate output and suspends until the renderer asks for the
    /// next one.
    pub fn yield_(&self, child: impl Into<Child>) -> impl Future<Output = ()> + 'static {
        Yielded {
            slot: self.slot.clone(),
            child: Some(child.into()),
        }
    }
}

struct Yielded {
    slot: Slot,
    child: Option<Child>,
}

impl Future for Yielded {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.child.take() {
            // The stream sees the filled slot and wakes us by polling again.
            Some(child) => {
                *this.slot.borrow_mut() = Some(child);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

struct Coroutine {
    slot: Slot,
    body: Option<LocalBoxFuture<'static, anyhow::Result<Child>>>,
}

impl Stream for Coroutine {
    type Item = anyhow::Result<Step>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(body) = this.body.as_mut() else {
            return Poll::Ready(None);
        };
        match body.as_mut().poll(cx) {
            Poll::Ready(result) => {
                this.body = None;
                Poll::Ready(Some(result.map(Step::Return)))
            }
            Poll::Pending => match this.slot.borrow_mut().take() {
                Some(child) => Poll::Ready(Some(Ok(Step::Yield(child)))),
                None => Poll::Pending,
            },
        }
    }
}

/// Builds a generator stream from an `async` body.
///
/// ```ignore
/// Component::async_generator("Clock", |_props, ctx| {
///     coroutine(move |co| async move {
///         let mut updates = ctx.props_stream();
///         while let Some(props) = updates.next().await {
///             co.yield_(h("span").child(props.str("time").unwrap_or_default())).await;
///         }
///         Ok(Child::Empty)
///     })
/// })
/// ```
pub fn coroutine<F, Fut>(body: F) -> GeneratorStream
where
    F: FnOnce(Co) -> Fut,
    Fut: Future<Output = anyhow::Result<Child>> + 'static,
{
    let slot = Slot::default();
    let co = Co { slot: slot.clone() };
    Box::pin(Coroutine {
        slot,
        body: Some(Box::pin(body(co))),
    })
}

//! The capability handed to component logic.

use core::any::Any;
use core::fmt;
use core::pin::Pin;
use core::task::{Context as TaskContext, Poll, Waker};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use futures::Stream;

use crate::error::RenderError;
use crate::props::{Props, Value};
use crate::record::NodeId;
use crate::renderer::Completion;

/// An event delivered to listeners.
#[derive(Debug, Clone, Default)]
pub struct Event {
    /// Event name, such as `click`.
    pub name: String,
    /// Attributes of the node the event was dispatched on.
    pub target: BTreeMap<String, Value>,
}

impl Event {
    /// Creates an event without target attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: BTreeMap::new(),
        }
    }

    /// Returns a target attribute as a string, if present.
    #[must_use]
    pub fn target_attr(&self, name: &str) -> Option<&str> {
        self.target.get(name).and_then(Value::as_str)
    }
}

/// An event callback. Two listeners are equal when they share an allocation.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Event)>);

impl Listener {
    /// Wraps a callback.
    pub fn new(callback: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(callback))
    }

    /// Invokes the callback.
    pub fn call(&self, event: &Event) {
        (self.0)(event);
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

/// Engine side of a [`Context`]. Erases the adapter type.
pub(crate) trait ContextHost {
    fn props(&self, id: NodeId) -> Option<Props>;
    fn mailbox(&self, id: NodeId) -> Option<Rc<Mailbox>>;
    fn refresh(self: Rc<Self>, id: NodeId) -> Completion;
    fn add_listener(&self, id: NodeId, name: &str, listener: Listener);
    fn remove_listener(&self, id: NodeId, name: &str, listener: &Listener);
    fn nodes(&self, id: NodeId) -> Option<Box<dyn Any>>;
    fn is_mounted(&self, id: NodeId) -> bool;
}

/// Per-record handle given to component logic.
#[derive(Clone)]
pub struct Context {
    host: Weak<dyn ContextHost>,
    id: NodeId,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

impl Context {
    pub(crate) fn new(host: Weak<dyn ContextHost>, id: NodeId) -> Self {
        Self { host, id }
    }

    /// The record this context belongs to.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// The most recently supplied props. Empty once the record is gone.
    #[must_use]
    pub fn props(&self) -> Props {
        self.host
            .upgrade()
            .and_then(|host| host.props(self.id))
            .unwrap_or_default()
    }

    /// Iterates over props snapshots, one per update.
    ///
    /// For asynchronous generators each `next()` waits until the next update
    /// supplies props. Only the latest props are kept while the generator is busy,
    /// and the stream ends when the record is destroyed. Other component kinds get
    /// their current props once.
    #[must_use]
    pub fn props_stream(&self) -> PropsStream {
        let host = self.host.upgrade();
        match host.as_ref().and_then(|host| host.mailbox(self.id)) {
            Some(mailbox) => PropsStream::mailbox(mailbox),
            None => PropsStream {
                source: Source::Once(host.and_then(|host| host.props(self.id))),
            },
        }
    }

    /// Re-renders this record with its current props.
    ///
    /// The returned completion resolves once this request, or a newer one, has
    /// committed.
    #[must_use = "the completion reports failures of the refresh"]
    pub fn refresh(&self) -> Completion {
        match self.host.upgrade() {
            Some(host) => host.refresh(self.id),
            None => Completion::ready(Err(RenderError::Unmounted)),
        }
    }

    /// Registers `listener` on the nodes this record renders, now and after every
    /// future commit.
    pub fn add_event_listener(&self, name: &str, listener: Listener) {
        if let Some(host) = self.host.upgrade() {
            host.add_listener(self.id, name, listener);
        }
    }

    /// Removes a listener added with [`add_event_listener`](Self::add_event_listener).
    pub fn remove_event_listener(&self, name: &str, listener: &Listener) {
        if let Some(host) = self.host.upgrade() {
            host.remove_listener(self.id, name, listener);
        }
    }

    /// The platform nodes committed by the last render of this record.
    ///
    /// `N` must be the adapter's node type; any other type yields `None`.
    #[must_use]
    pub fn nodes<N: Clone + 'static>(&self) -> Option<Vec<N>> {
        let nodes = self.host.upgrade()?.nodes(self.id)?;
        nodes.downcast::<Vec<N>>().ok().map(|nodes| *nodes)
    }

    /// Returns `true` once the record has been destroyed.
    #[must_use]
    pub fn is_unmounted(&self) -> bool {
        self.host
            .upgrade()
            .is_none_or(|host| !host.is_mounted(self.id))
    }
}

#[derive(Debug, Default)]
struct MailboxState {
    handoff: Option<(Props, u64)>,
    latest: Option<(Props, u64)>,
    waiting: Option<Waker>,
    pulled: u64,
    delivered: u64,
    pulling: bool,
    closed: bool,
}

/// Single-slot props buffer feeding an asynchronous generator.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    state: RefCell<MailboxState>,
}

impl Mailbox {
    /// A mailbox already holding the initial props of request `seq`.
    pub(crate) fn new(props: Props, seq: u64) -> Self {
        Self {
            state: RefCell::new(MailboxState {
                latest: Some((props, seq)),
                pulled: seq,
                delivered: seq,
                ..MailboxState::default()
            }),
        }
    }

    /// Delivers props. A pull that is already waiting receives them directly;
    /// otherwise they replace whatever was buffered.
    pub(crate) fn deliver(&self, props: Props, seq: u64) {
        let waker = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.delivered = state.delivered.max(seq);
            if state.waiting.is_some() && state.handoff.is_none() {
                state.handoff = Some((props, seq));
                state.waiting.take()
            } else {
                state.latest = Some((props, seq));
                None
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Ends the props stream.
    pub(crate) fn close(&self) {
        let waker = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            state.waiting.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// The newest request an output produced now reflects: the props last pulled,
    /// or every delivery for a generator that never pulls.
    pub(crate) fn covers(&self) -> u64 {
        let state = self.state.borrow();
        if state.pulling { state.pulled } else { state.delivered }
    }

    fn poll_pull(&self, cx: &mut TaskContext<'_>) -> Poll<Option<Props>> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Poll::Ready(None);
        }
        state.pulling = true;
        let next = state.handoff.take().or_else(|| state.latest.take());
        match next {
            Some((props, seq)) => {
                state.pulled = state.pulled.max(seq);
                Poll::Ready(Some(props))
            }
            None => {
                state.waiting = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[derive(Debug)]
enum Source {
    Mailbox(Rc<Mailbox>),
    Once(Option<Props>),
}

/// Stream of props snapshots returned by [`Context::props_stream`].
#[derive(Debug)]
pub struct PropsStream {
    source: Source,
}

impl PropsStream {
    fn mailbox(mailbox: Rc<Mailbox>) -> Self {
        Self {
            source: Source::Mailbox(mailbox),
        }
    }
}

impl Stream for PropsStream {
    type Item = Props;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Props>> {
        match &mut self.get_mut().source {
            Source::Mailbox(mailbox) => mailbox.poll_pull(cx),
            Source::Once(props) => Poll::Ready(props.take()),
        }
    }
}

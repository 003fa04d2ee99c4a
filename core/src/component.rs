//! User components.
//!
//! A [`Component`] pairs a name with one of four execution models. The model decides
//! how the driver advances a record on each update; see [`Component::function`],
//! [`Component::async_function`], [`Component::generator`] and
//! [`Component::async_generator`].

use core::fmt;
use core::future::Future;
use std::rc::Rc;

use futures::stream::{LocalBoxStream, Stream, StreamExt};
use futures::future::{FutureExt, LocalBoxFuture};

use crate::context::Context;
use crate::element::{Child, Element};
use crate::error::RenderError;
use crate::props::Props;

/// One step of a generator component.
#[derive(Debug, Clone)]
pub enum Step {
    /// Output for this update; the generator is resumed on the next one.
    Yield(Child),
    /// Final output; the generator is never resumed again.
    Return(Child),
}

/// Stream type produced by asynchronous generator components.
pub type GeneratorStream = LocalBoxStream<'static, anyhow::Result<Step>>;

/// A resumable component body.
///
/// The factory passed to [`Component::generator`] builds one generator per record.
/// The driver then calls [`resume`](Self::resume) once per update with the latest
/// props.
pub trait Generator: 'static {
    /// Advances the generator by one update.
    ///
    /// # Errors
    ///
    /// An error puts the record into a terminal state and propagates to the nearest
    /// ancestor generator.
    fn resume(&mut self, ctx: &Context, props: &Props) -> anyhow::Result<Step>;

    /// Called when rendering this generator's output failed somewhere below it.
    ///
    /// Returning a step replaces the failed output. The default re-raises.
    ///
    /// # Errors
    ///
    /// Returns the error to keep propagating it upward.
    fn throw(&mut self, ctx: &Context, error: RenderError) -> anyhow::Result<Step> {
        let _ = ctx;
        Err(error.into())
    }

    /// Called once when the record is destroyed.
    fn finalize(&mut self, ctx: &Context) {
        let _ = ctx;
    }
}

/// A [`Generator`] backed by a closure.
pub struct FnGenerator<F>(F);

impl<F> fmt::Debug for FnGenerator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnGenerator")
    }
}

/// Wraps a closure as a [`Generator`].
pub const fn generator_fn<F>(f: F) -> FnGenerator<F>
where
    F: FnMut(&Context, &Props) -> anyhow::Result<Step> + 'static,
{
    FnGenerator(f)
}

impl<F> Generator for FnGenerator<F>
where
    F: FnMut(&Context, &Props) -> anyhow::Result<Step> + 'static,
{
    fn resume(&mut self, ctx: &Context, props: &Props) -> anyhow::Result<Step> {
        (self.0)(ctx, props)
    }
}

type FunctionBody = dyn Fn(&Props, &Context) -> anyhow::Result<Child>;
type AsyncBody = dyn Fn(Props, Context) -> LocalBoxFuture<'static, anyhow::Result<Child>>;
type GeneratorFactory = dyn Fn(&Props, &Context) -> Box<dyn Generator>;
type StreamFactory = dyn Fn(Props, Context) -> GeneratorStream;

pub(crate) enum ComponentKind {
    Function(Box<FunctionBody>),
    Async(Box<AsyncBody>),
    Generator(Box<GeneratorFactory>),
    AsyncGenerator(Box<StreamFactory>),
}

struct ComponentInner {
    name: &'static str,
    kind: ComponentKind,
}

/// A user component.
///
/// Identity is by allocation: clones of one `Component` are the same tag, while two
/// components built from identical closures are different tags.
#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

impl Component {
    fn new(name: &'static str, kind: ComponentKind) -> Self {
        Self(Rc::new(ComponentInner { name, kind }))
    }

    /// A synchronous function component, called on every update.
    pub fn function<F>(name: &'static str, body: F) -> Self
    where
        F: Fn(&Props, &Context) -> anyhow::Result<Child> + 'static,
    {
        Self::new(name, ComponentKind::Function(Box::new(body)))
    }

    /// An asynchronous function component.
    ///
    /// At most one call is in flight per record. Updates that arrive meanwhile
    /// collapse into a single follow-up call with the latest props.
    pub fn async_function<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: Fn(Props, Context) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Child>> + 'static,
    {
        Self::new(
            name,
            ComponentKind::Async(Box::new(move |props, ctx| body(props, ctx).boxed_local())),
        )
    }

    /// A generator component. `factory` runs once per record; the generator it
    /// returns is resumed on every update.
    pub fn generator<F, G>(name: &'static str, factory: F) -> Self
    where
        F: Fn(&Props, &Context) -> G + 'static,
        G: Generator,
    {
        Self::new(
            name,
            ComponentKind::Generator(Box::new(move |props, ctx| {
                Box::new(factory(props, ctx)) as Box<dyn Generator>
            })),
        )
    }

    /// An asynchronous generator component.
    ///
    /// `factory` runs once per record. Every item of the returned stream is an
    /// output; the body pulls fresh props through [`Context::props_stream`].
    pub fn async_generator<F, S>(name: &'static str, factory: F) -> Self
    where
        F: Fn(Props, Context) -> S + 'static,
        S: Stream<Item = anyhow::Result<Step>> + 'static,
    {
        Self::new(
            name,
            ComponentKind::AsyncGenerator(Box::new(move |props, ctx| {
                factory(props, ctx).boxed_local()
            })),
        )
    }

    /// The component's name, used in errors and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Builds an element rendering this component.
    #[must_use]
    pub fn element(&self) -> Element {
        Element::new(self)
    }

    pub(crate) fn kind(&self) -> &ComponentKind {
        &self.0.kind
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Component {}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.0.name).finish()
    }
}

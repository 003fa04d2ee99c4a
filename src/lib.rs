//! Declarative UI rendering with synchronous, asynchronous and generator
//! components.
//!
//! `waterfall` renders trees of [`Element`] descriptors into any output tree that
//! implements [`Adapter`]. Components are plain functions, async functions,
//! [`Generator`]s that keep state between updates, or async generators that pull
//! props and yield outputs at their own pace. Asynchronous results race and only the
//! newest one for a given position is ever shown.
//!
//! ```ignore
//! use waterfall::prelude::*;
//!
//! let greeting = Component::function("Greeting", |props, _ctx| {
//!     Ok(h("div").child(format!("Hello {}", props.str("name").unwrap_or("world"))).into())
//! });
//!
//! let runtime = LocalRuntime::new();
//! let renderer = runtime.renderer(dom.clone());
//! runtime.block_on(renderer.render(greeting.element().prop("name", "Alice"), &root))?;
//! ```

#![allow(clippy::future_not_send)]

pub mod debug;
pub mod task;

pub use task::LocalRuntime;
#[doc(inline)]
pub use waterfall_core::*;

pub mod prelude {
    //! The types needed to write components and render them.
    pub use crate::task::LocalRuntime;
    pub use waterfall_core::{
        Child, Co, Component, Completion, Context, Element, Event, Listener, Props, Renderer,
        Step, coroutine, generator_fn, h, json,
    };
}

#[cfg(test)]
mod tests;

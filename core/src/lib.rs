//! Reconciliation and component-execution engine for `waterfall`.
//!
//! A tree of [`Element`] descriptors is rendered into a live output tree owned by an
//! [`Adapter`]. Every render diffs the new descriptors against the node records left
//! behind by the previous one, reuses what matches and runs user components:
//!
//! - plain functions, synchronous or asynchronous;
//! - [`Generator`]s, resumed once per update;
//! - asynchronous generators, streams that may yield any number of times.
//!
//! Asynchronous results race. A result only commits when no newer result for the
//! same record has committed first, and a render's [`Completion`] resolves once the
//! tree reflects that request or a newer one.

#![allow(clippy::future_not_send)]
#![allow(clippy::module_name_repetitions)]

mod adapter;
mod component;
mod config;
mod context;
mod coroutine;
mod diff;
mod driver;
mod element;
mod engine;
mod error;
mod props;
mod record;
mod renderer;
mod scheduler;

pub use adapter::Adapter;
pub use component::{Component, FnGenerator, Generator, GeneratorStream, Step, generator_fn};
pub use config::{Config, DuplicateKeys};
pub use context::{Context, Event, Listener, PropsStream};
pub use coroutine::{Co, coroutine};
pub use element::{Child, Element, Key, Tag, h};
pub use error::{AdapterError, RenderError};
pub use props::{Props, Value};
pub use record::NodeId;
pub use renderer::{Completion, Renderer, RendererBuilder, Spawner};

/// Re-exported so component bodies can build attribute maps with `json!`.
pub use serde_json::json;

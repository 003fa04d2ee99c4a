#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Browser backend for `waterfall`.
//!
//! [`WebDom`] implements the engine's output adapter on top of `web-sys`, so a
//! [`Renderer`](waterfall_core::Renderer) can drive a real document inside
//! `wasm32-unknown-unknown` targets. Event listeners are wrapped in JS closures that
//! live as long as their registration.

mod dom;
mod error;

pub use dom::WebDom;
pub use error::WebError;

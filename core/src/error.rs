//! Error types produced while rendering.

use std::sync::Arc;

use crate::element::Key;

/// Failure reported by an [`Adapter`](crate::Adapter) operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct AdapterError {
    operation: &'static str,
    message: String,
}

impl AdapterError {
    /// Creates an error for the named adapter operation.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }

    /// The adapter operation that failed, e.g. `insert_node`.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// The adapter's description of the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error surfaced by a render or refresh completion.
///
/// The type is cheap to clone because a single failure may settle several pending
/// completions at once.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// Component logic returned an error.
    #[error("component `{name}` failed: {error}")]
    Component {
        /// Name of the failing component.
        name: String,
        /// The error returned by the component.
        error: Arc<anyhow::Error>,
    },
    /// Two siblings were given the same key.
    #[error("duplicate key `{key}` among siblings")]
    DuplicateKey {
        /// The repeated key.
        key: Key,
    },
    /// The output adapter failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// A component asked to re-render itself while it was executing.
    #[error("component `{name}` re-entered while executing")]
    Reentrant {
        /// Name of the re-entered component.
        name: String,
    },
    /// The record behind a context has been destroyed.
    #[error("component is no longer mounted")]
    Unmounted,
}

impl RenderError {
    pub(crate) const fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// Wraps an error returned by component logic.
    ///
    /// A [`RenderError`] travelling through component code inside an
    /// [`anyhow::Error`] is unwrapped instead of being nested.
    #[must_use]
    pub fn component(name: &str, error: anyhow::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(error) => error,
            Err(error) => Self::Component {
                name: name.to_owned(),
                error: Arc::new(error),
            },
        }
    }
}

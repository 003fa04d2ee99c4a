use core::fmt;

use waterfall_core::AdapterError;

/// Error type produced by the web adapter.
#[derive(Debug, Clone)]
pub enum WebError {
    /// The DOM APIs are not accessible (e.g., when executed outside of a browser).
    DomUnavailable,
    /// The requested mounting node cannot be located.
    RootNotFound(String),
    /// The node cannot take part in the requested operation.
    NotAnElement,
    /// Wrapper around JavaScript exceptions.
    Js(String),
}

impl WebError {
    /// Attaches the failing adapter operation.
    pub(crate) fn during(self, operation: &'static str) -> AdapterError {
        AdapterError::new(operation, self.to_string())
    }
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomUnavailable => write!(f, "DOM is not available"),
            Self::RootNotFound(id) => write!(f, "Failed to find DOM element with id `{id}`"),
            Self::NotAnElement => write!(f, "node is not an element"),
            Self::Js(msg) => write!(f, "JavaScript error: {msg}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<wasm_bindgen::JsValue> for WebError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        value
            .as_string()
            .map_or_else(|| Self::Js(format!("{value:?}")), Self::Js)
    }
}

impl From<WebError> for wasm_bindgen::JsValue {
    fn from(value: WebError) -> Self {
        match value {
            WebError::Js(msg) => Self::from(msg),
            other => Self::from(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_failing_operation() {
        let error = WebError::RootNotFound("app".to_owned()).during("create_root");
        assert_eq!(error.operation(), "create_root");
        assert_eq!(error.message(), "Failed to find DOM element with id `app`");
        assert_eq!(
            WebError::NotAnElement.during("patch_node").to_string(),
            "patch_node failed: node is not an element"
        );
    }
}

//! Error types for the embed loader

use thiserror::Error;
use wasm_bindgen::JsValue;

/// Result type alias for widget operations
pub type EmbedResult<T> = Result<T, EmbedError>;

/// Errors that can occur while building or driving the widget
#[derive(Debug, Error)]
pub enum EmbedError {
    /// A DOM call threw, or an element had an unexpected type
    #[error("dom error: {0}")]
    Dom(String),

    /// A browser global (window, document, body, ...) is unavailable
    #[error("missing browser global: {0}")]
    MissingGlobal(&'static str),

    /// Invalid widget options
    #[error("config error: {0}")]
    Config(String),

    /// Outbound message could not be serialized or posted
    #[error("message error: {0}")]
    Message(String),

    /// Permission API rejected or is unsupported
    #[error("permission error: {0}")]
    Permission(String),

    /// A widget with the same id prefix is already on the page
    #[error("widget already mounted with id prefix {0:?}")]
    AlreadyMounted(String),
}

impl From<JsValue> for EmbedError {
    fn from(value: JsValue) -> Self {
        let text = value.as_string().unwrap_or_else(|| format!("{value:?}"));
        Self::Dom(text)
    }
}

impl From<EmbedError> for JsValue {
    fn from(err: EmbedError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

//! Message Bridge - `postMessage` protocol with the conversation iframe
//!
//! # Protocol
//!
//! ```text
//! Host page                             Conversation iframe
//! ┌────────────────┐                    ┌────────────────┐
//! │  MessageBridge │<──widget-close─────│                │
//! │                │<──widget-ready─────│                │
//! │                │<──voice-call-──────│                │
//! │                │     starting       │                │
//! │                │<──button-click─────│                │
//! │                │──mic-permission-──>│                │
//! │                │     update         │                │
//! └────────────────┘                    └────────────────┘
//! ```
//!
//! Payloads are objects discriminated by `type`. Anything else, including
//! JSON-encoded strings that fail to parse, is ignored.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use wasm_bindgen::JsValue;

use crate::config::TargetOrigin;
use crate::error::{EmbedError, EmbedResult};
use crate::permission::MicPermissionState;

/// Messages the iframe sends to the host
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    /// Close the widget
    WidgetClose,
    /// Conversation UI finished loading
    WidgetReady {
        /// Sender's clock, informational
        #[serde(default)]
        timestamp: Option<f64>,
    },
    /// A voice call is about to start and needs the microphone
    VoiceCallStarting,
    /// A button inside the iframe was pressed
    ButtonClick,
}

impl InboundMessage {
    /// Parse a decoded JSON payload
    #[must_use]
    pub fn from_json_value(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(text) => serde_json::from_str(&text).ok(),
            other => serde_json::from_value(other).ok(),
        }
    }

    /// Parse a `MessageEvent.data` value
    #[must_use]
    pub fn from_js(data: &JsValue) -> Option<Self> {
        if let Some(text) = data.as_string() {
            return serde_json::from_str(&text).ok();
        }
        if !data.is_object() {
            return None;
        }
        serde_wasm_bindgen::from_value(data.clone()).ok()
    }

    /// Wire name of the `type` field
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WidgetClose => "widget-close",
            Self::WidgetReady { .. } => "widget-ready",
            Self::VoiceCallStarting => "voice-call-starting",
            Self::ButtonClick => "button-click",
        }
    }
}

/// Messages the host sends to the iframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Microphone permission changed
    MicPermissionUpdate {
        /// New state
        state: MicPermissionState,
    },
}

impl OutboundMessage {
    /// JSON form, as the iframe receives it
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::MicPermissionUpdate { state } => serde_json::json!({
                "type": "mic-permission-update",
                "state": state.as_str(),
            }),
        }
    }

    /// Plain JS object for `postMessage`
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Message`] if serialization fails.
    pub fn to_js(&self) -> EmbedResult<JsValue> {
        self.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| EmbedError::Message(e.to_string()))
    }
}

/// Which origins messages go to and are accepted from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    target: String,
}

impl OriginPolicy {
    /// Resolve the configured policy against the iframe URL
    #[must_use]
    pub fn new(policy: &TargetOrigin, target_url: &Url) -> Self {
        Self {
            target: policy.resolve(target_url),
        }
    }

    /// `postMessage` target origin
    #[must_use]
    pub fn target_origin(&self) -> &str {
        &self.target
    }

    /// Whether a message from `origin` is processed
    #[must_use]
    pub fn accepts(&self, origin: &str) -> bool {
        self.target == "*" || self.target == origin
    }
}

/// Receives and sends iframe protocol messages
#[derive(Debug, Clone)]
pub struct MessageBridge {
    policy: OriginPolicy,
}

impl MessageBridge {
    /// Create a bridge with the resolved origin policy
    #[must_use]
    pub fn new(policy: OriginPolicy) -> Self {
        Self { policy }
    }

    /// Origin policy in use
    #[must_use]
    pub fn policy(&self) -> &OriginPolicy {
        &self.policy
    }

    /// Whether a message from `origin` is processed; `from_own_iframe` says
    /// whether its source window is this instance's iframe
    #[must_use]
    pub fn admits(&self, origin: &str, from_own_iframe: bool) -> bool {
        if !from_own_iframe {
            debug!(origin, "Message from another window ignored");
            return false;
        }
        if !self.policy.accepts(origin) {
            debug!(origin, expected = self.policy.target_origin(), "Message from foreign origin ignored");
            return false;
        }
        true
    }

    /// Decode a window message, dropping other senders and unknown types
    #[must_use]
    pub fn accept(&self, origin: &str, from_own_iframe: bool, data: &JsValue) -> Option<InboundMessage> {
        if !self.admits(origin, from_own_iframe) {
            return None;
        }
        let message = InboundMessage::from_js(data);
        if message.is_none() {
            debug!(origin, "Unrecognized message ignored");
        }
        message
    }

    /// Post to the iframe; a missing iframe or window is a silent no-op
    ///
    /// Returns whether the message was handed to the browser.
    pub fn send(
        &self,
        iframe: Option<&web_sys::HtmlIFrameElement>,
        message: &OutboundMessage,
    ) -> bool {
        let Some(target) = iframe.and_then(web_sys::HtmlIFrameElement::content_window) else {
            debug!(?message, "No iframe window, message dropped");
            return false;
        };

        let result = message
            .to_js()
            .and_then(|payload| {
                target
                    .post_message(&payload, self.policy.target_origin())
                    .map_err(EmbedError::from)
            });
        match result {
            Ok(()) => {
                debug!(?message, origin = self.policy.target_origin(), "Message posted to iframe");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to post message to iframe");
                false
            }
        }
    }
}

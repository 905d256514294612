//! # chat-embed
//!
//! Embeddable chat widget loader, compiled to `wasm32-unknown-unknown`.
//!
//! ## Overview
//!
//! Loaded into an arbitrary host page, the module renders a floating
//! launcher button, a mobile dimming overlay and a chat panel whose
//! conversation iframe is created on first open. It coordinates the
//! microphone permission prompt, tracks the mobile viewport height, and
//! locks page scrolling while the widget covers a phone screen.
//!
//! ## Host page
//!
//! ```html
//! <script>window.chatEmbedConfig = { variant: "ios", targetUrl: "https://chat.example.org/embed" };</script>
//! <script type="module">import init from "./chat_embed.js"; init();</script>
//! ```
//!
//! The widget mounts on `DOMContentLoaded` (or immediately when the document
//! is already parsed). Further instances can be mounted with
//! `mountWidget({ idPrefix: "support", ... })`.
//!
//! ## Layout
//!
//! - [`state`]: pure widget state machine (events in, effects out)
//! - [`surface`]: effect boundary; [`dom::DomSurface`] is the browser side
//! - [`permission`], [`viewport`], [`bridge`]: browser collaborators
//! - [`style`], [`dom`]: stylesheet and element construction
//! - [`widget`]: listeners and the event queue

#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod bridge;
pub mod config;
pub mod dom;
pub mod error;
pub mod permission;
pub mod state;
pub mod style;
pub mod surface;
pub mod viewport;
pub mod widget;

pub use bridge::{InboundMessage, MessageBridge, OutboundMessage};
pub use config::{ConfigOverrides, Variant, WidgetConfig};
pub use error::{EmbedError, EmbedResult};
pub use permission::{MicPermissionState, PermissionController};
pub use state::{Effect, WidgetEvent, WidgetStateMachine, WidgetVisibility};
pub use surface::{commit, WidgetSurface};

use tracing::{info, info_span};
use wasm_bindgen::prelude::*;

/// Entry point, run when the module is instantiated
///
/// # Errors
///
/// Returns an error if the page has no window or document, or if mounting
/// an already parsed page fails.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
    let _span = info_span!("chat_embed", version = env!("CARGO_PKG_VERSION")).entered();
    info!("Initializing chat widget");

    widget::boot()?;
    Ok(())
}

/// Mount another widget instance from a JS options object
///
/// # Errors
///
/// Returns an error for invalid options, a prefix that is already mounted,
/// or a page without `<body>`.
#[wasm_bindgen(js_name = mountWidget)]
pub fn mount_widget(options: JsValue) -> Result<(), JsValue> {
    let config = WidgetConfig::resolve(ConfigOverrides::from_js(options)?)?;
    widget::mount(config)?;
    Ok(())
}

//! Widget configuration
//!
//! The five historical embed flavours (direct, fixed-toggle, viewport-based,
//! Webflow, iOS) are one widget with different presets. A host page picks a
//! [`Variant`] and optionally overrides individual fields through a JSON or
//! JS options object.
//!
//! ```rust
//! use chat_embed::config::{ConfigOverrides, Variant, WidgetConfig};
//!
//! let overrides = ConfigOverrides::from_json(
//!     r##"{"variant":"ios","targetUrl":"https://chat.example.org/embed","primaryColor":"#0f766e"}"##,
//! ).unwrap();
//! let config = WidgetConfig::resolve(overrides).unwrap();
//! assert_eq!(config.variant, Variant::Ios);
//! assert_eq!(config.colors.primary, "#0f766e");
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EmbedError, EmbedResult};

/// Iframe endpoint used when the host page does not supply one.
/// Relative URLs are resolved against the host document's base URL.
pub const DEFAULT_TARGET_URL: &str = "/widget";

/// Default element id / class prefix
pub const DEFAULT_ID_PREFIX: &str = "chat-embed";

/// Width at or below which a profile counts as mobile
pub const DEFAULT_MOBILE_BREAKPOINT_PX: u32 = 768;

/// Time the iframe gets to load before the error panel is shown
pub const DEFAULT_LOAD_TIMEOUT_MS: u32 = 15_000;

/// Delay before re-measuring after `orientationchange`
pub const DEFAULT_ORIENTATION_SETTLE_MS: u32 = 100;

/// Embed flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Plain floating launcher and panel
    #[default]
    Direct,
    /// Panel anchored above a fixed launcher
    FixedToggle,
    /// Panel sized from the live viewport height
    Viewport,
    /// Hardened against site-builder stylesheets (high z-index, resets)
    Webflow,
    /// Safe-area insets and inline playback quirks for iOS Safari
    Ios,
}

impl Variant {
    /// All variants, in declaration order
    pub const ALL: [Self; 5] = [
        Self::Direct,
        Self::FixedToggle,
        Self::Viewport,
        Self::Webflow,
        Self::Ios,
    ];

    /// Name used in the options object
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::FixedToggle => "fixed-toggle",
            Self::Viewport => "viewport",
            Self::Webflow => "webflow",
            Self::Ios => "ios",
        }
    }
}

/// Corner the launcher and panel are anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    /// Bottom right corner
    #[default]
    BottomRight,
    /// Bottom left corner
    BottomLeft,
}

impl Position {
    /// CSS property used for the horizontal offset
    #[must_use]
    pub const fn side(&self) -> &'static str {
        match self {
            Self::BottomRight => "right",
            Self::BottomLeft => "left",
        }
    }
}

/// Whether layout honours `env(safe-area-inset-*)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafeAreaMode {
    /// Ignore device insets
    #[default]
    None,
    /// Pad button and panel by the device insets
    Insets,
}

/// iOS Safari specific attributes and styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IosQuirks {
    /// Set `playsinline` / `webkit-playsinline` on the iframe
    pub playsinline: bool,
    /// Emit `-webkit-overflow-scrolling: touch` for the panel
    pub webkit_overflow_scrolling: bool,
}

/// Target origin policy for the iframe protocol
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetOrigin {
    /// `"*"`: post anywhere and accept every sender
    Any,
    /// A fixed origin such as `https://chat.example.org`
    Trusted(String),
    /// Use the origin of the iframe URL
    #[default]
    FromTargetUrl,
}

impl TargetOrigin {
    /// Parse the options-object spelling: `"*"`, `"auto"` or an origin
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        match value.trim() {
            "*" => Self::Any,
            "" | "auto" => Self::FromTargetUrl,
            origin => Self::Trusted(
                normalize_origin(origin).unwrap_or_else(|| origin.to_string()),
            ),
        }
    }

    /// Concrete origin string for `postMessage`
    #[must_use]
    pub fn resolve(&self, target: &Url) -> String {
        match self {
            Self::Any => "*".to_string(),
            Self::Trusted(origin) => normalize_origin(origin).unwrap_or_else(|| origin.clone()),
            Self::FromTargetUrl => target.origin().ascii_serialization(),
        }
    }
}

/// Serialized origin of `value` (`scheme://host[:port]`, lowercased host,
/// default port dropped); `None` for unparsable or opaque origins
#[must_use]
pub fn normalize_origin(value: &str) -> Option<String> {
    let origin = Url::parse(value.trim()).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Widget colours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colors {
    /// Launcher and primary button background
    pub primary: String,
    /// Text/icon colour on primary
    pub on_primary: String,
    /// Panel and dialog background
    pub surface: String,
    /// Overlay dimming colour
    pub overlay: String,
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            primary: "#2563eb".to_string(),
            on_primary: "#ffffff".to_string(),
            surface: "#ffffff".to_string(),
            overlay: "rgba(15, 23, 42, 0.55)".to_string(),
        }
    }
}

/// Desktop panel geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSize {
    /// Panel width in px
    pub width_px: u32,
    /// Panel height in px (capped by the viewport)
    pub height_px: u32,
}

/// User-facing text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetCopy {
    /// Launcher `aria-label`
    pub button_label: String,
    /// Permission dialog heading
    pub dialog_title: String,
    /// Permission dialog body
    pub dialog_body: String,
    /// Allow button
    pub allow_label: String,
    /// Cancel button
    pub cancel_label: String,
    /// Blocking notice shown once after a denial
    pub denied_notice: String,
    /// Load-error panel text
    pub load_error: String,
    /// Retry button
    pub retry_label: String,
}

impl Default for WidgetCopy {
    fn default() -> Self {
        Self {
            button_label: "Open chat".to_string(),
            dialog_title: "Enable your microphone".to_string(),
            dialog_body: "Voice conversations need microphone access. You can still chat by text if you skip this.".to_string(),
            allow_label: "Allow".to_string(),
            cancel_label: "Not now".to_string(),
            denied_notice: "Microphone access was blocked. Voice features are disabled, but you can keep chatting by text. Re-enable the microphone in your browser settings to talk.".to_string(),
            load_error: "The chat could not be loaded.".to_string(),
            retry_label: "Retry".to_string(),
        }
    }
}

/// Fully resolved widget options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    /// Embed flavour the preset came from
    pub variant: Variant,
    /// Conversation iframe endpoint (absolute or relative to the host page)
    pub target_url: String,
    /// Prefix for element ids, classes and the viewport-height property
    pub id_prefix: String,
    /// Colours
    pub colors: Colors,
    /// Anchoring corner
    pub position: Position,
    /// Width threshold for mobile profiles
    pub mobile_breakpoint_px: u32,
    /// Stacking order of the widget layers
    pub z_index: u32,
    /// Desktop panel size
    pub panel: PanelSize,
    /// Safe-area handling
    pub safe_area: SafeAreaMode,
    /// iOS attributes
    pub ios_quirks: IosQuirks,
    /// `!important` on layout rules, for hostile host stylesheets
    pub important_rules: bool,
    /// Origin policy for the iframe protocol
    pub target_origin: TargetOrigin,
    /// Iframe load timeout
    pub load_timeout_ms: u32,
    /// Only `widget-ready` marks the iframe as loaded (ignore the DOM `load` event)
    pub require_ready_handshake: bool,
    /// Re-measure delay after rotation
    pub orientation_settle_ms: u32,
    /// User-facing text
    pub copy: WidgetCopy,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self::preset(Variant::Direct, DEFAULT_TARGET_URL)
    }
}

impl WidgetConfig {
    /// Preset for a variant
    #[must_use]
    pub fn preset(variant: Variant, target_url: impl Into<String>) -> Self {
        let base = Self {
            variant,
            target_url: target_url.into(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            colors: Colors::default(),
            position: Position::BottomRight,
            mobile_breakpoint_px: DEFAULT_MOBILE_BREAKPOINT_PX,
            z_index: 2_147_483_000,
            panel: PanelSize {
                width_px: 400,
                height_px: 640,
            },
            safe_area: SafeAreaMode::None,
            ios_quirks: IosQuirks::default(),
            important_rules: false,
            target_origin: TargetOrigin::FromTargetUrl,
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
            require_ready_handshake: false,
            orientation_settle_ms: DEFAULT_ORIENTATION_SETTLE_MS,
            copy: WidgetCopy::default(),
        };

        match variant {
            Variant::Direct => base,
            Variant::FixedToggle => Self {
                panel: PanelSize {
                    width_px: 380,
                    height_px: 600,
                },
                ..base
            },
            Variant::Viewport => Self {
                safe_area: SafeAreaMode::Insets,
                orientation_settle_ms: 250,
                ..base
            },
            Variant::Webflow => Self {
                z_index: 2_147_483_647,
                important_rules: true,
                ..base
            },
            Variant::Ios => Self {
                safe_area: SafeAreaMode::Insets,
                ios_quirks: IosQuirks {
                    playsinline: true,
                    webkit_overflow_scrolling: true,
                },
                orientation_settle_ms: 300,
                ..base
            },
        }
    }

    /// Build a validated config from host overrides
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] if the merged options are invalid.
    pub fn resolve(overrides: ConfigOverrides) -> EmbedResult<Self> {
        let variant = overrides.variant.unwrap_or_default();
        let config = Self::preset(variant, DEFAULT_TARGET_URL).with_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply every field the host supplied
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        let ConfigOverrides {
            variant: _,
            target_url,
            id_prefix,
            primary_color,
            on_primary_color,
            surface_color,
            overlay_color,
            position,
            mobile_breakpoint_px,
            z_index,
            panel_width_px,
            panel_height_px,
            safe_area,
            ios_quirks,
            target_origin,
            load_timeout_ms,
            require_ready_handshake,
            orientation_settle_ms,
            button_label,
            denied_notice,
        } = overrides;

        if let Some(v) = target_url {
            self.target_url = v;
        }
        if let Some(v) = id_prefix {
            self.id_prefix = v;
        }
        if let Some(v) = primary_color {
            self.colors.primary = v;
        }
        if let Some(v) = on_primary_color {
            self.colors.on_primary = v;
        }
        if let Some(v) = surface_color {
            self.colors.surface = v;
        }
        if let Some(v) = overlay_color {
            self.colors.overlay = v;
        }
        if let Some(v) = position {
            self.position = v;
        }
        if let Some(v) = mobile_breakpoint_px {
            self.mobile_breakpoint_px = v;
        }
        if let Some(v) = z_index {
            self.z_index = v;
        }
        if let Some(v) = panel_width_px {
            self.panel.width_px = v;
        }
        if let Some(v) = panel_height_px {
            self.panel.height_px = v;
        }
        if let Some(v) = safe_area {
            self.safe_area = v;
        }
        if let Some(v) = ios_quirks {
            self.ios_quirks = v;
        }
        if let Some(v) = target_origin {
            self.target_origin = TargetOrigin::from_setting(&v);
        }
        if let Some(v) = load_timeout_ms {
            self.load_timeout_ms = v;
        }
        if let Some(v) = require_ready_handshake {
            self.require_ready_handshake = v;
        }
        if let Some(v) = orientation_settle_ms {
            self.orientation_settle_ms = v;
        }
        if let Some(v) = button_label {
            self.copy.button_label = v;
        }
        if let Some(v) = denied_notice {
            self.copy.denied_notice = v;
        }
        self
    }

    /// Check the options for values the widget cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] describing the first invalid field.
    pub fn validate(&self) -> EmbedResult<()> {
        if self.target_url.trim().is_empty() {
            return Err(EmbedError::Config("target url is empty".into()));
        }
        if self.id_prefix.is_empty()
            || !self
                .id_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(EmbedError::Config(format!(
                "id prefix {:?} must be non-empty [A-Za-z0-9_-]",
                self.id_prefix
            )));
        }
        if self.mobile_breakpoint_px == 0 {
            return Err(EmbedError::Config("mobile breakpoint must be positive".into()));
        }
        if self.load_timeout_ms == 0 {
            return Err(EmbedError::Config("load timeout must be positive".into()));
        }
        if let TargetOrigin::Trusted(origin) = &self.target_origin {
            let url = Url::parse(origin).map_err(|e| {
                EmbedError::Config(format!("trusted origin {origin:?} is not a URL: {e}"))
            })?;
            if !url.origin().is_tuple() {
                return Err(EmbedError::Config(format!(
                    "trusted origin {origin:?} has no scheme/host/port origin"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the iframe URL against the host document's base URL
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] if neither an absolute URL nor a
    /// valid relative reference was configured.
    pub fn resolve_target_url(&self, base: &str) -> EmbedResult<Url> {
        match Url::parse(&self.target_url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base)
                .and_then(|base| base.join(&self.target_url))
                .map_err(|e| {
                    EmbedError::Config(format!(
                        "cannot resolve {:?} against {base:?}: {e}",
                        self.target_url
                    ))
                }),
            Err(e) => Err(EmbedError::Config(format!(
                "target url {:?} is invalid: {e}",
                self.target_url
            ))),
        }
    }

    /// Id for one of the widget's elements
    #[must_use]
    pub fn element_id(&self, part: &str) -> String {
        format!("{}-{part}", self.id_prefix)
    }

    /// Name of the CSS custom property carrying 1% of the viewport height
    #[must_use]
    pub fn viewport_height_property(&self) -> String {
        format!("--{}-vh", self.id_prefix)
    }

    /// Body class applied while the page scroll is locked
    #[must_use]
    pub fn scroll_lock_class(&self) -> String {
        format!("{}-scroll-locked", self.id_prefix)
    }

    /// Class toggled on widget parts that are showing
    #[must_use]
    pub fn visible_class(&self) -> String {
        format!("{}-visible", self.id_prefix)
    }
}

/// Host-supplied partial options; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ConfigOverrides {
    pub variant: Option<Variant>,
    pub target_url: Option<String>,
    pub id_prefix: Option<String>,
    pub primary_color: Option<String>,
    pub on_primary_color: Option<String>,
    pub surface_color: Option<String>,
    pub overlay_color: Option<String>,
    pub position: Option<Position>,
    pub mobile_breakpoint_px: Option<u32>,
    pub z_index: Option<u32>,
    pub panel_width_px: Option<u32>,
    pub panel_height_px: Option<u32>,
    pub safe_area: Option<SafeAreaMode>,
    pub ios_quirks: Option<IosQuirks>,
    pub target_origin: Option<String>,
    pub load_timeout_ms: Option<u32>,
    pub require_ready_handshake: Option<bool>,
    pub orientation_settle_ms: Option<u32>,
    pub button_label: Option<String>,
    pub denied_notice: Option<String>,
}

impl ConfigOverrides {
    /// Parse overrides from a JSON string
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] on malformed JSON or unknown keys.
    pub fn from_json(json: &str) -> EmbedResult<Self> {
        serde_json::from_str(json).map_err(|e| EmbedError::Config(e.to_string()))
    }

    /// Parse overrides from a JS options object
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] if the object does not match the schema.
    pub fn from_js(value: wasm_bindgen::JsValue) -> EmbedResult<Self> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        serde_wasm_bindgen::from_value(value).map_err(|e| EmbedError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_direct_preset() {
        let config = WidgetConfig::default();
        assert_eq!(config.variant, Variant::Direct);
        assert_eq!(config.target_url, DEFAULT_TARGET_URL);
        assert_eq!(config.mobile_breakpoint_px, 768);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_all_validate() {
        for variant in Variant::ALL {
            let config = WidgetConfig::preset(variant, "https://chat.example.org/embed");
            assert!(config.validate().is_ok(), "{variant:?}");
            assert_eq!(config.variant, variant);
        }
    }

    #[test]
    fn test_ios_preset_quirks() {
        let config = WidgetConfig::preset(Variant::Ios, "/w");
        assert!(config.ios_quirks.playsinline);
        assert!(config.ios_quirks.webkit_overflow_scrolling);
        assert_eq!(config.safe_area, SafeAreaMode::Insets);
    }

    #[test]
    fn test_webflow_preset_is_hardened() {
        let config = WidgetConfig::preset(Variant::Webflow, "/w");
        assert!(config.important_rules);
        assert_eq!(config.z_index, 2_147_483_647);
    }

    #[test]
    fn test_overrides_from_json() {
        let overrides = ConfigOverrides::from_json(
            r#"{"variant":"fixed-toggle","position":"bottom-left","mobileBreakpointPx":600}"#,
        )
        .unwrap();
        let config = WidgetConfig::resolve(overrides).unwrap();
        assert_eq!(config.variant, Variant::FixedToggle);
        assert_eq!(config.position, Position::BottomLeft);
        assert_eq!(config.mobile_breakpoint_px, 600);
        // untouched fields keep the preset
        assert_eq!(config.panel.width_px, 380);
    }

    #[test]
    fn test_overrides_reject_unknown_keys() {
        let result = ConfigOverrides::from_json(r#"{"colour":"red"}"#);
        assert!(matches!(result, Err(EmbedError::Config(_))));
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = WidgetConfig::resolve(ConfigOverrides::from_json("{}").unwrap()).unwrap();
        assert_eq!(config, WidgetConfig::default());
    }

    #[test]
    fn test_validate_rejects_empty_target() {
        let mut config = WidgetConfig::default();
        config.target_url = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_prefix() {
        let mut config = WidgetConfig::default();
        config.id_prefix = "bad prefix".into();
        assert!(config.validate().is_err());
        config.id_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_breakpoint() {
        let mut config = WidgetConfig::default();
        config.mobile_breakpoint_px = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unparsable_trusted_origin() {
        let mut config = WidgetConfig::default();
        config.target_origin = TargetOrigin::Trusted("not an origin".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_relative_target_url() {
        let config = WidgetConfig::default();
        let url = config
            .resolve_target_url("https://shop.example.com/products/1")
            .unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/widget");
    }

    #[test]
    fn test_resolve_absolute_target_url_ignores_base() {
        let config = WidgetConfig::preset(Variant::Direct, "https://chat.example.org/embed?x=1");
        let url = config.resolve_target_url("https://shop.example.com/").unwrap();
        assert_eq!(url.host_str(), Some("chat.example.org"));
    }

    #[test]
    fn test_target_origin_settings() {
        assert_eq!(TargetOrigin::from_setting("*"), TargetOrigin::Any);
        assert_eq!(TargetOrigin::from_setting("auto"), TargetOrigin::FromTargetUrl);
        assert_eq!(
            TargetOrigin::from_setting("https://chat.example.org/"),
            TargetOrigin::Trusted("https://chat.example.org".into())
        );
    }

    #[test]
    fn test_trusted_origin_setting_drops_path_and_case() {
        assert_eq!(
            TargetOrigin::from_setting("https://Chat.Example.org/embed?room=1"),
            TargetOrigin::Trusted("https://chat.example.org".into())
        );
        assert_eq!(
            TargetOrigin::from_setting("https://chat.example.org:443/"),
            TargetOrigin::Trusted("https://chat.example.org".into())
        );
        let url = Url::parse("https://chat.example.org/embed").unwrap();
        assert_eq!(
            TargetOrigin::Trusted("https://CHAT.example.org/embed".into()).resolve(&url),
            "https://chat.example.org"
        );
    }

    #[test]
    fn test_validate_rejects_opaque_trusted_origin() {
        let mut config = WidgetConfig::default();
        config.target_origin = TargetOrigin::Trusted("data:text/plain,hi".into());
        assert!(config.validate().is_err());
        config.target_origin = TargetOrigin::from_setting("https://chat.example.org/embed");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_normalize_origin() {
        assert_eq!(
            normalize_origin("http://localhost:8080/x").as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(normalize_origin("not an origin"), None);
        assert_eq!(normalize_origin("blob:opaque"), None);
    }

    #[test]
    fn test_target_origin_resolve() {
        let url = Url::parse("https://chat.example.org:8443/embed/room").unwrap();
        assert_eq!(TargetOrigin::Any.resolve(&url), "*");
        assert_eq!(
            TargetOrigin::FromTargetUrl.resolve(&url),
            "https://chat.example.org:8443"
        );
        assert_eq!(
            TargetOrigin::Trusted("https://other.example".into()).resolve(&url),
            "https://other.example"
        );
    }

    #[test]
    fn test_derived_names() {
        let config = WidgetConfig::default();
        assert_eq!(config.element_id("button"), "chat-embed-button");
        assert_eq!(config.viewport_height_property(), "--chat-embed-vh");
        assert_eq!(config.scroll_lock_class(), "chat-embed-scroll-locked");
        assert_eq!(config.visible_class(), "chat-embed-visible");
    }

    #[test]
    fn test_variant_names_round_trip_through_serde() {
        for variant in Variant::ALL {
            let json = format!("\"{}\"", variant.as_str());
            let parsed: Variant = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, variant);
        }
    }
}

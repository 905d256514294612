//! Widget stylesheet
//!
//! [`build_stylesheet`] renders the whole stylesheet from a [`WidgetConfig`];
//! [`inject_styles`] appends it to `<head>` once per id prefix.

use tracing::{debug, info};

use crate::config::{SafeAreaMode, WidgetConfig};
use crate::dom::ElementIds;
use crate::error::{EmbedError, EmbedResult};

/// Attribute marking the injected `<style>`; its value is the id prefix
pub const STYLE_MARKER_ATTR: &str = "data-chat-embed-style";

/// Height of the overlay band left above the panel on phones
pub const MOBILE_OVERLAY_STRIP_PX: u32 = 48;

/// Append one rule; `important` hardens every declaration
fn rule(css: &mut String, selector: &str, declarations: &[(&str, &str)], important: bool) {
    css.push_str(selector);
    css.push_str(" {\n");
    for (property, value) in declarations {
        css.push_str("  ");
        css.push_str(property);
        css.push_str(": ");
        css.push_str(value);
        if important {
            css.push_str(" !important");
        }
        css.push_str(";\n");
    }
    css.push_str("}\n");
}

/// Render the stylesheet for one widget
#[must_use]
pub fn build_stylesheet(config: &WidgetConfig) -> String {
    let ids = ElementIds::new(config);
    let visible = config.visible_class();
    let vh = config.viewport_height_property();
    let side = config.position.side();
    let hard = config.important_rules;
    let insets = config.safe_area == SafeAreaMode::Insets;

    let z_top = config.z_index.to_string();
    let z_panel = config.z_index.saturating_sub(1).to_string();
    let z_overlay = config.z_index.saturating_sub(2).to_string();

    let (button_bottom, button_side, panel_bottom, panel_side) = if insets {
        (
            "calc(20px + env(safe-area-inset-bottom, 0px))".to_string(),
            format!("calc(20px + env(safe-area-inset-{side}, 0px))"),
            "calc(92px + env(safe-area-inset-bottom, 0px))".to_string(),
            format!("calc(20px + env(safe-area-inset-{side}, 0px))"),
        )
    } else {
        (
            "20px".to_string(),
            "20px".to_string(),
            "92px".to_string(),
            "20px".to_string(),
        )
    };
    let panel_width = format!("{}px", config.panel.width_px);
    let panel_height = format!("min({}px, calc(var({vh}, 1vh) * 100 - 112px))", config.panel.height_px);
    // the strip above the phone panel stays overlay, so tapping it closes
    let strip_top = if insets {
        format!("calc({MOBILE_OVERLAY_STRIP_PX}px + env(safe-area-inset-top, 0px))")
    } else {
        format!("{MOBILE_OVERLAY_STRIP_PX}px")
    };
    let mobile_height = format!("calc(var({vh}, 1vh) * 100 - {strip_top})");

    let mut css = String::with_capacity(4096);
    css.push_str(&format!("/* chat-embed {} */\n", config.variant.as_str()));

    rule(&mut css, ":root", &[(vh.as_str(), "1vh")], false);

    // Launcher
    let button = format!("#{}", ids.button);
    rule(
        &mut css,
        &button,
        &[
            ("position", "fixed"),
            ("bottom", button_bottom.as_str()),
            (side, button_side.as_str()),
            ("width", "60px"),
            ("height", "60px"),
            ("border", "none"),
            ("border-radius", "50%"),
            ("background", config.colors.primary.as_str()),
            ("color", config.colors.on_primary.as_str()),
            ("box-shadow", "0 4px 16px rgba(0, 0, 0, 0.2)"),
            ("cursor", "pointer"),
            ("z-index", z_top.as_str()),
            ("display", "none"),
            ("align-items", "center"),
            ("justify-content", "center"),
            ("padding", "0"),
        ],
        hard,
    );
    rule(&mut css, &format!("{button}.{visible}"), &[("display", "flex")], hard);

    // Overlay
    let overlay = format!("#{}", ids.overlay);
    rule(
        &mut css,
        &overlay,
        &[
            ("position", "fixed"),
            ("inset", "0"),
            ("background", config.colors.overlay.as_str()),
            ("z-index", z_overlay.as_str()),
            ("display", "none"),
        ],
        hard,
    );
    rule(&mut css, &format!("{overlay}.{visible}"), &[("display", "block")], hard);

    // Panel
    let container = format!("#{}", ids.container);
    rule(
        &mut css,
        &container,
        &[
            ("position", "fixed"),
            ("bottom", panel_bottom.as_str()),
            (side, panel_side.as_str()),
            ("width", panel_width.as_str()),
            ("max-width", "calc(100vw - 40px)"),
            ("height", panel_height.as_str()),
            ("background", config.colors.surface.as_str()),
            ("border-radius", "12px"),
            ("box-shadow", "0 12px 48px rgba(0, 0, 0, 0.25)"),
            ("overflow", "hidden"),
            ("z-index", z_panel.as_str()),
            ("display", "none"),
            ("flex-direction", "column"),
        ],
        hard,
    );
    rule(&mut css, &format!("{container}.{visible}"), &[("display", "flex")], hard);
    if config.ios_quirks.webkit_overflow_scrolling {
        rule(
            &mut css,
            &container,
            &[("-webkit-overflow-scrolling", "touch"), ("overflow-y", "auto")],
            false,
        );
    }
    rule(
        &mut css,
        &format!("{container} iframe"),
        &[
            ("flex", "1"),
            ("width", "100%"),
            ("height", "100%"),
            ("border", "0"),
        ],
        hard,
    );

    // Load error
    let load_error = format!("#{}", ids.load_error);
    rule(
        &mut css,
        &load_error,
        &[
            ("position", "absolute"),
            ("inset", "0"),
            ("background", config.colors.surface.as_str()),
            ("display", "none"),
            ("flex-direction", "column"),
            ("align-items", "center"),
            ("justify-content", "center"),
            ("gap", "12px"),
            ("font-family", "system-ui, sans-serif"),
        ],
        hard,
    );
    rule(&mut css, &format!("{load_error}.{visible}"), &[("display", "flex")], hard);

    // Permission dialog
    let dialog = format!("#{}", ids.dialog);
    rule(
        &mut css,
        &dialog,
        &[
            ("position", "fixed"),
            ("top", "50%"),
            ("left", "50%"),
            ("transform", "translate(-50%, -50%)"),
            ("width", "min(360px, calc(100vw - 32px))"),
            ("padding", "24px"),
            ("background", config.colors.surface.as_str()),
            ("border-radius", "12px"),
            ("box-shadow", "0 12px 48px rgba(0, 0, 0, 0.3)"),
            ("font-family", "system-ui, sans-serif"),
            ("z-index", z_top.as_str()),
            ("display", "none"),
        ],
        hard,
    );
    rule(&mut css, &format!("{dialog}.{visible}"), &[("display", "block")], hard);
    rule(
        &mut css,
        &format!("{dialog} button, {load_error} button"),
        &[
            ("margin", "16px 8px 0 0"),
            ("padding", "8px 16px"),
            ("border-radius", "6px"),
            ("border", "1px solid currentColor"),
            ("cursor", "pointer"),
        ],
        hard,
    );
    rule(
        &mut css,
        &format!("#{}, #{}", ids.allow, ids.retry),
        &[
            ("background", config.colors.primary.as_str()),
            ("color", config.colors.on_primary.as_str()),
            ("border-color", config.colors.primary.as_str()),
        ],
        hard,
    );

    // Mobile: bottom sheet sized from the live viewport height
    css.push_str(&format!("@media (max-width: {}px) {{\n", config.mobile_breakpoint_px));
    let mobile_bottom = if insets { "env(safe-area-inset-bottom, 0px)" } else { "0" };
    rule(
        &mut css,
        &container,
        &[
            ("top", strip_top.as_str()),
            ("bottom", "auto"),
            ("left", "0"),
            ("right", "0"),
            ("width", "100%"),
            ("max-width", "100%"),
            ("height", mobile_height.as_str()),
            ("border-radius", "16px 16px 0 0"),
            ("padding-bottom", mobile_bottom),
            ("box-sizing", "border-box"),
        ],
        hard,
    );
    css.push_str("}\n");

    rule(
        &mut css,
        &format!("body.{}", config.scroll_lock_class()),
        &[("overflow", "hidden"), ("touch-action", "none")],
        hard,
    );

    css
}

/// Append the stylesheet to `<head>` unless this prefix already has one
///
/// Returns whether a `<style>` was added.
///
/// # Errors
///
/// Returns an error if `<head>` is missing or the element cannot be created.
pub fn inject_styles(document: &web_sys::Document, config: &WidgetConfig) -> EmbedResult<bool> {
    let selector = format!("style[{STYLE_MARKER_ATTR}=\"{}\"]", config.id_prefix);
    if document.query_selector(&selector)?.is_some() {
        debug!(prefix = %config.id_prefix, "Stylesheet already injected");
        return Ok(false);
    }

    let head = document.head().ok_or(EmbedError::MissingGlobal("head"))?;
    let style = document.create_element("style")?;
    style.set_attribute(STYLE_MARKER_ATTR, config.id_prefix.as_str())?;
    let css = build_stylesheet(config);
    style.set_text_content(Some(&css));
    head.append_child(&style)?;

    info!(prefix = %config.id_prefix, bytes = css.len(), "Stylesheet injected");
    Ok(true)
}

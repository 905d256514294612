//! Widget DOM: element construction and the live [`WidgetSurface`]

use tracing::{debug, info, warn};
use url::Url;
use wasm_bindgen::JsCast;

use crate::bridge::{MessageBridge, OutboundMessage};
use crate::config::WidgetConfig;
use crate::error::{EmbedError, EmbedResult};
use crate::state::Part;
use crate::surface::WidgetSurface;
use crate::viewport::ViewportAdapter;

/// Value of the iframe `allow` attribute
pub const IFRAME_ALLOW: &str = "microphone; autoplay";

const LAUNCHER_ICON: &str = r#"<svg width="28" height="28" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round" aria-hidden="true"><path d="M21 15a2 2 0 0 1-2 2H7l-4 4V5a2 2 0 0 1 2-2h14a2 2 0 0 1 2 2z"/></svg>"#;

/// Element ids for one widget, derived from its prefix
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ElementIds {
    pub button: String,
    pub overlay: String,
    pub container: String,
    pub dialog: String,
    pub dialog_title: String,
    pub allow: String,
    pub cancel: String,
    pub load_error: String,
    pub retry: String,
    pub iframe: String,
}

impl ElementIds {
    /// Ids for `config.id_prefix`
    #[must_use]
    pub fn new(config: &WidgetConfig) -> Self {
        Self {
            button: config.element_id("button"),
            overlay: config.element_id("overlay"),
            container: config.element_id("container"),
            dialog: config.element_id("dialog"),
            dialog_title: config.element_id("dialog-title"),
            allow: config.element_id("allow"),
            cancel: config.element_id("cancel"),
            load_error: config.element_id("load-error"),
            retry: config.element_id("retry"),
            iframe: config.element_id("iframe"),
        }
    }
}

fn create_element(document: &web_sys::Document, tag: &str) -> EmbedResult<web_sys::HtmlElement> {
    document
        .create_element(tag)?
        .dyn_into::<web_sys::HtmlElement>()
        .map_err(|_| EmbedError::Dom(format!("<{tag}> is not an HtmlElement")))
}

fn create_text_button(
    document: &web_sys::Document,
    id: &str,
    label: &str,
) -> EmbedResult<web_sys::HtmlElement> {
    let button = create_element(document, "button")?;
    button.set_id(id);
    button.set_attribute("type", "button")?;
    button.set_text_content(Some(label));
    Ok(button)
}

/// Builds the widget's elements
///
/// None of the created nodes get listeners here; the runtime wires them.
pub struct DomFactory {
    document: web_sys::Document,
    config: WidgetConfig,
    ids: ElementIds,
}

impl DomFactory {
    /// Factory for one widget
    #[must_use]
    pub fn new(document: web_sys::Document, config: &WidgetConfig) -> Self {
        Self {
            document,
            ids: ElementIds::new(config),
            config: config.clone(),
        }
    }

    /// Ids in use
    #[must_use]
    pub fn ids(&self) -> &ElementIds {
        &self.ids
    }

    fn body(&self) -> EmbedResult<web_sys::HtmlElement> {
        self.document.body().ok_or(EmbedError::MissingGlobal("body"))
    }

    /// Launcher button, visible and appended to `<body>`
    ///
    /// # Errors
    ///
    /// Returns an error if the element cannot be created or appended.
    pub fn create_button(&self) -> EmbedResult<web_sys::HtmlElement> {
        let button = create_element(&self.document, "button")?;
        button.set_id(&self.ids.button);
        button.set_attribute("type", "button")?;
        button.set_attribute("aria-label", &self.config.copy.button_label)?;
        button.set_inner_html(LAUNCHER_ICON);
        button.class_list().add_1(&self.config.visible_class())?;
        self.body()?.append_child(&button)?;
        Ok(button)
    }

    /// Dimming layer, hidden
    ///
    /// # Errors
    ///
    /// Returns an error if the element cannot be created or appended.
    pub fn create_overlay(&self) -> EmbedResult<web_sys::HtmlElement> {
        let overlay = create_element(&self.document, "div")?;
        overlay.set_id(&self.ids.overlay);
        overlay.set_attribute("aria-hidden", "true")?;
        self.body()?.append_child(&overlay)?;
        Ok(overlay)
    }

    /// Chat panel, hidden, holding only the (hidden) load-error panel
    ///
    /// # Errors
    ///
    /// Returns an error if an element cannot be created or appended.
    pub fn create_container(&self) -> EmbedResult<web_sys::HtmlElement> {
        let container = create_element(&self.document, "div")?;
        container.set_id(&self.ids.container);
        container.set_attribute("role", "dialog")?;
        container.set_attribute("aria-label", "Chat")?;
        container.set_attribute("aria-hidden", "true")?;

        let load_error = create_element(&self.document, "div")?;
        load_error.set_id(&self.ids.load_error);
        load_error.set_attribute("role", "alert")?;
        let text = create_element(&self.document, "p")?;
        text.set_text_content(Some(&self.config.copy.load_error));
        load_error.append_child(&text)?;
        let retry = create_text_button(&self.document, &self.ids.retry, &self.config.copy.retry_label)?;
        load_error.append_child(&retry)?;
        container.append_child(&load_error)?;

        self.body()?.append_child(&container)?;
        Ok(container)
    }

    /// Microphone dialog with Allow and Cancel, hidden
    ///
    /// # Errors
    ///
    /// Returns an error if an element cannot be created or appended.
    pub fn create_permission_dialog(&self) -> EmbedResult<web_sys::HtmlElement> {
        let copy = &self.config.copy;
        let dialog = create_element(&self.document, "div")?;
        dialog.set_id(&self.ids.dialog);
        dialog.set_attribute("role", "dialog")?;
        dialog.set_attribute("aria-modal", "true")?;
        dialog.set_attribute("aria-labelledby", &self.ids.dialog_title)?;
        dialog.set_attribute("aria-hidden", "true")?;

        let title = create_element(&self.document, "h2")?;
        title.set_id(&self.ids.dialog_title);
        title.set_text_content(Some(&copy.dialog_title));
        dialog.append_child(&title)?;

        let body = create_element(&self.document, "p")?;
        body.set_text_content(Some(&copy.dialog_body));
        dialog.append_child(&body)?;

        let allow = create_text_button(&self.document, &self.ids.allow, &copy.allow_label)?;
        dialog.append_child(&allow)?;
        let cancel = create_text_button(&self.document, &self.ids.cancel, &copy.cancel_label)?;
        dialog.append_child(&cancel)?;

        self.body()?.append_child(&dialog)?;
        Ok(dialog)
    }

    /// The conversation iframe inside `container`, if any
    #[must_use]
    pub fn find_iframe(container: &web_sys::Element) -> Option<web_sys::HtmlIFrameElement> {
        container
            .query_selector("iframe")
            .ok()
            .flatten()
            .and_then(|node| node.dyn_into::<web_sys::HtmlIFrameElement>().ok())
    }

    /// Create the conversation iframe unless `container` already holds one
    ///
    /// The check is a DOM query, so a container emptied by someone else gets
    /// a fresh iframe. Returns the new node, or `None` if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the iframe cannot be created or appended.
    pub fn ensure_iframe(
        &self,
        container: &web_sys::Element,
        url: &Url,
        is_ios: bool,
    ) -> EmbedResult<Option<web_sys::HtmlIFrameElement>> {
        if Self::find_iframe(container).is_some() {
            return Ok(None);
        }

        let iframe = self
            .document
            .create_element("iframe")?
            .dyn_into::<web_sys::HtmlIFrameElement>()
            .map_err(|_| EmbedError::Dom("<iframe> is not an HtmlIFrameElement".into()))?;
        iframe.set_id(&self.ids.iframe);
        iframe.set_title("Chat");
        iframe.set_attribute("allow", IFRAME_ALLOW)?;
        if is_ios && self.config.ios_quirks.playsinline {
            iframe.set_attribute("playsinline", "")?;
            iframe.set_attribute("webkit-playsinline", "")?;
        }
        iframe.set_src(url.as_str());
        container.append_child(&iframe)?;

        info!(url = %url, "Conversation iframe created");
        Ok(Some(iframe))
    }

    /// Load `url` again in the existing iframe; never creates one
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Dom`] if the container has no iframe.
    pub fn reload_iframe(container: &web_sys::Element, url: &Url) -> EmbedResult<()> {
        let iframe = Self::find_iframe(container)
            .ok_or_else(|| EmbedError::Dom("no iframe to reload".into()))?;
        iframe.set_src(url.as_str());
        debug!(url = %url, "Conversation iframe reloading");
        Ok(())
    }
}

/// Live page elements of one widget
struct Parts {
    button: web_sys::HtmlElement,
    overlay: web_sys::HtmlElement,
    container: web_sys::HtmlElement,
    dialog: web_sys::HtmlElement,
    load_error: web_sys::HtmlElement,
}

impl Parts {
    fn get(&self, part: Part) -> &web_sys::HtmlElement {
        match part {
            Part::Button => &self.button,
            Part::Overlay => &self.overlay,
            Part::Container => &self.container,
            Part::Dialog => &self.dialog,
            Part::LoadError => &self.load_error,
        }
    }
}

/// [`WidgetSurface`] over the real page
pub struct DomSurface {
    window: web_sys::Window,
    factory: DomFactory,
    parts: Parts,
    visible_class: String,
    target_url: Url,
    denied_notice: String,
    viewport: ViewportAdapter,
    bridge: MessageBridge,
    on_iframe_load: Option<js_sys::Function>,
}

impl DomSurface {
    /// Build the static shell: button, overlay, container and dialog
    ///
    /// Styles must already be injected.
    ///
    /// # Errors
    ///
    /// Returns an error if any element cannot be created.
    pub fn build(
        window: web_sys::Window,
        document: web_sys::Document,
        config: &WidgetConfig,
        target_url: Url,
        viewport: ViewportAdapter,
        bridge: MessageBridge,
    ) -> EmbedResult<Self> {
        let factory = DomFactory::new(document, config);
        let button = factory.create_button()?;
        let overlay = factory.create_overlay()?;
        let container = factory.create_container()?;
        let dialog = factory.create_permission_dialog()?;
        let load_error = container
            .query_selector(&format!("#{}", factory.ids().load_error))?
            .and_then(|e| e.dyn_into::<web_sys::HtmlElement>().ok())
            .ok_or_else(|| EmbedError::Dom("load-error panel missing".into()))?;

        Ok(Self {
            window,
            factory,
            parts: Parts {
                button,
                overlay,
                container,
                dialog,
                load_error,
            },
            visible_class: config.visible_class(),
            target_url,
            denied_notice: config.copy.denied_notice.clone(),
            viewport,
            bridge,
            on_iframe_load: None,
        })
    }

    /// Ids of the created elements
    #[must_use]
    pub fn ids(&self) -> &ElementIds {
        self.factory.ids()
    }

    /// Launcher button
    #[must_use]
    pub fn button(&self) -> &web_sys::HtmlElement {
        &self.parts.button
    }

    /// Overlay element
    #[must_use]
    pub fn overlay(&self) -> &web_sys::HtmlElement {
        &self.parts.overlay
    }

    /// Viewport adapter
    pub fn viewport_mut(&mut self) -> &mut ViewportAdapter {
        &mut self.viewport
    }

    /// Listener attached to the iframe's `load` event when it is created
    pub fn set_iframe_load_handler(&mut self, handler: js_sys::Function) {
        self.on_iframe_load = Some(handler);
    }

    fn iframe(&self) -> Option<web_sys::HtmlIFrameElement> {
        DomFactory::find_iframe(&self.parts.container)
    }
}

impl WidgetSurface for DomSurface {
    fn set_visible(&mut self, part: Part, visible: bool) {
        let element = self.parts.get(part);
        let class_list = element.class_list();
        let result = if visible {
            class_list.add_1(&self.visible_class)
        } else {
            class_list.remove_1(&self.visible_class)
        };
        let aria = if visible { "false" } else { "true" };
        if let Err(e) = result.and_then(|()| element.set_attribute("aria-hidden", aria)) {
            warn!(?part, visible, error = ?e, "Failed to toggle visibility");
        }
    }

    fn ensure_iframe(&mut self) -> bool {
        let is_ios = self.viewport.profile().is_ios;
        match self
            .factory
            .ensure_iframe(&self.parts.container, &self.target_url, is_ios)
        {
            Ok(Some(iframe)) => {
                if let Some(handler) = &self.on_iframe_load {
                    if let Err(e) = iframe.add_event_listener_with_callback("load", handler) {
                        warn!(error = ?e, "Failed to attach iframe load listener");
                    }
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Failed to create conversation iframe");
                false
            }
        }
    }

    fn reload_iframe(&mut self) {
        if let Err(e) = DomFactory::reload_iframe(&self.parts.container, &self.target_url) {
            warn!(error = %e, "Failed to reload conversation iframe");
        }
    }

    fn lock_scroll(&mut self) {
        if let Err(e) = self.viewport.lock_scroll() {
            warn!(error = %e, "Failed to lock scroll");
        }
    }

    fn unlock_scroll(&mut self) {
        if let Err(e) = self.viewport.unlock_scroll() {
            warn!(error = %e, "Failed to unlock scroll");
        }
    }

    fn show_denied_notice(&mut self) {
        if let Err(e) = self.window.alert_with_message(&self.denied_notice) {
            warn!(error = ?e, "Failed to show denied notice");
        }
    }

    fn post(&mut self, message: &OutboundMessage) -> bool {
        let iframe = self.iframe();
        self.bridge.send(iframe.as_ref(), message)
    }
}

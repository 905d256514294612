//! Widget runtime: browser listeners feeding the state machine
//!
//! One [`Widget`] per mounted instance. Browser callbacks turn into
//! [`WidgetEvent`]s, which are queued and drained in order; an event raised
//! while another is being committed waits its turn instead of re-borrowing.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, error, info, info_span, warn};
use wasm_bindgen::prelude::*;

use crate::bridge::{MessageBridge, OriginPolicy};
use crate::config::{ConfigOverrides, WidgetConfig};
use crate::dom::DomSurface;
use crate::error::{EmbedError, EmbedResult};
use crate::permission::{BrowserPermissionApi, PermissionController};
use crate::state::{Task, WidgetEvent, WidgetStateMachine};
use crate::style::inject_styles;
use crate::surface::commit;
use crate::viewport::ViewportAdapter;

/// Global holding page-level overrides for the auto-mounted widget
pub const CONFIG_GLOBAL: &str = "chatEmbedConfig";

/// Attribute carrying JSON overrides on the loader's `<script>` tag
pub const CONFIG_ATTR: &str = "data-chat-embed-config";

thread_local! {
    static MOUNTED: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Reserve an id prefix for a new instance
///
/// # Errors
///
/// Returns [`EmbedError::AlreadyMounted`] if the prefix is taken.
pub fn claim_prefix(prefix: &str) -> EmbedResult<()> {
    MOUNTED.with(|mounted| {
        if mounted.borrow_mut().insert(prefix.to_string()) {
            Ok(())
        } else {
            Err(EmbedError::AlreadyMounted(prefix.to_string()))
        }
    })
}

/// Give a prefix back after a failed mount
pub fn release_prefix(prefix: &str) {
    MOUNTED.with(|mounted| mounted.borrow_mut().remove(prefix));
}

struct Inner {
    machine: WidgetStateMachine,
    surface: DomSurface,
}

/// A mounted widget
pub struct Widget {
    id_prefix: String,
    window: web_sys::Window,
    inner: RefCell<Inner>,
    queue: RefCell<VecDeque<WidgetEvent>>,
    permissions: PermissionController<BrowserPermissionApi>,
    bridge: MessageBridge,
    orientation_settle_ms: u32,
}

impl Widget {
    /// Id prefix of this instance
    #[must_use]
    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    /// Queue `event` and drain the queue unless a drain is already running
    pub fn dispatch(self: &Rc<Self>, event: WidgetEvent) {
        self.queue.borrow_mut().push_back(event);
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return;
        };
        let _span = info_span!("widget", prefix = %self.id_prefix).entered();

        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let inner = &mut *inner;
            let effects = inner.machine.handle(event);
            for task in commit(&mut inner.surface, effects) {
                self.run(task);
            }
        }
    }

    fn run(self: &Rc<Self>, task: Task) {
        match task {
            Task::RequestPermission(origin) => {
                let widget = Rc::clone(self);
                wasm_bindgen_futures::spawn_local(async move {
                    let state = widget.permissions.request().await;
                    widget.dispatch(WidgetEvent::PermissionResolved { origin, state });
                });
            }
            Task::ArmLoadTimeout { attempt, delay_ms } => {
                let widget = Rc::clone(self);
                let callback = Closure::once(Box::new(move || {
                    widget.dispatch(WidgetEvent::IframeLoadTimedOut { attempt });
                }) as Box<dyn FnOnce()>);
                let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
                if let Err(e) = self
                    .window
                    .set_timeout_with_callback_and_timeout_and_arguments_0(
                        callback.as_ref().unchecked_ref(),
                        delay,
                    )
                {
                    warn!(error = ?e, "Failed to arm iframe load timeout");
                }
                callback.forget();
            }
        }
    }

    fn spawn_permission_query(self: &Rc<Self>) {
        let widget = Rc::clone(self);
        wasm_bindgen_futures::spawn_local(async move {
            let state = widget.permissions.query().await;
            widget.dispatch(WidgetEvent::PermissionQueried(state));
        });
    }

    fn refresh_viewport(self: &Rc<Self>) {
        let profile = {
            let Ok(mut inner) = self.inner.try_borrow_mut() else {
                debug!("Viewport refresh skipped during dispatch");
                return;
            };
            match inner.surface.viewport_mut().refresh() {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(error = %e, "Failed to measure viewport");
                    return;
                }
            }
        };
        self.dispatch(WidgetEvent::ViewportChanged(profile));
    }
}

/// Create, style and wire one widget instance
///
/// # Errors
///
/// Returns [`EmbedError::AlreadyMounted`] for a taken prefix, or an error if
/// the page lacks a window, document or body.
pub fn mount(config: WidgetConfig) -> EmbedResult<Rc<Widget>> {
    claim_prefix(&config.id_prefix)?;
    build(&config).inspect_err(|_| release_prefix(&config.id_prefix))
}

fn build(config: &WidgetConfig) -> EmbedResult<Rc<Widget>> {
    let window = web_sys::window().ok_or(EmbedError::MissingGlobal("window"))?;
    let document = window.document().ok_or(EmbedError::MissingGlobal("document"))?;
    let base = match document.base_uri()? {
        Some(base) => base,
        None => window.location().href()?,
    };
    let target_url = config.resolve_target_url(&base)?;

    inject_styles(&document, config)?;
    let viewport = ViewportAdapter::new(window.clone(), document.clone(), config)?;
    let profile = viewport.profile();
    let bridge = MessageBridge::new(OriginPolicy::new(&config.target_origin, &target_url));
    let surface = DomSurface::build(
        window.clone(),
        document.clone(),
        config,
        target_url.clone(),
        viewport,
        bridge.clone(),
    )?;

    let widget = Rc::new(Widget {
        id_prefix: config.id_prefix.clone(),
        window,
        inner: RefCell::new(Inner {
            machine: WidgetStateMachine::new(config, profile),
            surface,
        }),
        queue: RefCell::new(VecDeque::new()),
        permissions: PermissionController::new(BrowserPermissionApi),
        bridge,
        orientation_settle_ms: config.orientation_settle_ms,
    });

    attach_listeners(&widget, &document, profile.is_mobile)?;
    widget.spawn_permission_query();

    info!(
        prefix = %config.id_prefix,
        variant = config.variant.as_str(),
        target = %target_url,
        origin = widget.bridge.policy().target_origin(),
        "Chat widget mounted"
    );
    Ok(widget)
}

// ============================================================================
// Listeners
// ============================================================================

fn listen<E, F>(target: &web_sys::EventTarget, event: &str, handler: F) -> EmbedResult<()>
where
    E: JsCast + 'static,
    F: Fn(E) + 'static,
{
    let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
        if let Ok(event) = event.dyn_into::<E>() {
            handler(event);
        }
    }) as Box<dyn Fn(_)>);
    target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

fn element(document: &web_sys::Document, id: &str) -> EmbedResult<web_sys::Element> {
    document
        .get_element_by_id(id)
        .ok_or_else(|| EmbedError::Dom(format!("#{id} not found")))
}

fn on_click(
    widget: &Rc<Widget>,
    target: &web_sys::EventTarget,
    event: WidgetEvent,
) -> EmbedResult<()> {
    let widget = Rc::clone(widget);
    listen(target, "click", move |_: web_sys::MouseEvent| {
        widget.dispatch(event.clone());
    })
}

/// Whether `event` was posted by the iframe with id `iframe_id`
fn is_from_iframe(document: &web_sys::Document, iframe_id: &str, event: &web_sys::MessageEvent) -> bool {
    let own = document
        .get_element_by_id(iframe_id)
        .and_then(|e| e.dyn_into::<web_sys::HtmlIFrameElement>().ok())
        .and_then(|iframe| iframe.content_window());
    match (event.source(), own) {
        (Some(source), Some(own)) => {
            let own: &JsValue = own.as_ref();
            let source: &JsValue = source.as_ref();
            source == own
        }
        _ => false,
    }
}

fn attach_listeners(
    widget: &Rc<Widget>,
    document: &web_sys::Document,
    is_mobile: bool,
) -> EmbedResult<()> {
    let (button, overlay, ids) = {
        let inner = widget.inner.borrow();
        (
            inner.surface.button().clone(),
            inner.surface.overlay().clone(),
            inner.surface.ids().clone(),
        )
    };

    let allow = element(document, &ids.allow)?;
    let cancel = element(document, &ids.cancel)?;
    let retry = element(document, &ids.retry)?;
    on_click(widget, &button, WidgetEvent::ButtonClicked)?;
    on_click(widget, &allow, WidgetEvent::AllowClicked)?;
    on_click(widget, &cancel, WidgetEvent::CancelClicked)?;
    on_click(widget, &retry, WidgetEvent::RetryClicked)?;

    {
        let widget = Rc::clone(widget);
        let overlay_value: JsValue = overlay.clone().into();
        listen(&overlay, "click", move |event: web_sys::MouseEvent| {
            let direct_hit = event.target().is_some_and(|target| {
                let target: &JsValue = target.as_ref();
                *target == overlay_value
            });
            widget.dispatch(WidgetEvent::OverlayClicked { direct_hit });
        })?;
    }

    {
        let widget = Rc::clone(widget);
        listen(document, "keydown", move |event: web_sys::KeyboardEvent| {
            if event.key() == "Escape" {
                widget.dispatch(WidgetEvent::EscapePressed);
            }
        })?;
    }

    {
        let widget = Rc::clone(widget);
        let document = document.clone();
        let iframe_id = ids.iframe.clone();
        listen(&widget.window.clone(), "message", move |event: web_sys::MessageEvent| {
            let from_own_iframe = is_from_iframe(&document, &iframe_id, &event);
            if let Some(message) = widget.bridge.accept(&event.origin(), from_own_iframe, &event.data()) {
                widget.dispatch(WidgetEvent::Message(message));
            }
        })?;
    }

    {
        let widget_for_load = Rc::clone(widget);
        let on_load = Closure::wrap(Box::new(move |_: web_sys::Event| {
            widget_for_load.dispatch(WidgetEvent::IframeLoaded);
        }) as Box<dyn Fn(_)>);
        widget
            .inner
            .borrow_mut()
            .surface
            .set_iframe_load_handler(on_load.as_ref().unchecked_ref::<js_sys::Function>().clone());
        on_load.forget();
    }

    attach_viewport_listeners(widget, is_mobile)
}

fn attach_viewport_listeners(widget: &Rc<Widget>, is_mobile: bool) -> EmbedResult<()> {
    let window = widget.window.clone();

    {
        let widget = Rc::clone(widget);
        listen(&window, "resize", move |_: web_sys::Event| widget.refresh_viewport())?;
    }

    // Rotation reports stale dimensions until the layout settles
    let settled = {
        let widget = Rc::clone(widget);
        Closure::wrap(Box::new(move || widget.refresh_viewport()) as Box<dyn Fn()>)
    };
    let settled_fn: js_sys::Function = settled.as_ref().unchecked_ref::<js_sys::Function>().clone();
    settled.forget();
    {
        let settle_ms = i32::try_from(widget.orientation_settle_ms).unwrap_or(i32::MAX);
        let timer_window = window.clone();
        listen(&window, "orientationchange", move |_: web_sys::Event| {
            if let Err(e) = timer_window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&settled_fn, settle_ms)
            {
                warn!(error = ?e, "Failed to schedule orientation refresh");
            }
        })?;
    }

    if is_mobile {
        if let Some(visual) = window.visual_viewport() {
            let widget = Rc::clone(widget);
            listen(&visual, "resize", move |_: web_sys::Event| widget.refresh_viewport())?;
        } else {
            debug!("visualViewport unavailable");
        }
    }
    Ok(())
}

// ============================================================================
// Page boot
// ============================================================================

/// Overrides for the auto-mounted widget
///
/// `window.chatEmbedConfig` wins over the `<script data-chat-embed-config>`
/// attribute. `None` means the page opted out (`chatEmbedConfig = false`).
fn page_overrides(
    window: &web_sys::Window,
    document: &web_sys::Document,
) -> EmbedResult<Option<ConfigOverrides>> {
    let global = js_sys::Reflect::get(window, &JsValue::from_str(CONFIG_GLOBAL))?;
    if global.as_bool() == Some(false) {
        return Ok(None);
    }
    if !global.is_undefined() && !global.is_null() {
        return ConfigOverrides::from_js(global).map(Some);
    }

    let attribute = document
        .query_selector(&format!("script[{CONFIG_ATTR}]"))?
        .and_then(|script| script.get_attribute(CONFIG_ATTR));
    match attribute {
        Some(json) if !json.trim().is_empty() => ConfigOverrides::from_json(&json).map(Some),
        _ => Ok(Some(ConfigOverrides::default())),
    }
}

fn mount_from_page() -> EmbedResult<()> {
    let window = web_sys::window().ok_or(EmbedError::MissingGlobal("window"))?;
    let document = window.document().ok_or(EmbedError::MissingGlobal("document"))?;
    let Some(overrides) = page_overrides(&window, &document)? else {
        info!("Auto mount disabled by page");
        return Ok(());
    };
    mount(WidgetConfig::resolve(overrides)?)?;
    Ok(())
}

/// `document.readyState` past `"loading"`
fn parsing_done(ready_state: &str) -> bool {
    ready_state != "loading"
}

/// Mount the page's widget now, or on `DOMContentLoaded` while parsing
///
/// # Errors
///
/// Returns an error if the page has no window or document, or if an
/// immediate mount fails.
pub fn boot() -> EmbedResult<()> {
    let window = web_sys::window().ok_or(EmbedError::MissingGlobal("window"))?;
    let document = window.document().ok_or(EmbedError::MissingGlobal("document"))?;

    if parsing_done(&document.ready_state()) {
        return mount_from_page();
    }

    let callback = Closure::once(Box::new(move || {
        if let Err(e) = mount_from_page() {
            error!(error = %e, "Chat widget failed to mount");
        }
    }) as Box<dyn FnOnce()>);
    document.add_event_listener_with_callback("DOMContentLoaded", callback.as_ref().unchecked_ref())?;
    callback.forget();
    debug!("Waiting for DOMContentLoaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_prefix_is_rejected() {
        claim_prefix("registry-dup").unwrap();
        let err = claim_prefix("registry-dup").unwrap_err();
        assert!(matches!(err, EmbedError::AlreadyMounted(ref p) if p == "registry-dup"));
    }

    #[test]
    fn test_released_prefix_can_be_claimed_again() {
        claim_prefix("registry-release").unwrap();
        release_prefix("registry-release");
        assert!(claim_prefix("registry-release").is_ok());
    }

    #[test]
    fn test_ready_states() {
        assert!(!parsing_done("loading"));
        assert!(parsing_done("interactive"));
        assert!(parsing_done("complete"));
    }

    #[test]
    fn test_prefixes_are_independent() {
        assert!(claim_prefix("registry-a").is_ok());
        assert!(claim_prefix("registry-b").is_ok());
    }
}

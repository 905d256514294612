//! Device profile, viewport height and body scroll lock
//!
//! The detection and lock bookkeeping are pure functions over plain values;
//! [`ViewportAdapter`] applies them to the live page.

use std::cell::RefCell;

use tracing::{debug, info};
use wasm_bindgen::JsValue;

use crate::config::WidgetConfig;
use crate::error::{EmbedError, EmbedResult};

/// User-agent fragments of phones and tablets (matched lowercase)
const MOBILE_UA_PATTERNS: [&str; 9] = [
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
    "mobile",
];

const IOS_UA_PATTERNS: [&str; 3] = ["iphone", "ipad", "ipod"];

/// Derived snapshot of the device; a cache, recomputed on resize
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceProfile {
    /// Phone/tablet user agent or narrow viewport
    pub is_mobile: bool,
    /// iOS / iPadOS
    pub is_ios: bool,
    /// `window.innerHeight` in CSS px
    pub viewport_height: f64,
}

impl DeviceProfile {
    /// Desktop profile with the given height
    #[must_use]
    pub const fn desktop(viewport_height: f64) -> Self {
        Self {
            is_mobile: false,
            is_ios: false,
            viewport_height,
        }
    }

    /// Mobile profile with the given height
    #[must_use]
    pub const fn mobile(viewport_height: f64) -> Self {
        Self {
            is_mobile: true,
            is_ios: false,
            viewport_height,
        }
    }
}

/// Mobile when the user agent looks like a handheld or the viewport is at
/// most `breakpoint_px` wide
#[must_use]
pub fn detect_mobile(user_agent: &str, width: f64, breakpoint_px: u32) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    MOBILE_UA_PATTERNS.iter().any(|p| ua.contains(p)) || width <= f64::from(breakpoint_px)
}

/// iOS user agent, or iPadOS pretending to be a Mac but exposing touch points
#[must_use]
pub fn detect_ios(user_agent: &str, platform: &str, max_touch_points: i32) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    IOS_UA_PATTERNS.iter().any(|p| ua.contains(p)) || (platform == "MacIntel" && max_touch_points > 1)
}

/// Value for the viewport-height custom property: 1% of the height in px
#[must_use]
pub fn viewport_unit(inner_height: f64) -> String {
    format!("{}px", inner_height * 0.01)
}

/// Body styles to apply while locked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockPlan {
    /// Negative `top` keeping the page visually in place
    pub top_px: f64,
}

/// Remembers the scroll offset across one lock/unlock pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollLock {
    original_scroll_y: f64,
    locked: bool,
}

impl ScrollLock {
    /// Whether the body is currently fixed
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Offset captured by the active lock
    #[must_use]
    pub const fn original_scroll_y(&self) -> f64 {
        self.original_scroll_y
    }

    /// Start a lock at `current_y`
    ///
    /// Returns `None` on desktop profiles and when already locked, so the
    /// first offset survives repeated calls.
    pub fn lock(&mut self, current_y: f64, profile: &DeviceProfile) -> Option<LockPlan> {
        if !profile.is_mobile || self.locked {
            return None;
        }
        self.original_scroll_y = current_y;
        self.locked = true;
        Some(LockPlan { top_px: -current_y })
    }

    /// End the lock, yielding the offset to restore exactly once
    pub fn unlock(&mut self) -> Option<f64> {
        if !self.locked {
            return None;
        }
        self.locked = false;
        Some(std::mem::take(&mut self.original_scroll_y))
    }
}

/// The page body's lock, shared by every widget instance on the page
///
/// The first instance to lock captures the offset and fixes the body; the
/// last one to unlock restores it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyLock {
    holders: u32,
    original_scroll_y: f64,
}

impl BodyLock {
    /// Instances currently holding the lock
    #[must_use]
    pub const fn holders(&self) -> u32 {
        self.holders
    }

    /// Lock on behalf of `instance`; a plan is returned only when the body
    /// still has to be fixed
    pub fn lock(
        &mut self,
        instance: &mut ScrollLock,
        current_y: f64,
        profile: &DeviceProfile,
    ) -> Option<LockPlan> {
        instance.lock(current_y, profile)?;
        self.holders += 1;
        if self.holders > 1 {
            return None;
        }
        self.original_scroll_y = current_y;
        Some(LockPlan { top_px: -current_y })
    }

    /// Release `instance`'s hold; yields the offset once the last holder leaves
    pub fn unlock(&mut self, instance: &mut ScrollLock) -> Option<f64> {
        instance.unlock()?;
        self.holders = self.holders.saturating_sub(1);
        if self.holders > 0 {
            return None;
        }
        Some(std::mem::take(&mut self.original_scroll_y))
    }
}

thread_local! {
    static BODY_LOCK: RefCell<BodyLock> = RefCell::new(BodyLock::default());
}

/// Body style properties touched by the lock
const LOCKED_PROPERTIES: [&str; 6] = ["overflow", "position", "top", "left", "right", "width"];

/// Live viewport handling for one widget
pub struct ViewportAdapter {
    window: web_sys::Window,
    document: web_sys::Document,
    breakpoint_px: u32,
    height_property: String,
    lock_class: String,
    is_ios: bool,
    profile: DeviceProfile,
    lock: ScrollLock,
}

impl ViewportAdapter {
    /// Measure the page once; iOS detection is not repeated afterwards
    ///
    /// # Errors
    ///
    /// Returns an error if the user agent cannot be read.
    pub fn new(
        window: web_sys::Window,
        document: web_sys::Document,
        config: &WidgetConfig,
    ) -> EmbedResult<Self> {
        let navigator = window.navigator();
        let user_agent = navigator.user_agent()?;
        let platform = navigator.platform().unwrap_or_default();
        let is_ios = detect_ios(&user_agent, &platform, navigator.max_touch_points());

        let mut adapter = Self {
            window,
            document,
            breakpoint_px: config.mobile_breakpoint_px,
            height_property: config.viewport_height_property(),
            lock_class: config.scroll_lock_class(),
            is_ios,
            profile: DeviceProfile::default(),
            lock: ScrollLock::default(),
        };
        adapter.refresh()?;
        info!(
            is_mobile = adapter.profile.is_mobile,
            is_ios,
            viewport_height = adapter.profile.viewport_height,
            "Device profile detected"
        );
        Ok(adapter)
    }

    /// Last measured profile
    #[must_use]
    pub const fn profile(&self) -> DeviceProfile {
        self.profile
    }

    /// Re-measure and republish the viewport height
    ///
    /// # Errors
    ///
    /// Returns an error if the window dimensions cannot be read.
    pub fn refresh(&mut self) -> EmbedResult<DeviceProfile> {
        let width = number(self.window.inner_width()?, "innerWidth")?;
        let height = self.visual_height()?;
        let user_agent = self.window.navigator().user_agent()?;

        self.profile = DeviceProfile {
            is_mobile: detect_mobile(&user_agent, width, self.breakpoint_px),
            is_ios: self.is_ios,
            viewport_height: height,
        };
        self.update_viewport_height()?;
        Ok(self.profile)
    }

    /// Publish the current height as the viewport-height custom property
    ///
    /// # Errors
    ///
    /// Returns an error if the root element's style cannot be written.
    pub fn update_viewport_height(&self) -> EmbedResult<()> {
        let root = self
            .document
            .document_element()
            .ok_or(EmbedError::MissingGlobal("documentElement"))?;
        let root: web_sys::HtmlElement = wasm_bindgen::JsCast::dyn_into(root)
            .map_err(|_| EmbedError::Dom("documentElement is not an HtmlElement".into()))?;
        root.style().set_property(
            &self.height_property,
            &viewport_unit(self.profile.viewport_height),
        )?;
        Ok(())
    }

    /// Fix the body in place (mobile only)
    ///
    /// # Errors
    ///
    /// Returns an error if the body or its style is unavailable.
    pub fn lock_scroll(&mut self) -> EmbedResult<()> {
        let scroll_y = self.window.scroll_y()?;
        let profile = self.profile;
        let instance = &mut self.lock;
        let plan = BODY_LOCK.with(|body| body.borrow_mut().lock(instance, scroll_y, &profile));
        let Some(plan) = plan else {
            debug!(locked = self.lock.is_locked(), "Body already fixed or desktop profile");
            return Ok(());
        };

        let body = self.body()?;
        let style = body.style();
        style.set_property("overflow", "hidden")?;
        style.set_property("position", "fixed")?;
        style.set_property("top", &format!("{}px", plan.top_px))?;
        style.set_property("left", "0")?;
        style.set_property("right", "0")?;
        style.set_property("width", "100%")?;
        body.class_list().add_1(&self.lock_class)?;
        debug!(scroll_y, "Body scroll locked");
        Ok(())
    }

    /// Undo [`Self::lock_scroll`] and restore the original offset
    ///
    /// # Errors
    ///
    /// Returns an error if the body or its style is unavailable.
    pub fn unlock_scroll(&mut self) -> EmbedResult<()> {
        let instance = &mut self.lock;
        let Some(scroll_y) = BODY_LOCK.with(|body| body.borrow_mut().unlock(instance)) else {
            return Ok(());
        };

        let body = self.body()?;
        let style = body.style();
        for property in LOCKED_PROPERTIES {
            style.remove_property(property)?;
        }
        body.class_list().remove_1(&self.lock_class)?;
        self.window.scroll_to_with_x_and_y(0.0, scroll_y);
        debug!(scroll_y, "Body scroll restored");
        Ok(())
    }

    fn visual_height(&self) -> EmbedResult<f64> {
        // visualViewport tracks the on-screen keyboard, innerHeight does not
        if let Some(visual) = self.window.visual_viewport() {
            return Ok(visual.height());
        }
        number(self.window.inner_height()?, "innerHeight")
    }

    fn body(&self) -> EmbedResult<web_sys::HtmlElement> {
        self.document.body().ok_or(EmbedError::MissingGlobal("body"))
    }
}

fn number(value: JsValue, what: &'static str) -> EmbedResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| EmbedError::Dom(format!("{what} is not a number")))
}

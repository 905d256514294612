//! Shared fixtures: a page model implementing `WidgetSurface` and a harness
//! that drives the state machine the way the browser runtime does.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use chat_embed::bridge::OutboundMessage;
use chat_embed::config::WidgetConfig;
use chat_embed::dom::IFRAME_ALLOW;
use chat_embed::error::{EmbedError, EmbedResult};
use chat_embed::permission::{MicPermissionState, PermissionApi, PermissionController};
use chat_embed::state::{Part, PermissionOrigin, Task, WidgetEvent, WidgetStateMachine};
use chat_embed::surface::{commit, WidgetSurface};
use chat_embed::viewport::{DeviceProfile, ScrollLock};
use futures::executor::block_on;

// ============================================================================
// Page model
// ============================================================================

/// One iframe node in the container
#[derive(Debug, Clone, PartialEq)]
pub struct FakeIframe {
    pub allow: String,
    pub loads: u32,
}

/// In-memory page: part visibility, iframe nodes, body scroll and postMessage log
#[derive(Debug)]
pub struct FakePage {
    pub visible: HashMap<Part, bool>,
    pub iframes: Vec<FakeIframe>,
    pub profile: DeviceProfile,
    pub scroll_y: f64,
    pub body_top: Option<f64>,
    pub lock: ScrollLock,
    pub notices: u32,
    pub posted: Vec<serde_json::Value>,
    /// Operation log for ordering checks
    pub ops: Vec<String>,
}

impl FakePage {
    pub fn new(profile: DeviceProfile) -> Self {
        let mut visible = HashMap::new();
        visible.insert(Part::Button, true);
        Self {
            visible,
            iframes: Vec::new(),
            profile,
            scroll_y: 0.0,
            body_top: None,
            lock: ScrollLock::default(),
            notices: 0,
            posted: Vec::new(),
            ops: Vec::new(),
        }
    }

    pub fn is_visible(&self, part: Part) -> bool {
        self.visible.get(&part).copied().unwrap_or(false)
    }

    /// Foreground parts currently showing (button, container, dialog)
    pub fn foreground(&self) -> Vec<Part> {
        [Part::Button, Part::Container, Part::Dialog]
            .into_iter()
            .filter(|p| self.is_visible(*p))
            .collect()
    }

    pub fn body_locked(&self) -> bool {
        self.body_top.is_some()
    }

    /// Simulate the user scrolling the page (ignored while the body is fixed)
    pub fn scroll_to(&mut self, y: f64) {
        if !self.body_locked() {
            self.scroll_y = y;
        }
    }
}

impl WidgetSurface for FakePage {
    fn set_visible(&mut self, part: Part, visible: bool) {
        self.ops.push(format!("{part:?}={visible}"));
        self.visible.insert(part, visible);
    }

    fn ensure_iframe(&mut self) -> bool {
        self.ops.push("ensure-iframe".into());
        if !self.iframes.is_empty() {
            return false;
        }
        self.iframes.push(FakeIframe {
            allow: IFRAME_ALLOW.to_string(),
            loads: 1,
        });
        true
    }

    fn reload_iframe(&mut self) {
        self.ops.push("reload-iframe".into());
        if let Some(iframe) = self.iframes.first_mut() {
            iframe.loads += 1;
        }
    }

    fn lock_scroll(&mut self) {
        self.ops.push("lock".into());
        if let Some(plan) = self.lock.lock(self.scroll_y, &self.profile) {
            self.body_top = Some(plan.top_px);
            self.scroll_y = 0.0;
        }
    }

    fn unlock_scroll(&mut self) {
        self.ops.push("unlock".into());
        if let Some(y) = self.lock.unlock() {
            self.body_top = None;
            self.scroll_y = y;
        }
    }

    fn show_denied_notice(&mut self) {
        self.ops.push("notice".into());
        self.notices += 1;
    }

    fn post(&mut self, message: &OutboundMessage) -> bool {
        if self.iframes.is_empty() {
            return false;
        }
        self.posted.push(message.to_json());
        true
    }
}

// ============================================================================
// Permission API
// ============================================================================

/// Permission API with a fixed query answer and prompt outcome
pub struct ScriptedPermissions {
    pub query: Option<MicPermissionState>,
    pub grant: Rc<Cell<bool>>,
    pub prompts: Rc<Cell<u32>>,
}

impl PermissionApi for ScriptedPermissions {
    async fn query(&self) -> EmbedResult<MicPermissionState> {
        self.query
            .ok_or_else(|| EmbedError::Permission("permissions API unsupported".into()))
    }

    async fn request(&self) -> EmbedResult<()> {
        self.prompts.set(self.prompts.get() + 1);
        if self.grant.get() {
            Ok(())
        } else {
            Err(EmbedError::Permission("NotAllowedError".into()))
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

/// State machine + page + permission controller, wired like the runtime
pub struct Harness {
    pub machine: WidgetStateMachine,
    pub page: FakePage,
    pub permissions: PermissionController<ScriptedPermissions>,
    pub pending: Vec<Task>,
    grant: Rc<Cell<bool>>,
    prompts: Rc<Cell<u32>>,
}

impl Harness {
    /// Widget on `profile` whose initial permission query answers `query`
    /// and whose prompt grants when `grant`
    pub fn new(profile: DeviceProfile, query: Option<MicPermissionState>, grant: bool) -> Self {
        Self::with_config(&WidgetConfig::default(), profile, query, grant)
    }

    pub fn with_config(
        config: &WidgetConfig,
        profile: DeviceProfile,
        query: Option<MicPermissionState>,
        grant: bool,
    ) -> Self {
        let grant = Rc::new(Cell::new(grant));
        let prompts = Rc::new(Cell::new(0));
        let permissions = PermissionController::new(ScriptedPermissions {
            query,
            grant: Rc::clone(&grant),
            prompts: Rc::clone(&prompts),
        });
        let mut harness = Self {
            machine: WidgetStateMachine::new(config, profile),
            page: FakePage::new(profile),
            permissions,
            pending: Vec::new(),
            grant,
            prompts,
        };
        let state = block_on(harness.permissions.query());
        harness.send(WidgetEvent::PermissionQueried(state));
        harness
    }

    pub fn desktop() -> Self {
        Self::new(DeviceProfile::desktop(900.0), None, true)
    }

    pub fn mobile() -> Self {
        Self::new(DeviceProfile::mobile(700.0), None, true)
    }

    /// Handle one event and commit its effects
    pub fn send(&mut self, event: WidgetEvent) {
        let effects = self.machine.handle(event);
        let tasks = commit(&mut self.page, effects);
        self.pending.extend(tasks);
    }

    /// Number of outstanding permission requests
    pub fn pending_requests(&self) -> usize {
        self.pending
            .iter()
            .filter(|t| matches!(t, Task::RequestPermission(_)))
            .count()
    }

    /// Run every queued permission request through the controller
    pub fn resolve_permissions(&mut self) {
        let (requests, rest): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|t| matches!(t, Task::RequestPermission(_)));
        self.pending = rest;
        for task in requests {
            if let Task::RequestPermission(origin) = task {
                let state = block_on(self.permissions.request());
                self.send(WidgetEvent::PermissionResolved { origin, state });
            }
        }
    }

    /// Fire every armed load timer
    pub fn fire_timeouts(&mut self) {
        let (timers, rest): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|t| matches!(t, Task::ArmLoadTimeout { .. }));
        self.pending = rest;
        for task in timers {
            if let Task::ArmLoadTimeout { attempt, .. } = task {
                self.send(WidgetEvent::IframeLoadTimedOut { attempt });
            }
        }
    }

    /// Move the user through the dialog's Allow path
    pub fn allow(&mut self) {
        self.send(WidgetEvent::AllowClicked);
        self.resolve_permissions();
    }

    /// Native prompts the browser actually showed
    pub fn prompts(&self) -> u32 {
        assert_eq!(self.prompts.get(), self.permissions.requests_issued());
        self.prompts.get()
    }

    /// Outcome of the next native prompt
    pub fn set_grant(&mut self, grant: bool) {
        self.grant.set(grant);
    }
}

/// Shorthand for permission-resolution events
pub fn resolved(origin: PermissionOrigin, state: MicPermissionState) -> WidgetEvent {
    WidgetEvent::PermissionResolved { origin, state }
}

//! Widget state machine
//!
//! Owns the single widget visibility state and decides every transition.
//! No browser types appear here: input arrives as [`WidgetEvent`]s and the
//! output is an ordered list of [`Effect`]s, committed to the page by
//! [`crate::surface::commit`].
//!
//! ```text
//!            button (mic granted)
//!   ┌────────────────────────────────────────┐
//!   │                                        ▼
//! Closed ──button──> PermissionPrompt ──allow/cancel──> Open
//!   ▲                      │                              │
//!   └──────escape──────────┘                              │
//!   └──────────escape / overlay / widget-close────────────┘
//! ```

use tracing::{debug, error, info};

use crate::bridge::{InboundMessage, OutboundMessage};
use crate::config::WidgetConfig;
use crate::permission::MicPermissionState;
use crate::viewport::DeviceProfile;

/// Which foreground element is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetVisibility {
    /// Only the launcher button is visible
    #[default]
    Closed,
    /// Microphone dialog is visible
    PermissionPrompt,
    /// Chat container is visible
    Open,
}

impl WidgetVisibility {
    /// Lowercase name (for logs and data attributes)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::PermissionPrompt => "permission-prompt",
            Self::Open => "open",
        }
    }

    /// Container or dialog showing
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Transition validator for widget visibility
pub struct VisibilityTransition;

impl VisibilityTransition {
    /// Check if a visibility transition is valid
    #[must_use]
    #[allow(clippy::unnested_or_patterns)]
    pub const fn is_valid(from: WidgetVisibility, to: WidgetVisibility) -> bool {
        matches!(
            (from, to),
            (WidgetVisibility::Closed, WidgetVisibility::Open)
                | (WidgetVisibility::Closed, WidgetVisibility::PermissionPrompt)
                | (WidgetVisibility::PermissionPrompt, WidgetVisibility::Open)
                | (WidgetVisibility::PermissionPrompt, WidgetVisibility::Closed)
                | (WidgetVisibility::Open, WidgetVisibility::Closed)
                // Self-transitions (no-op)
                | (WidgetVisibility::Closed, WidgetVisibility::Closed)
                | (WidgetVisibility::PermissionPrompt, WidgetVisibility::PermissionPrompt)
                | (WidgetVisibility::Open, WidgetVisibility::Open)
        )
    }
}

/// Conversation iframe lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IframeStatus {
    /// Not created yet
    #[default]
    Absent,
    /// Created or reloaded, waiting for `load` / `widget-ready`
    Loading,
    /// Conversation UI is up
    Loaded,
    /// Load timed out; error panel shown
    Failed,
}

/// Who asked for the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOrigin {
    /// "Allow" in the permission dialog
    Dialog,
    /// The iframe announced a voice call
    VoiceCall,
}

/// Widget elements whose visibility is driven by transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    /// Launcher button
    Button,
    /// Mobile dimming layer
    Overlay,
    /// Chat panel
    Container,
    /// Microphone dialog
    Dialog,
    /// Load-error panel inside the container
    LoadError,
}

impl Part {
    /// All parts
    pub const ALL: [Self; 5] = [
        Self::Button,
        Self::Overlay,
        Self::Container,
        Self::Dialog,
        Self::LoadError,
    ];
}

/// Asynchronous follow-up work scheduled by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Prompt for the microphone and report back with
    /// [`WidgetEvent::PermissionResolved`]
    RequestPermission(PermissionOrigin),
    /// Report [`WidgetEvent::IframeLoadTimedOut`] after `delay_ms`
    ArmLoadTimeout {
        /// Load attempt the timer belongs to
        attempt: u32,
        /// Delay in ms
        delay_ms: u32,
    },
}

/// One side effect of a transition, committed in order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Show or hide a part
    SetVisible(Part, bool),
    /// Fix the page behind the widget (mobile only)
    LockScroll,
    /// Release the page and restore its scroll offset
    UnlockScroll,
    /// Create the conversation iframe unless the container already has one
    EnsureIframe,
    /// Load the same iframe again
    ReloadIframe,
    /// Blocking notice after the microphone was denied
    ShowDeniedNotice,
    /// Send a message to the iframe
    Post(OutboundMessage),
    /// Run asynchronous work
    Schedule(Task),
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    /// Launcher button clicked
    ButtonClicked,
    /// "Allow" in the permission dialog
    AllowClicked,
    /// "Cancel" in the permission dialog
    CancelClicked,
    /// Overlay clicked; `direct_hit` when the target is the overlay itself
    OverlayClicked {
        /// Event target is the overlay element
        direct_hit: bool,
    },
    /// Escape key
    EscapePressed,
    /// Message from the iframe
    Message(InboundMessage),
    /// The iframe's DOM `load` event
    IframeLoaded,
    /// Load timer fired
    IframeLoadTimedOut {
        /// Attempt the timer was armed for
        attempt: u32,
    },
    /// "Retry" in the load-error panel
    RetryClicked,
    /// Initial permission query finished
    PermissionQueried(MicPermissionState),
    /// Permission request finished
    PermissionResolved {
        /// Who asked
        origin: PermissionOrigin,
        /// Effective state after the request
        state: MicPermissionState,
    },
    /// Resize, rotation or visual viewport change re-measured the device
    ViewportChanged(DeviceProfile),
}

impl WidgetEvent {
    /// Short name for logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ButtonClicked => "button-click",
            Self::AllowClicked => "allow-click",
            Self::CancelClicked => "cancel-click",
            Self::OverlayClicked { .. } => "overlay-click",
            Self::EscapePressed => "escape",
            Self::Message(message) => message.kind(),
            Self::IframeLoaded => "iframe-load",
            Self::IframeLoadTimedOut { .. } => "iframe-load-timeout",
            Self::RetryClicked => "retry-click",
            Self::PermissionQueried(_) => "permission-queried",
            Self::PermissionResolved { .. } => "permission-resolved",
            Self::ViewportChanged(_) => "viewport-changed",
        }
    }
}

/// The coordinating core; one instance per mounted widget
#[derive(Debug, Clone)]
pub struct WidgetStateMachine {
    visibility: WidgetVisibility,
    mic: MicPermissionState,
    profile: DeviceProfile,
    iframe: IframeStatus,
    load_attempt: u32,
    load_timeout_ms: u32,
    require_ready_handshake: bool,
    denied_notice_shown: bool,
    dialog_request_pending: bool,
    voice_request_pending: bool,
    last_posted_mic: Option<MicPermissionState>,
    mic_post_deferred: bool,
}

impl WidgetStateMachine {
    /// Create a closed widget
    #[must_use]
    pub fn new(config: &WidgetConfig, profile: DeviceProfile) -> Self {
        Self {
            visibility: WidgetVisibility::Closed,
            mic: MicPermissionState::Unknown,
            profile,
            iframe: IframeStatus::Absent,
            load_attempt: 0,
            load_timeout_ms: config.load_timeout_ms,
            require_ready_handshake: config.require_ready_handshake,
            denied_notice_shown: false,
            dialog_request_pending: false,
            voice_request_pending: false,
            last_posted_mic: None,
            mic_post_deferred: false,
        }
    }

    /// Current visibility
    #[must_use]
    pub const fn visibility(&self) -> WidgetVisibility {
        self.visibility
    }

    /// Current microphone permission
    #[must_use]
    pub const fn mic(&self) -> MicPermissionState {
        self.mic
    }

    /// Current device profile
    #[must_use]
    pub const fn profile(&self) -> DeviceProfile {
        self.profile
    }

    /// Current iframe status
    #[must_use]
    pub const fn iframe(&self) -> IframeStatus {
        self.iframe
    }

    /// Whether the denial notice has been shown
    #[must_use]
    pub const fn denied_notice_shown(&self) -> bool {
        self.denied_notice_shown
    }

    /// Whether a voice-call permission request is outstanding
    #[must_use]
    pub const fn voice_request_pending(&self) -> bool {
        self.voice_request_pending
    }

    /// Feed one event; returns the effects to commit, in order
    pub fn handle(&mut self, event: WidgetEvent) -> Vec<Effect> {
        let from = self.visibility;
        let trigger = event.label();
        let mut effects = Vec::new();

        match event {
            WidgetEvent::ButtonClicked => self.on_button_clicked(&mut effects),
            WidgetEvent::AllowClicked => self.on_allow_clicked(&mut effects),
            WidgetEvent::CancelClicked => {
                if self.visibility == WidgetVisibility::PermissionPrompt {
                    self.open(&mut effects);
                }
            }
            WidgetEvent::OverlayClicked { direct_hit } => {
                if self.visibility == WidgetVisibility::Open && direct_hit && self.profile.is_mobile {
                    self.close(&mut effects);
                }
            }
            WidgetEvent::EscapePressed => {
                if self.visibility.is_visible() {
                    self.close(&mut effects);
                }
            }
            WidgetEvent::Message(message) => self.on_message(message, &mut effects),
            WidgetEvent::IframeLoaded => {
                if !self.require_ready_handshake {
                    self.on_iframe_ready(&mut effects);
                }
            }
            WidgetEvent::IframeLoadTimedOut { attempt } => {
                if attempt == self.load_attempt && self.iframe == IframeStatus::Loading {
                    self.iframe = IframeStatus::Failed;
                    effects.push(Effect::SetVisible(Part::LoadError, true));
                }
            }
            WidgetEvent::RetryClicked => {
                if self.iframe == IframeStatus::Failed {
                    effects.push(Effect::SetVisible(Part::LoadError, false));
                    effects.push(Effect::ReloadIframe);
                    self.start_loading(&mut effects);
                }
            }
            WidgetEvent::PermissionQueried(queried) => {
                self.mic = self.mic.after_query(queried);
            }
            WidgetEvent::PermissionResolved { origin, state } => {
                self.on_permission_resolved(origin, state, &mut effects);
            }
            WidgetEvent::ViewportChanged(profile) => self.on_viewport_changed(profile, &mut effects),
        }

        if self.visibility != from {
            info!(from = from.as_str(), trigger, to = self.visibility.as_str(), "Widget transition");
        } else if effects.is_empty() {
            debug!(trigger, state = from.as_str(), "Event caused no effects");
        }
        effects
    }

    fn on_button_clicked(&mut self, effects: &mut Vec<Effect>) {
        if self.visibility != WidgetVisibility::Closed {
            return;
        }
        effects.push(Effect::LockScroll);
        if self.mic.is_granted() {
            self.open(effects);
        } else {
            effects.push(Effect::SetVisible(Part::Button, false));
            effects.push(Effect::SetVisible(Part::Container, false));
            effects.push(Effect::SetVisible(Part::Dialog, true));
            effects.push(Effect::SetVisible(Part::Overlay, self.profile.is_mobile));
            self.transition_to(WidgetVisibility::PermissionPrompt);
        }
    }

    fn on_allow_clicked(&mut self, effects: &mut Vec<Effect>) {
        if self.visibility != WidgetVisibility::PermissionPrompt {
            return;
        }
        if self.mic.is_granted() {
            // granted meanwhile by a voice-call request
            self.open(effects);
        } else if !self.dialog_request_pending {
            self.dialog_request_pending = true;
            effects.push(Effect::Schedule(Task::RequestPermission(PermissionOrigin::Dialog)));
        }
    }

    fn on_message(&mut self, message: InboundMessage, effects: &mut Vec<Effect>) {
        match message {
            InboundMessage::WidgetClose => {
                if self.visibility == WidgetVisibility::Open {
                    self.close(effects);
                }
            }
            InboundMessage::WidgetReady { timestamp } => {
                debug!(?timestamp, "Conversation iframe ready");
                self.on_iframe_ready(effects);
            }
            InboundMessage::VoiceCallStarting => {
                if !self.mic.is_granted() && !self.voice_request_pending {
                    self.voice_request_pending = true;
                    effects.push(Effect::Schedule(Task::RequestPermission(
                        PermissionOrigin::VoiceCall,
                    )));
                }
            }
            InboundMessage::ButtonClick => {}
        }
    }

    fn on_permission_resolved(
        &mut self,
        origin: PermissionOrigin,
        state: MicPermissionState,
        effects: &mut Vec<Effect>,
    ) {
        self.mic = self.mic.after_request(state);
        match origin {
            PermissionOrigin::VoiceCall => {
                self.voice_request_pending = false;
                self.post_mic_state(effects);
            }
            PermissionOrigin::Dialog => {
                self.dialog_request_pending = false;
                let iframe_loaded = self.iframe == IframeStatus::Loaded;
                if self.visibility == WidgetVisibility::PermissionPrompt {
                    if self.mic == MicPermissionState::Denied && !self.denied_notice_shown {
                        self.denied_notice_shown = true;
                        effects.push(Effect::ShowDeniedNotice);
                    }
                    self.open(effects);
                }
                // an outstanding voice-call request reports the state itself
                if iframe_loaded
                    && !self.voice_request_pending
                    && self.last_posted_mic != Some(self.mic)
                {
                    self.post_mic_state(effects);
                }
            }
        }
    }

    fn on_iframe_ready(&mut self, effects: &mut Vec<Effect>) {
        match self.iframe {
            IframeStatus::Loading => self.iframe = IframeStatus::Loaded,
            IframeStatus::Failed => {
                self.iframe = IframeStatus::Loaded;
                effects.push(Effect::SetVisible(Part::LoadError, false));
            }
            IframeStatus::Absent | IframeStatus::Loaded => return,
        }
        if self.mic_post_deferred {
            self.mic_post_deferred = false;
            if self.last_posted_mic != Some(self.mic) {
                self.post_mic_state(effects);
            }
        }
    }

    fn on_viewport_changed(&mut self, profile: DeviceProfile, effects: &mut Vec<Effect>) {
        let was_mobile = self.profile.is_mobile;
        self.profile = profile;
        if !self.visibility.is_visible() || was_mobile == profile.is_mobile {
            return;
        }
        if profile.is_mobile {
            effects.push(Effect::LockScroll);
        } else {
            effects.push(Effect::UnlockScroll);
        }
        effects.push(Effect::SetVisible(Part::Overlay, profile.is_mobile));
    }

    /// Show the container; the iframe exists before the container is shown
    fn open(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::SetVisible(Part::Button, false));
        effects.push(Effect::SetVisible(Part::Dialog, false));
        effects.push(Effect::EnsureIframe);
        if self.iframe == IframeStatus::Absent {
            self.start_loading(effects);
        }
        effects.push(Effect::SetVisible(Part::Container, true));
        effects.push(Effect::SetVisible(Part::Overlay, self.profile.is_mobile));
        self.transition_to(WidgetVisibility::Open);
    }

    fn close(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::UnlockScroll);
        effects.push(Effect::SetVisible(Part::Container, false));
        effects.push(Effect::SetVisible(Part::Dialog, false));
        effects.push(Effect::SetVisible(Part::Overlay, false));
        effects.push(Effect::SetVisible(Part::Button, true));
        self.transition_to(WidgetVisibility::Closed);
    }

    fn start_loading(&mut self, effects: &mut Vec<Effect>) {
        self.iframe = IframeStatus::Loading;
        self.load_attempt += 1;
        effects.push(Effect::Schedule(Task::ArmLoadTimeout {
            attempt: self.load_attempt,
            delay_ms: self.load_timeout_ms,
        }));
    }

    /// Post the mic state now, or once the iframe has loaded
    fn post_mic_state(&mut self, effects: &mut Vec<Effect>) {
        if self.iframe != IframeStatus::Loaded {
            debug!(state = self.mic.as_str(), "Mic update held until the iframe loads");
            self.mic_post_deferred = true;
            return;
        }
        self.last_posted_mic = Some(self.mic);
        effects.push(Effect::Post(OutboundMessage::MicPermissionUpdate { state: self.mic }));
    }

    fn transition_to(&mut self, to: WidgetVisibility) {
        if VisibilityTransition::is_valid(self.visibility, to) {
            self.visibility = to;
        } else {
            error!(from = self.visibility.as_str(), to = to.as_str(), "Invalid widget transition refused");
        }
    }
}

// ============================================================================
// Arbitrary trait for property testing
// ============================================================================

#[cfg(test)]
impl proptest::arbitrary::Arbitrary for WidgetEvent {
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Self>;

    fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
        use proptest::prelude::*;
        prop_oneof![
            Just(WidgetEvent::ButtonClicked),
            Just(WidgetEvent::AllowClicked),
            Just(WidgetEvent::CancelClicked),
            any::<bool>().prop_map(|direct_hit| WidgetEvent::OverlayClicked { direct_hit }),
            Just(WidgetEvent::EscapePressed),
            Just(WidgetEvent::Message(InboundMessage::WidgetClose)),
            Just(WidgetEvent::Message(InboundMessage::WidgetReady { timestamp: None })),
            Just(WidgetEvent::Message(InboundMessage::VoiceCallStarting)),
            Just(WidgetEvent::Message(InboundMessage::ButtonClick)),
            Just(WidgetEvent::IframeLoaded),
            (0u32..4).prop_map(|attempt| WidgetEvent::IframeLoadTimedOut { attempt }),
            Just(WidgetEvent::RetryClicked),
            any::<MicPermissionState>().prop_map(WidgetEvent::PermissionQueried),
            (any::<bool>(), any::<MicPermissionState>()).prop_map(|(dialog, state)| {
                WidgetEvent::PermissionResolved {
                    origin: if dialog {
                        PermissionOrigin::Dialog
                    } else {
                        PermissionOrigin::VoiceCall
                    },
                    state,
                }
            }),
            any::<bool>().prop_map(|is_mobile| {
                WidgetEvent::ViewportChanged(DeviceProfile {
                    is_mobile,
                    is_ios: false,
                    viewport_height: 700.0,
                })
            }),
        ]
        .boxed()
    }
}

//! Widget Invariant Tests
//!
//! Property-based checks over arbitrary event sequences: foreground
//! exclusivity, scroll restoration and iframe uniqueness.

mod common;

use chat_embed::bridge::InboundMessage;
use chat_embed::permission::MicPermissionState;
use chat_embed::state::{Part, WidgetEvent, WidgetVisibility};
use chat_embed::viewport::DeviceProfile;
use common::Harness;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// One step a user, the iframe or the browser can take
#[derive(Debug, Clone)]
enum Step {
    Event(WidgetEvent),
    ResolvePermissions,
    FireTimeouts,
    Rotate(bool),
}

fn user_event() -> impl Strategy<Value = WidgetEvent> {
    prop_oneof![
        Just(WidgetEvent::ButtonClicked),
        Just(WidgetEvent::AllowClicked),
        Just(WidgetEvent::CancelClicked),
        any::<bool>().prop_map(|direct_hit| WidgetEvent::OverlayClicked { direct_hit }),
        Just(WidgetEvent::EscapePressed),
        Just(WidgetEvent::RetryClicked),
    ]
}

fn iframe_event() -> impl Strategy<Value = WidgetEvent> {
    prop_oneof![
        Just(WidgetEvent::Message(InboundMessage::WidgetClose)),
        Just(WidgetEvent::Message(InboundMessage::WidgetReady { timestamp: None })),
        Just(WidgetEvent::Message(InboundMessage::VoiceCallStarting)),
        Just(WidgetEvent::Message(InboundMessage::ButtonClick)),
        Just(WidgetEvent::IframeLoaded),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => user_event().prop_map(Step::Event),
        2 => iframe_event().prop_map(Step::Event),
        1 => Just(Step::ResolvePermissions),
        1 => Just(Step::FireTimeouts),
        1 => any::<bool>().prop_map(Step::Rotate),
    ]
}

/// Steps that never close the widget
fn non_closing_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Event(WidgetEvent::ButtonClicked)),
        Just(Step::Event(WidgetEvent::OverlayClicked { direct_hit: false })),
        Just(Step::Event(WidgetEvent::RetryClicked)),
        Just(Step::Event(WidgetEvent::IframeLoaded)),
        Just(Step::Event(WidgetEvent::Message(InboundMessage::ButtonClick))),
        Just(Step::Event(WidgetEvent::Message(InboundMessage::VoiceCallStarting))),
        Just(Step::ResolvePermissions),
        Just(Step::FireTimeouts),
    ]
}

fn apply(h: &mut Harness, step: Step) {
    match step {
        Step::Event(event) => h.send(event),
        Step::ResolvePermissions => h.resolve_permissions(),
        Step::FireTimeouts => h.fire_timeouts(),
        Step::Rotate(mobile) => {
            let profile = if mobile {
                DeviceProfile::mobile(640.0)
            } else {
                DeviceProfile::desktop(640.0)
            };
            h.page.profile = profile;
            h.send(WidgetEvent::ViewportChanged(profile));
        }
    }
}

fn mic_strategy() -> impl Strategy<Value = Option<MicPermissionState>> {
    prop_oneof![
        Just(None),
        Just(Some(MicPermissionState::Unknown)),
        Just(Some(MicPermissionState::Granted)),
        Just(Some(MicPermissionState::Denied)),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: exactly one of button/container/dialog is visible, and the
    /// overlay only shows with the container or dialog on mobile
    #[test]
    fn prop_exactly_one_foreground_element(
        mobile: bool,
        query in mic_strategy(),
        grant: bool,
        steps in proptest::collection::vec(step(), 0..80)
    ) {
        let profile = if mobile { DeviceProfile::mobile(700.0) } else { DeviceProfile::desktop(900.0) };
        let mut h = Harness::new(profile, query, grant);
        for step in steps {
            apply(&mut h, step);
            prop_assert_eq!(h.page.foreground().len(), 1);
            let expected = match h.machine.visibility() {
                WidgetVisibility::Closed => Part::Button,
                WidgetVisibility::PermissionPrompt => Part::Dialog,
                WidgetVisibility::Open => Part::Container,
            };
            prop_assert_eq!(h.page.foreground(), vec![expected]);
            if h.page.is_visible(Part::Overlay) {
                prop_assert!(h.machine.profile().is_mobile);
                prop_assert!(!h.page.is_visible(Part::Button));
            }
        }
    }

    /// Property: the container never holds more than one iframe, and an open
    /// widget always has one
    #[test]
    fn prop_single_iframe(
        query in mic_strategy(),
        grant: bool,
        steps in proptest::collection::vec(step(), 0..80)
    ) {
        let mut h = Harness::new(DeviceProfile::desktop(900.0), query, grant);
        for step in steps {
            apply(&mut h, step);
            prop_assert!(h.page.iframes.len() <= 1);
            if h.machine.visibility() == WidgetVisibility::Open {
                prop_assert_eq!(h.page.iframes.len(), 1);
            }
        }
    }

    /// Property: closing restores the scroll offset from before opening,
    /// whatever happened in between
    #[test]
    fn prop_close_restores_scroll(
        scroll_y in 0.0f64..50_000.0,
        grant: bool,
        middle in proptest::collection::vec(non_closing_step(), 0..30)
    ) {
        let mut h = Harness::new(DeviceProfile::mobile(700.0), None, grant);
        h.page.scroll_to(scroll_y);
        h.send(WidgetEvent::ButtonClicked);
        prop_assert!(h.page.body_locked());
        for step in middle {
            apply(&mut h, step);
        }
        h.send(WidgetEvent::EscapePressed);
        prop_assert_eq!(h.machine.visibility(), WidgetVisibility::Closed);
        prop_assert!(!h.page.body_locked());
        prop_assert_eq!(h.page.scroll_y, scroll_y);
    }

    /// Property: with the microphone granted, any number of launcher clicks
    /// ends open with the iframe present
    #[test]
    fn prop_granted_clicks_end_open(clicks in 1usize..20, mobile: bool) {
        let profile = if mobile { DeviceProfile::mobile(700.0) } else { DeviceProfile::desktop(900.0) };
        let mut h = Harness::new(profile, Some(MicPermissionState::Granted), true);
        for _ in 0..clicks {
            h.send(WidgetEvent::ButtonClicked);
        }
        prop_assert_eq!(h.machine.visibility(), WidgetVisibility::Open);
        prop_assert_eq!(h.page.iframes.len(), 1);
        prop_assert_eq!(h.prompts(), 0);
    }

    /// Property: at most one outstanding request per origin (dialog, voice call)
    #[test]
    fn prop_no_duplicate_prompts(
        query in mic_strategy(),
        steps in proptest::collection::vec(step(), 0..60)
    ) {
        let mut h = Harness::new(DeviceProfile::desktop(900.0), query, false);
        for step in steps {
            apply(&mut h, step);
            prop_assert!(h.pending_requests() <= 2);
        }
    }
}

//! Microphone permission
//!
//! Wraps the browser's permission query and `getUserMedia` prompt behind
//! [`PermissionApi`] and tracks the tri-state result.
//!
//! Rules:
//! - A query result is only taken while the state is still `Unknown`.
//! - Nothing regresses `Granted`.
//! - Every failure (unsupported API, rejection) becomes a state value;
//!   callers never see an error.
//! - Concurrent requests share one in-flight browser prompt.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

use crate::error::{EmbedError, EmbedResult};

/// Microphone permission as seen by the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicPermissionState {
    /// Not yet known, or the browser would prompt
    #[default]
    Unknown,
    /// Microphone may be used
    Granted,
    /// User or policy refused
    Denied,
}

impl MicPermissionState {
    /// Map a Permissions API state string (`granted`, `denied`, `prompt`)
    #[must_use]
    pub fn from_query_str(value: &str) -> Self {
        match value {
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            _ => Self::Unknown,
        }
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    /// Whether voice features may start without prompting
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// State after an initial query returned `queried`
    #[must_use]
    pub const fn after_query(self, queried: Self) -> Self {
        match self {
            Self::Unknown => queried,
            current => current,
        }
    }

    /// State after an explicit request resolved to `outcome`
    #[must_use]
    pub const fn after_request(self, outcome: Self) -> Self {
        match (self, outcome) {
            (Self::Granted, _) => Self::Granted,
            (_, outcome) => outcome,
        }
    }
}

/// Host browser permission capabilities
#[allow(async_fn_in_trait)]
pub trait PermissionApi {
    /// Query the current microphone permission without prompting
    ///
    /// # Errors
    ///
    /// Returns an error if the API is missing or the query rejects.
    async fn query(&self) -> EmbedResult<MicPermissionState>;

    /// Show the native prompt by opening (and immediately releasing) an
    /// audio stream
    ///
    /// # Errors
    ///
    /// Returns an error if the user or the browser refuses.
    async fn request(&self) -> EmbedResult<()>;
}

type PendingRequest = Shared<LocalBoxFuture<'static, MicPermissionState>>;

/// Tracks microphone permission for one widget instance
pub struct PermissionController<A: PermissionApi + 'static> {
    api: Rc<A>,
    state: Cell<MicPermissionState>,
    in_flight: RefCell<Option<PendingRequest>>,
    requests_issued: Cell<u32>,
}

impl<A: PermissionApi + 'static> PermissionController<A> {
    /// Create a controller in the `Unknown` state
    pub fn new(api: A) -> Self {
        Self {
            api: Rc::new(api),
            state: Cell::new(MicPermissionState::Unknown),
            in_flight: RefCell::new(None),
            requests_issued: Cell::new(0),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> MicPermissionState {
        self.state.get()
    }

    /// Whether a browser prompt is pending
    #[must_use]
    pub fn is_requesting(&self) -> bool {
        self.in_flight.borrow().is_some()
    }

    /// Number of browser prompts actually started
    #[must_use]
    pub fn requests_issued(&self) -> u32 {
        self.requests_issued.get()
    }

    /// Query the browser; failures degrade to `Unknown`
    pub async fn query(&self) -> MicPermissionState {
        let queried = match self.api.query().await {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "Permission query unavailable, treating as unknown");
                MicPermissionState::Unknown
            }
        };
        let next = self.state.get().after_query(queried);
        self.state.set(next);
        info!(queried = queried.as_str(), state = next.as_str(), "Microphone permission queried");
        next
    }

    /// Prompt for the microphone; must originate from a user gesture
    ///
    /// Callers arriving while a prompt is pending await the same outcome.
    pub async fn request(&self) -> MicPermissionState {
        let pending = {
            let mut slot = self.in_flight.borrow_mut();
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let api = Rc::clone(&self.api);
                    self.requests_issued.set(self.requests_issued.get() + 1);
                    let pending = async move {
                        match api.request().await {
                            Ok(()) => MicPermissionState::Granted,
                            Err(e) => {
                                warn!(error = %e, "Microphone request refused");
                                MicPermissionState::Denied
                            }
                        }
                    }
                    .boxed_local()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;
        {
            let mut slot = self.in_flight.borrow_mut();
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&pending)) {
                *slot = None;
            }
        }

        let next = self.state.get().after_request(outcome);
        self.state.set(next);
        info!(outcome = outcome.as_str(), state = next.as_str(), "Microphone request resolved");
        next
    }
}

/// [`PermissionApi`] backed by `navigator.permissions` and `navigator.mediaDevices`
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserPermissionApi;

impl PermissionApi for BrowserPermissionApi {
    async fn query(&self) -> EmbedResult<MicPermissionState> {
        let window = web_sys::window().ok_or(EmbedError::MissingGlobal("window"))?;
        let permissions = window.navigator().permissions()?;

        let descriptor = js_sys::Object::new();
        js_sys::Reflect::set(&descriptor, &"name".into(), &"microphone".into())?;

        // Firefox and older Safari reject the "microphone" name
        let status = JsFuture::from(permissions.query(&descriptor)?)
            .await
            .map_err(|e| EmbedError::Permission(format!("query rejected: {e:?}")))?;
        let status: web_sys::PermissionStatus = status.dyn_into()?;

        Ok(match status.state() {
            web_sys::PermissionState::Granted => MicPermissionState::Granted,
            web_sys::PermissionState::Denied => MicPermissionState::Denied,
            _ => MicPermissionState::Unknown,
        })
    }

    async fn request(&self) -> EmbedResult<()> {
        let window = web_sys::window().ok_or(EmbedError::MissingGlobal("window"))?;
        let media_devices = window.navigator().media_devices()?;

        let constraints = web_sys::MediaStreamConstraints::new();
        constraints.set_audio(&JsValue::TRUE);
        constraints.set_video(&JsValue::FALSE);

        let promise = media_devices.get_user_media_with_constraints(&constraints)?;
        let stream = JsFuture::from(promise)
            .await
            .map_err(|e| EmbedError::Permission(format!("getUserMedia rejected: {e:?}")))?;
        let stream: web_sys::MediaStream = stream.dyn_into()?;

        stop_tracks(&stream);
        Ok(())
    }
}

/// Stop every track so the browser's recording indicator goes away
fn stop_tracks(stream: &web_sys::MediaStream) {
    let tracks = stream.get_tracks();
    for i in 0..tracks.length() {
        if let Some(track) = tracks.get(i).dyn_ref::<web_sys::MediaStreamTrack>() {
            track.stop();
        }
    }
}

#[cfg(test)]
impl proptest::arbitrary::Arbitrary for MicPermissionState {
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Self>;

    fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
        use proptest::prelude::*;
        prop_oneof![
            Just(MicPermissionState::Unknown),
            Just(MicPermissionState::Granted),
            Just(MicPermissionState::Denied),
        ]
        .boxed()
    }
}

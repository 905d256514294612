//! Applying state machine effects to a page

use tracing::debug;

use crate::bridge::OutboundMessage;
use crate::state::{Effect, Part, Task};

/// Everything a transition may do to the page
///
/// Implemented by [`crate::dom::DomSurface`] in the browser and by fakes in
/// tests. Methods are infallible: implementations log and carry on.
pub trait WidgetSurface {
    /// Show or hide a part
    fn set_visible(&mut self, part: Part, visible: bool);

    /// Create the conversation iframe if the container has none; returns
    /// whether one was created
    fn ensure_iframe(&mut self) -> bool;

    /// Reload the existing iframe in place
    fn reload_iframe(&mut self);

    /// Fix the page (no-op on desktop or when already locked)
    fn lock_scroll(&mut self);

    /// Release the page and restore the scroll offset (no-op when unlocked)
    fn unlock_scroll(&mut self);

    /// Blocking notice that the microphone was denied
    fn show_denied_notice(&mut self);

    /// Post to the iframe; returns whether it was delivered
    fn post(&mut self, message: &OutboundMessage) -> bool;
}

/// Apply `effects` in order; scheduled tasks are handed back to the caller
pub fn commit<S: WidgetSurface + ?Sized>(surface: &mut S, effects: Vec<Effect>) -> Vec<Task> {
    let mut tasks = Vec::new();
    for effect in effects {
        match effect {
            Effect::SetVisible(part, visible) => surface.set_visible(part, visible),
            Effect::LockScroll => surface.lock_scroll(),
            Effect::UnlockScroll => surface.unlock_scroll(),
            Effect::EnsureIframe => {
                if surface.ensure_iframe() {
                    debug!("Conversation iframe created");
                }
            }
            Effect::ReloadIframe => surface.reload_iframe(),
            Effect::ShowDeniedNotice => surface.show_denied_notice(),
            Effect::Post(message) => {
                surface.post(&message);
            }
            Effect::Schedule(task) => tasks.push(task),
        }
    }
    tasks
}

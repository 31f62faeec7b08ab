use std::sync::Arc;

use tracing::debug;

use super::{DeferredAction, DispatchMode, RecorderCore};
use crate::events::InteractionType;
use crate::page::{anchor_href, EventHandler, PageEvent};

/// Capture-phase document listener that defers anchor navigation until the
/// click has been captured. Covers anchors the page never attached a click
/// listener to.
pub struct AnchorCaptureHandler {
    core: Arc<RecorderCore>,
}

impl AnchorCaptureHandler {
    pub(crate) fn new(core: Arc<RecorderCore>) -> Self {
        Self { core }
    }
}

impl EventHandler for AnchorCaptureHandler {
    fn handle_event(&self, event: &PageEvent) {
        let core = &self.core;
        let Some(page) = core.page() else {
            return;
        };
        let target = event.target();

        if core.config.dispatch_mode == DispatchMode::Exclusive
            && page.has_intercepted_listener_on_path(target, "click")
        {
            debug!(%target, "Wrapped listener on click path, leaving capture to it");
            return;
        }

        // Only anchor clicks this handler defers may take the debounce slot.
        let Some(href) = anchor_href(&page.document(), target) else {
            return;
        };
        if !core.should_process() {
            return;
        }
        event.prevent_default();
        event.stop_propagation();
        let record = core.build_record(&page, InteractionType::CaptureAnchor, target);
        debug!(%target, %href, "Deferring anchor navigation for capture");
        core.defer(&page, record, DeferredAction::Navigate(href));
    }
}

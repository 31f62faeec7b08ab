use std::sync::Arc;

use tracing::debug;

use super::{DeferredAction, RecorderCore};
use crate::events::InteractionType;
use crate::page::{anchor_href, EventHandler, EventListener, PageEvent, RegistrationInterceptor};

/// Wraps every `click` listener registered on the page so the click is
/// captured before the listener (or the navigation it triggers) runs.
/// Other event types pass through untouched.
///
/// Wrappers share the recorder's debounce guard. When several wrapped
/// listeners sit on one click path, only the first to fire captures and
/// runs its listener; the rest are debounced and their listeners do not
/// run for that click.
pub struct ClickInterceptor {
    core: Arc<RecorderCore>,
}

impl ClickInterceptor {
    pub(crate) fn new(core: Arc<RecorderCore>) -> Self {
        Self { core }
    }
}

impl RegistrationInterceptor for ClickInterceptor {
    fn intercept(&self, event_type: &str, listener: EventListener) -> EventListener {
        if event_type != "click" {
            return listener;
        }
        EventListener::handler(Arc::new(WrappedClickListener {
            original: listener,
            core: Arc::clone(&self.core),
        }))
    }
}

struct WrappedClickListener {
    original: EventListener,
    core: Arc<RecorderCore>,
}

impl EventHandler for WrappedClickListener {
    fn handle_event(&self, event: &PageEvent) {
        let core = &self.core;
        let Some(page) = core.page() else {
            self.original.invoke(event);
            return;
        };
        let target = event.target();

        if core.is_from_popup(&page, target) {
            debug!(%target, "Click inside recorder overlay, passing through");
            self.original.invoke(event);
            return;
        }

        if !core.should_process() {
            return;
        }

        let href = anchor_href(&page.document(), target);
        match href {
            Some(href) => {
                event.prevent_default();
                event.stop_propagation();
                let record = core.build_record(&page, InteractionType::WrappedAnchor, target);
                debug!(%target, %href, "Deferring anchor navigation for capture");
                core.defer(&page, record, DeferredAction::Navigate(href));
            }
            None => {
                let record = core.build_record(&page, InteractionType::WrappedListener, target);
                core.defer(
                    &page,
                    record,
                    DeferredAction::Invoke(self.original.clone(), event.clone()),
                );
            }
        }
    }
}

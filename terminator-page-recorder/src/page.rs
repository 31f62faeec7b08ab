//! The host page: document, location, message channel and listeners.
//!
//! Listener registration goes through [`Page::add_event_listener`], which
//! hands every registration to the installed [`RegistrationInterceptor`].
//! This is the single hook point where click listeners get wrapped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::channel::PageChannel;
use crate::dom::{Document, ElementId};
use crate::{PageRecorderError, Result};

mod event;
mod href;

pub use event::{
    EventHandler, EventListener, EventTarget, ListenerOptions, PageEvent, RegistrationInterceptor,
};
pub use href::{anchor_href, resolve_href};

#[derive(Debug, Clone)]
struct Registration {
    original: EventListener,
    effective: EventListener,
    capture: bool,
    intercepted: bool,
}

#[derive(Debug, Default)]
struct Location {
    href: String,
    history: Vec<String>,
}

type ListenerMap = HashMap<(EventTarget, String), Vec<Registration>>;

pub struct Page {
    document: RwLock<Document>,
    location: Mutex<Location>,
    channel: PageChannel,
    listeners: Mutex<ListenerMap>,
    interceptor: OnceLock<Arc<dyn RegistrationInterceptor>>,
}

impl Page {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Self::with_channel(url, PageChannel::default())
    }

    pub fn with_channel(url: impl Into<String>, channel: PageChannel) -> Arc<Self> {
        Arc::new(Self {
            document: RwLock::new(Document::new()),
            location: Mutex::new(Location {
                href: url.into(),
                history: Vec::new(),
            }),
            channel,
            listeners: Mutex::new(HashMap::new()),
            interceptor: OnceLock::new(),
        })
    }

    pub fn document(&self) -> RwLockReadGuard<'_, Document> {
        self.document.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn document_mut(&self) -> RwLockWriteGuard<'_, Document> {
        self.document.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn channel(&self) -> &PageChannel {
        &self.channel
    }

    pub fn url(&self) -> String {
        self.location().href.clone()
    }

    /// Assigns the location, resolving `href` against the current URL.
    pub fn navigate(&self, href: &str) {
        let mut location = self.location();
        let resolved = resolve_href(&location.href, href);
        info!(from = %location.href, to = %resolved, "Navigating");
        location.history.push(resolved.clone());
        location.href = resolved;
    }

    /// Every URL navigated to, oldest first.
    pub fn navigation_history(&self) -> Vec<String> {
        self.location().history.clone()
    }

    /// Installs the registration hook. Only registrations made afterwards
    /// are affected.
    pub fn install_interceptor(&self, interceptor: Arc<dyn RegistrationInterceptor>) -> Result<()> {
        self.interceptor
            .set(interceptor)
            .map_err(|_| PageRecorderError::AlreadyInstalled)
    }

    pub fn has_interceptor(&self) -> bool {
        self.interceptor.get().is_some()
    }

    /// Registers `listener`, routed through the installed interceptor.
    ///
    /// Registering the same listener again for the same target, type and
    /// phase is a no-op.
    pub fn add_event_listener(
        &self,
        target: EventTarget,
        event_type: &str,
        listener: EventListener,
        options: ListenerOptions,
    ) {
        let interceptor = self.interceptor.get().cloned();
        self.register(target, event_type, listener, options, interceptor.as_deref());
    }

    /// Registers `listener` without consulting the interceptor.
    pub fn add_native_event_listener(
        &self,
        target: EventTarget,
        event_type: &str,
        listener: EventListener,
        options: ListenerOptions,
    ) {
        self.register(target, event_type, listener, options, None);
    }

    /// Removes a registration by the listener originally passed in, even if
    /// what was registered is a wrapper around it.
    pub fn remove_event_listener(
        &self,
        target: EventTarget,
        event_type: &str,
        listener: &EventListener,
        options: ListenerOptions,
    ) -> bool {
        let mut listeners = self.listeners();
        let Some(registrations) = listeners.get_mut(&(target, event_type.to_string())) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| !(r.capture == options.capture && r.original.same_listener(listener)));
        before != registrations.len()
    }

    pub fn listener_count(&self, target: EventTarget, event_type: &str) -> usize {
        self.listeners()
            .get(&(target, event_type.to_string()))
            .map_or(0, Vec::len)
    }

    /// Whether an intercepted `event_type` listener sits on `target` or on
    /// any of its ancestors, or in the document's bubble phase.
    pub fn has_intercepted_listener_on_path(&self, target: ElementId, event_type: &str) -> bool {
        let path: Vec<EventTarget> = {
            let doc = self.document();
            let path = std::iter::once(target)
                .chain(doc.ancestors(target))
                .map(EventTarget::Element)
                .collect();
            path
        };
        let listeners = self.listeners();
        let intercepted_on = |t: EventTarget, bubble_only: bool| {
            listeners
                .get(&(t, event_type.to_string()))
                .is_some_and(|regs| {
                    regs.iter()
                        .any(|r| r.intercepted && !(bubble_only && r.capture))
                })
        };
        path.into_iter().any(|t| intercepted_on(t, false)) || intercepted_on(EventTarget::Document, true)
    }

    /// Dispatches a click on `target` through capture, target and bubble
    /// phases, then runs the default action unless it was prevented.
    pub fn dispatch_click(&self, target: ElementId) -> Result<PageEvent> {
        let ancestors: Vec<ElementId> = {
            let doc = self.document();
            if !doc.contains(target) {
                return Err(PageRecorderError::ElementNotFound(target.to_string()));
            }
            let ancestors = doc.ancestors(target).collect();
            ancestors
        };
        let event = PageEvent::new("click", target);
        debug!(%target, "Dispatching click");

        let mut stages: Vec<(EventTarget, Option<bool>)> = Vec::new();
        stages.push((EventTarget::Document, Some(true)));
        stages.extend(ancestors.iter().rev().map(|a| (EventTarget::Element(*a), Some(true))));
        stages.push((EventTarget::Element(target), None));
        stages.extend(ancestors.iter().map(|a| (EventTarget::Element(*a), Some(false))));
        stages.push((EventTarget::Document, Some(false)));

        for (stage_target, capture) in stages {
            for listener in self.listeners_for(stage_target, "click", capture) {
                listener.invoke(&event);
            }
            if event.propagation_stopped() {
                break;
            }
        }

        if !event.default_prevented() {
            let href = anchor_href(&self.document(), target);
            if let Some(href) = href {
                self.navigate(&href);
            }
        }
        Ok(event)
    }

    fn register(
        &self,
        target: EventTarget,
        event_type: &str,
        listener: EventListener,
        options: ListenerOptions,
        interceptor: Option<&dyn RegistrationInterceptor>,
    ) {
        let effective = match interceptor {
            Some(interceptor) => interceptor.intercept(event_type, listener.clone()),
            None => listener.clone(),
        };
        let intercepted = !effective.same_listener(&listener);

        let mut listeners = self.listeners();
        let registrations = listeners
            .entry((target, event_type.to_string()))
            .or_default();
        if registrations
            .iter()
            .any(|r| r.capture == options.capture && r.original.same_listener(&listener))
        {
            return;
        }
        debug!(?target, event_type, capture = options.capture, intercepted, "Registered listener");
        registrations.push(Registration {
            original: listener,
            effective,
            capture: options.capture,
            intercepted,
        });
    }

    /// Snapshot of listeners for one stage; `None` means both phases, in
    /// registration order (the at-target phase).
    fn listeners_for(
        &self,
        target: EventTarget,
        event_type: &str,
        capture: Option<bool>,
    ) -> Vec<EventListener> {
        self.listeners()
            .get(&(target, event_type.to_string()))
            .map(|regs| {
                regs.iter()
                    .filter(|r| capture.map_or(true, |c| r.capture == c))
                    .map(|r| r.effective.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn location(&self) -> std::sync::MutexGuard<'_, Location> {
        self.location.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, ListenerMap> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder_log() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> EventListener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &'static str| {
            let log = log_clone.clone();
            EventListener::function(move |_| log.lock().unwrap().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_dispatch_order() {
        let page = Page::new("https://example.com/");
        let (outer, inner) = {
            let mut doc = page.document_mut();
            let body = doc.body();
            let outer = doc.append_element(body, "div", &[]).unwrap();
            let inner = doc.append_element(outer, "button", &[]).unwrap();
            (outer, inner)
        };
        let (log, make) = recorder_log();
        page.add_event_listener(EventTarget::Document, "click", make("doc-bubble"), ListenerOptions::default());
        page.add_event_listener(EventTarget::Element(outer), "click", make("outer-bubble"), ListenerOptions::default());
        page.add_event_listener(EventTarget::Element(inner), "click", make("target"), ListenerOptions::default());
        page.add_event_listener(EventTarget::Element(outer), "click", make("outer-capture"), ListenerOptions::capture());
        page.add_event_listener(EventTarget::Document, "click", make("doc-capture"), ListenerOptions::capture());

        page.dispatch_click(inner).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["doc-capture", "outer-capture", "target", "outer-bubble", "doc-bubble"]
        );
    }

    #[test]
    fn test_stop_propagation_halts_later_targets() {
        let page = Page::new("https://example.com/");
        let button = {
            let mut doc = page.document_mut();
            let body = doc.body();
            doc.append_element(body, "button", &[]).unwrap()
        };
        let (log, make) = recorder_log();
        page.add_event_listener(
            EventTarget::Document,
            "click",
            EventListener::function(|e| e.stop_propagation()),
            ListenerOptions::capture(),
        );
        page.add_event_listener(EventTarget::Element(button), "click", make("target"), ListenerOptions::default());

        page.dispatch_click(button).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_anchor_default_action_navigates() {
        let page = Page::new("https://example.com/start");
        let span = {
            let mut doc = page.document_mut();
            let body = doc.body();
            let a = doc.append_element(body, "a", &[("href", "/x")]).unwrap();
            doc.append_element(a, "span", &[]).unwrap()
        };

        page.dispatch_click(span).unwrap();
        assert_eq!(page.navigation_history(), vec!["https://example.com/x"]);
        assert_eq!(page.url(), "https://example.com/x");
    }

    #[test]
    fn test_prevented_default_does_not_navigate() {
        let page = Page::new("https://example.com/");
        let a = {
            let mut doc = page.document_mut();
            let body = doc.body();
            doc.append_element(body, "a", &[("href", "/x")]).unwrap()
        };
        page.add_event_listener(
            EventTarget::Element(a),
            "click",
            EventListener::function(|e| e.prevent_default()),
            ListenerOptions::default(),
        );

        let event = page.dispatch_click(a).unwrap();
        assert!(event.default_prevented());
        assert!(page.navigation_history().is_empty());
    }

    struct CountingWrapper(Arc<AtomicUsize>);

    impl RegistrationInterceptor for CountingWrapper {
        fn intercept(&self, event_type: &str, listener: EventListener) -> EventListener {
            if event_type != "click" {
                return listener;
            }
            let calls = self.0.clone();
            EventListener::function(move |e| {
                calls.fetch_add(1, Ordering::SeqCst);
                listener.invoke(e);
            })
        }
    }

    #[test]
    fn test_interceptor_wraps_future_registrations_only() {
        let page = Page::new("https://example.com/");
        let button = {
            let mut doc = page.document_mut();
            let body = doc.body();
            doc.append_element(body, "button", &[]).unwrap()
        };
        let (log, make) = recorder_log();
        let target = EventTarget::Element(button);
        page.add_event_listener(target, "click", make("before"), ListenerOptions::default());

        let wraps = Arc::new(AtomicUsize::new(0));
        page.install_interceptor(Arc::new(CountingWrapper(wraps.clone())))
            .unwrap();
        assert!(matches!(
            page.install_interceptor(Arc::new(CountingWrapper(wraps.clone()))),
            Err(PageRecorderError::AlreadyInstalled)
        ));

        page.add_event_listener(target, "click", make("after"), ListenerOptions::default());
        page.add_event_listener(target, "keydown", make("key"), ListenerOptions::default());
        assert!(page.has_intercepted_listener_on_path(button, "click"));
        assert!(!page.has_intercepted_listener_on_path(button, "keydown"));

        page.dispatch_click(button).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
        assert_eq!(wraps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_by_original_identity() {
        let page = Page::new("https://example.com/");
        let button = {
            let mut doc = page.document_mut();
            let body = doc.body();
            doc.append_element(body, "button", &[]).unwrap()
        };
        page.install_interceptor(Arc::new(CountingWrapper(Arc::new(AtomicUsize::new(0)))))
            .unwrap();
        let target = EventTarget::Element(button);
        let listener = EventListener::function(|_| {});

        page.add_event_listener(target, "click", listener.clone(), ListenerOptions::default());
        page.add_event_listener(target, "click", listener.clone(), ListenerOptions::default());
        assert_eq!(page.listener_count(target, "click"), 1);

        assert!(page.remove_event_listener(target, "click", &listener, ListenerOptions::default()));
        assert_eq!(page.listener_count(target, "click"), 0);
        assert!(!page.remove_event_listener(target, "click", &listener, ListenerOptions::default()));
    }
}

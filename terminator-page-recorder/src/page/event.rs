use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dom::ElementId;

/// Where a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Document,
    Element(ElementId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
}

impl ListenerOptions {
    pub fn capture() -> Self {
        Self { capture: true }
    }
}

#[derive(Debug, Default)]
struct EventState {
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
}

/// A dispatched event. Clones share prevent-default and propagation state.
#[derive(Debug, Clone)]
pub struct PageEvent {
    event_type: String,
    target: ElementId,
    state: Arc<EventState>,
}

impl PageEvent {
    pub fn new(event_type: impl Into<String>, target: ElementId) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            state: Arc::default(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The element the user actually clicked.
    pub fn target(&self) -> ElementId {
        self.target
    }

    pub fn prevent_default(&self) {
        self.state.default_prevented.store(true, Ordering::SeqCst);
    }

    pub fn default_prevented(&self) -> bool {
        self.state.default_prevented.load(Ordering::SeqCst)
    }

    pub fn stop_propagation(&self) {
        self.state.propagation_stopped.store(true, Ordering::SeqCst);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.state.propagation_stopped.load(Ordering::SeqCst)
    }
}

/// Object-style listener, the `handleEvent` calling convention.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &PageEvent);
}

type ListenerFn = dyn Fn(&PageEvent) + Send + Sync;

/// A registered listener in either calling convention.
///
/// Identity is the identity of the shared allocation, so clones of one
/// listener compare equal under [`EventListener::same_listener`].
#[derive(Clone)]
pub enum EventListener {
    Function(Arc<ListenerFn>),
    Handler(Arc<dyn EventHandler>),
}

impl EventListener {
    pub fn function(f: impl Fn(&PageEvent) + Send + Sync + 'static) -> Self {
        EventListener::Function(Arc::new(f))
    }

    pub fn handler(handler: Arc<dyn EventHandler>) -> Self {
        EventListener::Handler(handler)
    }

    /// Calls the listener the way it expects to be called.
    pub fn invoke(&self, event: &PageEvent) {
        match self {
            EventListener::Function(f) => f(event),
            EventListener::Handler(h) => h.handle_event(event),
        }
    }

    pub fn same_listener(&self, other: &EventListener) -> bool {
        self.identity() == other.identity()
    }

    fn identity(&self) -> *const () {
        match self {
            EventListener::Function(f) => Arc::as_ptr(f) as *const (),
            EventListener::Handler(h) => Arc::as_ptr(h) as *const (),
        }
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            EventListener::Function(_) => "Function",
            EventListener::Handler(_) => "Handler",
        };
        write!(f, "EventListener::{kind}({:p})", self.identity())
    }
}

/// Hook consulted on every listener registration.
///
/// Returns the listener to actually register: either `listener` itself or a
/// composed listener that eventually calls it.
pub trait RegistrationInterceptor: Send + Sync {
    fn intercept(&self, event_type: &str, listener: EventListener) -> EventListener;
}

//! In-page click recording for browser interaction traces
//!
//! This crate intercepts clicks inside a web page, captures a structured
//! record of each interaction (target element, selector, page snapshot) and
//! coordinates with an external capture pipeline (screenshot + persistence)
//! over the page's message channel before letting the page's own behavior
//! (listeners, navigation) proceed. Capture is fail-open: a failed or
//! timed-out handshake never blocks the deferred action.

pub mod channel;
pub mod debounce;
pub mod dom;
pub mod error;
pub mod events;
pub mod handshake;
pub mod interaction;
pub mod logging;
pub mod page;
pub mod recorder;
pub mod selector;

pub use channel::PageChannel;
pub use debounce::DebounceGuard;
pub use dom::{Document, ElementId};
pub use error::*;
pub use events::{InteractionRecord, InteractionType, PageMessage, TargetInfo};
pub use handshake::{
    await_completion, CaptureCoordinator, HandshakePhase, HandshakeReport, PendingWait,
    PhaseOutcome,
};
pub use interaction::{find_clickable_id, CorrelationClock, InteractionSerializer};
pub use page::{
    EventHandler, EventListener, EventTarget, ListenerOptions, Page, PageEvent,
    RegistrationInterceptor,
};
pub use recorder::{
    CapturedInteraction, DispatchMode, OverlayDetector, OverlayRootDetector, PageRecorder,
    PageRecorderConfig,
};
pub use selector::{build_selector, build_snapshot_id};

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};

use crate::debounce::DebounceGuard;
use crate::dom::{Document, ElementId};
use crate::events::{InteractionRecord, InteractionType};
use crate::handshake::{CaptureCoordinator, HandshakeReport};
use crate::interaction::{CorrelationClock, InteractionSerializer};
use crate::page::{EventListener, EventTarget, ListenerOptions, Page, PageEvent};
use crate::selector::build_selector;
use crate::Result;

mod anchor_handler;
mod interceptor;

pub use anchor_handler::AnchorCaptureHandler;
pub use interceptor::ClickInterceptor;

/// How the two click paths share work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// The document capture-phase anchor handler stands down whenever a
    /// wrapped click listener sits on the click path, so each physical click
    /// is captured by one path only.
    #[default]
    Exclusive,
    /// Both paths run independently and rely on the shared debounce guard.
    Overlapping,
}

/// Configuration for the page recorder
#[derive(Debug, Clone)]
pub struct PageRecorderConfig {
    /// Clicks closer than this to the last processed click are dropped (milliseconds)
    pub debounce_window_ms: u64,

    /// How long each handshake phase waits for its completion message (milliseconds)
    pub handshake_timeout_ms: u64,

    /// Attribute marking the logical clickable unit around a target
    pub clickable_attribute: String,

    /// Ancestor hops searched for the clickable attribute
    pub clickable_max_depth: usize,

    pub dispatch_mode: DispatchMode,

    /// Buffer size of the captured-interaction stream
    pub channel_capacity: usize,

    /// Id of the recorder's own overlay root. Clicks inside it are passed
    /// straight through to page listeners.
    pub overlay_root_id: Option<String>,
}

impl Default for PageRecorderConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 150,
            handshake_timeout_ms: 30_000,
            clickable_attribute: "data-clickable-id".to_string(),
            clickable_max_depth: 5,
            dispatch_mode: DispatchMode::Exclusive,
            channel_capacity: 256,
            overlay_root_id: Some("terminator-recorder-overlay".to_string()),
        }
    }
}

impl PageRecorderConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Decides whether a click came from the recorder's own UI.
pub trait OverlayDetector: Send + Sync {
    fn is_from_popup(&self, doc: &Document, target: ElementId) -> bool;
}

impl<F> OverlayDetector for F
where
    F: Fn(&Document, ElementId) -> bool + Send + Sync,
{
    fn is_from_popup(&self, doc: &Document, target: ElementId) -> bool {
        self(doc, target)
    }
}

/// Treats anything inside the element with `root_id` as overlay.
#[derive(Debug, Clone)]
pub struct OverlayRootDetector {
    root_id: Option<String>,
}

impl OverlayRootDetector {
    pub fn new(root_id: Option<String>) -> Self {
        Self { root_id }
    }
}

impl OverlayDetector for OverlayRootDetector {
    fn is_from_popup(&self, doc: &Document, target: ElementId) -> bool {
        let Some(root_id) = self.root_id.as_deref() else {
            return false;
        };
        std::iter::once(target)
            .chain(doc.ancestors(target))
            .any(|el| doc.element_id(el) == Some(root_id))
    }
}

/// A settled capture, published after both handshake phases end.
#[derive(Debug, Clone)]
pub struct CapturedInteraction {
    pub record: InteractionRecord,
    pub report: HandshakeReport,
}

/// What runs once a capture settles.
enum DeferredAction {
    Navigate(String),
    Invoke(EventListener, PageEvent),
}

/// State shared by both click paths of one recorder.
pub(crate) struct RecorderCore {
    page: Weak<Page>,
    config: PageRecorderConfig,
    session_id: String,
    guard: DebounceGuard,
    coordinator: CaptureCoordinator,
    clock: CorrelationClock,
    serializer: InteractionSerializer,
    overlay: Arc<dyn OverlayDetector>,
    captured_tx: broadcast::Sender<CapturedInteraction>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RecorderCore {
    fn page(&self) -> Option<Arc<Page>> {
        self.page.upgrade()
    }

    fn should_process(&self) -> bool {
        let pass = self.guard.should_process(tokio::time::Instant::now());
        if !pass {
            debug!(session_id = %self.session_id, "Click debounced");
        }
        pass
    }

    fn is_from_popup(&self, page: &Page, target: ElementId) -> bool {
        self.overlay.is_from_popup(&page.document(), target)
    }

    fn build_record(
        &self,
        page: &Page,
        event_type: InteractionType,
        target: ElementId,
    ) -> Result<InteractionRecord> {
        let timestamp = self.clock.next();
        let url = page.url();
        let doc = page.document();
        let selector = build_selector(&doc, target);
        self.serializer
            .capture(&doc, event_type, target, &timestamp, selector, &url)
    }

    /// Runs the handshake for `record` off the dispatch path, then performs
    /// `action` whatever the outcome. Without a record or a runtime the
    /// action runs immediately.
    fn defer(self: &Arc<Self>, page: &Arc<Page>, record: Result<InteractionRecord>, action: DeferredAction) {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "Failed to build interaction record");
                Self::perform(page, action);
                return;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "No runtime for capture, skipping it");
                Self::perform(page, action);
                return;
            }
        };

        let core = Arc::clone(self);
        let page = Arc::clone(page);
        let task = runtime.spawn(async move {
            let report = core.coordinator.capture(&record).await;
            if report.is_complete() {
                debug!(session_id = %core.session_id, correlation_id = %record.timestamp, "Capture complete");
            } else {
                warn!(
                    session_id = %core.session_id,
                    correlation_id = %record.timestamp,
                    screenshot = ?report.screenshot,
                    save = ?report.save,
                    "Capture incomplete, continuing"
                );
            }
            Self::perform(&page, action);
            let _ = core.captured_tx.send(CapturedInteraction { record, report });
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    fn perform(page: &Page, action: DeferredAction) {
        match action {
            DeferredAction::Navigate(href) => page.navigate(&href),
            DeferredAction::Invoke(listener, event) => listener.invoke(&event),
        }
    }
}

/// Records clicks on one page and coordinates their capture.
pub struct PageRecorder {
    core: Arc<RecorderCore>,
}

impl PageRecorder {
    /// Installs the click interceptor and the capture-phase anchor handler,
    /// detecting overlay clicks by `config.overlay_root_id`.
    pub fn install(page: &Arc<Page>, config: PageRecorderConfig) -> Result<Self> {
        let overlay = Arc::new(OverlayRootDetector::new(config.overlay_root_id.clone()));
        Self::install_with_overlay(page, config, overlay)
    }

    pub fn install_with_overlay(
        page: &Arc<Page>,
        config: PageRecorderConfig,
        overlay: Arc<dyn OverlayDetector>,
    ) -> Result<Self> {
        let (captured_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        let core = Arc::new(RecorderCore {
            page: Arc::downgrade(page),
            session_id: uuid::Uuid::new_v4().to_string(),
            guard: DebounceGuard::new(config.debounce_window()),
            coordinator: CaptureCoordinator::new(page.channel().clone(), config.handshake_timeout()),
            clock: CorrelationClock::new(),
            serializer: InteractionSerializer::new(
                config.clickable_attribute.clone(),
                config.clickable_max_depth,
            ),
            overlay,
            captured_tx,
            tasks: Mutex::new(Vec::new()),
            config,
        });

        page.install_interceptor(Arc::new(ClickInterceptor::new(Arc::clone(&core))))?;
        page.add_native_event_listener(
            EventTarget::Document,
            "click",
            EventListener::handler(Arc::new(AnchorCaptureHandler::new(Arc::clone(&core)))),
            ListenerOptions::capture(),
        );

        info!(
            session_id = %core.session_id,
            url = %page.url(),
            dispatch_mode = ?core.config.dispatch_mode,
            "Page recorder installed"
        );
        Ok(Self { core })
    }

    pub fn session_id(&self) -> &str {
        &self.core.session_id
    }

    pub fn config(&self) -> &PageRecorderConfig {
        &self.core.config
    }

    /// Captures still waiting on their handshake.
    pub fn in_flight(&self) -> usize {
        self.core
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }

    /// Get a stream of settled captures
    pub fn interaction_stream(&self) -> impl Stream<Item = CapturedInteraction> + Unpin {
        let mut rx = self.core.captured_tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(captured) => yield captured,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Interaction stream lagged, skipped {} captures", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Waits until every deferred action started so far has run.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut tasks = self.core.tasks.lock().unwrap_or_else(|e| e.into_inner());
                tasks.drain(..).collect()
            };
            if pending.is_empty() {
                break;
            }
            for task in futures::future::join_all(pending).await {
                if let Err(e) = task {
                    error!(session_id = %self.core.session_id, error = %e, "Capture task failed");
                }
            }
        }
    }
}

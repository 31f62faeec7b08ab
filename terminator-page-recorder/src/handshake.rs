//! Request / correlated-completion handshake with the capture pipeline.
//!
//! A capture sends `CAPTURE_SCREENSHOT` and `SAVE_INTERACTION_DATA` tagged
//! with the click timestamp, then waits for the matching
//! `SCREENSHOT_COMPLETE` and `INTERACTION_COMPLETE` replies in that order.
//! Each wait ends on the first matching reply or on its timeout, whichever
//! comes first; the listener and timer are released when the wait ends.

use std::fmt;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::channel::PageChannel;
use crate::events::{InteractionRecord, PageMessage};
use crate::{PageRecorderError, Result};

const DEFAULT_FAILURE_MESSAGE: &str = "Unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakePhase {
    Screenshot,
    InteractionSave,
}

impl HandshakePhase {
    /// The `type` of the completion message this phase waits for.
    pub fn completion_type(&self) -> &'static str {
        match self {
            HandshakePhase::Screenshot => "SCREENSHOT_COMPLETE",
            HandshakePhase::InteractionSave => "INTERACTION_COMPLETE",
        }
    }

    /// `Some((success, error))` when `message` completes this phase for
    /// `correlation_id`.
    fn completion<'a>(
        &self,
        message: &'a PageMessage,
        correlation_id: &str,
    ) -> Option<(bool, Option<&'a str>)> {
        match (self, message) {
            (
                HandshakePhase::Screenshot,
                PageMessage::ScreenshotComplete {
                    timestamp,
                    success,
                    error,
                },
            )
            | (
                HandshakePhase::InteractionSave,
                PageMessage::InteractionComplete {
                    timestamp,
                    success,
                    error,
                },
            ) if timestamp == correlation_id => Some((*success, error.as_deref())),
            _ => None,
        }
    }
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakePhase::Screenshot => write!(f, "screenshot"),
            HandshakePhase::InteractionSave => write!(f, "interaction save"),
        }
    }
}

/// A registered, not yet settled wait for one phase.
///
/// The channel listener is held until [`PendingWait::wait`] returns (or the
/// value is dropped), so replies posted between registration and waiting
/// are not lost.
#[derive(Debug)]
pub struct PendingWait {
    phase: HandshakePhase,
    correlation_id: String,
    listener: broadcast::Receiver<PageMessage>,
}

impl PendingWait {
    pub fn register(
        channel: &PageChannel,
        phase: HandshakePhase,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            correlation_id: correlation_id.into(),
            listener: channel.subscribe(),
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Waits for the matching completion. The timer starts now.
    pub async fn wait(mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let outcome = tokio::time::timeout_at(deadline, self.next_completion()).await;
        match outcome {
            Ok(result) => result,
            Err(_elapsed) => Err(PageRecorderError::HandshakeTimeout {
                phase: self.phase,
                correlation_id: self.correlation_id,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Reads the channel until the matching completion arrives. No timer;
    /// cancel-safe, so it can be raced against other work.
    async fn next_completion(&mut self) -> Result<()> {
        loop {
            match self.listener.recv().await {
                Ok(message) => {
                    let Some((success, error)) =
                        self.phase.completion(&message, &self.correlation_id)
                    else {
                        continue;
                    };
                    if success {
                        return Ok(());
                    }
                    return Err(PageRecorderError::HandshakeFailure {
                        phase: self.phase,
                        message: error.unwrap_or(DEFAULT_FAILURE_MESSAGE).to_string(),
                    });
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        phase = %self.phase,
                        correlation_id = %self.correlation_id,
                        skipped,
                        "Handshake listener lagged, continuing"
                    );
                }
                Err(RecvError::Closed) => return Err(PageRecorderError::ChannelClosed),
            }
        }
    }
}

/// Registers a listener for `phase` and waits for the reply carrying
/// `correlation_id`, or fails after `timeout`.
pub async fn await_completion(
    channel: &PageChannel,
    phase: HandshakePhase,
    correlation_id: &str,
    timeout: Duration,
) -> Result<()> {
    PendingWait::register(channel, phase, correlation_id)
        .wait(timeout)
        .await
}

/// How one phase of a handshake ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Failed(String),
    TimedOut,
    Abandoned(String),
}

impl PhaseOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PhaseOutcome::Completed)
    }
}

impl From<Result<()>> for PhaseOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => PhaseOutcome::Completed,
            Err(PageRecorderError::HandshakeFailure { message, .. }) => {
                PhaseOutcome::Failed(message)
            }
            Err(PageRecorderError::HandshakeTimeout { .. }) => PhaseOutcome::TimedOut,
            Err(other) => PhaseOutcome::Abandoned(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReport {
    pub screenshot: PhaseOutcome,
    pub save: PhaseOutcome,
}

impl HandshakeReport {
    pub fn is_complete(&self) -> bool {
        self.screenshot.is_completed() && self.save.is_completed()
    }
}

/// Sends capture requests for a record and waits out both phases.
#[derive(Debug, Clone)]
pub struct CaptureCoordinator {
    channel: PageChannel,
    timeout: Duration,
}

impl CaptureCoordinator {
    pub fn new(channel: PageChannel, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Never fails: every error is logged and folded into the report.
    pub async fn capture(&self, record: &InteractionRecord) -> HandshakeReport {
        let correlation_id = record.timestamp.as_str();

        // Listen before sending so a fast reply cannot slip past.
        let screenshot_wait =
            PendingWait::register(&self.channel, HandshakePhase::Screenshot, correlation_id);
        let mut save_wait =
            PendingWait::register(&self.channel, HandshakePhase::InteractionSave, correlation_id);

        debug!(%correlation_id, event_type = record.event_type.as_str(), "Requesting capture");
        self.channel.post_message(PageMessage::CaptureScreenshot {
            timestamp: correlation_id.to_string(),
        });
        self.channel.post_message(PageMessage::SaveInteractionData {
            data: record.clone(),
        });

        // The save listener keeps reading while the screenshot phase runs so
        // it cannot fall behind on a busy channel; an early reply is held
        // until the save phase starts.
        let mut early_save = None;
        let screenshot_result = {
            let screenshot = screenshot_wait.wait(self.timeout);
            tokio::pin!(screenshot);
            loop {
                tokio::select! {
                    result = &mut screenshot => break result,
                    result = save_wait.next_completion(), if early_save.is_none() => {
                        early_save = Some(result);
                    }
                }
            }
        };
        let screenshot = Self::settle(screenshot_result, correlation_id);
        let save_result = match early_save {
            Some(result) => result,
            None => save_wait.wait(self.timeout).await,
        };
        let save = Self::settle(save_result, correlation_id);
        HandshakeReport { screenshot, save }
    }

    fn settle(result: Result<()>, correlation_id: &str) -> PhaseOutcome {
        match &result {
            Ok(()) => debug!(%correlation_id, "Handshake phase completed"),
            Err(e) if e.is_handshake_error() => warn!(%correlation_id, error = %e, "Capture incomplete"),
            Err(e) => warn!(%correlation_id, error = %e, "Capture abandoned"),
        }
        result.into()
    }
}

use serde::{Deserialize, Serialize};

/// Which click path produced an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionType {
    /// Anchor navigation deferred by a wrapped page listener.
    #[serde(rename = "click_a")]
    WrappedAnchor,
    /// Non-navigating click delivered to a wrapped page listener.
    #[serde(rename = "click_b")]
    WrappedListener,
    /// Anchor navigation deferred by the document capture-phase handler.
    #[serde(rename = "click_c")]
    CaptureAnchor,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::WrappedAnchor => "click_a",
            InteractionType::WrappedListener => "click_b",
            InteractionType::CaptureAnchor => "click_c",
        }
    }
}

/// Directly visible properties of the clicked element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Uppercase, as the DOM reports it.
    pub tag_name: String,
    pub class_name: String,
    pub id: String,
    /// Visible text, or the current value for form controls.
    pub text: String,
    #[serde(rename = "outerHTML")]
    pub outer_html: String,
}

/// One captured click. Built once per click and handed off with the
/// `SAVE_INTERACTION_DATA` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub event_type: InteractionType,
    /// ISO-8601 click time; doubles as the handshake correlation id.
    pub timestamp: String,
    pub target: TargetInfo,
    pub selector: String,
    pub clickable_id: String,
    pub url: String,
    pub html_snapshot_id: String,
    pub html_content: String,
}

/// Messages exchanged over the page's message channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    CaptureScreenshot {
        timestamp: String,
    },
    SaveInteractionData {
        data: InteractionRecord,
    },
    ScreenshotComplete {
        timestamp: String,
        #[serde(default)]
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    InteractionComplete {
        timestamp: String,
        #[serde(default)]
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Anything else posted on the channel.
    #[serde(other)]
    Other,
}

impl PageMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            PageMessage::CaptureScreenshot { .. } => "CAPTURE_SCREENSHOT",
            PageMessage::SaveInteractionData { .. } => "SAVE_INTERACTION_DATA",
            PageMessage::ScreenshotComplete { .. } => "SCREENSHOT_COMPLETE",
            PageMessage::InteractionComplete { .. } => "INTERACTION_COMPLETE",
            PageMessage::Other => "OTHER",
        }
    }
}

//! Builds [`InteractionRecord`]s from the document state at click time.

use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use tracing::debug;

use crate::dom::{Document, ElementId};
use crate::events::{InteractionRecord, InteractionType, TargetInfo};
use crate::selector::build_snapshot_id;
use crate::{PageRecorderError, Result};

/// Reads the clicked element and the page markup into a record.
#[derive(Debug, Clone)]
pub struct InteractionSerializer {
    clickable_attribute: String,
    clickable_max_depth: usize,
}

impl InteractionSerializer {
    pub fn new(clickable_attribute: impl Into<String>, clickable_max_depth: usize) -> Self {
        Self {
            clickable_attribute: clickable_attribute.into(),
            clickable_max_depth,
        }
    }

    pub fn capture(
        &self,
        doc: &Document,
        event_type: InteractionType,
        target: ElementId,
        timestamp: &str,
        selector: String,
        url: &str,
    ) -> Result<InteractionRecord> {
        if !doc.contains(target) {
            return Err(PageRecorderError::ElementNotFound(target.to_string()));
        }

        let text = {
            let visible = doc.inner_text(target);
            if visible.is_empty() {
                doc.value(target).unwrap_or_default().to_string()
            } else {
                visible
            }
        };

        let clickable_id = find_clickable_id(
            doc,
            target,
            &self.clickable_attribute,
            self.clickable_max_depth,
        );
        debug!(
            event_type = event_type.as_str(),
            %selector,
            %clickable_id,
            "Serialized interaction"
        );

        Ok(InteractionRecord {
            event_type,
            timestamp: timestamp.to_string(),
            target: TargetInfo {
                tag_name: doc.tag_name(target).to_ascii_uppercase(),
                class_name: doc.class_name(target).to_string(),
                id: doc.element_id(target).unwrap_or_default().to_string(),
                text,
                outer_html: doc.outer_html(target),
            },
            selector,
            clickable_id,
            url: url.to_string(),
            html_snapshot_id: build_snapshot_id(url, timestamp),
            html_content: doc.document_html(),
        })
    }
}

/// Value of `attribute` on `target` or on one of its ancestors at most
/// `max_depth` hops up. Empty when nothing within that range carries it.
pub fn find_clickable_id(
    doc: &Document,
    target: ElementId,
    attribute: &str,
    max_depth: usize,
) -> String {
    let mut current = Some(target);
    let mut hops = 0;
    while let Some(el) = current {
        if let Some(value) = doc.attribute(el, attribute) {
            return value.to_string();
        }
        if hops == max_depth {
            break;
        }
        hops += 1;
        current = doc.parent(el);
    }
    String::new()
}

/// Issues ISO-8601 millisecond timestamps that are strictly increasing per
/// clock, so two clicks in the same millisecond still get distinct
/// correlation ids.
#[derive(Debug, Default)]
pub struct CorrelationClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl CorrelationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        self.next_at(Utc::now())
    }

    pub fn next_at(&self, now: DateTime<Utc>) -> String {
        let now = now.trunc_subsecs(3);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = match *last {
            Some(prev) if now <= prev => prev + chrono::Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        format_iso(stamp)
    }
}

/// `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub fn format_iso(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn nested(depth: usize) -> (Document, Vec<ElementId>) {
        let mut doc = Document::new();
        let mut chain = vec![doc.body()];
        for _ in 0..depth {
            let parent = *chain.last().unwrap();
            chain.push(doc.append_element(parent, "div", &[]).unwrap());
        }
        (doc, chain)
    }

    #[test]
    fn test_clickable_on_target_itself() {
        let (mut doc, chain) = nested(1);
        doc.set_attribute(chain[1], "data-clickable-id", "card-1")
            .unwrap();
        assert_eq!(
            find_clickable_id(&doc, chain[1], "data-clickable-id", 5),
            "card-1"
        );
    }

    #[test]
    fn test_clickable_at_exactly_five_hops() {
        let (mut doc, chain) = nested(7);
        let target = chain[7];
        doc.set_attribute(chain[2], "data-clickable-id", "five-up")
            .unwrap();
        assert_eq!(
            find_clickable_id(&doc, target, "data-clickable-id", 5),
            "five-up"
        );
    }

    #[test]
    fn test_clickable_beyond_five_hops_is_ignored() {
        let (mut doc, chain) = nested(7);
        let target = chain[7];
        doc.set_attribute(chain[1], "data-clickable-id", "six-up")
            .unwrap();
        assert_eq!(find_clickable_id(&doc, target, "data-clickable-id", 5), "");
    }

    #[test]
    fn test_capture_reads_target_and_page() {
        let mut doc = Document::new();
        let card = doc
            .append_element(doc.body(), "div", &[("data-clickable-id", "card")])
            .unwrap();
        let button = doc
            .append_element(card, "button", &[("class", "primary big"), ("id", "buy")])
            .unwrap();
        doc.append_text(button, " Buy now ").unwrap();

        let serializer = InteractionSerializer::new("data-clickable-id", 5);
        let record = serializer
            .capture(
                &doc,
                InteractionType::WrappedListener,
                button,
                "2024-05-01T10:00:00.000Z",
                "#buy".to_string(),
                "https://shop.example.com/",
            )
            .unwrap();

        assert_eq!(record.target.tag_name, "BUTTON");
        assert_eq!(record.target.class_name, "primary big");
        assert_eq!(record.target.id, "buy");
        assert_eq!(record.target.text, "Buy now");
        assert_eq!(record.clickable_id, "card");
        assert_eq!(record.html_content, doc.document_html());
        assert!(record
            .html_snapshot_id
            .ends_with("_2024-05-01T10:00:00.000Z"));
    }

    #[test]
    fn test_capture_uses_value_for_inputs() {
        let mut doc = Document::new();
        let input = doc.append_element(doc.body(), "input", &[]).unwrap();
        doc.set_value(input, "hello").unwrap();

        let record = InteractionSerializer::new("data-clickable-id", 5)
            .capture(
                &doc,
                InteractionType::WrappedListener,
                input,
                "t",
                "input".to_string(),
                "https://example.com/",
            )
            .unwrap();
        assert_eq!(record.target.text, "hello");
    }

    #[test]
    fn test_correlation_clock_is_strictly_increasing() {
        let clock = CorrelationClock::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let first = clock.next_at(at);
        let second = clock.next_at(at);
        let third = clock.next_at(at);

        assert_eq!(first, "2024-05-01T10:00:00.000Z");
        assert_eq!(second, "2024-05-01T10:00:00.001Z");
        assert_eq!(third, "2024-05-01T10:00:00.002Z");
    }
}

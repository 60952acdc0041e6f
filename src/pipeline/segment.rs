use chrono::NaiveDate;
use tracing::debug;

use crate::config::Rules;
use crate::model::{Intervention, Message};
use crate::pipeline::category;
use crate::pipeline::classify;
use crate::pipeline::redaction::reference_day;

/// Group a filtered message stream into interventions keyed by
/// (author, reference-timezone day). An author's runs interrupted by other
/// authors' messages merge back into the same intervention; contiguity is
/// irrelevant to the key.
///
/// Messages from excluded display names are dropped before grouping.
/// Interventions come back in the order their key was first encountered.
pub fn group(messages: &[Message], rules: &Rules) -> Vec<Intervention> {
    let mut sorted: Vec<&Message> = messages
        .iter()
        .filter(|m| {
            if rules.is_excluded(&m.author_name) {
                debug!(author = %m.author_name, "excluding message from office team member");
                return false;
            }
            true
        })
        .collect();
    sorted.sort_by_key(|m| m.timestamp);

    let mut builders: Vec<InterventionBuilder> = Vec::new();
    for msg in sorted {
        let day = reference_day(msg.timestamp, rules);
        // No identity: unmergeable singleton rather than a shared "" bucket.
        let existing = if msg.author_id.is_empty() {
            None
        } else {
            builders
                .iter()
                .position(|b| b.author_id == msg.author_id && b.day == day)
        };
        match existing {
            Some(i) => builders[i].push(msg.clone()),
            None => builders.push(InterventionBuilder::start(msg.clone(), day)),
        }
    }

    let interventions: Vec<Intervention> =
        builders.into_iter().map(|b| b.finalize(rules)).collect();
    debug!(
        "grouped {} messages into {} interventions",
        messages.len(),
        interventions.len()
    );
    interventions
}

/// Accumulates one intervention's messages; all derived fields are computed
/// once, in [`finalize`], so merges can never leave stale state behind.
struct InterventionBuilder {
    author_id: String,
    author_name: String,
    day: NaiveDate,
    messages: Vec<Message>,
}

impl InterventionBuilder {
    fn start(msg: Message, day: NaiveDate) -> Self {
        InterventionBuilder {
            author_id: msg.author_id.clone(),
            author_name: msg.author_name.clone(),
            day,
            messages: vec![msg],
        }
    }

    /// Insert keeping the message list timestamp-ordered even when the
    /// caller feeds an out-of-order merge.
    fn push(&mut self, msg: Message) {
        let pos = self
            .messages
            .iter()
            .position(|m| msg.timestamp < m.timestamp)
            .unwrap_or(self.messages.len());
        self.messages.insert(pos, msg);
    }

    fn finalize(self, rules: &Rules) -> Intervention {
        // Never empty: a builder starts with one message.
        let start_time = self.messages[0].timestamp;
        let last_time = self.messages[self.messages.len() - 1].timestamp;

        let joined: String = self
            .messages
            .iter()
            .map(|m| m.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let images: Vec<_> = self
            .messages
            .iter()
            .flat_map(|m| m.images().cloned())
            .collect();

        let sections = classify::classify(&self.messages, rules);
        // The date comes from the pre-rewrite text; marker removal happens after.
        let (display_date, date_source) = classify::display_date(&joined, start_time, rules);
        let raw_text = if sections.has_before_after {
            sections.regular_text
        } else {
            joined
        };
        let category = category::categorize(&raw_text).to_string();

        Intervention {
            author_id: self.author_id,
            author_name: self.author_name,
            day: self.day,
            start_time,
            last_time,
            messages: self.messages,
            raw_text,
            images,
            has_before_after: sections.has_before_after,
            before_images: sections.before_images,
            after_images: sections.after_images,
            regular_images: sections.regular_images,
            display_date,
            date_source,
            category,
            enhanced_text: None,
            title: None,
        }
    }
}

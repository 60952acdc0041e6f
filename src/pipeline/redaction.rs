use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::config::Rules;
use crate::model::Message;

/// Calendar day of an instant in the reference timezone.
pub fn reference_day(timestamp: DateTime<Utc>, rules: &Rules) -> NaiveDate {
    timestamp.with_timezone(&rules.timezone).date_naive()
}

/// Apply the OFF rule: once an author posts the off-the-record marker on a
/// given day, everything from that author after that instant on that day is
/// suppressed. The marker message itself is truncated at the marker.
///
/// Other authors, and the same author on other days, are untouched.
pub fn apply(messages: &[Message], rules: &Rules) -> Vec<Message> {
    // Pass 1: earliest marker instant per (author, day).
    let mut cutoffs: HashMap<(String, NaiveDate), DateTime<Utc>> = HashMap::new();
    for msg in messages {
        if msg.author_id.is_empty() || !rules.off.is_match(&msg.text) {
            continue;
        }
        let key = (msg.author_id.clone(), reference_day(msg.timestamp, rules));
        let cutoff = cutoffs.entry(key).or_insert(msg.timestamp);
        if msg.timestamp < *cutoff {
            *cutoff = msg.timestamp;
        }
    }
    if cutoffs.is_empty() {
        return messages.to_vec();
    }

    // Pass 2: keep, truncate, or drop against the recorded cutoffs.
    let mut kept = Vec::with_capacity(messages.len());
    for msg in messages {
        if msg.author_id.is_empty() {
            kept.push(msg.clone());
            continue;
        }
        let key = (msg.author_id.clone(), reference_day(msg.timestamp, rules));
        match cutoffs.get(&key) {
            None => kept.push(msg.clone()),
            Some(&cutoff) if msg.timestamp < cutoff => kept.push(msg.clone()),
            Some(&cutoff) if msg.timestamp == cutoff => {
                if let Some(truncated) = truncate_at_marker(msg, rules) {
                    kept.push(truncated);
                }
            }
            Some(_) => {
                debug!(author = %msg.author_id, "dropped message after OFF cutoff");
            }
        }
    }

    debug!("off rule: {} messages -> {}", messages.len(), kept.len());
    kept
}

/// Cut the marker message down to the text before the marker. A message
/// left with no text survives only if it carries images: those were posted
/// before the author went off the record textually.
fn truncate_at_marker(msg: &Message, rules: &Rules) -> Option<Message> {
    let found = match rules.off.find(&msg.text) {
        Some(m) => m,
        // Same author, same instant as the marker message, no marker itself.
        None => return Some(msg.clone()),
    };
    let text = msg.text[..found.start()].trim();
    if text.is_empty() && !msg.attachments.iter().any(|a| a.is_image()) {
        debug!(author = %msg.author_id, "dropped message starting with OFF");
        return None;
    }
    let mut truncated = msg.clone();
    truncated.text = text.to_string();
    Some(truncated)
}

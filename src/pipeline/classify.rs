use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

use crate::config::Rules;
use crate::model::{Attachment, DateSource, Message};
use crate::pipeline::redaction::reference_day;

/// A message shorter than this that contains a marker word counts as a
/// marker ("Avant photo"); anything longer is ordinary prose.
const MARKER_MAX_LEN: usize = 15;

/// Section partition of one intervention's images, from the before/after
/// marker state machine.
#[derive(Debug, Default)]
pub struct Classification {
    pub has_before_after: bool,
    pub before_images: Vec<Attachment>,
    pub after_images: Vec<Attachment>,
    pub regular_images: Vec<Attachment>,
    /// Non-empty texts with pure marker messages removed, newline-joined.
    pub regular_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    BeforeSection,
    InBefore,
    InAfter,
}

/// A message is a marker only when it is essentially nothing but the marker
/// word: the word alone with optional trailing punctuation, or a very short
/// message containing it as a whole word. "attendre avant d'arroser" never
/// qualifies.
fn is_marker(text: &str, exact: &Regex, word: &Regex) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    exact.is_match(trimmed) || (trimmed.chars().count() < MARKER_MAX_LEN && word.is_match(trimmed))
}

/// Walk the (timestamp-ordered) messages of one intervention, detecting
/// before/after section markers and partitioning images by section.
///
/// States run `BeforeSection -> InBefore -> InAfter` with no reset. A marker
/// message's own images belong to the section it announces, so the state
/// transition happens before its images are placed.
pub fn classify(messages: &[Message], rules: &Rules) -> Classification {
    let mut result = Classification::default();
    let mut state = Section::BeforeSection;
    let mut text_parts: Vec<&str> = Vec::new();

    for msg in messages {
        let is_before = is_marker(&msg.text, &rules.before_exact, &rules.before);
        let is_after = is_marker(&msg.text, &rules.after_exact, &rules.after);

        if is_before && state == Section::BeforeSection {
            state = Section::InBefore;
            result.has_before_after = true;
            debug!(text = %msg.text.trim(), "before section detected");
        } else if is_after && matches!(state, Section::BeforeSection | Section::InBefore) {
            state = Section::InAfter;
            result.has_before_after = true;
            debug!(text = %msg.text.trim(), "after section detected");
        }

        for image in msg.images() {
            match state {
                Section::BeforeSection => result.regular_images.push(image.clone()),
                Section::InBefore => result.before_images.push(image.clone()),
                Section::InAfter => result.after_images.push(image.clone()),
            }
        }

        let trimmed = msg.text.trim();
        if !trimmed.is_empty() && !is_before && !is_after {
            text_parts.push(trimmed);
        }
    }

    result.regular_text = text_parts.join("\n");
    result
}

/// Derive the display date: a valid DD/MM found in the text combined with
/// the start year, otherwise the start timestamp's reference-timezone day.
pub fn display_date(
    text: &str,
    start_time: DateTime<Utc>,
    rules: &Rules,
) -> (NaiveDate, DateSource) {
    let fallback = (reference_day(start_time, rules), DateSource::Timestamp);
    let Some((day, month)) = extract_day_month(text, rules) else {
        return fallback;
    };
    let year = start_time.with_timezone(&rules.timezone).year();
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => (date, DateSource::Extracted),
        // 31/02 and friends: the pattern matched but no such date exists.
        None => fallback,
    }
}

fn extract_day_month(text: &str, rules: &Rules) -> Option<(u32, u32)> {
    let caps = rules.date.captures(text)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    ((1..=31).contains(&day) && (1..=12).contains(&month)).then_some((day, month))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testutil::*;

    #[test]
    fn bare_marker_words_are_markers() {
        let rules = rules();
        for text in ["Avant", "avant", "AVANT", "Avant:", "Avant !", "Avant."] {
            assert!(is_marker(text, &rules.before_exact, &rules.before), "{}", text);
        }
        for text in ["Après", "apres", "APRÈS -"] {
            assert!(is_marker(text, &rules.after_exact, &rules.after), "{}", text);
        }
    }

    #[test]
    fn short_message_containing_word_is_marker() {
        let rules = rules();
        assert!(is_marker("Avant photo", &rules.before_exact, &rules.before));
        assert!(is_marker("photos après", &rules.after_exact, &rules.after));
    }

    #[test]
    fn marker_in_sentence_does_not_trigger() {
        // The word inside ordinary prose is not a section marker.
        let rules = rules();
        let sentence = "Attendre 1/2 semaines avant de les arroser";
        assert!(!is_marker(sentence, &rules.before_exact, &rules.before));

        let messages = vec![
            msg_with_images("ed@jardin.fr", "Edward Carey", sentence, "2024-01-15T09:00:00Z", &["a.jpg"]),
            msg_with_images("ed@jardin.fr", "Edward Carey", "Avant", "2024-01-15T09:10:00Z", &["b.jpg"]),
            msg_with_images("ed@jardin.fr", "Edward Carey", "Après", "2024-01-15T09:20:00Z", &["c.jpg"]),
        ];
        let c = classify(&messages, &rules);
        assert!(c.has_before_after);
        assert_eq!(c.regular_images.len(), 1);
        assert_eq!(c.regular_images[0].name, "a.jpg");
        assert_eq!(c.before_images[0].name, "b.jpg");
        assert_eq!(c.after_images[0].name, "c.jpg");
        assert_eq!(c.regular_text, sentence);
    }

    #[test]
    fn marker_images_belong_to_announced_section() {
        let rules = rules();
        let messages = vec![
            msg_with_images("ed@jardin.fr", "Edward Carey", "Avant", "2024-01-15T09:00:00Z", &["b1.jpg", "b2.jpg"]),
            msg_with_images("ed@jardin.fr", "Edward Carey", "Après", "2024-01-15T09:30:00Z", &["a1.jpg"]),
        ];
        let c = classify(&messages, &rules);
        assert_eq!(c.before_images.len(), 2);
        assert_eq!(c.after_images.len(), 1);
        assert!(c.regular_images.is_empty());
        assert_eq!(c.regular_text, "");
    }

    #[test]
    fn after_marker_opening_an_intervention_goes_to_after() {
        let rules = rules();
        let messages = vec![msg_with_images(
            "ed@jardin.fr",
            "Edward Carey",
            "Après",
            "2024-01-15T09:00:00Z",
            &["a.jpg"],
        )];
        let c = classify(&messages, &rules);
        assert!(c.has_before_after);
        assert_eq!(c.after_images.len(), 1);
        assert!(c.before_images.is_empty());
    }

    #[test]
    fn no_reset_after_after_section() {
        // A second "Avant" once in the after section changes nothing.
        let rules = rules();
        let messages = vec![
            msg("ed@jardin.fr", "Edward Carey", "Avant", "2024-01-15T09:00:00Z"),
            msg("ed@jardin.fr", "Edward Carey", "Après", "2024-01-15T09:10:00Z"),
            msg_with_images("ed@jardin.fr", "Edward Carey", "Avant", "2024-01-15T09:20:00Z", &["x.jpg"]),
        ];
        let c = classify(&messages, &rules);
        assert_eq!(c.after_images.len(), 1);
        assert!(c.before_images.is_empty());
    }

    #[test]
    fn display_date_extracted_from_text() {
        let rules = rules();
        let (date, source) = display_date("Taille effectuée le 15/01", at("2024-03-10T09:00:00Z"), &rules);
        assert_eq!(source, crate::model::DateSource::Extracted);
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn out_of_range_day_month_falls_back() {
        let rules = rules();
        let (date, source) = display_date("rendez-vous le 32/13", at("2024-03-10T09:00:00Z"), &rules);
        assert_eq!(source, crate::model::DateSource::Timestamp);
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn invalid_calendar_combination_falls_back() {
        // 31/02 passes the range check but is not a real date.
        let rules = rules();
        let (_, source) = display_date("le 31/2 au matin", at("2024-03-10T09:00:00Z"), &rules);
        assert_eq!(source, crate::model::DateSource::Timestamp);
    }

    #[test]
    fn no_date_in_text_falls_back_to_reference_day() {
        let rules = rules();
        // 23:30 UTC is already the next day in Paris.
        let (date, source) = display_date("Arrosage", at("2024-06-15T23:30:00Z"), &rules);
        assert_eq!(source, crate::model::DateSource::Timestamp);
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
    }
}

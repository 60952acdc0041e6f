use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::Rules;
use crate::model::{Message, TeamMember};

// @Name NAME, @Jean-Pierre DUPONT, @Marie Louise BERNARD. Each word starts
// with an uppercase letter (accents included); the match stops at the first
// lowercase-leading word or non-letter.
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-ZÀ-Ÿ][A-ZÀ-Ÿa-zà-ÿ\-]+(?:[ \t]+[A-ZÀ-Ÿ][A-ZÀ-Ÿa-zà-ÿ\-]+)*)").unwrap()
});

/// Normalize a display name: every whitespace-delimited token gets an
/// uppercase first letter, the rest lowercased. "JOHN DOE" -> "John Doe".
pub fn format_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    let mut formatted: String = first.to_uppercase().collect();
                    formatted.push_str(&chars.as_str().to_lowercase());
                    formatted
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// All @-mentioned names in a text, unnormalized.
pub fn mentions(text: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Build the participant roster: message authors (keyed by email) plus
/// @-mentioned names (keyed synthetically, no email), minus the exclusion
/// list. Author and mention entries are never reconciled with each other.
pub fn extract(messages: &[Message], rules: &Rules) -> Vec<TeamMember> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut members = Vec::new();

    for msg in messages {
        if rules.is_excluded(&msg.author_name) {
            debug!(author = %msg.author_name, "excluded office member from roster");
        } else if !msg.author_id.is_empty() && seen.insert(msg.author_id.clone()) {
            members.push(TeamMember {
                name: format_name(&msg.author_name),
                email: Some(msg.author_id.clone()),
            });
        }

        for raw in mentions(&msg.text) {
            let name = format_name(&raw);
            if rules.is_excluded(&name) {
                debug!(mention = %name, "excluded office member mention");
                continue;
            }
            let key = format!("mention_{}", name.to_lowercase().replace(' ', "_"));
            if seen.insert(key) {
                members.push(TeamMember { name, email: None });
            }
        }
    }

    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testutil::*;

    #[test]
    fn format_name_capitalizes_each_word() {
        assert_eq!(format_name("edward carey"), "Edward Carey");
        assert_eq!(format_name("JOHN DOE"), "John Doe");
        assert_eq!(format_name("marie-pierre DUPONT"), "Marie-pierre Dupont");
        assert_eq!(format_name("  salomé   CREMONA "), "Salomé Cremona");
        assert_eq!(format_name(""), "");
    }

    #[test]
    fn mentions_stop_at_lowercase_words() {
        let found = mentions("@Alice MARTIN et @Paul LECLERC ont fait le travail");
        assert_eq!(found, vec!["Alice MARTIN", "Paul LECLERC"]);
    }

    #[test]
    fn hyphenated_and_multiword_mentions() {
        assert_eq!(mentions("vu avec @Jean-Pierre DUPONT"), vec!["Jean-Pierre DUPONT"]);
        assert_eq!(
            mentions("merci @Marie Louise BERNARD pour le coup de main"),
            vec!["Marie Louise BERNARD"]
        );
        assert!(mentions("pas de mention ici").is_empty());
    }

    #[test]
    fn roster_includes_authors_and_mentions() {
        let rules = rules();
        let messages = vec![msg(
            "nico@jardin.fr",
            "nicolas DUPONT",
            "@Alice MARTIN et @Paul LECLERC ont fait le travail",
            "2024-05-02T09:00:00Z",
        )];
        let team = extract(&messages, &rules);
        assert_eq!(
            team,
            vec![
                TeamMember { name: "Nicolas Dupont".into(), email: Some("nico@jardin.fr".into()) },
                TeamMember { name: "Alice Martin".into(), email: None },
                TeamMember { name: "Paul Leclerc".into(), email: None },
            ]
        );
    }

    #[test]
    fn roster_dedupes_by_identity() {
        let rules = rules();
        let messages = vec![
            msg("nico@jardin.fr", "Nicolas Dupont", "lundi: @Alice MARTIN", "2024-05-01T09:00:00Z"),
            msg("nico@jardin.fr", "Nicolas Dupont", "mardi: @Alice MARTIN encore", "2024-05-02T09:00:00Z"),
        ];
        let team = extract(&messages, &rules);
        assert_eq!(team.len(), 2);
    }

    #[test]
    fn mention_and_author_entries_are_not_merged() {
        // The same human can appear once per identity kind; no reconciliation.
        let rules = rules();
        let messages = vec![
            msg("alice@jardin.fr", "Alice Martin", "présente", "2024-05-02T09:00:00Z"),
            msg("nico@jardin.fr", "Nicolas Dupont", "avec @Alice MARTIN", "2024-05-02T10:00:00Z"),
        ];
        let team = extract(&messages, &rules);
        assert_eq!(team.len(), 3);
    }

    #[test]
    fn excluded_names_filtered_from_authors_and_mentions() {
        let rules = rules();
        let messages = vec![
            msg("salome@bureau.fr", "Salomé Cremona", "rappel planning", "2024-05-02T09:00:00Z"),
            msg("nico@jardin.fr", "Nicolas Dupont", "ok avec @Salomé CREMONA", "2024-05-02T10:00:00Z"),
        ];
        let team = extract(&messages, &rules);
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].name, "Nicolas Dupont");
    }

    #[test]
    fn author_without_email_is_skipped() {
        let rules = rules();
        let messages = vec![msg("", "Visiteur Anonyme", "bonjour", "2024-05-02T09:00:00Z")];
        assert!(extract(&messages, &rules).is_empty());
    }
}

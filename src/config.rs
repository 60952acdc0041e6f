use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

/// Pipeline configuration, loaded from a JSON file. Defaults match the
/// production deployment (French markers, Paris timezone).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Reference timezone for all calendar-day computations.
    pub timezone: Tz,
    /// Word pattern for the off-the-record marker.
    pub off_marker: String,
    /// Word pattern for the "before" section marker.
    pub before_marker: String,
    /// Word pattern for the "after" section marker.
    pub after_marker: String,
    /// DD/MM pattern with day and month capture groups.
    pub date_pattern: String,
    /// Display names excluded from interventions and the team roster.
    pub excluded_names: Vec<String>,
    /// Client name -> transcript export URL.
    pub clients: BTreeMap<String, String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            timezone: chrono_tz::Europe::Paris,
            off_marker: r"\(?\s*\boff\b\s*\)?".to_string(),
            before_marker: r"\bavant\b".to_string(),
            after_marker: r"\b(?:après|apres)\b".to_string(),
            date_pattern: r"\b(\d{1,2})/(\d{1,2})\b".to_string(),
            excluded_names: vec![
                "Salomé Cremona".to_string(),
                "Luana Debusschere".to_string(),
            ],
            clients: BTreeMap::new(),
        }
    }
}

impl ReportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ReportConfig =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Compile the configured patterns once. Fails early on a bad pattern so
    /// the pipeline entry points stay infallible.
    pub fn rules(&self) -> Result<Rules> {
        Ok(Rules {
            timezone: self.timezone,
            off: case_insensitive(&self.off_marker).context("off_marker")?,
            before: case_insensitive(&self.before_marker).context("before_marker")?,
            after: case_insensitive(&self.after_marker).context("after_marker")?,
            before_exact: exact_marker(&self.before_marker).context("before_marker")?,
            after_exact: exact_marker(&self.after_marker).context("after_marker")?,
            date: Regex::new(&self.date_pattern).context("date_pattern")?,
            excluded_names: self
                .excluded_names
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
        })
    }
}

/// Compiled form of [`ReportConfig`], shared by all pipeline stages.
#[derive(Debug, Clone)]
pub struct Rules {
    pub timezone: Tz,
    pub off: Regex,
    pub before: Regex,
    pub after: Regex,
    /// Anchored variants: the marker word alone, optional trailing `: - ! .`
    pub before_exact: Regex,
    pub after_exact: Regex,
    pub date: Regex,
    /// Lowercased exclusion list, matched against lowercased display names.
    pub excluded_names: Vec<String>,
}

impl Rules {
    pub fn is_excluded(&self, display_name: &str) -> bool {
        let lower = display_name.to_lowercase();
        self.excluded_names.iter().any(|n| *n == lower)
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", pattern)).context("invalid marker pattern")
}

fn exact_marker(pattern: &str) -> Result<Regex> {
    Regex::new(&format!(r"(?i)^\s*{}\s*[:\-!.]*\s*$", pattern)).context("invalid marker pattern")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_compile() {
        let rules = ReportConfig::default().rules().unwrap();
        assert!(rules.off.is_match("(OFF) pause"));
        assert!(rules.off.is_match("off"));
        assert!(!rules.off.is_match("office"));
        assert!(rules.before.is_match("AVANT"));
        assert!(rules.after.is_match("Après"));
        assert!(rules.after.is_match("apres"));
    }

    #[test]
    fn exact_marker_allows_trailing_punctuation() {
        let rules = ReportConfig::default().rules().unwrap();
        for text in ["Avant", "avant:", "AVANT !", "Avant."] {
            assert!(rules.before_exact.is_match(text), "{}", text);
        }
        assert!(!rules.before_exact.is_match("Avant la pluie"));
    }

    #[test]
    fn exclusion_is_case_insensitive() {
        let rules = ReportConfig::default().rules().unwrap();
        assert!(rules.is_excluded("salomé cremona"));
        assert!(rules.is_excluded("SALOMÉ CREMONA"));
        assert!(!rules.is_excluded("Nicolas Dupont"));
    }

    #[test]
    fn config_parses_from_json() {
        let json = r#"{
            "timezone": "Europe/Paris",
            "excluded_names": ["Back Office"],
            "clients": { "jardin-luxembourg": "https://example.com/export/lux.json" }
        }"#;
        let config: ReportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::Paris);
        assert_eq!(config.excluded_names, vec!["Back Office"]);
        assert_eq!(config.clients.len(), 1);
        // Unspecified fields keep their defaults.
        assert!(config.off_marker.contains("off"));
    }
}

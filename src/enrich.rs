use anyhow::Result;

use crate::model::Intervention;

/// Enrichment collaborator: rewrites raw intervention text into report prose
/// and produces a title. The pipeline never calls this itself; callers run
/// it between segmentation and publishing.
pub trait Enricher {
    fn enhance(&self, raw_text: &str, display_date: &str) -> Result<String>;
    fn title(&self, display_date: &str) -> String;
}

/// No-model fallback: echoes the raw text and builds the standard title.
/// Keeps `process` usable without an LLM endpoint configured.
pub struct Passthrough;

impl Enricher for Passthrough {
    fn enhance(&self, raw_text: &str, _display_date: &str) -> Result<String> {
        Ok(raw_text.to_string())
    }

    fn title(&self, display_date: &str) -> String {
        format!("Intervention du {}", display_date)
    }
}

/// Fill the enrichment slots of freshly segmented interventions in place.
/// Existing titles are kept; an enrichment failure falls back to the raw
/// text rather than losing the intervention.
pub fn enrich_all(interventions: &mut [Intervention], enricher: &dyn Enricher) {
    for intervention in interventions.iter_mut() {
        let date = intervention.display_date.format("%d/%m/%Y").to_string();
        let enhanced = match enricher.enhance(&intervention.raw_text, &date) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("enrichment failed, keeping raw text: {e}");
                intervention.raw_text.clone()
            }
        };
        intervention.enhanced_text = Some(enhanced);
        if intervention.title.is_none() {
            intervention.title = Some(enricher.title(&date));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::segment;
    use crate::pipeline::testutil::*;

    #[test]
    fn passthrough_fills_title_and_text() {
        let rules = rules();
        let messages = vec![msg("ed@jardin.fr", "Edward Carey", "Taille le 15/01", "2024-03-10T09:00:00Z")];
        let mut interventions = segment::group(&messages, &rules);
        enrich_all(&mut interventions, &Passthrough);
        let i = &interventions[0];
        assert_eq!(i.enhanced_text.as_deref(), Some("Taille le 15/01"));
        assert_eq!(i.title.as_deref(), Some("Intervention du 15/01/2024"));
    }
}

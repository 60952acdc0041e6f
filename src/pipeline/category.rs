/// Keyword table for intervention categories. First match wins, so the more
/// specific work types come before "Entretien général".
const CATEGORIES: &[(&str, &[&str])] = &[
    ("Taille", &["taille", "taillé", "coupe", "élagage", "élagué"]),
    ("Désherbage", &["désherbage", "désherbé", "mauvaises herbes", "herbes"]),
    ("Arrosage", &["arrosage", "arrosé", "eau", "irrigation"]),
    ("Nettoyage", &["nettoyage", "nettoyé", "propre", "ramassage"]),
    ("Plantation", &["plantation", "planté", "semis", "repiquage"]),
    ("Fertilisation", &["engrais", "fertilisation", "nutriments"]),
    ("Palissage", &["palissage", "palissé", "tuteur", "support"]),
    ("Entretien général", &["entretien", "maintenance", "ras", "rien à signaler"]),
];

/// Deterministic category label for an intervention's text.
pub fn categorize(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or("Autre")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert_eq!(categorize("Grosse TAILLE des rosiers"), "Taille");
        assert_eq!(categorize("arrosage automatique vérifié"), "Arrosage");
        assert_eq!(categorize("Plantation de bulbes"), "Plantation");
    }

    #[test]
    fn first_listed_category_wins() {
        // "taille" and "arrosage" both present: table order decides.
        assert_eq!(categorize("taille puis arrosage"), "Taille");
    }

    #[test]
    fn unknown_text_is_autre() {
        assert_eq!(categorize("visite de contrôle"), "Autre");
        assert_eq!(categorize(""), "Autre");
    }
}

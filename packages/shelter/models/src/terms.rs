//! Fixed vocabulary of need-filter terms.
//!
//! Public search lets citizens narrow shelters down to those with an active
//! need matching one of these terms. Anything outside the vocabulary is
//! dropped silently.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A need-filter term from the closed vocabulary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum NeedTerm {
    /// Drinking water.
    #[serde(rename = "água")]
    #[strum(serialize = "água")]
    Agua,
    /// Food.
    #[serde(rename = "alimentos")]
    #[strum(serialize = "alimentos")]
    Alimentos,
    /// Mattresses and bedding.
    #[serde(rename = "colchões")]
    #[strum(serialize = "colchões")]
    Colchoes,
    /// Hygiene products.
    #[serde(rename = "higiene")]
    #[strum(serialize = "higiene")]
    Higiene,
    /// Medicine.
    #[serde(rename = "remédios")]
    #[strum(serialize = "remédios")]
    Remedios,
}

impl NeedTerm {
    /// Returns all terms in vocabulary order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Agua,
            Self::Alimentos,
            Self::Colchoes,
            Self::Higiene,
            Self::Remedios,
        ]
    }

    /// Parses a single raw term: trimmed, lowercased, and matched against
    /// the vocabulary. Returns `None` for anything unrecognized.
    #[must_use]
    pub fn parse_term(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        normalized.parse().ok()
    }

    /// Parses a comma-separated list such as `"água, Remédios,foo"`,
    /// keeping recognized terms in order and dropping duplicates.
    #[must_use]
    pub fn parse_list(raw: &str) -> Vec<Self> {
        normalize_terms(raw.split(','))
    }
}

/// Validates a list of raw terms, dropping unrecognized ones and
/// duplicates while preserving first-seen order.
pub fn normalize_terms<I, S>(raw: I) -> Vec<NeedTerm>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut terms: Vec<NeedTerm> = Vec::new();
    for term in raw.into_iter().filter_map(|t| NeedTerm::parse_term(t.as_ref())) {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively_and_trims() {
        assert_eq!(NeedTerm::parse_term("  ÁGUA "), Some(NeedTerm::Agua));
        assert_eq!(NeedTerm::parse_term("Remédios"), Some(NeedTerm::Remedios));
        assert_eq!(NeedTerm::parse_term("roupas"), None);
        assert_eq!(NeedTerm::parse_term("   "), None);
    }

    #[test]
    fn list_drops_unknown_and_duplicate_terms() {
        assert_eq!(
            NeedTerm::parse_list("higiene,roupas, Higiene ,colchões,"),
            vec![NeedTerm::Higiene, NeedTerm::Colchoes]
        );
        assert!(NeedTerm::parse_list("roupas,brinquedos").is_empty());
        assert!(NeedTerm::parse_list("").is_empty());
    }

    #[test]
    fn display_matches_vocabulary() {
        let words: Vec<String> = NeedTerm::all().iter().map(ToString::to_string).collect();
        assert_eq!(
            words,
            vec!["água", "alimentos", "colchões", "higiene", "remédios"]
        );
    }
}

// src/config/vocabulary.rs
//! Controlled vocabularies for generated posts: the closed category set and
//! the configurable hashtag list.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Exactly one of four fixed post categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Category {
    #[serde(rename = "Clinical Practice")]
    ClinicalPractice,
    #[serde(rename = "Health Policy")]
    HealthPolicy,
    #[serde(rename = "Digital Health")]
    DigitalHealth,
    #[serde(rename = "Industry News")]
    IndustryNews,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::ClinicalPractice => "Clinical Practice",
            Category::HealthPolicy => "Health Policy",
            Category::DigitalHealth => "Digital Health",
            Category::IndustryNews => "Industry News",
        }
    }

    /// Space-free form used when the category is prepended to hashtags.
    pub fn as_hashtag(self) -> &'static str {
        match self {
            Category::ClinicalPractice => "ClinicalPractice",
            Category::HealthPolicy => "HealthPolicy",
            Category::DigitalHealth => "DigitalHealth",
            Category::IndustryNews => "IndustryNews",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn default_hashtags() -> Vec<String> {
    [
        "HealthTech",
        "DigitalHealth",
        "MedTech",
        "AI",
        "Pharma",
        "ClinicalTrials",
        "PublicHealth",
        "NHS",
        "PrimaryCare",
        "MentalHealth",
        "Oncology",
        "Cardiology",
        "Diabetes",
        "Vaccines",
        "PatientSafety",
        "Regulation",
        "Research",
        "Innovation",
        "Startups",
        "Funding",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Hashtag vocabulary. Matching ignores case and a leading `#`, and always
/// yields the configured spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();
        for it in items {
            let t = it.as_ref().trim().trim_start_matches('#').trim();
            if t.is_empty() || !seen.insert(t.to_lowercase()) {
                continue;
            }
            entries.push(t.to_string());
        }
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.to_lowercase(), i))
            .collect();
        Self { entries, index }
    }

    pub fn canonicalize(&self, tag: &str) -> Option<&str> {
        let key = tag.trim().trim_start_matches('#').trim().to_lowercase();
        self.index.get(&key).map(|&i| self.entries[i].as_str())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(default_hashtags())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_serde_labels() {
        for c in [
            Category::ClinicalPractice,
            Category::HealthPolicy,
            Category::DigitalHealth,
            Category::IndustryNews,
        ] {
            let s = serde_json::to_string(&c).unwrap();
            assert_eq!(s, format!("\"{}\"", c.label()));
            assert!(!c.as_hashtag().contains(' '));
        }
        assert!(serde_json::from_str::<Category>("\"Sports\"").is_err());
    }

    #[test]
    fn vocabulary_trims_dedups_and_canonicalizes() {
        let v = Vocabulary::new(["#AI", " ai ", "", "MedTech"]);
        assert_eq!(v.entries(), &["AI".to_string(), "MedTech".to_string()]);
        assert_eq!(v.canonicalize("#medtech"), Some("MedTech"));
        assert_eq!(v.canonicalize("Crypto"), None);
    }
}

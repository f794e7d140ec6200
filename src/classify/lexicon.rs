// Term-count classifier backed by a JSON lexicon file.
//
// The model file looks like:
//
//   {"default": "neu", "labels": {"pos": ["great", "love"], "neg": ["awful"]}}
//
// Each label scores one point per occurrence of any of its terms in the
// lowercased text. The highest score wins; ties go to the label that sorts
// first, and a text with no hits gets the default label.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::traits::Classifier;

#[derive(Debug, Deserialize)]
struct LexiconFile {
    default: String,
    #[serde(default)]
    labels: BTreeMap<String, Vec<String>>,
}

pub struct LexiconClassifier {
    default: String,
    /// Label -> lowercased terms, sorted by label
    labels: BTreeMap<String, Vec<String>>,
}

impl LexiconClassifier {
    /// Load a lexicon model from disk. A missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Classifier model not found: {}", path.display());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read classifier model {}", path.display()))?;
        let file: LexiconFile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse classifier model {}", path.display()))?;

        debug!(
            path = %path.display(),
            labels = file.labels.len(),
            "Loaded lexicon classifier"
        );
        Ok(Self::from_terms(file.default, file.labels))
    }

    /// Build a classifier directly from a label -> terms map.
    pub fn from_terms(default: impl Into<String>, labels: BTreeMap<String, Vec<String>>) -> Self {
        let labels = labels
            .into_iter()
            .map(|(label, terms)| {
                let terms = terms
                    .into_iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect();
                (label, terms)
            })
            .collect();
        Self {
            default: default.into(),
            labels,
        }
    }

    fn score(terms: &[String], text: &str, words: &[&str]) -> usize {
        terms
            .iter()
            .map(|term| {
                if term.contains(' ') {
                    text.matches(term.as_str()).count()
                } else {
                    words.iter().filter(|w| **w == term.as_str()).count()
                }
            })
            .sum()
    }
}

impl Classifier for LexiconClassifier {
    fn classify(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '#'))
            .map(|w| w.trim_start_matches('#'))
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<(&str, usize)> = None;
        for (label, terms) in &self.labels {
            let hits = Self::score(terms, &lowered, &words);
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((label.as_str(), hits));
            }
        }

        best.map(|(label, _)| label.to_string())
            .unwrap_or_else(|| self.default.clone())
    }
}

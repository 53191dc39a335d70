use std::collections::{BTreeMap, BTreeSet};

use tagscope_models::text::tokenize;

/// Groups of interchangeable plant vocabulary. Tokens are already normalized.
const BUILTIN_GROUPS: &[&[&str]] = &[
    &["speed", "rpm", "velocity", "velocidade"],
    &["temperature", "temp", "temperatura"],
    &["pressure", "press", "pressao"],
    &["power", "kw", "potencia"],
    &["current", "amps", "amp", "corrente"],
    &["flow", "flowrate", "caudal"],
    &["level", "nivel"],
    &["vibration", "vib", "vibracao"],
    &["motor", "drive"],
];

/// A query term: either a word the user typed or one added by synonym expansion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryTerm {
    pub text: String,
    /// The literal term this was expanded from; `None` for literal terms.
    pub expanded_from: Option<String>,
}

impl QueryTerm {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expanded_from: None,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.expanded_from.is_none()
    }
}

/// Bidirectional synonym lookup built from the built-in groups plus configured extras.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    related: BTreeMap<String, BTreeSet<String>>,
}

impl SynonymTable {
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for group in BUILTIN_GROUPS {
            table.add_group(group.iter().map(|s| s.to_string()));
        }
        table
    }

    /// Built-in groups plus `extra` groups from configuration. Extra words are
    /// normalized the same way queries are.
    pub fn with_extra(extra: &[Vec<String>]) -> Self {
        let mut table = Self::builtin();
        for group in extra {
            table.add_group(group.iter().flat_map(|w| tokenize(w)));
        }
        table
    }

    fn add_group(&mut self, words: impl IntoIterator<Item = String>) {
        let words: BTreeSet<String> = words.into_iter().filter(|w| !w.is_empty()).collect();
        for word in &words {
            let entry = self.related.entry(word.clone()).or_default();
            entry.extend(words.iter().filter(|w| *w != word).cloned());
        }
    }

    pub fn synonyms_of(&self, word: &str) -> impl Iterator<Item = &str> {
        self.related
            .get(word)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Literal terms followed by synonym terms. Expansion only adds: a synonym
    /// that is also a literal term stays literal, and each synonym appears once.
    pub fn expand(&self, literals: &[String]) -> Vec<QueryTerm> {
        let literal_set: BTreeSet<&str> = literals.iter().map(String::as_str).collect();
        let mut terms: Vec<QueryTerm> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for literal in literals {
            if seen.insert(literal.clone()) {
                terms.push(QueryTerm::literal(literal.clone()));
            }
        }
        for literal in literals {
            for synonym in self.synonyms_of(literal) {
                if literal_set.contains(synonym) || !seen.insert(synonym.to_string()) {
                    continue;
                }
                terms.push(QueryTerm {
                    text: synonym.to_string(),
                    expanded_from: Some(literal.clone()),
                });
            }
        }
        terms
    }
}

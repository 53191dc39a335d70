//! Candidate scoring, ranking and confidence.
//!
//! Each literal query term earns at most one name tier (exact, prefix, contains,
//! fuzzy), plus folder-context points for every path segment it appears in and
//! a description point. Synonym terms only add the synonym weight, once per
//! candidate, so a literal hit always outranks a synonym hit.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use tagscope_models::config::{ResolverConfig, ScoreWeights};
use tagscope_models::tag::{ScoredCandidate, TagCandidate};
use tagscope_models::text::tokenize;

use crate::synonyms::QueryTerm;

/// Words that carry no tag-matching signal.
const STOPWORDS: [&str; 12] = [
    "the", "a", "an", "of", "at", "for", "in", "on", "and", "do", "da", "de",
];

/// Normalize a query into literal terms, dropping stopwords and repeats.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Classic two-row edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Tokenized view of one candidate, built once per scoring pass.
struct CandidateTokens {
    name: Vec<String>,
    compact_name: String,
    /// One token list per folder segment above the tag.
    folders: Vec<Vec<String>>,
    description: BTreeSet<String>,
}

impl CandidateTokens {
    fn new(candidate: &TagCandidate) -> Self {
        let name = tokenize(&candidate.name);
        let compact_name = name.concat();
        let folders = candidate.folders().map(tokenize).collect();
        let description = candidate
            .description
            .as_deref()
            .map(|d| tokenize(d).into_iter().collect())
            .unwrap_or_default();
        Self {
            name,
            compact_name,
            folders,
            description,
        }
    }

    fn folder_hits(&self, term: &str) -> usize {
        self.folders
            .iter()
            .filter(|segment| segment.iter().any(|t| t == term) || segment.concat() == term)
            .count()
    }

    fn mentions(&self, term: &str) -> bool {
        self.name.iter().any(|t| t == term) || self.folder_hits(term) > 0
    }
}

pub struct Scorer<'a> {
    weights: &'a ScoreWeights,
    fuzzy_max_distance: usize,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a ResolverConfig) -> Self {
        Self {
            weights: &config.weights,
            fuzzy_max_distance: config.fuzzy_max_distance,
        }
    }

    fn name_tier(&self, term: &str, tokens: &CandidateTokens) -> f64 {
        if tokens.name.iter().any(|t| t == term) {
            self.weights.exact
        } else if tokens.compact_name.starts_with(term) {
            self.weights.prefix
        } else if tokens.compact_name.contains(term) {
            self.weights.contains
        } else if term.chars().count() > self.fuzzy_max_distance
            && tokens.name.iter().any(|t| {
                t.chars().count() > self.fuzzy_max_distance
                    && levenshtein(term, t) <= self.fuzzy_max_distance
            })
        {
            self.weights.fuzzy
        } else {
            0.0
        }
    }

    /// Score one candidate. `None` when no term matched anything.
    pub fn score(&self, candidate: &TagCandidate, terms: &[QueryTerm]) -> Option<ScoredCandidate> {
        let tokens = CandidateTokens::new(candidate);
        let mut score = 0.0;
        let mut matched = BTreeSet::new();
        let mut synonym_hit = false;

        for term in terms {
            let text = term.text.as_str();
            if term.is_literal() {
                let mut points = self.name_tier(text, &tokens);
                points += self.weights.path * tokens.folder_hits(text) as f64;
                if tokens.description.contains(text) {
                    points += self.weights.description;
                }
                if points > 0.0 {
                    score += points;
                    matched.insert(term.text.clone());
                }
            } else if tokens.mentions(text) {
                if !synonym_hit {
                    score += self.weights.synonym;
                    synonym_hit = true;
                }
                matched.insert(term.text.clone());
            }
        }

        if matched.is_empty() {
            return None;
        }
        Some(ScoredCandidate {
            candidate: candidate.clone(),
            score,
            matched_terms: matched,
        })
    }

    /// Score, discard non-matches and rank.
    pub fn rank(&self, candidates: &[TagCandidate], terms: &[QueryTerm]) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .filter_map(|c| self.score(c, terms))
            .collect();
        scored.sort_by(compare_ranked);
        scored
    }

    /// Best achievable score for `literal_terms` terms: one exact name hit and
    /// a folder hit for every other term.
    pub fn ceiling(&self, literal_terms: usize) -> f64 {
        if literal_terms == 0 {
            return 0.0;
        }
        self.weights.exact + self.weights.path * (literal_terms - 1) as f64
    }
}

/// Score descending, then shorter path, then path lexical order.
pub fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.candidate.path.len().cmp(&b.candidate.path.len()))
        .then_with(|| a.candidate.path.cmp(&b.candidate.path))
}

/// `top / ceiling` clamped to `[0, 1]`.
pub fn confidence(top_score: Option<f64>, ceiling: f64) -> f64 {
    match top_score {
        Some(score) if ceiling > 0.0 => (score / ceiling).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// True when the top two scores are within `margin` of each other.
pub fn is_tie(ranked: &[ScoredCandidate], margin: f64) -> bool {
    match ranked {
        [first, second, ..] => first.score - second.score <= margin,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synonyms::SynonymTable;

    fn terms(query: &str) -> Vec<QueryTerm> {
        SynonymTable::builtin().expand(&query_terms(query))
    }

    fn tag(path: &str) -> TagCandidate {
        let name = path.rsplit('/').next().unwrap_or(path);
        TagCandidate::new(name, path)
    }

    #[test]
    fn edit_distance() {
        assert_eq!(levenshtein("kiln", "kiln"), 0);
        assert_eq!(levenshtein("temprature", "temperature"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("speed", "rpm"), 4);
    }

    #[test]
    fn stopwords_and_duplicates_dropped() {
        assert_eq!(query_terms("Speed of the kiln kiln"), vec!["speed", "kiln"]);
    }

    #[test]
    fn literal_match_beats_synonym_match() {
        let config = ResolverConfig::default();
        let scorer = Scorer::new(&config);
        let q = terms("kiln main drive speed");
        let ranked = scorer.rank(
            &[
                tag("Views/Outao/Line1/Kiln/MainDrive/RPM"),
                tag("Views/Outao/Line1/Kiln/MainDrive/Speed"),
            ],
            &q,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].candidate.name, "Speed");
        assert_eq!(ranked[0].score, 10.0);
        assert_eq!(ranked[1].score, 7.0);
        assert!(ranked[1].matched_terms.contains("rpm"));
        assert_eq!(confidence(Some(ranked[0].score), scorer.ceiling(4)), 1.0);
    }

    #[test]
    fn name_tiers_are_exclusive() {
        let config = ResolverConfig::default();
        let scorer = Scorer::new(&config);
        let exact = scorer.score(&tag("A/Temp"), &[QueryTerm::literal("temp")]).unwrap();
        let prefix = scorer
            .score(&tag("A/Temperature"), &[QueryTerm::literal("temp")])
            .unwrap();
        let contains = scorer
            .score(&tag("A/OutletTemp2"), &[QueryTerm::literal("temp")])
            .unwrap();
        let fuzzy = scorer
            .score(&tag("A/Temprature"), &[QueryTerm::literal("temperature")])
            .unwrap();
        assert_eq!(exact.score, 4.0);
        assert_eq!(prefix.score, 3.0);
        assert_eq!(contains.score, 2.0);
        assert_eq!(fuzzy.score, 1.0);
    }

    #[test]
    fn unmatched_candidates_are_discarded() {
        let config = ResolverConfig::default();
        let scorer = Scorer::new(&config);
        let ranked = scorer.rank(&[tag("Views/Mill/Power")], &terms("kiln speed"));
        assert!(ranked.is_empty());
    }

    #[test]
    fn description_adds_lowest_weight() {
        let config = ResolverConfig::default();
        let scorer = Scorer::new(&config);
        let candidate = tag("Plant/FT101").with_description("Clinker cooler flow");
        let scored = scorer.score(&candidate, &terms("cooler")).unwrap();
        assert_eq!(scored.score, 1.0);
    }

    #[test]
    fn ties_break_on_path_length_then_lexically() {
        let config = ResolverConfig::default();
        let scorer = Scorer::new(&config);
        let ranked = scorer.rank(
            &[tag("Views/B/Speed"), tag("Views/Long/Speed"), tag("Views/A/Speed")],
            &terms("speed"),
        );
        let paths: Vec<&str> = ranked.iter().map(|s| s.candidate.path.as_str()).collect();
        assert_eq!(paths, vec!["Views/A/Speed", "Views/B/Speed", "Views/Long/Speed"]);
        assert!(is_tie(&ranked, config.tie_margin));
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(confidence(None, 10.0), 0.0);
        assert_eq!(confidence(Some(3.0), 0.0), 0.0);
        assert_eq!(confidence(Some(12.0), 10.0), 1.0);
        assert!((confidence(Some(7.0), 10.0) - 0.7).abs() < 1e-9);
    }
}

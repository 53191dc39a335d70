use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tagscope_cache::Catalog;
use tagscope_client::response::parse_tag_listing;
use tagscope_client::{CallOptions, ClientError, ResilientClient};
use tagscope_models::config::{ResolverConfig, TagscopeConfig};
use tagscope_models::read::ResponseSource;
use tagscope_models::remote::RemoteRequest;
use tagscope_models::resolution::{ConfidenceLabel, ResolutionResult};
use tagscope_models::tag::TagCandidate;
use tagscope_models::text::tokenize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clarify::clarifying_question;
use crate::error::ResolverError;
use crate::scoring::{confidence, is_tie, query_terms, Scorer};
use crate::synonyms::SynonymTable;
use crate::time_expr::{extract_time_phrase, parse_range, parse_timezone};

/// Input to [`Resolver::resolve`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub query: String,
    /// Browse roots to search under. Empty means "infer from the query".
    #[serde(default)]
    pub hint_paths: Vec<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub bypass_cache: bool,
    /// Budget for the live search, in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl ResolveRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_hints(mut self, hint_paths: Vec<String>) -> Self {
        self.hint_paths = hint_paths;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }
}

/// Search scope inferred for one request.
struct Scope {
    hints: Vec<String>,
    site: Option<String>,
}

/// Turns natural-language tag descriptions into ranked historian paths.
pub struct Resolver {
    client: Arc<ResilientClient>,
    catalog: Arc<Catalog>,
    config: ResolverConfig,
    synonyms: SynonymTable,
    timezone: Tz,
}

impl Resolver {
    pub fn new(
        client: Arc<ResilientClient>,
        catalog: Arc<Catalog>,
        config: ResolverConfig,
        timezone: Tz,
    ) -> Self {
        let synonyms = SynonymTable::with_extra(&config.synonyms);
        Self {
            client,
            catalog,
            config,
            synonyms,
            timezone,
        }
    }

    pub fn from_config(
        client: Arc<ResilientClient>,
        catalog: Arc<Catalog>,
        config: &TagscopeConfig,
    ) -> Result<Self, ResolverError> {
        let timezone = parse_timezone(&config.historian.timezone)
            .map_err(|e| ResolverError::Config(e.to_string()))?;
        Ok(Self::new(client, catalog, config.resolver.clone(), timezone))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Result<ResolutionResult, ResolverError> {
        self.resolve_at(request, Utc::now()).await
    }

    /// Resolve with an explicit reference instant for time phrases.
    pub async fn resolve_at(
        &self,
        request: &ResolveRequest,
        reference: DateTime<Utc>,
    ) -> Result<ResolutionResult, ResolverError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("resolve", request_id = %request_id);
        self.run(request_id, request, reference).instrument(span).await
    }

    fn scope(&self, literals: &[String], hint_paths: &[String]) -> Scope {
        let site = self
            .config
            .sites
            .iter()
            .find(|(keyword, _)| {
                let words = tokenize(keyword);
                !words.is_empty() && words.iter().all(|w| literals.contains(w))
            })
            .map(|(keyword, root)| (keyword.clone(), root.clone()));

        let hints = if !hint_paths.is_empty() {
            hint_paths.to_vec()
        } else if let Some((_, root)) = &site {
            vec![root.clone()]
        } else {
            vec![self.config.default_root.clone()]
        };
        Scope {
            hints,
            site: site.map(|(keyword, root)| format!("{keyword} ({root})")),
        }
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &ResolveRequest,
        reference: DateTime<Utc>,
    ) -> Result<ResolutionResult, ResolverError> {
        let start = Instant::now();
        let mut assumptions = BTreeMap::new();
        let mut notes = Vec::new();

        // 1. Pull out any time phrase so it does not pollute tag matching
        let mut text = request.query.clone();
        let mut time_range = None;
        if let Some(found) = extract_time_phrase(&request.query) {
            match parse_range(&found.phrase, reference, self.timezone) {
                Ok(range) => {
                    assumptions.insert("time_range".to_string(), range.describe());
                    time_range = Some(range);
                    text = found.remainder;
                }
                Err(e) => notes.push(format!("time phrase ignored: {e}")),
            }
        }

        // 2. Normalize and expand
        let literals = query_terms(&text);
        let terms = self.synonyms.expand(&literals);
        let scope = self.scope(&literals, &request.hint_paths);
        if let Some(site) = &scope.site {
            assumptions.insert("site".to_string(), site.clone());
        }
        assumptions.insert("search_scope".to_string(), scope.hints.join(", "));

        // 3. Gather candidates from the catalog and the historian in parallel
        let mut degraded = false;
        let mut candidates: BTreeMap<String, TagCandidate> = BTreeMap::new();
        if !literals.is_empty() {
            let tokens: Vec<String> = terms.iter().map(|t| t.text.clone()).collect();
            let live_query = literals.join(" ");
            let options = CallOptions {
                bypass_cache: request.bypass_cache,
                deadline: request
                    .deadline_ms
                    .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms)),
            };
            let live_calls = scope.hints.iter().map(|hint| {
                let remote = RemoteRequest::search_tags(
                    hint.clone(),
                    live_query.clone(),
                    self.config.live_search_limit,
                );
                let client = Arc::clone(&self.client);
                async move { client.execute(&remote, options).await }
            });

            let (catalog, live) = tokio::join!(self.catalog.search(&tokens), join_all(live_calls));

            let mut live_errors = Vec::new();
            for outcome in live {
                match outcome {
                    Ok(response) => {
                        if response.source == ResponseSource::StaleCache {
                            notes.push("live search served from stale cache".to_string());
                        }
                        let listing = parse_tag_listing(&response.body);
                        notes.extend(listing.notes);
                        for tag in listing.tags {
                            merge_candidate(&mut candidates, tag);
                        }
                    }
                    Err(ClientError::Config(message)) => return Err(ResolverError::Config(message)),
                    Err(e) => {
                        warn!(error = %e, "Live tag search failed, continuing with catalog");
                        live_errors.push(e.to_string());
                    }
                }
            }

            let catalog_error = match catalog {
                Ok(found) => {
                    for tag in found.iter() {
                        merge_candidate(&mut candidates, tag.clone());
                    }
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Catalog search failed");
                    notes.push(format!("catalog unavailable: {e}"));
                    Some(e.to_string())
                }
            };

            if !live_errors.is_empty() {
                if live_errors.len() == scope.hints.len() {
                    if let Some(catalog) = catalog_error {
                        return Err(ResolverError::Unavailable {
                            catalog,
                            live: live_errors.join("; "),
                        });
                    }
                }
                degraded = true;
                notes.push(format!(
                    "live search unavailable, results may be incomplete: {}",
                    live_errors.join("; ")
                ));
            }
        }

        // 4. Score and rank
        let scorer = Scorer::new(&self.config);
        let pool: Vec<TagCandidate> = candidates.into_values().collect();
        let mut ranked = scorer.rank(&pool, &terms);

        // 5. Confidence and clarification
        let mut score = confidence(ranked.first().map(|c| c.score), scorer.ceiling(literals.len()));
        if degraded {
            score *= self.config.degraded_confidence_factor;
        }
        let label = ConfidenceLabel::from_confidence(
            score,
            self.config.high_threshold,
            self.config.medium_threshold,
        );
        let clarifying_question =
            if label == ConfidenceLabel::Low || is_tie(&ranked, self.config.tie_margin) {
                Some(clarifying_question(
                    &ranked,
                    &self.config.sites,
                    scope.site.is_some(),
                ))
            } else {
                None
            };

        let top_k = request
            .top_k
            .filter(|k| *k > 0)
            .unwrap_or(self.config.default_top_k);
        let found = ranked.len();
        ranked.truncate(top_k);

        info!(
            query = %request.query,
            found,
            confidence = score,
            label = ?label,
            degraded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Resolution complete"
        );

        Ok(ResolutionResult {
            request_id,
            query: request.query.clone(),
            assumptions,
            candidates: ranked,
            confidence: score,
            confidence_label: label,
            clarifying_question,
            time_range,
            notes,
        })
    }
}

fn merge_candidate(candidates: &mut BTreeMap<String, TagCandidate>, tag: TagCandidate) {
    match candidates.entry(tag.path.clone()) {
        Entry::Occupied(mut existing) => existing.get_mut().merge(&tag),
        Entry::Vacant(slot) => {
            slot.insert(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_first_sighting_and_fills_gaps() {
        let mut map = BTreeMap::new();
        merge_candidate(&mut map, TagCandidate::new("Speed", "A/Speed").with_data_type("Float8"));
        merge_candidate(
            &mut map,
            TagCandidate::new("Speed", "A/Speed").with_description("Drive speed"),
        );
        let tag = &map["A/Speed"];
        assert_eq!(tag.data_type.as_deref(), Some("Float8"));
        assert_eq!(tag.description.as_deref(), Some("Drive speed"));
    }

    #[test]
    fn request_builder_defaults() {
        let request = ResolveRequest::new("kiln speed").with_top_k(3).bypass_cache(true);
        assert_eq!(request.top_k, Some(3));
        assert!(request.bypass_cache);
        assert!(request.hint_paths.is_empty());
        assert!(request.deadline_ms.is_none());
    }
}

// persona-gate-providers/src/retrieval.rs
// ============================================================================
// Module: Retrieval Strategies
// Description: Trigram, vector, and hybrid evidence retrieval.
// Purpose: Rank citable evidence for a query deterministically.
// Dependencies: persona-gate-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! Three strategies implement [`RetrievalProvider`]: `trgm` scores trigram
//! similarity over title and excerpt in process, `qdrant` searches the
//! vector store with an embedded query, and `hybrid` fuses both after
//! per-strategy min-max normalisation. All strategies order by descending
//! score with ties broken by evidence id ascending and never exceed the
//! query's `top_k`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use persona_gate_core::CatalogStore;
use persona_gate_core::Citation;
use persona_gate_core::EmbeddingProvider;
use persona_gate_core::EvidenceId;
use persona_gate_core::EvidenceQuery;
use persona_gate_core::RetrievalError;
use persona_gate_core::RetrievalProvider;
use persona_gate_core::RetrievalStrategy;
use persona_gate_core::Scope;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::llm::ProviderBuildError;

// ============================================================================
// SECTION: Trigram Scoring
// ============================================================================

/// Extracts padded word trigrams from text, lowercased.
fn trigrams(text: &str) -> BTreeSet<String> {
    let mut grams = BTreeSet::new();
    let lowered = text.to_lowercase();
    for word in lowered.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let padded: Vec<char> = format!("  {word} ").chars().collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

/// Computes trigram set similarity between two texts.
///
/// Similarity is shared trigrams over the union, the same measure the
/// `pg_trgm` operator exposes; identical texts score 1.0, disjoint texts 0.0.
#[must_use]
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let grams_a = trigrams(a);
    let grams_b = trigrams(b);
    if grams_a.is_empty() || grams_b.is_empty() {
        return 0.0;
    }
    let shared = grams_a.intersection(&grams_b).count();
    let union = grams_a.union(&grams_b).count();
    if union == 0 {
        return 0.0;
    }
    let shared = u32::try_from(shared).unwrap_or(u32::MAX);
    let union = u32::try_from(union).unwrap_or(u32::MAX);
    f64::from(shared) / f64::from(union)
}

/// Sorts citations by descending score with evidence id ascending ties.
fn sort_citations(citations: &mut [Citation]) {
    citations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.evidence_id.cmp(&b.evidence_id))
    });
}

/// Applies the score floor and top-k cap after sorting.
fn finalize(mut citations: Vec<Citation>, query: &EvidenceQuery) -> Vec<Citation> {
    citations.retain(|citation| citation.score >= query.min_score);
    sort_citations(&mut citations);
    citations.truncate(query.top_k);
    citations
}

// ============================================================================
// SECTION: Trigram Retriever
// ============================================================================

/// In-process trigram retrieval over stored evidence.
pub struct TrgmRetriever {
    /// Evidence catalog.
    catalog: Arc<dyn CatalogStore>,
    /// Candidate rows scored per query.
    candidate_limit: usize,
}

impl TrgmRetriever {
    /// Creates a trigram retriever.
    #[must_use]
    pub const fn new(catalog: Arc<dyn CatalogStore>, candidate_limit: usize) -> Self {
        Self {
            catalog,
            candidate_limit,
        }
    }
}

#[async_trait]
impl RetrievalProvider for TrgmRetriever {
    fn strategy_name(&self) -> &'static str {
        "trgm"
    }

    async fn retrieve(
        &self,
        scope: &Scope,
        query: &EvidenceQuery,
    ) -> Result<Vec<Citation>, RetrievalError> {
        let candidates = self
            .catalog
            .evidence_in_domains(scope, &query.domains, self.candidate_limit)
            .map_err(|err| RetrievalError::Provider(err.to_string()))?;
        let citations = candidates
            .into_iter()
            .map(|evidence| {
                let haystack = format!("{} {}", evidence.title, evidence.excerpt);
                let score = trigram_similarity(&query.query, &haystack);
                Citation {
                    evidence_id: evidence.id,
                    title: evidence.title,
                    excerpt: evidence.excerpt,
                    score,
                    confidence: evidence.confidence,
                    verified: evidence.verified,
                }
            })
            .collect();
        Ok(finalize(citations, query))
    }
}

// ============================================================================
// SECTION: Qdrant Retriever
// ============================================================================

/// One scored point in a qdrant search response.
#[derive(Debug, Deserialize)]
struct QdrantPoint {
    /// Point identifier.
    id: Value,
    /// Cosine score.
    score: f64,
    /// Stored payload.
    #[serde(default)]
    payload: Value,
}

/// Qdrant search response body.
#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    /// Scored points.
    #[serde(default)]
    result: Vec<QdrantPoint>,
}

/// Vector retrieval through the qdrant REST search API.
pub struct QdrantRetriever {
    /// Qdrant endpoint.
    url: String,
    /// Collection holding evidence vectors.
    collection: String,
    /// Optional API key.
    api_key: Option<String>,
    /// Query embedder.
    embedder: Arc<dyn EmbeddingProvider>,
    /// HTTP client.
    client: Client,
}

impl QdrantRetriever {
    /// Creates a qdrant retriever.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderBuildError`] when the HTTP client cannot be built.
    pub fn new(
        url: String,
        collection: String,
        api_key: Option<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderBuildError::Client(err.to_string()))?;
        Ok(Self {
            url,
            collection,
            api_key,
            embedder,
            client,
        })
    }

    /// Converts one scored point into a citation.
    fn citation_from_point(point: QdrantPoint) -> Citation {
        let id = match &point.id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        };
        let payload = &point.payload;
        let text = |key: &str| {
            payload.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
        };
        Citation {
            evidence_id: EvidenceId::new(id),
            title: text("title"),
            excerpt: text("excerpt"),
            score: point.score,
            confidence: payload.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
            verified: payload.get("verified").and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

#[async_trait]
impl RetrievalProvider for QdrantRetriever {
    fn strategy_name(&self) -> &'static str {
        "qdrant"
    }

    async fn retrieve(
        &self,
        scope: &Scope,
        query: &EvidenceQuery,
    ) -> Result<Vec<Citation>, RetrievalError> {
        let vector = self
            .embedder
            .embed(&query.query)
            .await
            .map_err(|err| RetrievalError::Provider(err.to_string()))?;

        let mut must = vec![
            json!({"key": "tenant_id", "match": {"value": scope.tenant_id.as_str()}}),
            json!({"key": "site_id", "match": {"value": scope.site_id.as_str()}}),
        ];
        if !query.domains.is_empty() {
            must.push(json!({"key": "domain", "match": {"any": query.domains}}));
        }
        let body = json!({
            "vector": vector,
            "limit": query.top_k,
            "filter": {"must": must},
            "with_payload": true,
        });

        let url = format!(
            "{}/collections/{}/points/search",
            self.url.trim_end_matches('/'),
            self.collection
        );
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                RetrievalError::Timeout(err.to_string())
            } else {
                RetrievalError::Provider(err.to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(RetrievalError::Provider(format!(
                "qdrant search failed with status {}",
                response.status().as_u16()
            )));
        }
        let parsed: QdrantSearchResponse = response
            .json()
            .await
            .map_err(|err| RetrievalError::Provider(err.to_string()))?;
        let citations = parsed.result.into_iter().map(Self::citation_from_point).collect();
        Ok(finalize(citations, query))
    }
}

// ============================================================================
// SECTION: Hybrid Retriever
// ============================================================================

/// Weighted fusion of the trigram and vector strategies.
pub struct HybridRetriever {
    /// Trigram side.
    trgm: Arc<dyn RetrievalProvider>,
    /// Vector side.
    qdrant: Arc<dyn RetrievalProvider>,
    /// Trigram fusion weight.
    trgm_weight: f64,
    /// Vector fusion weight.
    qdrant_weight: f64,
}

impl HybridRetriever {
    /// Creates a hybrid retriever over both strategies.
    #[must_use]
    pub const fn new(
        trgm: Arc<dyn RetrievalProvider>,
        qdrant: Arc<dyn RetrievalProvider>,
        trgm_weight: f64,
        qdrant_weight: f64,
    ) -> Self {
        Self {
            trgm,
            qdrant,
            trgm_weight,
            qdrant_weight,
        }
    }
}

/// Min-max normalises scores in place; a constant set maps to 1.0.
fn normalise(citations: &mut [Citation]) {
    let Some(min) = citations.iter().map(|c| c.score).reduce(f64::min) else {
        return;
    };
    let Some(max) = citations.iter().map(|c| c.score).reduce(f64::max) else {
        return;
    };
    let range = max - min;
    for citation in citations {
        citation.score = if range > f64::EPSILON { (citation.score - min) / range } else { 1.0 };
    }
}

#[async_trait]
impl RetrievalProvider for HybridRetriever {
    fn strategy_name(&self) -> &'static str {
        "hybrid"
    }

    async fn retrieve(
        &self,
        scope: &Scope,
        query: &EvidenceQuery,
    ) -> Result<Vec<Citation>, RetrievalError> {
        // Both sides see a widened query so fusion has candidates to rank;
        // the floor and cap re-apply after fusion.
        let wide = EvidenceQuery {
            query: query.query.clone(),
            domains: query.domains.clone(),
            top_k: query.top_k.saturating_mul(2),
            min_score: 0.0,
        };
        let (trgm_side, qdrant_side) =
            tokio::join!(self.trgm.retrieve(scope, &wide), self.qdrant.retrieve(scope, &wide));

        // One healthy side is enough; only a double failure degrades the turn.
        let mut trgm_citations = trgm_side.unwrap_or_default();
        let mut qdrant_citations = match qdrant_side {
            Ok(citations) => citations,
            Err(err) if trgm_citations.is_empty() => return Err(err),
            Err(_) => Vec::new(),
        };
        normalise(&mut trgm_citations);
        normalise(&mut qdrant_citations);

        let mut fused: BTreeMap<EvidenceId, Citation> = BTreeMap::new();
        for citation in trgm_citations {
            let mut weighted = citation;
            weighted.score *= self.trgm_weight;
            fused.insert(weighted.evidence_id.clone(), weighted);
        }
        for citation in qdrant_citations {
            let weighted_score = citation.score * self.qdrant_weight;
            fused
                .entry(citation.evidence_id.clone())
                .and_modify(|existing| existing.score += weighted_score)
                .or_insert_with(|| {
                    let mut weighted = citation;
                    weighted.score = weighted_score;
                    weighted
                });
        }
        Ok(finalize(fused.into_values().collect(), query))
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Builds the retrieval provider for a strategy selection.
#[must_use]
pub fn build_retrieval_provider(
    strategy: RetrievalStrategy,
    catalog: Arc<dyn CatalogStore>,
    qdrant: Arc<dyn RetrievalProvider>,
    candidate_limit: usize,
    trgm_weight: f64,
    qdrant_weight: f64,
) -> Arc<dyn RetrievalProvider> {
    let trgm: Arc<dyn RetrievalProvider> = Arc::new(TrgmRetriever::new(catalog, candidate_limit));
    match strategy {
        RetrievalStrategy::Trgm => trgm,
        RetrievalStrategy::Qdrant => qdrant,
        RetrievalStrategy::Hybrid => {
            Arc::new(HybridRetriever::new(trgm, qdrant, trgm_weight, qdrant_weight))
        }
    }
}

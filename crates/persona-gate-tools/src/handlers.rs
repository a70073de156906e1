// persona-gate-tools/src/handlers.rs
// ============================================================================
// Module: Tool Handlers
// Description: Executes built-in tools against the catalog and retrieval.
// Purpose: Back the tool contract with real reads and writes.
// Dependencies: persona-gate-cache, persona-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Handlers execute tool calls inside the caller's scope. Read-heavy tools
//! (profile, prompt, site map, evidence) are served through the namespaced
//! cache with per-resource TTLs; writes go straight to the store. Handlers
//! never see raw HTTP; the server and client layers handle transport.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use persona_gate_cache::CacheKeyBuilder;
use persona_gate_cache::CacheResource;
use persona_gate_cache::TtlCache;
use persona_gate_core::CatalogStore;
use persona_gate_core::Content;
use persona_gate_core::ContentLifecycle;
use persona_gate_core::EvidenceQuery;
use persona_gate_core::NpcId;
use persona_gate_core::RetrievalProvider;
use persona_gate_core::Scope;
use persona_gate_core::Timestamp;
use serde_json::Value;
use uuid::Uuid;

use crate::client::ToolContext;
use crate::client::ToolError;
use crate::schemas::ContentHit;
use crate::schemas::CreateDraftContentInput;
use crate::schemas::CreateDraftContentOutput;
use crate::schemas::GetNpcProfileInput;
use crate::schemas::GetNpcProfileOutput;
use crate::schemas::GetPromptActiveInput;
use crate::schemas::GetPromptActiveOutput;
use crate::schemas::GetSiteMapOutput;
use crate::schemas::LogUserEventInput;
use crate::schemas::LogUserEventOutput;
use crate::schemas::RetrieveEvidenceInput;
use crate::schemas::RetrieveEvidenceOutput;
use crate::schemas::SearchContentInput;
use crate::schemas::SearchContentOutput;

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Executes built-in tools against the catalog, retrieval, and cache.
pub struct ToolHandlers {
    /// Catalog reads and writes.
    catalog: Arc<dyn CatalogStore>,
    /// Evidence retrieval strategy.
    retrieval: Arc<dyn RetrievalProvider>,
    /// Shared cache for read-heavy tools.
    cache: Arc<dyn TtlCache>,
    /// Cache key namespace.
    keys: CacheKeyBuilder,
}

impl ToolHandlers {
    /// Creates handlers over the given backends.
    #[must_use]
    pub const fn new(
        catalog: Arc<dyn CatalogStore>,
        retrieval: Arc<dyn RetrievalProvider>,
        cache: Arc<dyn TtlCache>,
        keys: CacheKeyBuilder,
    ) -> Self {
        Self {
            catalog,
            retrieval,
            cache,
            keys,
        }
    }

    /// Dispatches one validated tool call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the tool is unknown, the payload does not
    /// decode, or execution fails.
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        match name {
            "get_npc_profile" => {
                let input: GetNpcProfileInput = decode(input)?;
                let output = self.get_npc_profile(&context.scope, &input)?;
                encode(&output)
            }
            "get_prompt_active" => {
                let input: GetPromptActiveInput = decode(input)?;
                let output = self.get_prompt_active(&context.scope, &input)?;
                encode(&output)
            }
            "get_site_map" => {
                let output = self.get_site_map(&context.scope)?;
                encode(&output)
            }
            "search_content" => {
                let input: SearchContentInput = decode(input)?;
                let output = self.search_content(&context.scope, &input)?;
                encode(&output)
            }
            "retrieve_evidence" => {
                let input: RetrieveEvidenceInput = decode(input)?;
                let output = self.retrieve_evidence(&context.scope, &input).await?;
                encode(&output)
            }
            "create_draft_content" => {
                let input: CreateDraftContentInput = decode(input)?;
                let output = self.create_draft_content(&context.scope, &input, context.now)?;
                encode(&output)
            }
            "log_user_event" => {
                let input: LogUserEventInput = decode(input)?;
                let output = self.log_user_event(&context.scope, &input, context.now)?;
                encode(&output)
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Loads the active NPC profile, cache first.
    fn get_npc_profile(
        &self,
        scope: &Scope,
        input: &GetNpcProfileInput,
    ) -> Result<GetNpcProfileOutput, ToolError> {
        let npc_id = NpcId::new(input.npc_id.clone());
        let key = self.keys.npc_profile(scope, &npc_id);
        if let Some(cached) = self.cache.get(&key)
            && let Ok(profile) = serde_json::from_str(&cached)
        {
            return Ok(GetNpcProfileOutput {
                profile,
            });
        }
        let profile = self
            .catalog
            .active_profile(scope, &npc_id)
            .map_err(ToolError::from_store)?
            .ok_or_else(|| ToolError::NotFound(format!("npc profile {npc_id}")))?;
        if let Ok(raw) = serde_json::to_string(&profile) {
            self.cache.set(&key, raw, CacheResource::NpcProfile.ttl());
        }
        Ok(GetNpcProfileOutput {
            profile,
        })
    }

    /// Loads the active or release-pinned prompt, cache first for active.
    fn get_prompt_active(
        &self,
        scope: &Scope,
        input: &GetPromptActiveInput,
    ) -> Result<GetPromptActiveOutput, ToolError> {
        let npc_id = NpcId::new(input.npc_id.clone());
        if let Some(version) = input.version {
            let prompt = self
                .catalog
                .prompt_version(scope, &npc_id, version)
                .map_err(ToolError::from_store)?
                .ok_or_else(|| {
                    ToolError::NotFound(format!("npc prompt {npc_id} version {version}"))
                })?;
            return Ok(GetPromptActiveOutput {
                prompt,
            });
        }
        let key = self.keys.prompt_active(scope, &npc_id);
        if let Some(cached) = self.cache.get(&key)
            && let Ok(prompt) = serde_json::from_str(&cached)
        {
            return Ok(GetPromptActiveOutput {
                prompt,
            });
        }
        let prompt = self
            .catalog
            .active_prompt(scope, &npc_id)
            .map_err(ToolError::from_store)?
            .ok_or_else(|| ToolError::NotFound(format!("npc prompt {npc_id}")))?;
        if let Ok(raw) = serde_json::to_string(&prompt) {
            self.cache.set(&key, raw, CacheResource::PromptActive.ttl());
        }
        Ok(GetPromptActiveOutput {
            prompt,
        })
    }

    /// Loads the site map, cache first.
    fn get_site_map(&self, scope: &Scope) -> Result<GetSiteMapOutput, ToolError> {
        let key = self.keys.site_map(scope);
        if let Some(cached) = self.cache.get(&key)
            && let Ok(site_map) = serde_json::from_str(&cached)
        {
            return Ok(GetSiteMapOutput {
                site_map,
            });
        }
        let site_map = self
            .catalog
            .site_map(scope)
            .map_err(ToolError::from_store)?
            .ok_or_else(|| ToolError::NotFound(format!("site map for {scope}")))?;
        if let Ok(raw) = serde_json::to_string(&site_map) {
            self.cache.set(&key, raw, CacheResource::SiteMap.ttl());
        }
        Ok(GetSiteMapOutput {
            site_map,
        })
    }

    /// Searches content by keyword with filters.
    fn search_content(
        &self,
        scope: &Scope,
        input: &SearchContentInput,
    ) -> Result<SearchContentOutput, ToolError> {
        let results = self
            .catalog
            .search_content(
                scope,
                &input.keyword,
                input.content_type.as_deref(),
                &input.tags,
                input.limit.min(100),
            )
            .map_err(ToolError::from_store)?;
        let results = results
            .into_iter()
            .map(|content| ContentHit {
                id: content.id,
                title: content.title,
                content_type: content.content_type,
                credibility_score: content.credibility_score,
                lifecycle: content.lifecycle.as_str().to_string(),
            })
            .collect();
        Ok(SearchContentOutput {
            results,
        })
    }

    /// Retrieves ranked evidence, cache first.
    async fn retrieve_evidence(
        &self,
        scope: &Scope,
        input: &RetrieveEvidenceInput,
    ) -> Result<RetrieveEvidenceOutput, ToolError> {
        let key = self.keys.evidence(scope, &input.query, &input.domains);
        if let Some(cached) = self.cache.get(&key)
            && let Ok(citations) = serde_json::from_str(&cached)
        {
            return Ok(RetrieveEvidenceOutput {
                citations,
            });
        }
        let query = EvidenceQuery {
            query: input.query.clone(),
            domains: input.domains.clone(),
            top_k: input.top_k,
            min_score: input.min_score,
        };
        let citations = self
            .retrieval
            .retrieve(scope, &query)
            .await
            .map_err(|err| ToolError::Dependency(err.to_string()))?;
        if let Ok(raw) = serde_json::to_string(&citations) {
            self.cache.set(&key, raw, CacheResource::Evidence.ttl());
        }
        Ok(RetrieveEvidenceOutput {
            citations,
        })
    }

    /// Creates a draft content item.
    fn create_draft_content(
        &self,
        scope: &Scope,
        input: &CreateDraftContentInput,
        now: Timestamp,
    ) -> Result<CreateDraftContentOutput, ToolError> {
        let content = Content {
            id: Uuid::new_v4().to_string(),
            scope: scope.clone(),
            title: input.title.clone(),
            body: input.body.clone(),
            content_type: input.content_type.clone(),
            tags: input.tags.clone(),
            credibility_score: 0.0,
            lifecycle: ContentLifecycle::Draft,
            created_at: now,
            updated_at: now,
        };
        self.catalog.insert_content(&content).map_err(ToolError::from_store)?;
        Ok(CreateDraftContentOutput {
            content_id: content.id,
        })
    }

    /// Appends an analytics event.
    fn log_user_event(
        &self,
        scope: &Scope,
        input: &LogUserEventInput,
        now: Timestamp,
    ) -> Result<LogUserEventOutput, ToolError> {
        self.catalog
            .log_user_event(scope, &input.event_type, &input.payload, now)
            .map_err(ToolError::from_store)?;
        Ok(LogUserEventOutput {
            logged: true,
        })
    }
}

// ============================================================================
// SECTION: Codec Helpers
// ============================================================================

/// Decodes a tool input payload.
fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, ToolError> {
    serde_json::from_value(payload).map_err(|err| ToolError::Validation(vec![err.to_string()]))
}

/// Encodes a tool output payload.
fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|_| ToolError::Serialization)
}

// persona-gate-tools/src/registry.rs
// ============================================================================
// Module: Tool Registry
// Description: Built-in tool specifications with JSON schemas.
// Purpose: Declare the external tool contract and validate payloads.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! The registry declares the seven built-in tools. Tool names are part of
//! the external contract; input and output schemas are compiled once and
//! used to validate payloads at both ends of every call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Tool Specification
// ============================================================================

/// Specification of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    /// Tool name; part of the external contract.
    pub name: &'static str,
    /// Semantic version of the tool contract.
    pub version: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Category used for discovery filtering.
    pub category: &'static str,
    /// JSON schema of the input payload.
    pub input_schema: Value,
    /// JSON schema of the output payload.
    pub output_schema: Value,
    /// Whether the tool requires an authenticated caller.
    pub requires_auth: bool,
    /// Whether the model may call the tool autonomously.
    pub ai_callable: bool,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of the built-in tools.
pub struct ToolRegistry {
    /// Specs keyed by tool name.
    tools: BTreeMap<&'static str, ToolSpec>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Creates the registry with every built-in tool registered.
    #[must_use]
    pub fn new() -> Self {
        let mut tools = BTreeMap::new();
        for spec in builtin_tools() {
            tools.insert(spec.name, spec);
        }
        Self {
            tools,
        }
    }

    /// Returns the spec for a tool name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Lists specs, optionally filtered by category and AI-callability.
    #[must_use]
    pub fn list(&self, category: Option<&str>, ai_callable_only: bool) -> Vec<&ToolSpec> {
        self.tools
            .values()
            .filter(|spec| category.is_none_or(|category| spec.category == category))
            .filter(|spec| !ai_callable_only || spec.ai_callable)
            .collect()
    }

    /// Validates a payload against a tool's input schema.
    ///
    /// # Errors
    ///
    /// Returns the validation error messages when the payload does not
    /// conform.
    pub fn validate_input(&self, name: &str, payload: &Value) -> Result<(), Vec<String>> {
        self.validate(name, payload, true)
    }

    /// Validates a payload against a tool's output schema.
    ///
    /// # Errors
    ///
    /// Returns the validation error messages when the payload does not
    /// conform.
    pub fn validate_output(&self, name: &str, payload: &Value) -> Result<(), Vec<String>> {
        self.validate(name, payload, false)
    }

    /// Shared validation path for both directions.
    fn validate(&self, name: &str, payload: &Value, input: bool) -> Result<(), Vec<String>> {
        let Some(spec) = self.tools.get(name) else {
            return Err(vec![format!("unknown tool: {name}")]);
        };
        let schema = if input { &spec.input_schema } else { &spec.output_schema };
        let compiled = jsonschema::validator_for(schema)
            .map_err(|err| vec![format!("schema compile failed: {err}")])?;
        let errors: Vec<String> =
            compiled.iter_errors(payload).map(|error| error.to_string()).collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

// ============================================================================
// SECTION: Built-In Tools
// ============================================================================

/// Declares the seven built-in tools.
fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "get_npc_profile",
            version: "1.0.0",
            description: "Load the active NPC profile: persona, domains, constraints.",
            category: "npc",
            input_schema: json!({
                "type": "object",
                "properties": {"npc_id": {"type": "string", "minLength": 1}},
                "required": ["npc_id"],
                "additionalProperties": false,
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"profile": {"type": "object"}},
                "required": ["profile"],
            }),
            requires_auth: true,
            ai_callable: true,
        },
        ToolSpec {
            name: "get_prompt_active",
            version: "1.0.0",
            description: "Load the active NPC prompt, or a release-pinned version.",
            category: "prompt",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "npc_id": {"type": "string", "minLength": 1},
                    "version": {"type": ["integer", "null"], "minimum": 1},
                },
                "required": ["npc_id"],
                "additionalProperties": false,
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"prompt": {"type": "object"}},
                "required": ["prompt"],
            }),
            requires_auth: true,
            ai_callable: true,
        },
        ToolSpec {
            name: "get_site_map",
            version: "1.0.0",
            description: "Load the site map: points of interest and routes.",
            category: "site",
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"site_map": {"type": "object"}},
                "required": ["site_map"],
            }),
            requires_auth: true,
            ai_callable: true,
        },
        ToolSpec {
            name: "search_content",
            version: "1.0.0",
            description: "Search content by keyword with type and tag filters.",
            category: "content",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "keyword": {"type": "string", "minLength": 1},
                    "content_type": {"type": ["string", "null"]},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100},
                },
                "required": ["keyword"],
                "additionalProperties": false,
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"results": {"type": "array"}},
                "required": ["results"],
            }),
            requires_auth: true,
            ai_callable: true,
        },
        ToolSpec {
            name: "retrieve_evidence",
            version: "1.0.0",
            description: "Retrieve ranked citable evidence for a query.",
            category: "evidence",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1},
                    "domains": {"type": "array", "items": {"type": "string"}},
                    "top_k": {"type": "integer", "minimum": 1, "maximum": 50},
                    "min_score": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                },
                "required": ["query", "top_k", "min_score"],
                "additionalProperties": false,
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"citations": {"type": "array"}},
                "required": ["citations"],
            }),
            requires_auth: true,
            ai_callable: true,
        },
        ToolSpec {
            name: "create_draft_content",
            version: "1.0.0",
            description: "Create a draft content item and return its id.",
            category: "content",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "minLength": 1},
                    "body": {"type": "string", "minLength": 1},
                    "content_type": {"type": "string", "minLength": 1},
                    "tags": {"type": "array", "items": {"type": "string"}},
                },
                "required": ["title", "body", "content_type"],
                "additionalProperties": false,
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"content_id": {"type": "string"}},
                "required": ["content_id"],
            }),
            requires_auth: true,
            ai_callable: false,
        },
        ToolSpec {
            name: "log_user_event",
            version: "1.0.0",
            description: "Append an analytics event for the current user.",
            category: "analytics",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "event_type": {"type": "string", "minLength": 1},
                    "payload": {"type": "object"},
                },
                "required": ["event_type"],
                "additionalProperties": false,
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"logged": {"type": "boolean"}},
                "required": ["logged"],
            }),
            requires_auth: true,
            ai_callable: false,
        },
    ]
}

// persona-gate-cache/src/session.rs
// ============================================================================
// Module: Session Memory
// Description: Short-term conversation memory with hard caps.
// Purpose: Give the pipeline recent context without unbounded growth.
// Dependencies: persona-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Session memory is a capped log of recent messages partitioned by
//! `(tenant, site, session, npc)`. Caps are enforced on every write: at most
//! N messages and M total characters survive, oldest dropped first. Entries
//! expire after the memory TTL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use persona_gate_core::MessageRole;
use persona_gate_core::NpcId;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use serde::Deserialize;
use serde::Serialize;

use crate::keys::CacheKeyBuilder;
use crate::store::TtlCache;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Hard caps applied to one session's memory.
#[derive(Debug, Clone, Copy)]
pub struct MemoryLimits {
    /// Maximum messages retained.
    pub max_messages: usize,
    /// Maximum total characters retained.
    pub max_chars: usize,
    /// Time to live of the memory entry.
    pub ttl: Duration,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_messages: 10,
            max_chars: 4_000,
            ttl: Duration::from_secs(86_400),
        }
    }
}

// ============================================================================
// SECTION: Messages
// ============================================================================

/// One remembered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    /// Author role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

// ============================================================================
// SECTION: Session Memory
// ============================================================================

/// Capped per-session conversation memory.
pub struct SessionMemory {
    /// Backing TTL store.
    cache: Arc<dyn TtlCache>,
    /// Key builder for the session namespace.
    keys: CacheKeyBuilder,
    /// Caps enforced on write.
    limits: MemoryLimits,
}

impl SessionMemory {
    /// Creates a session memory over a cache.
    #[must_use]
    pub const fn new(cache: Arc<dyn TtlCache>, keys: CacheKeyBuilder, limits: MemoryLimits) -> Self {
        Self {
            cache,
            keys,
            limits,
        }
    }

    /// Returns the remembered messages for a session, oldest first.
    #[must_use]
    pub fn history(&self, scope: &Scope, session_id: &SessionId, npc_id: &NpcId)
    -> Vec<MemoryMessage> {
        let key = self.keys.session_history(scope, session_id.as_str(), npc_id);
        self.cache
            .get(&key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Appends a message, enforcing the caps, and refreshes the TTL.
    pub fn append(
        &self,
        scope: &Scope,
        session_id: &SessionId,
        npc_id: &NpcId,
        role: MessageRole,
        content: impl Into<String>,
    ) {
        let mut messages = self.history(scope, session_id, npc_id);
        messages.push(MemoryMessage {
            role,
            content: content.into(),
        });
        trim_to_limits(&mut messages, self.limits.max_messages, self.limits.max_chars);
        let key = self.keys.session_history(scope, session_id.as_str(), npc_id);
        if let Ok(raw) = serde_json::to_string(&messages) {
            self.cache.set(&key, raw, self.limits.ttl);
        }
    }

    /// Clears the memory for a session.
    pub fn clear(&self, scope: &Scope, session_id: &SessionId, npc_id: &NpcId) {
        let key = self.keys.session_history(scope, session_id.as_str(), npc_id);
        self.cache.delete(&key);
    }
}

/// Trims messages to the caps, dropping oldest first.
///
/// A single over-long message is truncated rather than dropped so the most
/// recent turn always survives.
fn trim_to_limits(messages: &mut Vec<MemoryMessage>, max_messages: usize, max_chars: usize) {
    if messages.len() > max_messages {
        let excess = messages.len() - max_messages;
        messages.drain(..excess);
    }
    let mut total: usize = messages.iter().map(|message| message.content.chars().count()).sum();
    while total > max_chars && messages.len() > 1 {
        let removed = messages.remove(0);
        total -= removed.content.chars().count();
    }
    if total > max_chars
        && let Some(last) = messages.last_mut()
    {
        last.content = last.content.chars().take(max_chars).collect();
    }
}

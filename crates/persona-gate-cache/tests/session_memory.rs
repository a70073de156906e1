// persona-gate-cache/tests/session_memory.rs
// ============================================================================
// Module: Session Memory Tests
// Description: Cap enforcement and namespacing coverage.
// ============================================================================
//! ## Overview
//! Validates that session memory never exceeds its message and character
//! caps, that partitions do not bleed into each other, and that cache keys
//! follow the namespace convention.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use persona_gate_cache::CacheKeyBuilder;
use persona_gate_cache::CacheResource;
use persona_gate_cache::InMemoryTtlCache;
use persona_gate_cache::MemoryLimits;
use persona_gate_cache::SessionMemory;
use persona_gate_cache::TtlCache;
use persona_gate_core::MessageRole;
use persona_gate_core::NpcId;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a session memory with small caps for testing.
fn memory(max_messages: usize, max_chars: usize) -> SessionMemory {
    SessionMemory::new(
        Arc::new(InMemoryTtlCache::new()),
        CacheKeyBuilder::new("pg"),
        MemoryLimits {
            max_messages,
            max_chars,
            ttl: Duration::from_secs(60),
        },
    )
}

// ============================================================================
// SECTION: Cap Enforcement
// ============================================================================

/// The message cap holds after any sequence of appends.
#[test]
fn message_cap_holds() {
    let memory = memory(3, 10_000);
    let scope = Scope::new("tenant-a", "main");
    let session = SessionId::new("sess-1");
    let npc = NpcId::new("elder");
    for turn in 0..20 {
        memory.append(&scope, &session, &npc, MessageRole::User, format!("turn {turn}"));
    }
    let history = memory.history(&scope, &session, &npc);
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].content, "turn 19");
    assert_eq!(history[0].content, "turn 17");
}

/// The character cap drops oldest messages first.
#[test]
fn char_cap_drops_oldest() {
    let memory = memory(10, 12);
    let scope = Scope::new("tenant-a", "main");
    let session = SessionId::new("sess-1");
    let npc = NpcId::new("elder");
    memory.append(&scope, &session, &npc, MessageRole::User, "aaaaaa");
    memory.append(&scope, &session, &npc, MessageRole::Assistant, "bbbbbb");
    memory.append(&scope, &session, &npc, MessageRole::User, "cccccc");
    let history = memory.history(&scope, &session, &npc);
    let total: usize = history.iter().map(|message| message.content.chars().count()).sum();
    assert!(total <= 12);
    assert_eq!(history.last().map(|message| message.content.as_str()), Some("cccccc"));
}

/// A single over-long message is truncated, not lost.
#[test]
fn single_long_message_is_truncated() {
    let memory = memory(10, 8);
    let scope = Scope::new("tenant-a", "main");
    let session = SessionId::new("sess-1");
    let npc = NpcId::new("elder");
    memory.append(&scope, &session, &npc, MessageRole::User, "0123456789abcdef");
    let history = memory.history(&scope, &session, &npc);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "01234567");
}

// ============================================================================
// SECTION: Partitioning
// ============================================================================

/// Sessions and NPCs do not share memory.
#[test]
fn partitions_are_isolated() {
    let memory = memory(10, 1_000);
    let scope = Scope::new("tenant-a", "main");
    let session_a = SessionId::new("sess-a");
    let session_b = SessionId::new("sess-b");
    let elder = NpcId::new("elder");
    let scribe = NpcId::new("scribe");

    memory.append(&scope, &session_a, &elder, MessageRole::User, "to elder");
    memory.append(&scope, &session_b, &elder, MessageRole::User, "other session");
    memory.append(&scope, &session_a, &scribe, MessageRole::User, "to scribe");

    assert_eq!(memory.history(&scope, &session_a, &elder).len(), 1);
    assert_eq!(memory.history(&scope, &session_b, &elder).len(), 1);
    assert_eq!(memory.history(&scope, &session_a, &scribe).len(), 1);
    memory.clear(&scope, &session_a, &elder);
    assert!(memory.history(&scope, &session_a, &elder).is_empty());
    assert_eq!(memory.history(&scope, &session_b, &elder).len(), 1);
}

// ============================================================================
// SECTION: Keys and Store
// ============================================================================

/// Keys follow the `{prefix}:{tenant}:{site}:{resource}:{id}` convention.
#[test]
fn keys_follow_namespace_convention() {
    let keys = CacheKeyBuilder::new("pg");
    let scope = Scope::new("tenant-a", "main");
    let npc = NpcId::new("elder");
    assert_eq!(keys.npc_profile(&scope, &npc), "pg:tenant-a:main:npc_profile:elder");
    assert_eq!(keys.prompt_active(&scope, &npc), "pg:tenant-a:main:prompt:elder:active");
    assert_eq!(keys.site_map(&scope), "pg:tenant-a:main:site_map:default");

    // Equivalent evidence queries share a key regardless of domain order.
    let forward = keys.evidence(&scope, "founding year", &["history".into(), "lineage".into()]);
    let reversed = keys.evidence(&scope, "founding year", &["lineage".into(), "history".into()]);
    assert_eq!(forward, reversed);
}

/// Expired entries are not returned.
#[test]
fn expired_entries_are_dropped() {
    let cache = InMemoryTtlCache::new();
    cache.set("k", "v".to_string(), Duration::from_millis(0));
    assert!(cache.get("k").is_none());
    cache.set("k", "v".to_string(), Duration::from_secs(60));
    assert_eq!(cache.get("k").as_deref(), Some("v"));
    assert!(cache.delete("k"));
    assert!(cache.get("k").is_none());
}

/// Resource TTLs match the platform convention.
#[test]
fn resource_ttls_match_convention() {
    assert_eq!(CacheResource::NpcProfile.ttl(), Duration::from_secs(300));
    assert_eq!(CacheResource::PromptActive.ttl(), Duration::from_secs(300));
    assert_eq!(CacheResource::SiteMap.ttl(), Duration::from_secs(600));
    assert_eq!(CacheResource::Evidence.ttl(), Duration::from_secs(60));
}

// persona-gate-core/src/core/conversation.rs
// ============================================================================
// Module: Persona Gate Conversation Model
// Description: Session-grouped dialogue records.
// Purpose: Persist the message exchange each trace row refers back to.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Conversations group the messages of one session with one NPC. Messages are
//! parent-owned (cascade delete) and ordered monotonically by `created_at`;
//! the pipeline serialises writes per session so two concurrent turns cannot
//! interleave.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::NpcId;
use crate::core::identifiers::Scope;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TraceId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Message Role
// ============================================================================

/// Author role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// End-user turn.
    User,
    /// NPC answer.
    Assistant,
}

impl MessageRole {
    /// Returns the stable wire label for this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Conversation
// ============================================================================

/// Session-grouped dialogue between one user and one NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: String,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Session the conversation belongs to.
    pub session_id: SessionId,
    /// NPC taking part.
    pub npc_id: NpcId,
    /// End user, when known.
    pub user_id: Option<UserId>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Message
// ============================================================================

/// One message within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: String,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Session the message belongs to.
    pub session_id: SessionId,
    /// Author role.
    pub role: MessageRole,
    /// Message body.
    pub content: String,
    /// Evidence cited by an assistant message.
    pub evidence_ids: Vec<EvidenceId>,
    /// Trace row recorded for the turn that produced this message.
    pub trace_id: Option<TraceId>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

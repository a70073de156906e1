// persona-gate-core/src/core/content.rs
// ============================================================================
// Module: Persona Gate Content Model
// Description: Editorial content items with a publication lifecycle.
// Purpose: Back the content search and draft creation tools.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Content rows are editorial items moving through
//! `draft -> review -> published -> offline`. Search surfaces only what the
//! caller asks for; credibility scores feed ranking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Scope;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Editorial lifecycle state of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentLifecycle {
    /// Authored but not yet reviewed.
    Draft,
    /// Under editorial review.
    Review,
    /// Live and searchable.
    Published,
    /// Withdrawn from circulation.
    Offline,
}

impl ContentLifecycle {
    /// Returns whether a transition to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Review)
                | (Self::Review, Self::Published)
                | (Self::Review, Self::Draft)
                | (Self::Published, Self::Offline)
        )
    }

    /// Returns the stable wire label for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Review => "review",
            Self::Published => "published",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for ContentLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Content
// ============================================================================

/// Editorial content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Content identifier.
    pub id: String,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Item title.
    pub title: String,
    /// Item body.
    pub body: String,
    /// Content kind (article, story, faq).
    pub content_type: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Editorial credibility score in `[0, 1]`.
    pub credibility_score: f64,
    /// Lifecycle state.
    pub lifecycle: ContentLifecycle,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

// persona-gate-core/src/core/site.rs
// ============================================================================
// Module: Persona Gate Site Map Model
// Description: Points of interest and routes exposed by the site map tool.
// Purpose: Give NPCs spatial context about the site they inhabit.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A site map is a small document of points of interest and the routes that
//! connect them. It changes rarely and is served from cache with a long TTL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Scope;

// ============================================================================
// SECTION: Site Map
// ============================================================================

/// Point of interest within a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    /// Point identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Point kind (building, landmark, exhibit).
    pub kind: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// Short description.
    pub description: String,
}

/// Named route connecting points of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Route identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ordered point identifiers along the route.
    pub poi_ids: Vec<String>,
}

/// Site map document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMap {
    /// Owning tenant and site.
    pub scope: Scope,
    /// Points of interest.
    pub pois: Vec<Poi>,
    /// Routes connecting points.
    pub routes: Vec<Route>,
}

// persona-gate-tools/src/lib.rs
// ============================================================================
// Module: Persona Gate Tools Library
// Description: Typed tool plane: registry, server, resilient client, audit.
// Purpose: Expose the tool RPC surface the orchestrator reaches state through.
// Dependencies: crate::{audit, breaker, client, handlers, registry, schemas, server}
// ============================================================================

//! ## Overview
//! The tool plane is a typed, context-bearing RPC surface. The registry
//! declares seven built-in tools with JSON schemas; the server validates
//! inputs and outputs against them on both ends; the client adds per-tool
//! timeouts, bounded retries with jitter, and a circuit breaker per
//! `(tool, tenant, site)`. Every call emits an audit row.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod breaker;
pub mod client;
pub mod handlers;
pub mod registry;
pub mod schemas;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileToolAuditSink;
pub use audit::NoopToolAuditSink;
pub use audit::StderrToolAuditSink;
pub use audit::ToolAuditSink;
pub use breaker::BreakerState;
pub use breaker::CircuitBreaker;
pub use client::HttpToolInvoker;
pub use client::LocalToolInvoker;
pub use client::ResilientToolClient;
pub use client::ToolContext;
pub use client::ToolError;
pub use client::ToolInvoker;
pub use handlers::ToolHandlers;
pub use registry::ToolRegistry;
pub use registry::ToolSpec;
pub use server::ToolServer;
pub use server::ToolServerState;

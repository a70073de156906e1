// persona-gate-tools/src/audit.rs
// ============================================================================
// Module: Tool Call Audit Sinks
// Description: Structured audit emission for tool calls.
// Purpose: Emit one audit record per call without hard dependencies.
// Dependencies: persona-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Every tool call produces one [`ToolCallAudit`] row. Sinks route the rows
//! to the preferred pipeline: JSON lines on stderr, an append-only file, or
//! nothing. Durable persistence goes through the store trait separately so
//! log routing never blocks the ledger.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use persona_gate_core::ToolCallAudit;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for tool call records.
pub trait ToolAuditSink: Send + Sync {
    /// Records one audit row.
    fn record(&self, audit: &ToolCallAudit);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrToolAuditSink;

impl ToolAuditSink for StderrToolAuditSink {
    fn record(&self, audit: &ToolCallAudit) {
        if let Ok(payload) = serde_json::to_string(audit) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileToolAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileToolAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl ToolAuditSink for FileToolAuditSink {
    fn record(&self, audit: &ToolCallAudit) {
        if let Ok(payload) = serde_json::to_string(audit)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopToolAuditSink;

impl ToolAuditSink for NoopToolAuditSink {
    fn record(&self, _audit: &ToolCallAudit) {}
}

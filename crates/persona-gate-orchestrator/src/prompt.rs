// persona-gate-orchestrator/src/prompt.rs
// ============================================================================
// Module: Prompt Assembler
// Description: System prompt composition from persona, citations, and memory.
// Purpose: Give the model exactly the grounded context the gate admitted.
// Dependencies: persona-gate-cache, persona-gate-core
// ============================================================================

//! ## Overview
//! The system prompt is composed from the NPC prompt asset, the persona,
//! the citations that survived the gate (numbered, capped), and the most
//! recent session memory trimmed to the character budget. Evidence that did
//! not survive the gate never reaches the model.

// ============================================================================
// SECTION: Imports
// ============================================================================

use persona_gate_cache::MemoryMessage;
use persona_gate_core::Citation;
use persona_gate_core::NpcProfile;

// ============================================================================
// SECTION: Assembler
// ============================================================================

/// Composes system prompts for the model call.
pub struct PromptAssembler {
    /// Maximum citations included in the prompt.
    citation_cap: usize,
    /// Maximum memory messages included.
    memory_messages: usize,
    /// Character budget for the memory section.
    memory_chars: usize,
}

impl PromptAssembler {
    /// Creates an assembler with the given caps.
    #[must_use]
    pub const fn new(citation_cap: usize, memory_messages: usize, memory_chars: usize) -> Self {
        Self {
            citation_cap,
            memory_messages,
            memory_chars,
        }
    }

    /// Assembles the system prompt for one turn.
    #[must_use]
    pub fn assemble(
        &self,
        prompt_content: &str,
        profile: &NpcProfile,
        citations: &[Citation],
        memory: &[MemoryMessage],
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(prompt_content.trim());
        prompt.push_str("\n\n## Persona\n");
        prompt.push_str(&profile.persona);
        if profile.must_cite_sources {
            prompt.push_str(
                "\nCite the numbered sources for every factual claim; never invent sources.",
            );
        }

        if !citations.is_empty() {
            prompt.push_str("\n\n## Evidence\n");
            for (index, citation) in citations.iter().take(self.citation_cap).enumerate() {
                prompt.push_str(&format!(
                    "[{}] {}: {}\n",
                    index + 1,
                    citation.title,
                    citation.excerpt
                ));
            }
        }

        let memory_section = self.memory_section(memory);
        if !memory_section.is_empty() {
            prompt.push_str("\n\n## Recent conversation\n");
            prompt.push_str(&memory_section);
        }
        prompt
    }

    /// Renders the most recent memory within the character budget.
    fn memory_section(&self, memory: &[MemoryMessage]) -> String {
        let recent_start = memory.len().saturating_sub(self.memory_messages);
        let mut lines: Vec<String> = Vec::new();
        let mut used = 0_usize;
        // Walk newest-first so the budget keeps the most recent turns.
        for message in memory[recent_start..].iter().rev() {
            let line = format!("{}: {}", message.role, message.content);
            let cost = line.chars().count() + 1;
            if used + cost > self.memory_chars {
                break;
            }
            used += cost;
            lines.push(line);
        }
        lines.reverse();
        lines.join("\n")
    }
}

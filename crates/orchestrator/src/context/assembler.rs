//! Token-bounded context assembly.
//!
//! Fills `available_for_content` from two layers in priority order:
//!
//! 1. **Tool results**: the reason the tools ran. Higher `priority` first,
//!    plan order for ties. A result that does not fit is truncated or dropped,
//!    and smaller results after it are still considered.
//! 2. **Conversation history**: newest turn first. The first turn that has to
//!    be dropped closes the window; every older turn is dropped with it.
//!
//! When everything fits, segments pass through untouched.
//!
//! # Determinism
//!
//! Identical inputs always produce identical output. No random or
//! time-dependent logic is used during assembly.

use super::fallback;
use super::segment::{ContextSegment, ToolResult};
use super::truncate::truncate_to_fit;
use ragloom_config::ContextConfig;
use ragloom_core::error::BudgetError;
use ragloom_core::message::Message;
use ragloom_core::token::TokenEstimator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// ── Types ─────────────────────────────────────────────────────────────────

/// Token budget for one assembly call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub total: usize,
    pub reserved_output: usize,
    pub reserved_system: usize,
}

impl ContextBudget {
    pub fn new(total: usize, reserved_output: usize, reserved_system: usize) -> Self {
        Self {
            total,
            reserved_output,
            reserved_system,
        }
    }

    /// `total - reserved_output - reserved_system`.
    ///
    /// Zero or negative is a misconfiguration; the assembler never borrows
    /// from the reserved allocations.
    pub fn available_for_content(&self) -> Result<usize, BudgetError> {
        self.total
            .checked_sub(self.reserved_output)
            .and_then(|rest| rest.checked_sub(self.reserved_system))
            .filter(|&available| available > 0)
            .ok_or(BudgetError::Misconfigured {
                total: self.total,
                reserved_output: self.reserved_output,
                reserved_system: self.reserved_system,
            })
    }
}

impl From<&ContextConfig> for ContextBudget {
    fn from(cfg: &ContextConfig) -> Self {
        Self::new(
            cfg.total_tokens,
            cfg.reserved_output_tokens,
            cfg.reserved_system_tokens,
        )
    }
}

/// How segments are costed, truncated, and which mode is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyPolicy {
    pub token_aware: bool,
    pub segment_overhead_tokens: usize,
    pub min_segment_tokens: usize,
    pub fallback_messages_limit: usize,
    pub fallback_max_context_chars: usize,
}

impl Default for AssemblyPolicy {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for AssemblyPolicy {
    fn from(cfg: &ContextConfig) -> Self {
        Self {
            token_aware: cfg.token_aware,
            segment_overhead_tokens: cfg.segment_overhead_tokens,
            min_segment_tokens: cfg.min_segment_tokens,
            fallback_messages_limit: cfg.fallback_messages_limit,
            fallback_max_context_chars: cfg.fallback_max_context_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyMode {
    TokenAware,
    Fallback,
}

/// The assembled context: tool results first, then history oldest → newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub segments: Vec<ContextSegment>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// Single text payload for the downstream model call.
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(|seg| format!("{}\n{}", seg.label(), seg.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn history(&self) -> impl Iterator<Item = &ContextSegment> {
        self.segments.iter().filter(|s| s.is_history())
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ContextSegment> {
        self.segments.iter().filter(|s| !s.is_history())
    }
}

/// What the assembler kept, cut, and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub mode: AssemblyMode,
    /// Estimated tokens of the included segments.
    pub total_tokens: usize,
    /// `available_for_content` for this call.
    pub budget: usize,
    /// Budget utilization percentage (0.0–100.0).
    pub utilization_pct: f32,
    pub history_included: usize,
    pub history_dropped: usize,
    pub history_truncated: usize,
    pub tool_results_dropped: Vec<String>,
    pub tool_results_truncated: Vec<String>,
    pub per_layer: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
}

impl AssemblyMetadata {
    pub(crate) fn new(mode: AssemblyMode, budget: usize) -> Self {
        Self {
            mode,
            total_tokens: 0,
            budget,
            utilization_pct: 0.0,
            history_included: 0,
            history_dropped: 0,
            history_truncated: 0,
            tool_results_dropped: Vec::new(),
            tool_results_truncated: Vec::new(),
            per_layer: Vec::new(),
            drops: Vec::new(),
        }
    }

    pub(crate) fn finish(&mut self, segments: &[ContextSegment]) {
        self.total_tokens = segments.iter().map(|s| s.estimated_tokens).sum();
        self.history_included = segments.iter().filter(|s| s.is_history()).count();
        self.utilization_pct = if self.budget == 0 {
            0.0
        } else {
            (self.total_tokens as f32 / self.budget as f32) * 100.0
        };
    }
}

/// Statistics for a single layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items dropped from a layer during budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

pub(crate) const TOOL_LAYER: &str = "tool_results";
pub(crate) const HISTORY_LAYER: &str = "history";

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless; create one and reuse it.
#[derive(Clone)]
pub struct ContextAssembler {
    policy: AssemblyPolicy,
    estimator: Arc<dyn TokenEstimator>,
}

enum Placement {
    Whole(ContextSegment),
    Truncated(ContextSegment),
    Dropped,
}

impl ContextAssembler {
    pub fn new(policy: AssemblyPolicy, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { policy, estimator }
    }

    pub fn policy(&self) -> &AssemblyPolicy {
        &self.policy
    }

    /// Estimated cost of one segment, framing overhead included.
    pub fn segment_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text) + self.policy.segment_overhead_tokens
    }

    /// Assemble `history` (oldest → newest) and successful `tool_results`
    /// (plan order) into a context within `budget`.
    pub fn assemble(
        &self,
        history: &[Message],
        tool_results: &[ToolResult],
        budget: &ContextBudget,
    ) -> Result<AssembledContext, BudgetError> {
        let available = budget.available_for_content()?;

        let context = if self.policy.token_aware {
            self.assemble_token_aware(history, tool_results, available)
        } else {
            fallback::assemble(self, history, tool_results, available)
        };

        let meta = &context.metadata;
        info!(
            mode = ?meta.mode,
            segments = context.segments.len(),
            total_tokens = meta.total_tokens,
            budget = meta.budget,
            utilization_pct = meta.utilization_pct,
            history_dropped = meta.history_dropped,
            history_truncated = meta.history_truncated,
            tool_results_dropped = meta.tool_results_dropped.len(),
            "Assembler: context assembled"
        );
        Ok(context)
    }

    fn assemble_token_aware(
        &self,
        history: &[Message],
        tool_results: &[ToolResult],
        available: usize,
    ) -> AssembledContext {
        let mut meta = AssemblyMetadata::new(AssemblyMode::TokenAware, available);

        // Stable sort keeps plan order for equal priorities.
        let mut tools: Vec<ContextSegment> = tool_results
            .iter()
            .map(|r| ContextSegment::tool_result(r, self.segment_tokens(&r.content)))
            .collect();
        tools.sort_by(|a, b| b.priority.cmp(&a.priority));

        let turns: Vec<ContextSegment> = history
            .iter()
            .enumerate()
            .map(|(i, m)| ContextSegment::history(i, m, self.segment_tokens(&m.content)))
            .collect();

        let candidate_total: usize = tools
            .iter()
            .chain(turns.iter())
            .map(|s| s.estimated_tokens)
            .sum();
        if candidate_total <= available {
            debug!(candidate_total, available, "Assembler: everything fits, pass-through");
            let tool_tokens = tools.iter().map(|s| s.estimated_tokens).sum();
            meta.per_layer = vec![
                Self::full_stats(TOOL_LAYER, tool_tokens, tools.len()),
                Self::full_stats(HISTORY_LAYER, candidate_total - tool_tokens, turns.len()),
            ];
            let mut segments = tools;
            segments.extend(turns);
            meta.finish(&segments);
            return AssembledContext {
                segments,
                metadata: meta,
            };
        }

        let mut remaining = available;

        // ── Layer 1: Tool results ──────────────────────────────────────────
        let mut kept_tools = Vec::with_capacity(tools.len());
        let (mut dropped, mut dropped_tokens) = (0, 0);
        for seg in &tools {
            let id = seg.tool_id().unwrap_or_default().to_string();
            match self.place(seg, remaining) {
                Placement::Whole(seg) => {
                    remaining -= seg.estimated_tokens;
                    kept_tools.push(seg);
                }
                Placement::Truncated(seg) => {
                    remaining -= seg.estimated_tokens;
                    meta.tool_results_truncated.push(id);
                    kept_tools.push(seg);
                }
                Placement::Dropped => {
                    dropped += 1;
                    dropped_tokens += seg.estimated_tokens;
                    meta.tool_results_dropped.push(id);
                }
            }
        }
        meta.per_layer.push(Self::stats(TOOL_LAYER, &kept_tools, tools.len()));
        meta.drops.extend(Self::maybe_drop(
            TOOL_LAYER,
            dropped,
            dropped_tokens,
            "Lowest-priority results dropped",
        ));

        // ── Layer 2: Conversation history (newest first) ───────────────────
        let mut kept_turns = Vec::with_capacity(turns.len());
        let (mut dropped, mut dropped_tokens) = (0, 0);
        let mut window_closed = false;
        for seg in turns.iter().rev() {
            let placement = if window_closed {
                Placement::Dropped
            } else {
                self.place(seg, remaining)
            };
            match placement {
                Placement::Whole(seg) => {
                    remaining -= seg.estimated_tokens;
                    kept_turns.push(seg);
                }
                Placement::Truncated(seg) => {
                    remaining -= seg.estimated_tokens;
                    meta.history_truncated += 1;
                    kept_turns.push(seg);
                }
                Placement::Dropped => {
                    window_closed = true;
                    dropped += 1;
                    dropped_tokens += seg.estimated_tokens;
                }
            }
        }
        kept_turns.reverse();
        meta.history_dropped = dropped;
        meta.per_layer.push(Self::stats(HISTORY_LAYER, &kept_turns, turns.len()));
        meta.drops.extend(Self::maybe_drop(
            HISTORY_LAYER,
            dropped,
            dropped_tokens,
            "Oldest turns dropped",
        ));

        let mut segments = kept_tools;
        segments.extend(kept_turns);
        meta.finish(&segments);
        AssembledContext {
            segments,
            metadata: meta,
        }
    }

    /// Fit one segment into `remaining` tokens: whole, truncated, or not at all.
    fn place(&self, seg: &ContextSegment, remaining: usize) -> Placement {
        if seg.estimated_tokens <= remaining {
            return Placement::Whole(seg.clone());
        }

        let overhead = self.policy.segment_overhead_tokens;
        let cut = remaining.checked_sub(overhead).filter(|&room| room > 0).and_then(|room| {
            truncate_to_fit(
                &seg.text,
                room,
                self.policy.min_segment_tokens,
                self.estimator.as_ref(),
            )
        });

        match cut {
            Some(text) => {
                let tokens = self.segment_tokens(text);
                debug!(
                    source = ?seg.source,
                    from_tokens = seg.estimated_tokens,
                    to_tokens = tokens,
                    "Assembler: segment truncated"
                );
                Placement::Truncated(seg.truncated_to(text.to_string(), tokens))
            }
            None => {
                debug!(
                    source = ?seg.source,
                    tokens = seg.estimated_tokens,
                    remaining,
                    "Assembler: segment dropped"
                );
                Placement::Dropped
            }
        }
    }

    fn stats(layer: &str, kept: &[ContextSegment], total: usize) -> LayerStats {
        LayerStats {
            name: layer.into(),
            tokens: kept.iter().map(|s| s.estimated_tokens).sum(),
            items_included: kept.len(),
            items_total: total,
        }
    }

    fn full_stats(layer: &str, tokens: usize, count: usize) -> LayerStats {
        LayerStats {
            name: layer.into(),
            tokens,
            items_included: count,
            items_total: count,
        }
    }

    pub(crate) fn maybe_drop(
        layer: &str,
        count: usize,
        tokens: usize,
        reason: &str,
    ) -> Option<DropInfo> {
        if count > 0 {
            Some(DropInfo {
                layer: layer.into(),
                items_dropped: count,
                tokens_dropped: tokens,
                reason: reason.into(),
            })
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;

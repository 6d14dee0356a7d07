//! Fixed-length assembly used when token-aware assembly is disabled.
//!
//! Keeps the last `fallback_messages_limit` history turns, puts every tool
//! result in front of them, and cuts the concatenated text at
//! `fallback_max_context_chars` characters or at the content budget,
//! whichever comes first. The cut is a plain char cut with no boundary
//! awareness; everything after it is dropped.

use super::assembler::{
    AssembledContext, AssemblyMetadata, AssemblyMode, ContextAssembler, HISTORY_LAYER, LayerStats,
    TOOL_LAYER,
};
use super::segment::{ContextSegment, ToolResult};
use ragloom_core::message::Message;
use tracing::debug;

pub(crate) fn assemble(
    assembler: &ContextAssembler,
    history: &[Message],
    tool_results: &[ToolResult],
    available: usize,
) -> AssembledContext {
    let policy = assembler.policy();
    let mut meta = AssemblyMetadata::new(AssemblyMode::Fallback, available);

    let window_start = history.len().saturating_sub(policy.fallback_messages_limit);

    let candidates = tool_results
        .iter()
        .map(|r| ContextSegment::tool_result(r, assembler.segment_tokens(&r.content)))
        .chain(
            history
                .iter()
                .enumerate()
                .skip(window_start)
                .map(|(i, m)| ContextSegment::history(i, m, assembler.segment_tokens(&m.content))),
        );

    let mut chars_left = policy.fallback_max_context_chars;
    let mut tokens_left = available;
    let mut cut_reached = false;
    let mut segments = Vec::new();
    for seg in candidates {
        let len = seg.text.chars().count();
        if !cut_reached && len <= chars_left && seg.estimated_tokens <= tokens_left {
            chars_left -= len;
            tokens_left -= seg.estimated_tokens;
            segments.push(seg);
            continue;
        }

        let cut = if cut_reached {
            None
        } else {
            cut_reached = true;
            prefix_within(assembler, &seg.text, chars_left.min(len), tokens_left)
        };
        match cut {
            Some(cut) => {
                let tokens = assembler.segment_tokens(cut);
                match seg.tool_id() {
                    Some(id) => meta.tool_results_truncated.push(id.to_string()),
                    None => meta.history_truncated += 1,
                }
                segments.push(seg.truncated_to(cut.to_string(), tokens));
            }
            None => match seg.tool_id() {
                Some(id) => meta.tool_results_dropped.push(id.to_string()),
                None => meta.history_dropped += 1,
            },
        }
    }
    meta.history_dropped += window_start;

    debug!(
        kept = segments.len(),
        outside_window = window_start,
        max_chars = policy.fallback_max_context_chars,
        tokens_left,
        "Assembler: fallback truncation applied"
    );

    let layer = |name: &str, history_layer: bool, total: usize| {
        let kept: Vec<&ContextSegment> = segments
            .iter()
            .filter(|s| s.is_history() == history_layer)
            .collect();
        LayerStats {
            name: name.into(),
            tokens: kept.iter().map(|s| s.estimated_tokens).sum(),
            items_included: kept.len(),
            items_total: total,
        }
    };
    meta.per_layer = vec![
        layer(TOOL_LAYER, false, tool_results.len()),
        layer(HISTORY_LAYER, true, history.len()),
    ];
    meta.drops.extend(ContextAssembler::maybe_drop(
        TOOL_LAYER,
        meta.tool_results_dropped.len(),
        0,
        "Character or token limit reached",
    ));
    meta.drops.extend(ContextAssembler::maybe_drop(
        HISTORY_LAYER,
        meta.history_dropped,
        0,
        "Outside message window or past the cut",
    ));

    meta.finish(&segments);
    AssembledContext {
        segments,
        metadata: meta,
    }
}

/// Longest char prefix of at most `max_chars` whose segment cost fits `max_tokens`.
fn prefix_within<'a>(
    assembler: &ContextAssembler,
    text: &'a str,
    max_chars: usize,
    max_tokens: usize,
) -> Option<&'a str> {
    let ends: Vec<usize> = text
        .char_indices()
        .skip(1)
        .map(|(at, _)| at)
        .chain(std::iter::once(text.len()))
        .take(max_chars)
        .collect();
    let fitting = ends.partition_point(|&end| assembler.segment_tokens(&text[..end]) <= max_tokens);
    let end = *ends.get(fitting.checked_sub(1)?)?;
    (end > 0).then(|| &text[..end])
}

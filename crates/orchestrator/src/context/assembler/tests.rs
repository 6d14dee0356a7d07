use super::*;
use crate::context::segment::SegmentSource;
use crate::context::token::CharRatioEstimator;

/// One token per word, so sizes in tests read as token counts.
fn words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// `n` words, with a sentence ending every fifth word.
fn sentences(n: usize) -> String {
    (0..n)
        .map(|i| if (i + 1) % 5 == 0 { "done." } else { "word" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn policy(min_segment_tokens: usize) -> AssemblyPolicy {
    AssemblyPolicy {
        token_aware: true,
        segment_overhead_tokens: 0,
        min_segment_tokens,
        fallback_messages_limit: 20,
        fallback_max_context_chars: 50_000,
    }
}

fn assembler(min_segment_tokens: usize) -> ContextAssembler {
    ContextAssembler::new(policy(min_segment_tokens), Arc::new(words))
}

fn turns(sizes: &[usize]) -> Vec<Message> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            if i % 2 == 0 {
                Message::user(sentences(n))
            } else {
                Message::assistant(sentences(n))
            }
        })
        .collect()
}

fn history_indexes(ctx: &AssembledContext) -> Vec<usize> {
    ctx.history()
        .map(|s| match s.source {
            SegmentSource::History { index, .. } => index,
            SegmentSource::ToolResult { .. } => unreachable!(),
        })
        .collect()
}

fn assert_no_mid_word_cut(ctx: &AssembledContext, originals: &[&str]) {
    for seg in ctx.segments.iter().filter(|s| s.truncated) {
        let original = originals
            .iter()
            .find(|o| o.starts_with(seg.text.as_str()))
            .expect("truncated text must be a prefix of its source");
        let rest = &original[seg.text.len()..];
        assert!(
            rest.is_empty() || rest.starts_with(char::is_whitespace),
            "cut inside a word: {:?}|{:?}",
            seg.text,
            &rest[..rest.len().min(10)]
        );
    }
}

#[test]
fn budget_example_truncates_oldest_kept_turn() {
    // 1000 - 200 - 100 = 700 available
    let budget = ContextBudget::new(1_000, 200, 100);
    let history = turns(&[300, 300, 300]);
    let tools = vec![ToolResult::new("kb", "search_general_kb", sentences(200))];

    let ctx = assembler(16).assemble(&history, &tools, &budget).unwrap();
    let meta = &ctx.metadata;

    assert_eq!(meta.budget, 700);
    assert!(meta.total_tokens <= 700);
    assert_eq!(ctx.tool_results().count(), 1);
    assert!(meta.tool_results_dropped.is_empty());

    // Newest turn whole, the one before it cut to the 200 tokens left,
    // the oldest dropped.
    assert_eq!(history_indexes(&ctx), vec![1, 2]);
    let middle = ctx.history().next().unwrap();
    assert!(middle.truncated);
    assert_eq!(middle.estimated_tokens, 200);
    assert_eq!(meta.history_truncated, 1);
    assert_eq!(meta.history_dropped, 1);
    assert_eq!(meta.total_tokens, 700);
}

#[test]
fn exact_fit_passes_through() {
    let history = turns(&[100, 100]);
    let tools = vec![ToolResult::new("kb", "search_general_kb", sentences(50))];
    let budget = ContextBudget::new(250, 0, 0);

    let ctx = assembler(16).assemble(&history, &tools, &budget).unwrap();

    assert_eq!(ctx.segments.len(), 3);
    assert!(ctx.segments.iter().all(|s| !s.truncated));
    assert_eq!(ctx.metadata.total_tokens, 250);
    assert_eq!(ctx.metadata.utilization_pct, 100.0);
    assert_eq!(ctx.metadata.history_dropped, 0);
    assert!(ctx.metadata.drops.is_empty());
}

#[test]
fn one_token_over_changes_exactly_one_segment() {
    let history = turns(&[100, 100]);
    let tools = vec![ToolResult::new("kb", "search_general_kb", sentences(50))];
    let budget = ContextBudget::new(249, 0, 0);

    let ctx = assembler(16).assemble(&history, &tools, &budget).unwrap();

    assert_eq!(ctx.segments.len(), 3);
    let truncated: Vec<_> = ctx.segments.iter().filter(|s| s.truncated).collect();
    assert_eq!(truncated.len(), 1);
    // Oldest turn loses exactly the one word that did not fit.
    assert_eq!(
        truncated[0].source,
        SegmentSource::History {
            role: ragloom_core::message::Role::User,
            index: 0
        }
    );
    assert_eq!(truncated[0].estimated_tokens, 99);
    assert_eq!(ctx.metadata.total_tokens, 249);
    assert_eq!(ctx.metadata.history_dropped, 0);
}

#[test]
fn truncation_never_cuts_inside_a_word() {
    let long = "Quarterly revenue grew by eleven percent while operating costs stayed flat \
                and the board approved an expanded buyback program for next year";
    let history = vec![Message::user(long), Message::assistant("Noted, thanks.")];
    let estimator = Arc::new(CharRatioEstimator::new(1.0));

    for total in 20..long.len() {
        let asm = ContextAssembler::new(policy(5), estimator.clone());
        let ctx = asm
            .assemble(&history, &[], &ContextBudget::new(total, 0, 0))
            .unwrap();
        assert!(ctx.metadata.total_tokens <= total);
        assert_no_mid_word_cut(&ctx, &[long, "Noted, thanks."]);
    }
}

#[test]
fn higher_priority_tool_result_wins() {
    let tools = vec![
        ToolResult::new("low", "fetch_finance_news", sentences(100)).with_priority(1),
        ToolResult::new("high", "search_user_documents", sentences(100)).with_priority(5),
    ];
    let ctx = assembler(60)
        .assemble(&[], &tools, &ContextBudget::new(150, 0, 0))
        .unwrap();

    let kept: Vec<_> = ctx.tool_results().filter_map(|s| s.tool_id()).collect();
    assert_eq!(kept, vec!["high"]);
    assert_eq!(ctx.metadata.tool_results_dropped, vec!["low".to_string()]);
    assert_eq!(ctx.metadata.drops.len(), 1);
    assert_eq!(ctx.metadata.drops[0].layer, "tool_results");
}

#[test]
fn equal_priority_keeps_plan_order() {
    let tools = vec![
        ToolResult::new("first", "a", sentences(10)),
        ToolResult::new("second", "b", sentences(10)),
    ];
    let history = turns(&[500]);
    let ctx = assembler(1)
        .assemble(&history, &tools, &ContextBudget::new(100, 0, 0))
        .unwrap();
    let kept: Vec<_> = ctx.tool_results().filter_map(|s| s.tool_id()).collect();
    assert_eq!(kept, vec!["first", "second"]);
}

#[test]
fn smaller_tool_result_still_fits_after_a_drop() {
    let tools = vec![
        ToolResult::new("a", "search_general_kb", sentences(100)).with_priority(3),
        ToolResult::new("b", "search_user_documents", sentences(100)).with_priority(2),
        ToolResult::new("c", "fetch_cbr_data", sentences(10)).with_priority(1),
    ];
    let ctx = assembler(50)
        .assemble(&[], &tools, &ContextBudget::new(115, 0, 0))
        .unwrap();

    let kept: Vec<_> = ctx.tool_results().filter_map(|s| s.tool_id()).collect();
    assert_eq!(kept, vec!["a", "c"]);
    assert_eq!(ctx.metadata.tool_results_dropped, vec!["b".to_string()]);
}

#[test]
fn history_window_stays_contiguous() {
    // oldest -> newest: 10, 100, 20
    let history = turns(&[10, 100, 20]);
    let ctx = assembler(40)
        .assemble(&history, &[], &ContextBudget::new(50, 0, 0))
        .unwrap();

    // The oldest turn would fit on its own, but the turn after it was dropped.
    assert_eq!(history_indexes(&ctx), vec![2]);
    assert_eq!(ctx.metadata.history_dropped, 2);
    assert_eq!(ctx.metadata.history_included, 1);
    assert_eq!(ctx.metadata.drops[0].items_dropped, 2);
    assert_eq!(ctx.metadata.drops[0].tokens_dropped, 110);
}

#[test]
fn output_is_tools_then_history_in_order() {
    let history = turns(&[5, 5, 5]);
    let tools = vec![ToolResult::new("kb", "search_general_kb", sentences(5))];
    let ctx = assembler(1)
        .assemble(&history, &tools, &ContextBudget::new(1_000, 0, 0))
        .unwrap();

    assert!(!ctx.segments[0].is_history());
    assert_eq!(history_indexes(&ctx), vec![0, 1, 2]);
}

#[test]
fn reserved_budget_consuming_everything_rejected() {
    let asm = assembler(1);
    for budget in [
        ContextBudget::new(1_000, 900, 200),
        ContextBudget::new(1_000, 900, 100),
        ContextBudget::new(0, 0, 0),
    ] {
        let err = asm.assemble(&[], &[], &budget).unwrap_err();
        assert!(matches!(err, BudgetError::Misconfigured { .. }), "{budget:?}");
    }
}

#[test]
fn segment_cost_includes_overhead() {
    let asm = ContextAssembler::new(
        AssemblyPolicy::default(),
        Arc::new(CharRatioEstimator::default()),
    );
    // "test": 1 token + 4 overhead
    assert_eq!(asm.segment_tokens("test"), 5);

    let ctx = asm
        .assemble(
            &[Message::user("test")],
            &[],
            &ContextBudget::new(100, 10, 10),
        )
        .unwrap();
    assert_eq!(ctx.metadata.total_tokens, 5);
}

#[test]
fn empty_inputs_produce_empty_context() {
    let ctx = assembler(1)
        .assemble(&[], &[], &ContextBudget::new(100, 0, 0))
        .unwrap();
    assert!(ctx.segments.is_empty());
    assert_eq!(ctx.metadata.total_tokens, 0);
    assert_eq!(ctx.metadata.utilization_pct, 0.0);
    assert_eq!(ctx.render(), "");
}

#[test]
fn render_labels_segments() {
    let history = vec![Message::user("What is the key rate?")];
    let tools = vec![ToolResult::new("c1", "fetch_cbr_data", "Key rate: 16%.")];
    let ctx = assembler(1)
        .assemble(&history, &tools, &ContextBudget::new(1_000, 0, 0))
        .unwrap();

    assert_eq!(
        ctx.render(),
        "[tool:fetch_cbr_data]\nKey rate: 16%.\n\n[user]\nWhat is the key rate?"
    );
}

#[test]
fn assembly_is_deterministic() {
    let history = turns(&[40, 80, 60, 30]);
    let tools = vec![
        ToolResult::new("a", "x", sentences(70)).with_priority(1),
        ToolResult::new("b", "y", sentences(45)),
    ];
    let budget = ContextBudget::new(200, 20, 10);
    let asm = assembler(8);

    let first = asm.assemble(&history, &tools, &budget).unwrap();
    let second = asm.assemble(&history, &tools, &budget).unwrap();
    assert_eq!(first.segments, second.segments);
    assert!(first.metadata.total_tokens <= 170);
}

#[test]
fn config_conversions() {
    let cfg = ContextConfig::default();
    let budget = ContextBudget::from(&cfg);
    assert_eq!(budget.available_for_content().unwrap(), 174_000);

    let policy = AssemblyPolicy::from(&cfg);
    assert!(policy.token_aware);
    assert_eq!(policy.segment_overhead_tokens, 4);
    assert_eq!(policy.fallback_messages_limit, 20);
}

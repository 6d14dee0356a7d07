//! Turning model-emitted tool calls into a tool plan.
//!
//! The upstream planner decides *which* tools run. This module only converts
//! its OpenAI-style function calls into [`ToolInvocation`]s and applies
//! configured dependency rules, e.g. a full-document load waits for the
//! document search unless explicit document ids were given.

use ragloom_config::DependencyRuleConfig;
use ragloom_core::tool::ToolInvocation;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One function call as emitted by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: RawFunction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFunction {
    #[serde(default)]
    pub name: Option<String>,
    /// JSON-encoded arguments string, exactly as the model produced it.
    #[serde(default)]
    pub arguments: Option<String>,
}

/// A dependency inference rule. See [`DependencyRuleConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRule {
    pub tool: String,
    pub depends_on: String,
    pub unless_argument: Option<String>,
}

impl From<&DependencyRuleConfig> for DependencyRule {
    fn from(cfg: &DependencyRuleConfig) -> Self {
        Self {
            tool: cfg.tool.clone(),
            depends_on: cfg.depends_on.clone(),
            unless_argument: cfg.unless_argument.clone(),
        }
    }
}

impl DependencyRule {
    fn applies_to(&self, capability: &str, arguments: &serde_json::Value) -> bool {
        if self.tool != capability {
            return false;
        }
        match &self.unless_argument {
            Some(key) => !has_value(arguments.get(key)),
            None => true,
        }
    }
}

fn has_value(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(serde_json::Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Ordered list of invocations for one request.
#[derive(Debug, Clone, Default)]
pub struct ToolPlan {
    pub invocations: Vec<ToolInvocation>,
}

impl ToolPlan {
    pub fn new(invocations: Vec<ToolInvocation>) -> Self {
        Self { invocations }
    }

    /// Convert model tool calls into invocations.
    ///
    /// Calls without a function name are skipped. Malformed argument JSON
    /// degrades to an empty object. A call without an id is named
    /// `"{name}#{n}"`, `n` counting calls of that tool from 1.
    pub fn from_tool_calls(calls: &[RawToolCall], rules: &[DependencyRule], retryable: bool) -> Self {
        let mut plan = Self::default();
        plan.push_tool_calls(calls, rules, retryable);
        plan
    }

    /// Append tool calls after the invocations already in the plan.
    /// Dependency rules see every earlier invocation, not only earlier calls.
    pub fn push_tool_calls(&mut self, calls: &[RawToolCall], rules: &[DependencyRule], retryable: bool) {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for existing in &self.invocations {
            *seen.entry(existing.capability.clone()).or_insert(0) += 1;
        }

        for call in calls {
            let Some(name) = call.function.name.as_deref().filter(|n| !n.is_empty()) else {
                warn!("Plan: skipping tool call without a function name");
                continue;
            };

            let arguments = match call.function.arguments.as_deref() {
                None | Some("") => serde_json::json!({}),
                Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                    warn!(tool = %name, error = %e, "Plan: malformed tool arguments, using {{}}");
                    serde_json::json!({})
                }),
            };

            let ordinal = seen.entry(name.to_string()).or_insert(0);
            *ordinal += 1;
            let id = call
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{name}#{ordinal}"));

            let mut dependencies = Vec::new();
            for rule in rules.iter().filter(|r| r.applies_to(name, &arguments)) {
                for earlier in self.invocations.iter().filter(|e| e.capability == rule.depends_on) {
                    if !dependencies.contains(&earlier.id) {
                        dependencies.push(earlier.id.clone());
                    }
                }
            }
            if !dependencies.is_empty() {
                debug!(tool = %name, ?dependencies, "Plan: inferred dependencies");
            }

            self.invocations.push(
                ToolInvocation::new(id, name)
                    .with_arguments(arguments)
                    .depends_on(dependencies)
                    .retryable(retryable),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: Option<&str>, name: &str, args: &str) -> RawToolCall {
        RawToolCall {
            id: id.map(str::to_string),
            function: RawFunction {
                name: Some(name.to_string()),
                arguments: Some(args.to_string()),
            },
        }
    }

    fn load_after_search() -> Vec<DependencyRule> {
        vec![DependencyRule {
            tool: "load_documents_full".into(),
            depends_on: "search_user_documents".into(),
            unless_argument: Some("document_ids".into()),
        }]
    }

    #[test]
    fn load_without_ids_waits_for_search() {
        let calls = vec![
            call(Some("c1"), "search_user_documents", r#"{"query": "q3 revenue"}"#),
            call(Some("c2"), "load_documents_full", "{}"),
        ];
        let plan = ToolPlan::from_tool_calls(&calls, &load_after_search(), true);

        assert_eq!(plan.invocations.len(), 2);
        assert!(plan.invocations[0].dependencies.is_empty());
        assert_eq!(plan.invocations[1].dependencies, vec!["c1".to_string()]);
        assert_eq!(plan.invocations[0].arguments["query"], "q3 revenue");
    }

    #[test]
    fn explicit_ids_remove_the_dependency() {
        let calls = vec![
            call(Some("c1"), "search_user_documents", "{}"),
            call(Some("c2"), "load_documents_full", r#"{"document_ids": [4, 7]}"#),
        ];
        let plan = ToolPlan::from_tool_calls(&calls, &load_after_search(), true);
        assert!(plan.invocations[1].dependencies.is_empty());
    }

    #[test]
    fn searches_stay_independent() {
        let calls = vec![
            call(None, "search_general_kb", "{}"),
            call(None, "search_user_documents", "{}"),
            call(None, "search_general_kb", r#"{"query": "rates"}"#),
        ];
        let plan = ToolPlan::from_tool_calls(&calls, &load_after_search(), false);

        let ids: Vec<&str> = plan.invocations.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["search_general_kb#1", "search_user_documents#1", "search_general_kb#2"]
        );
        assert!(plan.invocations.iter().all(|i| i.dependencies.is_empty()));
        assert!(plan.invocations.iter().all(|i| !i.retryable));
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let calls = vec![call(Some("c1"), "fetch_cbr_data", "{not json")];
        let plan = ToolPlan::from_tool_calls(&calls, &[], true);
        assert_eq!(plan.invocations[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn nameless_calls_skipped() {
        let calls = vec![RawToolCall {
            id: Some("c1".into()),
            function: RawFunction {
                name: None,
                arguments: None,
            },
        }];
        let plan = ToolPlan::from_tool_calls(&calls, &[], true);
        assert!(plan.invocations.is_empty());
    }

    #[test]
    fn raw_calls_deserialize_from_model_json() {
        let json = r#"[{"id": "call_1", "type": "function",
                        "function": {"name": "fetch_finance_news", "arguments": "{\"topic\": \"oil\"}"}}]"#;
        let calls: Vec<RawToolCall> = serde_json::from_str(json).unwrap();
        let plan = ToolPlan::from_tool_calls(&calls, &[], true);
        assert_eq!(plan.invocations[0].id, "call_1");
        assert_eq!(plan.invocations[0].arguments["topic"], "oil");
    }

    #[test]
    fn rule_from_config() {
        let cfg = DependencyRuleConfig {
            tool: "load_documents_full".into(),
            depends_on: "search_user_documents".into(),
            unless_argument: None,
        };
        let rule = DependencyRule::from(&cfg);
        assert!(rule.applies_to("load_documents_full", &serde_json::json!({"document_ids": [1]})));
    }

    #[test]
    fn appended_calls_see_explicit_invocations() {
        let mut plan = ToolPlan::new(vec![ToolInvocation::new("s1", "search_user_documents")]);
        plan.push_tool_calls(
            &[call(None, "load_documents_full", "{}"), call(None, "search_user_documents", "{}")],
            &load_after_search(),
            true,
        );

        assert_eq!(plan.invocations[1].dependencies, vec!["s1".to_string()]);
        assert_eq!(plan.invocations[2].id, "search_user_documents#2");
    }
}

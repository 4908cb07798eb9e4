//! 规则引擎集成测试
//!
//! 测试完整的规则加载、排序、求值、动作执行和 trace 输出工作流。

use rule_engine::{
    ConfigOverrides, EvaluateOptions, Mode, NoopMetricsSink, RuleCompiler, RuleEngine, RuleError,
    RuleInput,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// 固定时钟：2024-06-01T00:00:00Z
const NOW_MS: i64 = 1_717_200_000_000;

/// 调试构建下放宽超时，避免并行测试偶发超时
fn relaxed() -> ConfigOverrides {
    ConfigOverrides::default().with_timeout_ms(10_000)
}

fn engine() -> RuleEngine {
    RuleEngine::with_overrides(relaxed()).with_metrics_sink(Arc::new(NoopMetricsSink))
}

fn options() -> EvaluateOptions {
    EvaluateOptions::default().with_now_ms(NOW_MS)
}

fn input(value: Value) -> RuleInput {
    serde_json::from_value(value).unwrap()
}

/// 模拟订单风控规则集
fn order_rule_set() -> RuleInput {
    input(json!({
        "version": "risk-2024.06",
        "rules": [
            {
                "ruleId": "high-value",
                "priority": 10,
                "condition": {"op": "gt", "left": {"path": "data.orderTotal"}, "right": {"value": 1000}},
                "actions": [
                    {"type": "setField", "path": "data.riskLevel", "value": "High"},
                    {"type": "emitEvent", "event": "risk.flagged", "payload": {"$path": "orderTotal"}}
                ]
            },
            {
                "ruleId": "vip-discount",
                "priority": 5,
                "scope": {"roles": ["vip"]},
                "condition": {
                    "all": [
                        {"op": "in", "left": {"path": "context.country"}, "right": {"value": ["US", "CA"]}},
                        {"op": "gte", "left": {"path": "orderTotal"}, "right": {"value": 100}}
                    ]
                },
                "actions": [
                    {"type": "transform", "path": "orderTotal", "fn": "multiply", "args": [0.9]},
                    {"type": "addItem", "path": "tags", "value": "vip"}
                ]
            },
            {
                "ruleId": "summary",
                "priority": 1,
                "actions": [
                    {"type": "transform", "path": "summary", "fn": "template", "template": "{{customer.name}} / {{riskLevel}}"}
                ]
            }
        ]
    }))
}

fn order_data() -> Value {
    json!({"orderTotal": 1500, "customer": {"name": "Ada"}})
}

fn vip_context() -> Value {
    json!({"country": "US", "role": "customer", "roles": ["vip"]})
}

#[test]
fn test_high_value_order_workflow() {
    let out = engine()
        .evaluate_input(&order_rule_set(), &vip_context(), &order_data(), &options())
        .unwrap();

    assert_eq!(out.data["riskLevel"], "High");
    assert_eq!(out.data["orderTotal"], json!(1350));
    assert_eq!(out.data["tags"], json!(["vip"]));
    assert_eq!(out.data["summary"], "Ada / High");

    let trace = &out.trace;
    assert_eq!(trace.version_id.as_deref(), Some("risk-2024.06"));
    assert_eq!(trace.rules_considered, vec!["high-value", "vip-discount", "summary"]);
    assert_eq!(trace.rules_matched, trace.rules_considered);
    assert!(trace.errors.is_empty());

    let first = &trace.action_diffs[0];
    assert_eq!(first.rule_id, "high-value");
    assert_eq!(first.path, "riskLevel");
    assert_eq!(first.before, None);
    assert_eq!(first.after, Some(json!("High")));

    assert_eq!(trace.events.len(), 1);
    assert_eq!(trace.events[0].payload, Some(json!(1500)));
}

#[test]
fn test_scope_excludes_rule() {
    let context = json!({"country": "US", "role": "customer"});
    let out = engine()
        .evaluate_input(&order_rule_set(), &context, &order_data(), &options())
        .unwrap();

    assert_eq!(out.trace.rules_considered, vec!["high-value", "summary"]);
    assert_eq!(out.data["orderTotal"], 1500);
}

#[test]
fn test_equal_priority_sorted_by_rule_id() {
    let rules = input(json!([
        {"ruleId": "R2", "priority": 10, "condition": {"op": "exists", "left": {"path": "x"}}},
        {"ruleId": "R1", "priority": 10, "condition": {"op": "exists", "left": {"path": "x"}}},
        {"ruleId": "R10", "priority": 10, "condition": {"op": "exists", "left": {"path": "x"}}}
    ]));

    let out = engine()
        .evaluate_input(&rules, &json!({}), &json!({"x": 1}), &options())
        .unwrap();
    assert_eq!(out.trace.rules_considered, vec!["R1", "R10", "R2"]);
    assert_eq!(out.trace.rules_matched, vec!["R1", "R10", "R2"]);
}

#[test]
fn test_evaluation_is_idempotent() {
    let engine = engine();
    let first = engine
        .evaluate_input(&order_rule_set(), &vip_context(), &order_data(), &options())
        .unwrap();
    let second = engine
        .evaluate_input(&order_rule_set(), &vip_context(), &order_data(), &options())
        .unwrap();

    assert_eq!(first.trace.rules_matched, second.trace.rules_matched);
    assert_eq!(first.trace.condition_results, second.trace.condition_results);
    assert_eq!(first.data, second.data);
    assert_ne!(first.trace.correlation_id, second.trace.correlation_id);
}

#[test]
fn test_memoization_does_not_change_results() {
    let rules = input(json!([
        {
            "ruleId": "a", "priority": 3,
            "condition": {"op": "lt", "left": {"path": "score"}, "right": {"value": 50}},
            "actions": [{"type": "setField", "path": "score", "value": 80}]
        },
        {
            "ruleId": "b", "priority": 2,
            "condition": {"op": "lt", "left": {"path": "score"}, "right": {"value": 50}},
            "actions": [{"type": "setField", "path": "flagged", "value": true}]
        },
        {
            "ruleId": "c", "priority": 1,
            "condition": {"any": [
                {"op": "lt", "left": {"path": "score"}, "right": {"value": 50}},
                {"op": "eq", "left": {"path": "score"}, "right": {"value": 80}}
            ]},
            "actions": [{"type": "addItem", "path": "log", "value": "c"}]
        }
    ]));

    let run = |memoize: bool| {
        let options = options()
            .with_overrides(ConfigOverrides::default().with_memoization(memoize));
        engine()
            .evaluate_input(&rules, &json!({}), &json!({"score": 10}), &options)
            .unwrap()
    };
    let memoized = run(true);
    let plain = run(false);

    assert_eq!(memoized.trace.condition_results, plain.trace.condition_results);
    assert_eq!(memoized.data, plain.data);
    assert_eq!(memoized.data, json!({"score": 80, "log": ["c"]}));
}

#[test]
fn test_max_rules_limit() {
    let rules = input(json!([
        {"ruleId": "a", "actions": [{"type": "setField", "path": "a", "value": 1}]},
        {"ruleId": "b", "actions": [{"type": "setField", "path": "b", "value": 1}]}
    ]));
    let options = options().with_overrides(ConfigOverrides::default().with_max_rules(1));

    let out = engine()
        .evaluate_input(&rules, &json!({}), &json!({}), &options)
        .unwrap();

    assert_eq!(out.data, json!({"a": 1}));
    assert_eq!(out.trace.actions_applied.len(), 1);
    assert!(
        out.trace
            .errors
            .iter()
            .any(|e| e.message.contains("Max rules limit reached: 1") && e.rule_id.is_none())
    );
}

#[test]
fn test_date_between_literal() {
    let rules = input(json!([{
        "ruleId": "window",
        "condition": {
            "op": "dateBetween",
            "left": {"value": "2024-06-01"},
            "right": {"value": ["2024-01-01", "2024-12-31"]}
        }
    }]));

    let out = engine()
        .evaluate_input(&rules, &json!({}), &json!({}), &options())
        .unwrap();
    assert_eq!(out.trace.condition_results.get("window"), Some(&true));
}

#[test]
fn test_depth_error_continues_with_next_rule() {
    let mut deep = json!({"op": "exists", "left": {"path": "a"}});
    for _ in 0..11 {
        deep = json!({ "not": deep });
    }
    let rules = input(json!([
        {"ruleId": "deep", "priority": 2, "condition": deep},
        {"ruleId": "next", "priority": 1, "actions": [{"type": "setField", "path": "ran", "value": true}]}
    ]));

    let out = engine()
        .evaluate_input(&rules, &json!({}), &json!({"a": 1}), &options())
        .unwrap();

    assert_eq!(out.trace.errors.len(), 1);
    assert_eq!(out.trace.errors[0].rule_id.as_deref(), Some("deep"));
    assert!(out.trace.errors[0].message.contains("Max condition depth exceeded: 10"));
    assert_eq!(out.trace.rules_matched, vec!["next"]);
    assert_eq!(out.data["ran"], true);
}

#[test]
fn test_throw_error_aborts_evaluation() {
    let rules = input(json!([
        {
            "ruleId": "blocked-country", "priority": 100,
            "condition": {"op": "eq", "left": {"path": "context.country"}, "right": {"value": "XX"}},
            "actions": [
                {"type": "setContext", "path": "blocked", "value": true},
                {"type": "throwError", "message": "Country not supported"}
            ]
        },
        {"ruleId": "later", "actions": [{"type": "setField", "path": "later", "value": true}]}
    ]));

    let err = engine()
        .evaluate_input(&rules, &json!({"country": "XX"}), &json!({}), &options())
        .unwrap_err();
    assert!(err.is_control_flow());

    let RuleError::Aborted(aborted) = err else {
        panic!("expected aborted evaluation");
    };
    assert_eq!(aborted.rule_id, "blocked-country");
    assert_eq!(aborted.message, "Country not supported");
    assert_eq!(aborted.context["blocked"], true);
    assert_eq!(aborted.data, json!({}));
    assert_eq!(aborted.trace.rules_considered, vec!["blocked-country"]);
    assert_eq!(
        aborted.trace.actions_applied.last().map(|a| a.action.as_str()),
        Some("throwError")
    );
}

#[test]
fn test_predicate_mode_is_dry_run() {
    let out = engine()
        .evaluate_input(
            &order_rule_set(),
            &vip_context(),
            &order_data(),
            &EvaluateOptions::predicate().with_now_ms(NOW_MS),
        )
        .unwrap();

    assert_eq!(out.trace.mode, Mode::Predicate);
    assert_eq!(out.trace.rules_matched.len(), 3);
    assert_eq!(out.data, order_data());
    assert!(out.trace.action_diffs.is_empty());
}

#[test]
fn test_custom_actions_policy() {
    let rules = input(json!([{
        "ruleId": "notify",
        "actions": [{"type": "custom", "name": "notify.sms", "to": {"$path": "phone"}}]
    }]));
    let data = json!({"phone": "+15550100"});

    // 默认禁用
    let out = engine()
        .evaluate_input(&rules, &json!({}), &data, &options())
        .unwrap();
    assert_eq!(out.trace.errors[0].message, "Custom actions are disabled: notify.sms");

    let engine = RuleEngine::with_overrides(relaxed().with_custom_actions(true))
        .with_metrics_sink(Arc::new(NoopMetricsSink));

    let out = engine
        .evaluate_input(&rules, &json!({}), &data, &options())
        .unwrap();
    assert_eq!(
        out.trace.errors[0].message,
        "No handler registered for custom action: notify.sms"
    );

    engine
        .register_custom_action("notify.sms", |params, scope| {
            let to = scope.resolve(params.get("to").unwrap_or(&Value::Null))?;
            scope.set("context.smsSentTo", to.unwrap_or(Value::Null));
            Ok(())
        })
        .unwrap();

    let out = engine
        .evaluate_input(&rules, &json!({}), &data, &options())
        .unwrap();
    assert!(out.trace.errors.is_empty());
    assert_eq!(out.context["smsSentTo"], "+15550100");

    let restricted = EvaluateOptions {
        overrides: ConfigOverrides {
            allowed_action_types: Some(vec!["notify.email".to_string()]),
            ..Default::default()
        },
        ..options()
    };
    let out = engine
        .evaluate_input(&rules, &json!({}), &data, &restricted)
        .unwrap();
    assert_eq!(out.trace.errors[0].message, "Action type not allowed: notify.sms");
}

#[test]
fn test_prototype_keys_are_never_written() {
    let rules = input(json!([{
        "ruleId": "pollute",
        "actions": [
            {"type": "setField", "path": "__proto__.polluted", "value": true},
            {"type": "setField", "path": "a.constructor.prototype.x", "value": true}
        ]
    }]));

    let out = engine()
        .evaluate_input(&rules, &json!({}), &json!({}), &options())
        .unwrap();
    assert_eq!(out.data, json!({}));
    assert!(out.trace.action_diffs.is_empty());
    assert_eq!(out.trace.actions_applied.len(), 2);
}

#[test]
fn test_trace_serializes_camel_case() {
    let out = engine()
        .evaluate_input(&order_rule_set(), &vip_context(), &order_data(), &options())
        .unwrap();
    let json = serde_json::to_value(&out).unwrap();

    let trace = &json["trace"];
    assert!(trace["correlationId"].is_string());
    assert_eq!(trace["mode"], "apply");
    assert!(trace["conditionResults"]["high-value"].as_bool().unwrap());
    assert!(trace["readsByRuleId"]["high-value"].is_array());
    assert!(trace["conditionExplains"]["high-value"].is_object());
    assert!(trace["durationMs"].is_number());
    assert_eq!(trace["actionDiffs"][0]["target"], "data");
}

#[test]
fn test_validator_and_engine_agree_on_depth() {
    let mut deep = json!({"op": "exists", "left": {"path": "a"}});
    for _ in 0..11 {
        deep = json!({ "not": deep });
    }
    let rules = input(json!([{"ruleId": "deep", "condition": deep}]));

    let issues = RuleCompiler::new().check(rules.rules());
    assert_eq!(issues.len(), 1);

    let out = engine()
        .evaluate_input(&rules, &json!({}), &json!({}), &options())
        .unwrap();
    assert_eq!(out.trace.errors[0].message, issues[0].message);
}

#[test]
fn test_out_of_range_array_index_is_not_written() {
    let rules = input(json!([{
        "ruleId": "index",
        "actions": [
            {"type": "setField", "path": "data.list[18446744073709551615]", "value": 1},
            {"type": "setField", "path": "data.list[20000000]", "value": 1},
            {"type": "addItem", "path": "data.nested[20000000].tags", "value": "x"}
        ]
    }]));
    let data = json!({"list": []});

    let out = engine()
        .evaluate_input(&rules, &json!({}), &data, &options())
        .unwrap();
    assert_eq!(out.data, data);
    assert!(out.trace.action_diffs.is_empty());
    assert!(out.trace.errors.is_empty());
}

#[test]
fn test_literal_array_at_depth_limit() {
    let mut condition = json!({"op": "in", "left": {"path": "context.country"}, "right": {"value": ["US", "CA"]}});
    for _ in 0..10 {
        condition = json!({ "not": condition });
    }
    let rules = input(json!([{"ruleId": "nested-in", "condition": condition}]));

    assert!(RuleCompiler::new().check(rules.rules()).is_empty());
    let out = engine()
        .evaluate_input(&rules, &json!({"country": "US"}), &json!({}), &options())
        .unwrap();
    assert!(out.trace.errors.is_empty());
    assert_eq!(out.trace.rules_matched, vec!["nested-in"]);

    let flat = input(json!([{
        "ruleId": "flat-in",
        "condition": {"op": "in", "left": {"path": "context.country"}, "right": {"value": ["US"]}}
    }]));
    let strict = options().with_overrides(ConfigOverrides::default().with_max_depth(0));
    let out = engine()
        .evaluate_input(&flat, &json!({"country": "US"}), &json!({}), &strict)
        .unwrap();
    assert!(out.trace.errors.is_empty());
    assert_eq!(out.trace.rules_matched, vec!["flat-in"]);
}

#[test]
fn test_malformed_action_fails_only_its_rule() {
    let rules = input(json!([
        {"ruleId": "a", "priority": 2, "actions": [{"type": "setField"}]},
        {"ruleId": "b", "priority": 1, "actions": [{"type": "setField", "path": "applied", "value": true}]}
    ]));

    let issues = RuleCompiler::new().check(rules.rules());
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].rule_id.as_deref(), Some("a"));

    let out = engine()
        .evaluate_input(&rules, &json!({}), &json!({}), &options())
        .unwrap();
    assert_eq!(out.data, json!({"applied": true}));
    assert_eq!(out.trace.rules_considered, vec!["a", "b"]);
    assert_eq!(out.trace.errors.len(), 1);
    assert_eq!(out.trace.errors[0].rule_id.as_deref(), Some("a"));
    assert_eq!(
        out.trace.errors[0].message,
        "Malformed action: setField requires string field 'path'"
    );
}

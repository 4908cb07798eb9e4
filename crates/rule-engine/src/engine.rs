//! 规则引擎
//!
//! 一次评估调用的流程：按 scope 过滤 → 按优先级降序、ruleId 升序排序 → 逐条求值条件并执行动作。
//! 循环在达到 `maxRules` 或超过 `timeoutMs` 时停止，已执行的修改不回滚。
//! 单条规则的错误记录到 trace 后继续，只有 `throwError` 会中止整个评估。

use crate::actions::{ActionExecutor, ActionScope, EvalState};
use crate::config::{ConfigOverrides, EngineConfig, EvaluateOptions};
use crate::error::{AbortedEvaluation, Result, RuleError};
use crate::evaluator::RegexCache;
use crate::executor::{ConditionExecutor, Evaluation};
use crate::explain::ExplainNode;
use crate::memo::ConditionMemo;
use crate::models::{Condition, Rule, RuleInput};
use crate::observability::{EvaluationOutcome, MetricsFacadeSink, MetricsSink, log_trace};
use crate::operand::EvalScope;
use crate::path::PathEngine;
use crate::registry::ActionRegistry;
use crate::trace::{Mode, Trace};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{Span, debug, instrument, warn};
use uuid::Uuid;

/// 评估结果：修改后的数据副本、上下文副本和完整 trace
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutput {
    pub data: Value,
    pub context: Value,
    pub trace: Trace,
}

/// 规则引擎
///
/// 持有路径分词缓存、条件记忆化缓存、正则缓存和自定义动作注册表，可在多线程间共享。
pub struct RuleEngine {
    overrides: ConfigOverrides,
    paths: PathEngine,
    memo: ConditionMemo,
    regex_cache: RegexCache,
    registry: ActionRegistry,
    metrics: Arc<dyn MetricsSink>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_overrides(ConfigOverrides::default())
    }

    /// 使用实例级配置覆盖创建引擎
    pub fn with_overrides(overrides: ConfigOverrides) -> Self {
        let config = EngineConfig::resolve(&overrides, &ConfigOverrides::default());
        Self {
            paths: PathEngine::new(config.performance.path_cache_size),
            memo: ConditionMemo::new(config.performance.condition_memo_size),
            regex_cache: RegexCache::new(config.performance.regex_cache_size),
            registry: ActionRegistry::new(),
            metrics: Arc::new(MetricsFacadeSink),
            overrides,
        }
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn paths(&self) -> &PathEngine {
        &self.paths
    }

    pub fn memo(&self) -> &ConditionMemo {
        &self.memo
    }

    /// 注册自定义动作处理器
    pub fn register_custom_action<F>(&self, action_type: &str, handler: F) -> Result<()>
    where
        F: Fn(&Map<String, Value>, &mut ActionScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.register(action_type, handler)
    }

    /// 解析本次调用的生效配置
    pub fn config(&self, options: &EvaluateOptions) -> EngineConfig {
        EngineConfig::resolve(&self.overrides, &options.overrides)
    }

    /// 评估规则集合（裸列表或带版本的 RuleSet）
    ///
    /// 未显式指定 `versionId` 时使用 RuleSet 的 `version`。
    pub fn evaluate_input(
        &self,
        input: &RuleInput,
        context: &Value,
        data: &Value,
        options: &EvaluateOptions,
    ) -> Result<EvaluationOutput> {
        match (options.version_id.as_ref(), input.version()) {
            (None, Some(version)) => {
                let mut options = options.clone();
                options.version_id = Some(version.to_string());
                self.evaluate(input.rules(), context, data, &options)
            }
            _ => self.evaluate(input.rules(), context, data, options),
        }
    }

    /// 评估规则
    ///
    /// 调用方传入的 `context` 和 `data` 不会被修改。正常结束时返回 `Ok`，
    /// 即使 trace 中记录了错误；只有 `throwError` 返回 [`RuleError::Aborted`]。
    #[instrument(
        skip_all,
        fields(
            correlation_id = tracing::field::Empty,
            version_id = ?options.version_id,
            rule_count = rules.len(),
            mode = ?options.mode
        )
    )]
    pub fn evaluate(
        &self,
        rules: &[Rule],
        context: &Value,
        data: &Value,
        options: &EvaluateOptions,
    ) -> Result<EvaluationOutput> {
        let started = Instant::now();
        let config = self.config(options);
        self.sync_caches();

        let correlation_id = options
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Span::current().record("correlation_id", correlation_id.as_str());

        let mut state = EvalState {
            data: data.clone(),
            context: context.clone(),
            trace: Trace::new(correlation_id, options.version_id.clone(), options.mode),
            epoch: self.memo.next_epoch(),
            now_ms: options.now_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
            max_depth: config.max_depth,
        };

        let ordered = Self::select(rules, &mut state);
        let timeout = Duration::from_millis(config.timeout_ms);

        for (index, rule) in ordered.into_iter().enumerate() {
            if index >= config.max_rules {
                let err = RuleError::MaxRulesReached(config.max_rules);
                warn!(error = %err, "Stopping rule evaluation");
                state.trace.loop_error(err.to_string());
                break;
            }
            if started.elapsed() > timeout {
                let err = RuleError::TimeoutExceeded(config.timeout_ms);
                warn!(error = %err, "Stopping rule evaluation");
                state.trace.loop_error(err.to_string());
                break;
            }

            state.trace.rules_considered.push(rule.rule_id.clone());
            match self.run_rule(rule, &mut state, &config) {
                Ok(()) => {}
                Err(RuleError::ThrowError { message }) => {
                    warn!(rule_id = %rule.rule_id, message = %message, "Evaluation aborted by throwError");
                    state.trace.rule_error(&rule.rule_id, message.clone());
                    self.finish(&mut state.trace, started, &config, EvaluationOutcome::Aborted);
                    return Err(RuleError::Aborted(Box::new(AbortedEvaluation {
                        rule_id: rule.rule_id.clone(),
                        message,
                        data: state.data,
                        context: state.context,
                        trace: state.trace,
                    })));
                }
                Err(e) => {
                    warn!(rule_id = %rule.rule_id, error = %e, "Rule evaluation failed");
                    state.trace.rule_error(&rule.rule_id, e.to_string());
                }
            }
        }

        self.finish(&mut state.trace, started, &config, EvaluationOutcome::Completed);

        Ok(EvaluationOutput {
            data: state.data,
            context: state.context,
            trace: state.trace,
        })
    }

    /// 单独求值一个条件（短路）
    pub fn evaluate_condition(
        &self,
        condition: &Condition,
        context: &Value,
        data: &Value,
        options: &EvaluateOptions,
    ) -> Result<bool> {
        let config = self.config(options);
        let now_ms = options.now_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
        ConditionExecutor::new(self.scope(data, context, now_ms, config.max_depth)).evaluate(condition)
    }

    /// 单独求值一个条件并返回解释树与读取日志
    pub fn explain_condition(
        &self,
        condition: &Condition,
        context: &Value,
        data: &Value,
        options: &EvaluateOptions,
    ) -> Result<Evaluation> {
        let config = self.config(options);
        let now_ms = options.now_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
        ConditionExecutor::new(self.scope(data, context, now_ms, config.max_depth)).explain(condition)
    }

    /// 按 scope 过滤并排序，重复的 ruleId 记录为循环级错误
    fn select<'r>(rules: &'r [Rule], state: &mut EvalState) -> Vec<&'r Rule> {
        let mut selected: Vec<&Rule> = rules
            .iter()
            .filter(|rule| rule.scope.as_ref().is_none_or(|s| s.matches(&state.context)))
            .collect();

        // 稳定的全序：优先级降序，同优先级按 ruleId 字典序升序
        selected.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for rule in &selected {
            let id = rule.rule_id.as_str();
            if !seen.insert(id) && reported.insert(id) {
                state.trace.loop_error(format!("Duplicate ruleId: {}", id));
            }
        }

        selected
    }

    fn run_rule(&self, rule: &Rule, state: &mut EvalState, config: &EngineConfig) -> Result<()> {
        let rule_id = rule.rule_id.as_str();

        let matched = match &rule.condition {
            Some(condition) => {
                let evaluation = self.evaluate_rule_condition(condition, state, config)?;
                let trace = &mut state.trace;
                trace.condition_results.insert(rule_id.to_string(), evaluation.result);
                trace
                    .condition_explains
                    .insert(rule_id.to_string(), evaluation.explain.clone());
                trace
                    .reads_by_rule_id
                    .insert(rule_id.to_string(), evaluation.reads.clone());
                evaluation.result
            }
            // 没有条件的规则总是匹配
            None => {
                let trace = &mut state.trace;
                trace.condition_results.insert(rule_id.to_string(), true);
                trace
                    .condition_explains
                    .insert(rule_id.to_string(), ExplainNode::Always { result: true });
                trace.reads_by_rule_id.insert(rule_id.to_string(), Vec::new());
                true
            }
        };

        debug!(rule_id = %rule_id, matched, "Rule condition evaluated");
        if !matched {
            return Ok(());
        }
        state.trace.rules_matched.push(rule_id.to_string());

        if state.trace.mode == Mode::Predicate {
            return Ok(());
        }

        let executor = ActionExecutor {
            paths: &self.paths,
            memo: &self.memo,
            regex_cache: &self.regex_cache,
            registry: &self.registry,
            policy: &config.actions,
        };
        // 按声明顺序执行，首个失败的动作终止本规则剩余动作
        for action in &rule.actions {
            executor.apply(rule_id, action, state)?;
        }

        Ok(())
    }

    fn evaluate_rule_condition(
        &self,
        condition: &Condition,
        state: &EvalState,
        config: &EngineConfig,
    ) -> Result<Arc<Evaluation>> {
        let executor =
            ConditionExecutor::new(self.scope(&state.data, &state.context, state.now_ms, config.max_depth));

        if !config.performance.memoize_condition_evaluations {
            return Ok(Arc::new(executor.explain(condition)?));
        }

        let key = ConditionMemo::key(condition)?;
        if let Some(hit) = self.memo.get(&key, state.epoch) {
            return Ok(hit);
        }
        let evaluation = Arc::new(executor.explain(condition)?);
        self.memo.put(key, state.epoch, Arc::clone(&evaluation));
        Ok(evaluation)
    }

    fn scope<'a>(&'a self, data: &'a Value, context: &'a Value, now_ms: i64, max_depth: usize) -> EvalScope<'a> {
        EvalScope {
            data,
            context,
            paths: &self.paths,
            regex_cache: &self.regex_cache,
            now_ms,
            max_depth,
        }
    }

    /// 共享缓存按引擎级配置调整容量，单次调用的覆盖不影响其他调用方
    fn sync_caches(&self) {
        let config = EngineConfig::resolve(&self.overrides, &ConfigOverrides::default());
        self.paths.resize_cache(config.performance.path_cache_size);
        self.memo.resize(config.performance.condition_memo_size);
        self.regex_cache.resize(config.performance.regex_cache_size);
    }

    fn finish(&self, trace: &mut Trace, started: Instant, config: &EngineConfig, outcome: EvaluationOutcome) {
        trace.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics
            .record_evaluation(trace.duration_ms, trace.matched_count(), outcome);
        debug!(
            considered = trace.rules_considered.len(),
            matched = trace.matched_count(),
            errors = trace.errors.len(),
            duration_ms = trace.duration_ms,
            outcome = outcome.as_str(),
            "Rule evaluation finished"
        );
        if config.trace_log {
            log_trace(trace);
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_ENGINE: LazyLock<RuleEngine> = LazyLock::new(RuleEngine::new);

/// 进程级共享引擎
pub fn global() -> &'static RuleEngine {
    &GLOBAL_ENGINE
}

/// 使用进程级共享引擎评估规则
pub fn evaluate_rules(
    input: &RuleInput,
    context: &Value,
    data: &Value,
    options: &EvaluateOptions,
) -> Result<EvaluationOutput> {
    global().evaluate_input(input, context, data, options)
}

/// 向进程级共享引擎注册自定义动作
pub fn register_custom_action<F>(action_type: &str, handler: F) -> Result<()>
where
    F: Fn(&Map<String, Value>, &mut ActionScope<'_>) -> Result<()> + Send + Sync + 'static,
{
    global().register_custom_action(action_type, handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MockMetricsSink;
    use serde_json::json;

    fn rules(value: Value) -> Vec<Rule> {
        serde_json::from_value(value).unwrap()
    }

    fn relaxed() -> ConfigOverrides {
        ConfigOverrides::default().with_timeout_ms(10_000)
    }

    fn quiet_engine() -> RuleEngine {
        RuleEngine::with_overrides(relaxed())
            .with_metrics_sink(Arc::new(crate::observability::NoopMetricsSink))
    }

    #[test]
    fn test_priority_then_rule_id_ordering() {
        let engine = quiet_engine();
        let rules = rules(json!([
            {"ruleId": "R2", "priority": 10},
            {"ruleId": "low", "priority": 1},
            {"ruleId": "R1", "priority": 10},
            {"ruleId": "top", "priority": 99}
        ]));

        let out = engine
            .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap();
        assert_eq!(out.trace.rules_considered, vec!["top", "R1", "R2", "low"]);
        assert_eq!(out.trace.rules_matched, vec!["top", "R1", "R2", "low"]);
    }

    #[test]
    fn test_scope_filtering() {
        let engine = quiet_engine();
        let rules = rules(json!([
            {"ruleId": "us-only", "scope": {"countries": ["US"]}},
            {"ruleId": "admins", "scope": {"roles": ["admin"]}},
            {"ruleId": "everyone"}
        ]));

        let out = engine
            .evaluate(&rules, &json!({"country": "US", "role": "user"}), &json!({}), &EvaluateOptions::default())
            .unwrap();
        assert_eq!(out.trace.rules_considered, vec!["everyone", "us-only"]);
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let engine = quiet_engine();
        let rules = rules(json!([{
            "ruleId": "r",
            "actions": [
                {"type": "setField", "path": "data.x", "value": 1},
                {"type": "setContext", "path": "y", "value": 2}
            ]
        }]));
        let context = json!({});
        let data = json!({});

        let out = engine
            .evaluate(&rules, &context, &data, &EvaluateOptions::default())
            .unwrap();
        assert_eq!(out.data, json!({"x": 1}));
        assert_eq!(out.context, json!({"y": 2}));
        assert_eq!(data, json!({}));
        assert_eq!(context, json!({}));
    }

    #[test]
    fn test_predicate_mode_skips_actions() {
        let engine = quiet_engine();
        let rules = rules(json!([{
            "ruleId": "r",
            "condition": {"op": "exists", "left": {"path": "id"}},
            "actions": [{"type": "setField", "path": "flag", "value": true}]
        }]));

        let out = engine
            .evaluate(&rules, &json!({}), &json!({"id": 1}), &EvaluateOptions::predicate())
            .unwrap();
        assert_eq!(out.trace.rules_matched, vec!["r"]);
        assert_eq!(out.trace.mode, Mode::Predicate);
        assert!(out.trace.actions_applied.is_empty());
        assert_eq!(out.data, json!({"id": 1}));
    }

    #[test]
    fn test_later_rules_see_earlier_mutations() {
        let rules = rules(json!([
            {
                "ruleId": "a", "priority": 2,
                "condition": {"op": "eq", "left": {"path": "status"}, "right": {"value": "new"}},
                "actions": [{"type": "setField", "path": "status", "value": "review"}]
            },
            {
                "ruleId": "b", "priority": 1,
                "condition": {"op": "eq", "left": {"path": "status"}, "right": {"value": "new"}},
                "actions": [{"type": "setField", "path": "touched", "value": true}]
            }
        ]));

        for memoize in [true, false] {
            let engine = quiet_engine();
            let options = EvaluateOptions::default()
                .with_overrides(ConfigOverrides::default().with_memoization(memoize));
            let out = engine
                .evaluate(&rules, &json!({}), &json!({"status": "new"}), &options)
                .unwrap();

            assert_eq!(out.trace.rules_matched, vec!["a"]);
            assert_eq!(out.trace.condition_results.get("b"), Some(&false));
            assert!(out.data.get("touched").is_none());
        }
    }

    #[test]
    fn test_memo_shared_guard_is_reused() {
        let engine = quiet_engine();
        let guard = json!({"op": "gt", "left": {"path": "amount"}, "right": {"value": 10}});
        let rules = rules(json!([
            {"ruleId": "a", "condition": guard.clone()},
            {"ruleId": "b", "condition": guard.clone()},
            {"ruleId": "c", "condition": guard}
        ]));

        let out = engine
            .evaluate(&rules, &json!({}), &json!({"amount": 50}), &EvaluateOptions::default())
            .unwrap();
        assert_eq!(engine.memo().len(), 1);
        assert_eq!(out.trace.rules_matched, vec!["a", "b", "c"]);
        assert_eq!(out.trace.reads_by_rule_id["c"].len(), 1);
        assert_eq!(out.trace.condition_explains["a"], out.trace.condition_explains["c"]);
    }

    #[test]
    fn test_failing_action_stops_only_its_rule() {
        let engine = quiet_engine();
        let rules = rules(json!([
            {
                "ruleId": "a",
                "actions": [
                    {"type": "setField", "path": "first", "value": 1},
                    {"type": "sendSms"},
                    {"type": "setField", "path": "never", "value": 1}
                ]
            },
            {"ruleId": "b", "actions": [{"type": "setField", "path": "second", "value": 2}]}
        ]));

        let out = engine
            .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap();
        assert_eq!(out.data, json!({"first": 1, "second": 2}));
        assert_eq!(out.trace.errors.len(), 1);
        assert_eq!(out.trace.errors[0].rule_id.as_deref(), Some("a"));
        assert_eq!(out.trace.errors[0].message, "Custom actions are disabled: sendSms");
    }

    #[test]
    fn test_unconditional_rule_has_explain_entry() {
        let engine = quiet_engine();
        let rules = rules(json!([{"ruleId": "always"}]));

        let out = engine
            .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap();
        assert_eq!(out.trace.condition_explains["always"], ExplainNode::Always { result: true });
        assert!(out.trace.reads_by_rule_id["always"].is_empty());

        let trace = serde_json::to_value(&out.trace).unwrap();
        assert_eq!(
            trace["conditionExplains"]["always"],
            json!({"type": "always", "result": true})
        );
        assert_eq!(trace["readsByRuleId"]["always"], json!([]));
    }

    #[test]
    fn test_per_call_cache_sizes_do_not_resize_shared_caches() {
        let engine = RuleEngine::with_overrides(relaxed().with_path_cache_size(64).with_condition_memo_size(32))
            .with_metrics_sink(Arc::new(crate::observability::NoopMetricsSink));
        let rules = rules(json!([{"ruleId": "a", "condition": {"op": "exists", "left": {"path": "x"}}}]));
        let options = EvaluateOptions::default().with_overrides(
            ConfigOverrides::default()
                .with_path_cache_size(1)
                .with_condition_memo_size(1),
        );

        engine
            .evaluate(&rules, &json!({}), &json!({"x": 1}), &options)
            .unwrap();
        assert_eq!(engine.paths().cache_capacity(), 64);
        assert_eq!(engine.memo().capacity(), 32);
    }

    #[test]
    fn test_throw_error_aborts_with_partial_state() {
        let engine = quiet_engine();
        let rules = rules(json!([
            {
                "ruleId": "a", "priority": 3,
                "actions": [{"type": "setField", "path": "seen", "value": true}]
            },
            {
                "ruleId": "b", "priority": 2,
                "actions": [{"type": "throwError", "message": "Blocked country"}]
            },
            {"ruleId": "c", "priority": 1}
        ]));

        let err = engine
            .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap_err();
        match err {
            RuleError::Aborted(aborted) => {
                assert_eq!(aborted.rule_id, "b");
                assert_eq!(aborted.message, "Blocked country");
                assert_eq!(aborted.data, json!({"seen": true}));
                assert_eq!(aborted.trace.rules_considered, vec!["a", "b"]);
                assert_eq!(aborted.trace.actions_applied.len(), 2);
                assert_eq!(aborted.trace.errors[0].message, "Blocked country");
            }
            other => panic!("expected aborted evaluation, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_stops_loop() {
        let engine = quiet_engine();
        let rules = rules(json!([{"ruleId": "a"}]));
        let options =
            EvaluateOptions::default().with_overrides(ConfigOverrides::default().with_timeout_ms(0));

        let out = engine
            .evaluate(&rules, &json!({}), &json!({}), &options)
            .unwrap();
        assert!(out.trace.rules_considered.is_empty());
        assert_eq!(out.trace.errors[0].message, "Evaluation timeout exceeded: 0ms");
        assert_eq!(out.trace.errors[0].rule_id, None);
    }

    #[test]
    fn test_duplicate_rule_ids_are_reported() {
        let engine = quiet_engine();
        let rules = rules(json!([{"ruleId": "dup"}, {"ruleId": "dup"}, {"ruleId": "dup"}]));

        let out = engine
            .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap();
        assert_eq!(out.trace.rules_considered.len(), 3);
        let duplicates: Vec<_> = out
            .trace
            .errors
            .iter()
            .filter(|e| e.message == "Duplicate ruleId: dup")
            .collect();
        assert_eq!(duplicates.len(), 1);
    }

    #[test]
    fn test_trace_attribution() {
        let engine = quiet_engine();
        let input: RuleInput =
            serde_json::from_value(json!({"version": "v42", "rules": [{"ruleId": "a"}]})).unwrap();

        let out = engine
            .evaluate_input(&input, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap();
        assert_eq!(out.trace.version_id.as_deref(), Some("v42"));
        assert!(Uuid::parse_str(&out.trace.correlation_id).is_ok());

        let options = EvaluateOptions::default().with_correlation_id("req-1");
        let out = engine
            .evaluate_input(&input, &json!({}), &json!({}), &options)
            .unwrap();
        assert_eq!(out.trace.correlation_id, "req-1");
    }

    #[test]
    fn test_metrics_emitted_once_per_call() {
        let mut sink = MockMetricsSink::new();
        sink.expect_record_evaluation()
            .withf(|duration, matched, outcome| {
                *duration >= 0.0 && *matched == 1 && *outcome == EvaluationOutcome::Completed
            })
            .times(1)
            .return_const(());

        let engine = RuleEngine::with_overrides(relaxed()).with_metrics_sink(Arc::new(sink));
        let rules = rules(json!([
            {"ruleId": "yes"},
            {"ruleId": "no", "condition": {"op": "exists", "left": {"path": "missing"}}}
        ]));
        engine
            .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap();
    }

    #[test]
    fn test_metrics_report_aborted_outcome() {
        let mut sink = MockMetricsSink::new();
        sink.expect_record_evaluation()
            .withf(|_, _, outcome| *outcome == EvaluationOutcome::Aborted)
            .times(1)
            .return_const(());

        let engine = RuleEngine::with_overrides(relaxed()).with_metrics_sink(Arc::new(sink));
        let rules = rules(json!([{"ruleId": "x", "actions": [{"type": "throwError", "message": "stop"}]}]));
        assert!(
            engine
                .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
                .is_err()
        );
    }

    #[test]
    fn test_custom_action_through_engine() {
        let engine = RuleEngine::with_overrides(relaxed().with_custom_actions(true))
            .with_metrics_sink(Arc::new(crate::observability::NoopMetricsSink));
        engine
            .register_custom_action("loyalty.award", |params, scope| {
                let points = params.get("points").cloned().unwrap_or(json!(0));
                scope.set("data.points", points);
                scope.emit("points-awarded", None);
                Ok(())
            })
            .unwrap();

        let rules = rules(json!([{
            "ruleId": "award",
            "actions": [{"type": "loyalty.award", "points": 25}]
        }]));
        let out = engine
            .evaluate(&rules, &json!({}), &json!({}), &EvaluateOptions::default())
            .unwrap();

        assert_eq!(out.data["points"], json!(25));
        assert_eq!(out.trace.events[0].event, "points-awarded");
        assert_eq!(out.trace.action_diffs[0].action, "loyalty.award");
        assert_eq!(out.trace.actions_applied[0].action, "loyalty.award");
    }

    #[test]
    fn test_evaluate_condition_helpers() {
        let engine = quiet_engine();
        let condition: Condition = serde_json::from_value(json!({
            "op": "dateWithinDays", "left": {"path": "due"}, "right": {"value": 3}
        }))
        .unwrap();
        let options = EvaluateOptions::default().with_now_ms(1_717_200_000_000);

        assert!(
            engine
                .evaluate_condition(&condition, &json!({}), &json!({"due": "2024-06-02"}), &options)
                .unwrap()
        );
        let evaluation = engine
            .explain_condition(&condition, &json!({}), &json!({"due": "2024-06-20"}), &options)
            .unwrap();
        assert!(!evaluation.result);
        assert_eq!(evaluation.reads[0].path, "due");
    }
}

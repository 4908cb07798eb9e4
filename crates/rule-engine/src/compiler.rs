//! 规则集校验器
//!
//! 评估本身对不规范的规则是宽容的（不满足的条件只会得到 false）。
//! 校验器在规则上线前找出这些问题，供 CLI `validate` 子命令和宿主的发布流程使用。

use crate::actions::Action;
use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{Result, RuleError};
use crate::evaluator::MAX_PATTERN_LENGTH;
use crate::models::{Comparison, Condition, Operand, Rule, RuleInput};
use crate::operators::Operator;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// 一条校验问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// 所属规则，规则集级问题为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// 条件树中的位置，例如 `condition.all[1].not`
    pub location: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule_id {
            Some(rule_id) => write!(f, "[{}] {}: {}", rule_id, self.location, self.message),
            None => write!(f, "{}: {}", self.location, self.message),
        }
    }
}

/// 规则校验器
pub struct RuleCompiler {
    max_depth: usize,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// 从 JSON 字符串解析规则输入（裸数组或 RuleSet）
    pub fn parse(json: &str) -> Result<RuleInput> {
        Ok(serde_json::from_str(json)?)
    }

    /// 收集所有问题
    pub fn check(&self, rules: &[Rule]) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (index, rule) in rules.iter().enumerate() {
            if rule.rule_id.trim().is_empty() {
                issues.push(ValidationIssue {
                    rule_id: None,
                    location: format!("rules[{}]", index),
                    message: "ruleId must not be empty".to_string(),
                });
            } else if !seen.insert(rule.rule_id.as_str()) {
                issues.push(ValidationIssue {
                    rule_id: Some(rule.rule_id.clone()),
                    location: format!("rules[{}]", index),
                    message: format!("Duplicate ruleId: {}", rule.rule_id),
                });
            }

            if let Some(condition) = &rule.condition {
                let mut ctx = CheckContext {
                    rule_id: &rule.rule_id,
                    issues: &mut issues,
                };
                self.check_condition(condition, "condition", 0, &mut ctx);
            }

            for (i, action) in rule.actions.iter().enumerate() {
                if let Action::Invalid { reason, .. } = action {
                    issues.push(ValidationIssue {
                        rule_id: Some(rule.rule_id.clone()),
                        location: format!("actions[{}]", i),
                        message: reason.clone(),
                    });
                }
            }
        }

        issues
    }

    /// 严格校验，存在任何问题即返回 [`RuleError::Validation`]
    pub fn validate(&self, rules: &[Rule]) -> Result<()> {
        let issues = self.check(rules);
        if issues.is_empty() {
            return Ok(());
        }
        let summary = issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(RuleError::Validation(summary))
    }

    fn check_condition(&self, condition: &Condition, location: &str, depth: usize, ctx: &mut CheckContext<'_>) {
        if depth > self.max_depth {
            ctx.push(location, format!("Max condition depth exceeded: {}", self.max_depth));
            return;
        }

        match condition {
            Condition::All { all: children } => {
                for (i, child) in children.iter().enumerate() {
                    self.check_condition(child, &format!("{}.all[{}]", location, i), depth + 1, ctx);
                }
            }
            Condition::Any { any: children } => {
                for (i, child) in children.iter().enumerate() {
                    self.check_condition(child, &format!("{}.any[{}]", location, i), depth + 1, ctx);
                }
            }
            Condition::Not { not } => {
                self.check_condition(not, &format!("{}.not", location), depth + 1, ctx);
            }
            Condition::Compare(comparison) => {
                let nested = [Some(&comparison.left), comparison.right.as_ref()]
                    .into_iter()
                    .flatten()
                    .map(transform_depth)
                    .max()
                    .unwrap_or(0);
                if depth + nested > self.max_depth {
                    ctx.push(location, format!("Max condition depth exceeded: {}", self.max_depth));
                    return;
                }
                Self::check_comparison(comparison, location, ctx)
            }
        }
    }

    /// 只检查静态字面量，路径和动态值要到评估时才知道
    fn check_comparison(comparison: &Comparison, location: &str, ctx: &mut CheckContext<'_>) {
        let op = comparison.op;
        if op.is_unary() {
            return;
        }
        let Some(right) = &comparison.right else {
            ctx.push(location, format!("{} requires a right operand", op));
            return;
        };
        let Some(literal) = static_literal(right) else {
            return;
        };

        match op {
            Operator::Between | Operator::DateBetween => {
                if !literal.as_array().is_some_and(|range| range.len() == 2) {
                    ctx.push(location, format!("{} requires a [min, max] array", op));
                }
            }
            Operator::In | Operator::NotIn => {
                if !literal.is_array() {
                    ctx.push(location, format!("{} requires an array value", op));
                }
            }
            Operator::Matches => match literal.as_str() {
                Some(pattern) if pattern.chars().count() > MAX_PATTERN_LENGTH => {
                    ctx.push(
                        location,
                        format!("Pattern exceeds {} characters", MAX_PATTERN_LENGTH),
                    );
                }
                Some(pattern) => {
                    if let Err(e) = regex::Regex::new(pattern) {
                        ctx.push(location, format!("Invalid regex pattern: {}", e));
                    }
                }
                None => ctx.push(location, "matches requires a string pattern".to_string()),
            },
            _ => {}
        }
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

struct CheckContext<'a> {
    rule_id: &'a str,
    issues: &'a mut Vec<ValidationIssue>,
}

impl CheckContext<'_> {
    fn push(&mut self, location: &str, message: String) {
        self.issues.push(ValidationIssue {
            rule_id: Some(self.rule_id.to_string()),
            location: location.to_string(),
            message,
        });
    }
}

/// 操作数中 `$transform` 参数的最大嵌套层数，数组元素不计层
fn transform_depth(operand: &Operand) -> usize {
    match operand {
        Operand::Path { .. } => 0,
        Operand::Literal { value } => literal_depth(value),
    }
}

fn literal_depth(value: &Value) -> usize {
    match value {
        Value::Object(obj) if obj.contains_key("$path") => 0,
        Value::Object(obj) if obj.contains_key("$transform") => obj
            .get("args")
            .and_then(Value::as_array)
            .and_then(|args| args.iter().map(|arg| literal_depth(arg) + 1).max())
            .unwrap_or(0),
        Value::Array(items) => items.iter().map(literal_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// 不含 `$path` / `$transform` 的字面量
fn static_literal(operand: &Operand) -> Option<&Value> {
    match operand {
        Operand::Path { .. } => None,
        Operand::Literal { value } => {
            let dynamic = value
                .as_object()
                .is_some_and(|obj| obj.contains_key("$path") || obj.contains_key("$transform"));
            (!dynamic).then_some(value)
        }
    }
}

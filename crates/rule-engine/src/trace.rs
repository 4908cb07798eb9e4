//! 单次评估的审计记录
//!
//! 每次调用新建一份，数组只追加不修改，随结果返回给调用方，引擎本身不持久化。

use crate::explain::{ExplainNode, ReadRecord};
use crate::path::Target;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 评估模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    /// 匹配后执行动作
    #[default]
    Apply,
    /// 只评估条件，不执行动作
    Predicate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub mode: Mode,
    pub rules_considered: Vec<String>,
    pub rules_matched: Vec<String>,
    pub condition_results: BTreeMap<String, bool>,
    pub condition_explains: BTreeMap<String, ExplainNode>,
    pub reads_by_rule_id: BTreeMap<String, Vec<ReadRecord>>,
    pub action_diffs: Vec<ActionDiff>,
    pub actions_applied: Vec<AppliedAction>,
    pub events: Vec<EmittedEvent>,
    pub errors: Vec<TraceError>,
    pub duration_ms: f64,
}

impl Trace {
    pub fn new(correlation_id: impl Into<String>, version_id: Option<String>, mode: Mode) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            version_id,
            mode,
            ..Default::default()
        }
    }

    /// 记录单条规则的错误
    pub fn rule_error(&mut self, rule_id: &str, message: impl Into<String>) {
        self.errors.push(TraceError {
            rule_id: Some(rule_id.to_string()),
            message: message.into(),
        });
    }

    /// 记录循环级错误（不关联规则）
    pub fn loop_error(&mut self, message: impl Into<String>) {
        self.errors.push(TraceError {
            rule_id: None,
            message: message.into(),
        });
    }

    pub fn matched_count(&self) -> usize {
        self.rules_matched.len()
    }
}

/// 一次修改的前后差异
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDiff {
    pub rule_id: String,
    pub action: String,
    pub target: Target,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedAction {
    pub rule_id: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedEvent {
    pub rule_id: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub message: String,
}

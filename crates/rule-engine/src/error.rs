//! 规则引擎错误类型
//!
//! 按处理方式分为三类：
//! - 控制流：`throwError` 动作触发，终止整个评估循环（[`RuleError::ThrowError`] / [`RuleError::Aborted`]）
//! - 单条规则可恢复：条件深度超限、动作被策略拒绝等，记录到 trace 后继续下一条规则
//! - 循环级限制：规则数量上限、超时，记录到 trace 后停止循环
//!
//! 各变体的 `Display` 文本即写入 `trace.errors[].message` 的内容。

use crate::trace::Trace;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Max condition depth exceeded: {0}")]
    MaxDepthExceeded(usize),

    #[error("Max rules limit reached: {0}")]
    MaxRulesReached(usize),

    #[error("Evaluation timeout exceeded: {0}ms")]
    TimeoutExceeded(u64),

    #[error("Unknown transform: {0}")]
    UnknownTransform(String),

    #[error("Custom actions are disabled: {0}")]
    CustomActionsDisabled(String),

    #[error("Action type not allowed: {0}")]
    ActionNotAllowed(String),

    #[error("No handler registered for custom action: {0}")]
    HandlerNotFound(String),

    #[error("Invalid custom action type name: {0}")]
    InvalidActionType(String),

    #[error("Custom action type shadows a built-in action: {0}")]
    ReservedActionType(String),

    #[error("Malformed action: {0}")]
    MalformedAction(String),

    #[error("Rule validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// `throwError` 动作的控制流信号，只在单条规则内部传递
    #[error("{message}")]
    ThrowError { message: String },

    /// 评估被 `throwError` 中止，携带已经部分修改的数据和 trace
    #[error("{0}")]
    Aborted(Box<AbortedEvaluation>),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    /// 是否为终止整个评估循环的控制流错误
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Self::ThrowError { .. } | Self::Aborted(_))
    }
}

/// 被 `throwError` 中止的评估现场
///
/// 已经应用的修改不会回滚，调用方可以据此审计到中止点为止发生了什么。
#[derive(Debug)]
pub struct AbortedEvaluation {
    pub rule_id: String,
    pub message: String,
    pub data: Value,
    pub context: Value,
    pub trace: Trace,
}

impl std::fmt::Display for AbortedEvaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Evaluation aborted by rule {}: {}", self.rule_id, self.message)
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;

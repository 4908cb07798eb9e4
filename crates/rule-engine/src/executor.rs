//! 条件树执行器
//!
//! 深度优先递归求值 `all` / `any` / `not` / 比较节点。根节点深度为 0，
//! 每进入一层子节点加 1，超过 `max_depth` 时返回 [`RuleError::MaxDepthExceeded`]。
//!
//! 提供两种求值方式：
//! - [`ConditionExecutor::evaluate`]：短路求值，只返回布尔结果
//! - [`ConditionExecutor::explain`]：逐个求值所有子节点，返回解释树和读取日志

use crate::error::{Result, RuleError};
use crate::evaluator::{CompareEnv, ConditionEvaluator};
use crate::explain::{ExplainNode, ReadLog, ReadRecord};
use crate::models::{Comparison, Condition};
use crate::operand::EvalScope;
use serde::Serialize;

/// 一次带解释的条件求值结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub result: bool,
    pub explain: ExplainNode,
    pub reads: Vec<ReadRecord>,
}

/// 条件树执行器
pub struct ConditionExecutor<'a> {
    scope: EvalScope<'a>,
}

impl<'a> ConditionExecutor<'a> {
    pub fn new(scope: EvalScope<'a>) -> Self {
        Self { scope }
    }

    /// 短路求值
    pub fn evaluate(&self, condition: &Condition) -> Result<bool> {
        self.evaluate_node(condition, 0)
    }

    /// 完整求值，生成解释树与读取日志
    pub fn explain(&self, condition: &Condition) -> Result<Evaluation> {
        let mut reads = ReadLog::new();
        let explain = self.explain_node(condition, 0, &mut reads)?;
        Ok(Evaluation {
            result: explain.result(),
            explain,
            reads: reads.into_records(),
        })
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.scope.max_depth {
            return Err(RuleError::MaxDepthExceeded(self.scope.max_depth));
        }
        Ok(())
    }

    fn evaluate_node(&self, condition: &Condition, depth: usize) -> Result<bool> {
        self.check_depth(depth)?;

        match condition {
            Condition::All { all } => {
                // AND: 遇到 false 立即返回
                for child in all {
                    if !self.evaluate_node(child, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any { any } => {
                // OR: 遇到 true 立即返回
                for child in any {
                    if self.evaluate_node(child, depth + 1)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not { not } => Ok(!self.evaluate_node(not, depth + 1)?),
            Condition::Compare(cmp) => {
                let left = self.scope.resolve_operand(&cmp.left, depth, None)?;
                let right = match &cmp.right {
                    Some(operand) => self.scope.resolve_operand(operand, depth, None)?,
                    None => None,
                };
                Ok(self.compare(cmp, left.as_ref(), right.as_ref()))
            }
        }
    }

    fn explain_node(&self, condition: &Condition, depth: usize, reads: &mut ReadLog) -> Result<ExplainNode> {
        self.check_depth(depth)?;

        let node = match condition {
            Condition::All { all } => {
                let children = self.explain_children(all, depth, reads)?;
                ExplainNode::All {
                    result: children.iter().all(ExplainNode::result),
                    children,
                }
            }
            Condition::Any { any } => {
                let children = self.explain_children(any, depth, reads)?;
                ExplainNode::Any {
                    result: children.iter().any(ExplainNode::result),
                    children,
                }
            }
            Condition::Not { not } => {
                let child = self.explain_node(not, depth + 1, reads)?;
                ExplainNode::Not {
                    result: !child.result(),
                    child: Box::new(child),
                }
            }
            Condition::Compare(cmp) => {
                let (left_value, left) = self.scope.explain_operand(&cmp.left, depth, reads)?;
                let (right_value, right) = match &cmp.right {
                    Some(operand) => {
                        let (value, explain) = self.scope.explain_operand(operand, depth, reads)?;
                        (value, Some(explain))
                    }
                    None => (None, None),
                };
                ExplainNode::Compare {
                    result: self.compare(cmp, left_value.as_ref(), right_value.as_ref()),
                    op: cmp.op,
                    left,
                    right,
                }
            }
        };

        Ok(node)
    }

    /// 解释模式下所有子节点都会被求值，保证读取日志完整
    fn explain_children(
        &self,
        children: &[Condition],
        depth: usize,
        reads: &mut ReadLog,
    ) -> Result<Vec<ExplainNode>> {
        children
            .iter()
            .map(|child| self.explain_node(child, depth + 1, reads))
            .collect()
    }

    fn compare(&self, cmp: &Comparison, left: Option<&serde_json::Value>, right: Option<&serde_json::Value>) -> bool {
        let env = CompareEnv {
            locale: self.scope.locale(),
            now_ms: self.scope.now_ms,
            regex_cache: self.scope.regex_cache,
        };
        ConditionEvaluator::evaluate(left, cmp.op, right, &env)
    }
}

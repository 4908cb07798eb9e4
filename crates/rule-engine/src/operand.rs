//! 操作数解析
//!
//! 路径操作数从 `data.*` / `context.*` 读取（无前缀默认 `data`），字面量可以内嵌
//! `{"$path": ...}` 或 `{"$transform": name, "args": [...]}` 动态值，数组字面量逐元素展开。

use crate::error::{Result, RuleError};
use crate::evaluator::RegexCache;
use crate::explain::{OperandExplain, ReadLog};
use crate::models::Operand;
use crate::path::{PathEngine, Target, split_target};
use crate::transforms::{self, TransformEnv};
use serde_json::Value;

/// 一次条件求值可见的只读环境
pub struct EvalScope<'a> {
    pub data: &'a Value,
    pub context: &'a Value,
    pub paths: &'a PathEngine,
    pub regex_cache: &'a RegexCache,
    pub now_ms: i64,
    pub max_depth: usize,
}

impl<'a> EvalScope<'a> {
    /// 执行上下文中的 locale，用于本地日期格式解析
    pub fn locale(&self) -> Option<&'a str> {
        self.context.get("locale").and_then(Value::as_str)
    }

    pub fn transform_env(&self) -> TransformEnv<'a> {
        TransformEnv {
            now_ms: self.now_ms,
            locale: self.locale(),
        }
    }

    /// 按完整路径读取（`data.` / `context.` 前缀选择根对象）
    pub fn lookup(&self, path: &str) -> Option<&'a Value> {
        lookup(self.data, self.context, self.paths, path)
    }

    /// 读取并记录到读取日志
    pub fn read(&self, path: &str, reads: Option<&mut ReadLog>) -> Option<Value> {
        let value = self.lookup(path);
        if let Some(log) = reads {
            log.record(path, value);
        }
        value.cloned()
    }

    /// 解析比较操作数
    pub fn resolve_operand(
        &self,
        operand: &Operand,
        depth: usize,
        reads: Option<&mut ReadLog>,
    ) -> Result<Option<Value>> {
        match operand {
            Operand::Path { path } => Ok(self.read(path, reads)),
            Operand::Literal { value } => self.resolve_value(value, depth, reads),
        }
    }

    /// 解析操作数并生成解释节点
    pub fn explain_operand(
        &self,
        operand: &Operand,
        depth: usize,
        reads: &mut ReadLog,
    ) -> Result<(Option<Value>, OperandExplain)> {
        let value = self.resolve_operand(operand, depth, Some(reads))?;
        let explain = match operand {
            Operand::Path { path } => OperandExplain::Path {
                path: path.clone(),
                value: value.clone(),
            },
            Operand::Literal { .. } => OperandExplain::Literal {
                value: value.clone(),
            },
        };
        Ok((value, explain))
    }

    /// 展开动态字面量
    ///
    /// 嵌套的变换参数每深入一层计一次深度，数组元素与数组本身同层。
    /// 条件侧遇到未知的变换名时结果为未定义。
    pub fn resolve_value(
        &self,
        value: &Value,
        depth: usize,
        mut reads: Option<&mut ReadLog>,
    ) -> Result<Option<Value>> {
        if depth > self.max_depth {
            return Err(RuleError::MaxDepthExceeded(self.max_depth));
        }

        match value {
            Value::Object(obj) => {
                if let Some(path) = obj.get("$path").and_then(Value::as_str) {
                    return Ok(self.read(path, reads));
                }
                if let Some(name) = obj.get("$transform").and_then(Value::as_str) {
                    let mut args = Vec::new();
                    if let Some(raw) = obj.get("args").and_then(Value::as_array) {
                        for arg in raw {
                            args.push(self.resolve_value(arg, depth + 1, reads.as_deref_mut())?);
                        }
                    }
                    return match transforms::apply(name, &args, self.transform_env()) {
                        Ok(result) => Ok(result),
                        Err(RuleError::UnknownTransform(_)) => Ok(None),
                        Err(e) => Err(e),
                    };
                }
                Ok(Some(value.clone()))
            }
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    let v = self.resolve_value(item, depth, reads.as_deref_mut())?;
                    resolved.push(v.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(resolved)))
            }
            other => Ok(Some(other.clone())),
        }
    }
}

/// 按完整路径在 data / context 中读取
pub fn lookup<'v>(data: &'v Value, context: &'v Value, paths: &PathEngine, path: &str) -> Option<&'v Value> {
    let (target, rest) = split_target(path);
    let root = match target {
        Target::Data => data,
        Target::Context => context,
    };
    if rest.is_empty() {
        return Some(root);
    }
    paths.get(root, rest)
}

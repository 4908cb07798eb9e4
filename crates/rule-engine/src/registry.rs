//! 自定义动作注册表

use crate::actions::{ActionScope, BUILTIN_ACTION_TYPES};
use crate::error::{Result, RuleError};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

const MAX_TYPE_NAME_LENGTH: usize = 64;

/// 自定义动作处理器
pub trait CustomActionHandler: Send + Sync {
    /// 处理一次动作调用，`params` 为动作 JSON 中除 `type` 以外的字段
    fn handle(&self, params: &Map<String, Value>, scope: &mut ActionScope<'_>) -> Result<()>;
}

impl<F> CustomActionHandler for F
where
    F: Fn(&Map<String, Value>, &mut ActionScope<'_>) -> Result<()> + Send + Sync,
{
    fn handle(&self, params: &Map<String, Value>, scope: &mut ActionScope<'_>) -> Result<()> {
        self(params, scope)
    }
}

/// 按类型名索引的处理器注册表
#[derive(Default)]
pub struct ActionRegistry {
    handlers: DashMap<String, Arc<dyn CustomActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册闭包处理器，同名处理器会被覆盖
    pub fn register<F>(&self, action_type: &str, handler: F) -> Result<()>
    where
        F: Fn(&Map<String, Value>, &mut ActionScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register_handler(action_type, Arc::new(handler))
    }

    /// 注册处理器对象
    pub fn register_handler(&self, action_type: &str, handler: Arc<dyn CustomActionHandler>) -> Result<()> {
        validate_type_name(action_type)?;
        self.handlers.insert(action_type.to_string(), handler);
        info!(action_type = %action_type, "Custom action handler registered");
        Ok(())
    }

    pub fn unregister(&self, action_type: &str) -> bool {
        self.handlers.remove(action_type).is_some()
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn CustomActionHandler>> {
        self.handlers.get(action_type).map(|h| Arc::clone(h.value()))
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// 已注册的类型名（排序后）
    pub fn action_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// 类型名：字母开头，其后为字母、数字或 `_ . : -`，不超过 64 个字符，且不能与内置动作同名
pub fn validate_type_name(action_type: &str) -> Result<()> {
    let mut chars = action_type.chars();
    let valid = action_type.len() <= MAX_TYPE_NAME_LENGTH
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'));
    if !valid {
        return Err(RuleError::InvalidActionType(action_type.to_string()));
    }
    if BUILTIN_ACTION_TYPES.contains(&action_type) {
        return Err(RuleError::ReservedActionType(action_type.to_string()));
    }
    Ok(())
}

//! 动作定义与执行
//!
//! 内置动作是封闭的枚举，其余 `type` 一律解析为 [`CustomAction`]，经注册表分发给处理器。
//! 缺少必填字段的动作解析为 [`Action::Invalid`]，执行时才作为所属规则的错误报告。
//! 每次实际修改 data / context 都会记录前后差异并推进变更纪元。

use crate::config::ActionPolicy;
use crate::error::{Result, RuleError};
use crate::evaluator::RegexCache;
use crate::memo::ConditionMemo;
use crate::operand::{self, EvalScope};
use crate::path::{PathEngine, Target, split_target};
use crate::registry::ActionRegistry;
use crate::trace::{ActionDiff, AppliedAction, EmittedEvent, Trace};
use crate::transforms::{self, TransformEnv, stringify};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// 内置动作类型名，自定义动作不能使用
pub const BUILTIN_ACTION_TYPES: [&str; 9] = [
    "setField",
    "setContext",
    "removeField",
    "addItem",
    "mapField",
    "transform",
    "emitEvent",
    "throwError",
    "custom",
];

/// 规则动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Action {
    /// 写入路径，`context.` 前缀写入上下文，其余写入 data
    SetField { path: String, value: Value },
    /// 写入上下文
    SetContext { path: String, value: Value },
    RemoveField { path: String },
    /// 追加到数组，路径不是数组时初始化为单元素数组
    AddItem { path: String, value: Value },
    /// 把源路径的值复制到目标路径
    MapField { from: String, to: String },
    /// 对路径上的现值执行变换后写回
    Transform {
        path: String,
        function: String,
        args: Vec<Value>,
        template: Option<String>,
    },
    EmitEvent { event: String, payload: Option<Value> },
    /// 中止整个评估
    ThrowError { message: String },
    Custom(CustomAction),
    /// 无法识别的动作，保留原始 JSON
    Invalid {
        action_type: String,
        reason: String,
        raw: Value,
    },
}

/// 自定义动作：类型名加其余参数
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAction {
    pub action_type: String,
    pub params: Map<String, Value>,
}

impl Action {
    pub fn set_field(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::SetField {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn custom(action_type: impl Into<String>, params: Value) -> Self {
        Self::Custom(CustomAction {
            action_type: action_type.into(),
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        })
    }

    /// 动作类型名（写入 trace）
    pub fn type_name(&self) -> &str {
        match self {
            Self::SetField { .. } => "setField",
            Self::SetContext { .. } => "setContext",
            Self::RemoveField { .. } => "removeField",
            Self::AddItem { .. } => "addItem",
            Self::MapField { .. } => "mapField",
            Self::Transform { .. } => "transform",
            Self::EmitEvent { .. } => "emitEvent",
            Self::ThrowError { .. } => "throwError",
            Self::Custom(custom) => &custom.action_type,
            Self::Invalid { action_type, .. } => action_type,
        }
    }
}

fn take_string(obj: &mut Map<String, Value>, keys: &[&str], action: &str) -> Result<String> {
    for key in keys {
        if let Some(Value::String(s)) = obj.remove(*key) {
            return Ok(s);
        }
    }
    Err(RuleError::MalformedAction(format!(
        "{} requires string field '{}'",
        action, keys[0]
    )))
}

impl From<Value> for Action {
    fn from(value: Value) -> Self {
        let raw = value.clone();
        match parse_action(value) {
            Ok(action) => action,
            Err(e) => Self::Invalid {
                action_type: raw
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                reason: match e {
                    RuleError::MalformedAction(reason) => reason,
                    other => other.to_string(),
                },
                raw,
            },
        }
    }
}

fn parse_action(value: Value) -> Result<Action> {
    let Value::Object(mut obj) = value else {
        return Err(RuleError::MalformedAction("action must be an object".into()));
    };
    let action_type = take_string(&mut obj, &["type"], "action")?;

    let action = match action_type.as_str() {
        "setField" => Action::SetField {
            path: take_string(&mut obj, &["path"], "setField")?,
            value: obj.remove("value").unwrap_or(Value::Null),
        },
        "setContext" => Action::SetContext {
            path: take_string(&mut obj, &["path"], "setContext")?,
            value: obj.remove("value").unwrap_or(Value::Null),
        },
        "removeField" => Action::RemoveField {
            path: take_string(&mut obj, &["path"], "removeField")?,
        },
        "addItem" => Action::AddItem {
            path: take_string(&mut obj, &["path"], "addItem")?,
            value: obj.remove("value").unwrap_or(Value::Null),
        },
        "mapField" => Action::MapField {
            from: take_string(&mut obj, &["from"], "mapField")?,
            to: take_string(&mut obj, &["to"], "mapField")?,
        },
        "transform" => Action::Transform {
            path: take_string(&mut obj, &["path"], "transform")?,
            function: take_string(&mut obj, &["fn", "function"], "transform")?,
            args: match obj.remove("args") {
                Some(Value::Array(args)) => args,
                Some(Value::Null) | None => Vec::new(),
                Some(single) => vec![single],
            },
            template: obj.remove("template").and_then(|t| t.as_str().map(str::to_string)),
        },
        "emitEvent" => Action::EmitEvent {
            event: take_string(&mut obj, &["event", "name"], "emitEvent")?,
            payload: obj.remove("payload"),
        },
        "throwError" => Action::ThrowError {
            message: take_string(&mut obj, &["message"], "throwError")?,
        },
        "custom" => Action::Custom(CustomAction {
            action_type: take_string(&mut obj, &["name", "customType"], "custom")?,
            params: obj,
        }),
        _ => Action::Custom(CustomAction {
            action_type,
            params: obj,
        }),
    };

    Ok(action)
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        match action {
            Action::SetField { path, value } => json!({"type": "setField", "path": path, "value": value}),
            Action::SetContext { path, value } => json!({"type": "setContext", "path": path, "value": value}),
            Action::RemoveField { path } => json!({"type": "removeField", "path": path}),
            Action::AddItem { path, value } => json!({"type": "addItem", "path": path, "value": value}),
            Action::MapField { from, to } => json!({"type": "mapField", "from": from, "to": to}),
            Action::Transform {
                path,
                function,
                args,
                template,
            } => {
                let mut obj = json!({"type": "transform", "path": path, "fn": function, "args": args});
                if let (Some(t), Some(map)) = (template, obj.as_object_mut()) {
                    map.insert("template".into(), Value::String(t));
                }
                obj
            }
            Action::EmitEvent { event, payload } => {
                let mut obj = json!({"type": "emitEvent", "event": event});
                if let (Some(p), Some(map)) = (payload, obj.as_object_mut()) {
                    map.insert("payload".into(), p);
                }
                obj
            }
            Action::ThrowError { message } => json!({"type": "throwError", "message": message}),
            Action::Invalid { raw, .. } => raw,
            Action::Custom(custom) => {
                let mut map = custom.params;
                map.insert("type".into(), Value::String(custom.action_type));
                Value::Object(map)
            }
        }
    }
}

/// 单次评估调用的可变现场：数据副本、上下文副本、trace 和当前变更纪元
pub struct EvalState {
    pub data: Value,
    pub context: Value,
    pub trace: Trace,
    pub epoch: u64,
    pub now_ms: i64,
    pub max_depth: usize,
}

/// 动作执行时可见的作用域
///
/// 自定义处理器通过它读写 data / context，写入与内置动作一样会留下差异记录。
pub struct ActionScope<'a> {
    rule_id: &'a str,
    action: &'a str,
    state: &'a mut EvalState,
    paths: &'a PathEngine,
    memo: &'a ConditionMemo,
    regex_cache: &'a RegexCache,
}

impl<'a> ActionScope<'a> {
    pub fn rule_id(&self) -> &str {
        self.rule_id
    }

    pub fn data(&self) -> &Value {
        &self.state.data
    }

    pub fn context(&self) -> &Value {
        &self.state.context
    }

    /// 按完整路径读取（无前缀默认 data）
    pub fn get(&self, path: &str) -> Option<&Value> {
        operand::lookup(&self.state.data, &self.state.context, self.paths, path)
    }

    /// 展开动态值（`$path` / `$transform`）
    pub fn resolve(&self, value: &Value) -> Result<Option<Value>> {
        EvalScope {
            data: &self.state.data,
            context: &self.state.context,
            paths: self.paths,
            regex_cache: self.regex_cache,
            now_ms: self.state.now_ms,
            max_depth: self.state.max_depth,
        }
        .resolve_value(value, 0, None)
    }

    pub fn transform_env(&self) -> TransformEnv<'_> {
        TransformEnv {
            now_ms: self.state.now_ms,
            locale: self.state.context.get("locale").and_then(Value::as_str),
        }
    }

    /// 写入路径，返回是否发生了修改
    pub fn set(&mut self, path: &str, value: Value) -> bool {
        let (target, rest) = split_target(path);
        self.write(target, rest, value)
    }

    /// 删除路径，返回被删除的值
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let (target, rest) = split_target(path);
        if rest.is_empty() {
            return None;
        }
        let paths = self.paths;
        let removed = paths.remove(self.root_mut(target), rest)?;
        self.record_diff(target, rest, Some(removed.clone()), None);
        Some(removed)
    }

    /// 追加事件
    pub fn emit(&mut self, event: impl Into<String>, payload: Option<Value>) {
        self.state.trace.events.push(EmittedEvent {
            rule_id: self.rule_id.to_string(),
            event: event.into(),
            payload,
        });
    }

    fn write(&mut self, target: Target, rest: &str, value: Value) -> bool {
        if rest.is_empty() {
            return false;
        }
        let paths = self.paths;
        let before = paths.get(self.root(target), rest).cloned();
        if !paths.set(self.root_mut(target), rest, value.clone()) {
            return false;
        }
        self.record_diff(target, rest, before, Some(value));
        true
    }

    fn root(&self, target: Target) -> &Value {
        match target {
            Target::Data => &self.state.data,
            Target::Context => &self.state.context,
        }
    }

    fn root_mut(&mut self, target: Target) -> &mut Value {
        match target {
            Target::Data => &mut self.state.data,
            Target::Context => &mut self.state.context,
        }
    }

    fn record_diff(&mut self, target: Target, path: &str, before: Option<Value>, after: Option<Value>) {
        self.state.trace.action_diffs.push(ActionDiff {
            rule_id: self.rule_id.to_string(),
            action: self.action.to_string(),
            target,
            path: path.to_string(),
            before,
            after,
        });
        // 任何修改都让已缓存的条件结果失效
        self.state.epoch = self.memo.next_epoch();
    }

    fn mark_applied(&mut self) {
        self.state.trace.actions_applied.push(AppliedAction {
            rule_id: self.rule_id.to_string(),
            action: self.action.to_string(),
        });
    }
}

/// 动作执行器
pub struct ActionExecutor<'a> {
    pub paths: &'a PathEngine,
    pub memo: &'a ConditionMemo,
    pub regex_cache: &'a RegexCache,
    pub registry: &'a ActionRegistry,
    pub policy: &'a ActionPolicy,
}

impl ActionExecutor<'_> {
    /// 执行一个动作
    ///
    /// 成功后记入 `actionsApplied`；`throwError` 先记入再返回控制流错误。
    pub fn apply(&self, rule_id: &str, action: &Action, state: &mut EvalState) -> Result<()> {
        let mut scope = ActionScope {
            rule_id,
            action: action.type_name(),
            state,
            paths: self.paths,
            memo: self.memo,
            regex_cache: self.regex_cache,
        };

        match action {
            Action::SetField { path, value } => {
                if let Some(value) = scope.resolve(value)? {
                    scope.set(path, value);
                }
            }
            Action::SetContext { path, value } => {
                if let Some(value) = scope.resolve(value)? {
                    let rest = path.strip_prefix("context.").unwrap_or(path);
                    scope.write(Target::Context, rest, value);
                }
            }
            Action::RemoveField { path } => {
                scope.remove(path);
            }
            Action::AddItem { path, value } => {
                let item = scope.resolve(value)?.unwrap_or(Value::Null);
                let list = match scope.get(path) {
                    Some(Value::Array(existing)) => {
                        let mut list = existing.clone();
                        list.push(item);
                        list
                    }
                    _ => vec![item],
                };
                scope.set(path, Value::Array(list));
            }
            Action::MapField { from, to } => {
                if let Some(value) = scope.get(from).cloned() {
                    scope.set(to, value);
                }
            }
            Action::Transform {
                path,
                function,
                args,
                template,
            } => Self::transform(&mut scope, path, function, args, template.as_deref())?,
            Action::EmitEvent { event, payload } => {
                let payload = match payload {
                    Some(p) => scope.resolve(p)?,
                    None => None,
                };
                scope.emit(event.as_str(), payload);
            }
            Action::ThrowError { message } => {
                scope.mark_applied();
                return Err(RuleError::ThrowError {
                    message: message.clone(),
                });
            }
            Action::Custom(custom) => self.dispatch_custom(custom, &mut scope)?,
            Action::Invalid { reason, .. } => return Err(RuleError::MalformedAction(reason.clone())),
        }

        scope.mark_applied();
        Ok(())
    }

    fn transform(
        scope: &mut ActionScope<'_>,
        path: &str,
        function: &str,
        args: &[Value],
        template: Option<&str>,
    ) -> Result<()> {
        let result = if function == "template" {
            let template = template
                .or_else(|| args.first().and_then(Value::as_str))
                .ok_or_else(|| RuleError::MalformedAction("template transform requires a template".into()))?;
            Some(Value::String(interpolate(template, scope)))
        } else {
            let mut inputs = Vec::with_capacity(args.len() + 1);
            inputs.push(scope.get(path).cloned());
            for arg in args {
                inputs.push(scope.resolve(arg)?);
            }
            transforms::apply(function, &inputs, scope.transform_env())?
        };

        if let Some(value) = result {
            scope.set(path, value);
        }
        Ok(())
    }

    fn dispatch_custom(&self, custom: &CustomAction, scope: &mut ActionScope<'_>) -> Result<()> {
        let action_type = &custom.action_type;
        if !self.policy.allow_custom_actions {
            return Err(RuleError::CustomActionsDisabled(action_type.clone()));
        }
        if let Some(allowed) = &self.policy.allowed_action_types {
            if !allowed.iter().any(|a| a == action_type) {
                return Err(RuleError::ActionNotAllowed(action_type.clone()));
            }
        }
        let handler = self
            .registry
            .get(action_type)
            .ok_or_else(|| RuleError::HandlerNotFound(action_type.clone()))?;
        handler.handle(&custom.params, scope)
    }
}

/// 模板插值：`{{key}}` 按路径解析（无前缀为 data），缺失的值替换为空串
pub fn interpolate(template: &str, scope: &ActionScope<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = rest[start + 2..start + 2 + len].trim();
        if key.is_empty() {
            out.push_str(&rest[start..start + 4 + len]);
        } else {
            out.push_str(&stringify(scope.get(key)));
        }
        rest = &rest[start + 4 + len..];
    }
    out.push_str(rest);
    out
}

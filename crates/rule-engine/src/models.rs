//! 规则引擎领域模型

use crate::actions::Action;
use crate::operators::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 规则定义
///
/// 输入不可变，评估期间不会被修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(alias = "id")]
    pub rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 优先级，数值越大越先评估
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    /// 缺省时规则总是匹配
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(rule_id: impl Into<String>, condition: Condition) -> Self {
        Self {
            rule_id: rule_id.into(),
            name: None,
            priority: 0,
            scope: None,
            condition: Some(condition),
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// 带版本的规则集合
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// 评估入口接受的规则输入：裸列表或 RuleSet 包装
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleInput {
    List(Vec<Rule>),
    Set(RuleSet),
}

impl RuleInput {
    pub fn rules(&self) -> &[Rule] {
        match self {
            Self::List(rules) => rules,
            Self::Set(set) => &set.rules,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            Self::List(_) => None,
            Self::Set(set) => set.version.as_deref(),
        }
    }
}

impl From<Vec<Rule>> for RuleInput {
    fn from(rules: Vec<Rule>) -> Self {
        Self::List(rules)
    }
}

impl From<RuleSet> for RuleInput {
    fn from(set: RuleSet) -> Self {
        Self::Set(set)
    }
}

/// 规则适用范围
///
/// 各列表彼此独立、均可为空；非空的列表要求上下文中对应的值是其成员，所有列表取合取。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scope {
    pub countries: Vec<String>,
    pub tenants: Vec<String>,
    pub orgs: Vec<String>,
    pub programs: Vec<String>,
    pub issuers: Vec<String>,
    pub roles: Vec<String>,
}

impl Scope {
    /// 判断执行上下文是否落在范围内
    pub fn matches(&self, context: &Value) -> bool {
        Self::member(&self.countries, context.get("country"))
            && Self::member(&self.tenants, context.get("tenantId"))
            && Self::member(&self.orgs, context.get("orgId"))
            && Self::member(&self.programs, context.get("programId"))
            && Self::member(&self.issuers, context.get("issuerId"))
            && self.roles_match(context)
    }

    fn member(allowed: &[String], value: Option<&Value>) -> bool {
        if allowed.is_empty() {
            return true;
        }
        value
            .and_then(scalar_key)
            .is_some_and(|v| allowed.iter().any(|a| *a == v))
    }

    /// 角色同时检查主角色 `role` 和附加角色列表 `roles`
    fn roles_match(&self, context: &Value) -> bool {
        if self.roles.is_empty() {
            return true;
        }
        let primary = context.get("role").and_then(scalar_key);
        let secondary = context
            .get("roles")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(scalar_key);

        primary
            .into_iter()
            .chain(secondary)
            .any(|role| self.roles.contains(&role))
    }
}

fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 条件树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    All { all: Vec<Condition> },
    Any { any: Vec<Condition> },
    Not { not: Box<Condition> },
    Compare(Comparison),
}

impl Condition {
    pub fn all(children: Vec<Condition>) -> Self {
        Self::All { all: children }
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Self::Any { any: children }
    }

    pub fn not(child: Condition) -> Self {
        Self::Not {
            not: Box::new(child),
        }
    }

    pub fn compare(op: Operator, left: Operand, right: Option<Operand>) -> Self {
        Self::Compare(Comparison { op, left, right })
    }

    /// 条件树高度（叶子为 0）
    pub fn depth(&self) -> usize {
        match self {
            Self::All { all: children } | Self::Any { any: children } => children
                .iter()
                .map(|c| c.depth() + 1)
                .max()
                .unwrap_or(0),
            Self::Not { not } => not.depth() + 1,
            Self::Compare(_) => 0,
        }
    }
}

/// 叶子比较节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub op: Operator,
    pub left: Operand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Operand>,
}

/// 比较操作数：路径引用或字面量
///
/// 字面量本身可以是动态值（`{"$path": ...}` / `{"$transform": ...}`），在求值时展开。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Path { path: String },
    Literal { value: Value },
}

impl Operand {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path { path: path.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }
}

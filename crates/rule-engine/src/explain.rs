//! 条件解释树与读取日志
//!
//! 解释树与条件树同形（all / any / not / compare），叶子携带两侧操作数的来源和解析后的值，
//! 供审计或界面展示规则为何匹配或不匹配。

use crate::operators::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 解释树节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExplainNode {
    All {
        result: bool,
        children: Vec<ExplainNode>,
    },
    Any {
        result: bool,
        children: Vec<ExplainNode>,
    },
    Not {
        result: bool,
        child: Box<ExplainNode>,
    },
    Compare {
        result: bool,
        op: Operator,
        left: OperandExplain,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<OperandExplain>,
    },
    /// 没有条件的规则，总是匹配
    Always { result: bool },
}

impl ExplainNode {
    pub fn result(&self) -> bool {
        match self {
            Self::All { result, .. }
            | Self::Any { result, .. }
            | Self::Not { result, .. }
            | Self::Compare { result, .. }
            | Self::Always { result } => *result,
        }
    }
}

/// 操作数描述：字面量或带解析值的路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperandExplain {
    Literal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Path {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl OperandExplain {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Literal { value } | Self::Path { value, .. } => value.as_ref(),
        }
    }
}

/// 一次路径读取
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// 去重的读取日志
///
/// 同一路径只保留一条，位置取首次读取，值取最后一次读取。
#[derive(Debug, Clone, Default)]
pub struct ReadLog {
    records: Vec<ReadRecord>,
    positions: HashMap<String, usize>,
}

impl ReadLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &str, value: Option<&Value>) {
        match self.positions.get(path) {
            Some(&index) => self.records[index].value = value.cloned(),
            None => {
                self.positions.insert(path.to_string(), self.records.len());
                self.records.push(ReadRecord {
                    path: path.to_string(),
                    value: value.cloned(),
                });
            }
        }
    }

    pub fn records(&self) -> &[ReadRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ReadRecord> {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

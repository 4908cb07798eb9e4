//! 条件操作符定义
//!
//! 同一语义的不同拼写（`before`/`dateBefore`、`regex`/`matches`、snake_case 写法）
//! 在反序列化时统一为同一个变体，评估器只面对一套操作符。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 比较操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    // 通用比较
    Eq,
    #[serde(alias = "ne")]
    Neq,

    // 数值比较
    Gt,
    Gte,
    Lt,
    Lte,
    Between,

    // 包含检查
    In,
    #[serde(alias = "not_in")]
    NotIn,
    Contains,
    #[serde(alias = "contains_any")]
    ContainsAny,
    #[serde(alias = "contains_all")]
    ContainsAll,

    // 字符串操作
    #[serde(alias = "starts_with")]
    StartsWith,
    #[serde(alias = "ends_with")]
    EndsWith,
    #[serde(alias = "regex")]
    Matches,

    // 存在性
    Exists,
    #[serde(alias = "not_exists")]
    NotExists,
    #[serde(alias = "is_empty")]
    IsEmpty,
    #[serde(alias = "is_not_empty")]
    IsNotEmpty,

    // 日期比较
    #[serde(alias = "date_eq")]
    DateEq,
    #[serde(alias = "before", alias = "date_before")]
    DateBefore,
    #[serde(alias = "after", alias = "date_after")]
    DateAfter,
    #[serde(alias = "date_between")]
    DateBetween,
    #[serde(alias = "date_on")]
    DateOn,
    #[serde(alias = "date_within_days")]
    DateWithinDays,
}

impl Operator {
    /// 不需要右操作数的操作符
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::Exists | Self::NotExists | Self::IsEmpty | Self::IsNotEmpty
        )
    }

    /// 日期类操作符，两侧操作数都会被转换为毫秒时间戳
    pub fn is_date(self) -> bool {
        matches!(
            self,
            Self::DateEq
                | Self::DateBefore
                | Self::DateAfter
                | Self::DateBetween
                | Self::DateOn
                | Self::DateWithinDays
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Contains => "contains",
            Self::ContainsAny => "containsAny",
            Self::ContainsAll => "containsAll",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Matches => "matches",
            Self::Exists => "exists",
            Self::NotExists => "notExists",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
            Self::DateEq => "dateEq",
            Self::DateBefore => "dateBefore",
            Self::DateAfter => "dateAfter",
            Self::DateBetween => "dateBetween",
            Self::DateOn => "dateOn",
            Self::DateWithinDays => "dateWithinDays",
        };
        write!(f, "{}", s)
    }
}

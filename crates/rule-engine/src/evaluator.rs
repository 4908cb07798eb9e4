//! 叶子比较评估器
//!
//! 实现各操作符的比较语义。比较永远不报错：类型不符、缺失值、无法解析的日期
//! 和非法正则都按不匹配处理，规则编写因此保持宽松。

use crate::cache::BoundedCache;
use crate::dates::{self, MS_PER_DAY};
use crate::operators::Operator;
use crate::transforms::as_number;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::sync::Arc;

/// `matches` 正则长度上限
pub const MAX_PATTERN_LENGTH: usize = 500;

/// 正则编译缓存默认容量
pub const DEFAULT_REGEX_CACHE_SIZE: usize = 256;

const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// 编译后的正则缓存，非法模式缓存为 `None`
pub type RegexCache = BoundedCache<String, Option<Arc<Regex>>>;

/// 比较时依赖的环境
pub struct CompareEnv<'a> {
    pub locale: Option<&'a str>,
    pub now_ms: i64,
    pub regex_cache: &'a RegexCache,
}

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估一次比较
    ///
    /// # Arguments
    /// * `left` - 左操作数，`None` 表示未定义
    /// * `operator` - 操作符
    /// * `right` - 右操作数，`None` 表示未定义或未提供
    pub fn evaluate(
        left: Option<&Value>,
        operator: Operator,
        right: Option<&Value>,
        env: &CompareEnv<'_>,
    ) -> bool {
        // 存在性与空值检查的语义就是检查值本身，需要先处理
        match operator {
            Operator::Exists => return Self::exists(left),
            Operator::NotExists => return !Self::exists(left),
            Operator::IsEmpty => return Self::is_empty(left),
            Operator::IsNotEmpty => return !Self::is_empty(left),
            Operator::Eq => return Self::eq_opt(left, right),
            Operator::Neq => return !Self::eq_opt(left, right),
            _ => {}
        }

        if operator.is_date() {
            return Self::date_compare(left, operator, right, env);
        }

        // 其余操作符两侧都必须有值
        let (Some(left), Some(right)) = (left, right) else {
            return false;
        };

        match operator {
            Operator::Gt => Self::compare(left, right, |a, b| a > b),
            Operator::Gte => Self::compare(left, right, |a, b| a >= b),
            Operator::Lt => Self::compare(left, right, |a, b| a < b),
            Operator::Lte => Self::compare(left, right, |a, b| a <= b),
            Operator::Between => Self::between(left, right),
            Operator::In => Self::in_list(left, right),
            Operator::NotIn => right.is_array() && !Self::in_list(left, right),
            Operator::Contains => Self::contains(left, right),
            Operator::ContainsAny => Self::contains_any(left, right),
            Operator::ContainsAll => Self::contains_all(left, right),
            Operator::StartsWith => Self::str_pair(left, right, |s, p| s.starts_with(p)),
            Operator::EndsWith => Self::str_pair(left, right, |s, p| s.ends_with(p)),
            Operator::Matches => Self::regex_match(left, right, env.regex_cache),
            _ => false,
        }
    }

    /// 值存在且不为 null
    fn exists(value: Option<&Value>) -> bool {
        value.is_some_and(|v| !v.is_null())
    }

    /// 判断值是否为空
    fn is_empty(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(arr)) => arr.is_empty(),
            Some(Value::Object(obj)) => obj.is_empty(),
            _ => false,
        }
    }

    fn eq_opt(left: Option<&Value>, right: Option<&Value>) -> bool {
        match (left, right) {
            (Some(a), Some(b)) => deep_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// 数值比较，任一侧不是数值时为 false
    fn compare<F>(left: &Value, right: &Value, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 范围比较 (between)，right 为 [min, max]，两端包含
    fn between(left: &Value, right: &Value) -> bool {
        let Some([min, max]) = right.as_array().and_then(|arr| <&[Value; 2]>::try_from(arr.as_slice()).ok()) else {
            return false;
        };
        match (as_number(left), as_number(min), as_number(max)) {
            (Some(v), Some(min), Some(max)) => v >= min && v <= max,
            _ => false,
        }
    }

    /// 列表包含检查 (in)
    fn in_list(left: &Value, right: &Value) -> bool {
        right
            .as_array()
            .is_some_and(|arr| arr.iter().any(|item| deep_equal(left, item)))
    }

    /// 字符串子串或数组成员检查
    fn contains(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
            (Value::Array(arr), item) => arr.iter().any(|v| deep_equal(v, item)),
            _ => false,
        }
    }

    /// 数组包含任意一个 (containsAny)
    fn contains_any(left: &Value, right: &Value) -> bool {
        match (left.as_array(), right.as_array()) {
            (Some(have), Some(want)) => want.iter().any(|w| have.iter().any(|h| deep_equal(h, w))),
            _ => false,
        }
    }

    /// 数组包含全部 (containsAll)
    fn contains_all(left: &Value, right: &Value) -> bool {
        match (left.as_array(), right.as_array()) {
            (Some(have), Some(want)) => want.iter().all(|w| have.iter().any(|h| deep_equal(h, w))),
            _ => false,
        }
    }

    fn str_pair(left: &Value, right: &Value, op: impl Fn(&str, &str) -> bool) -> bool {
        match (left.as_str(), right.as_str()) {
            (Some(s), Some(p)) => op(s, p),
            _ => false,
        }
    }

    /// 正则表达式匹配，超长或无法编译的模式视为不匹配
    fn regex_match(left: &Value, right: &Value, cache: &RegexCache) -> bool {
        let (Some(s), Some(pattern)) = (left.as_str(), right.as_str()) else {
            return false;
        };
        if pattern.chars().count() > MAX_PATTERN_LENGTH {
            return false;
        }

        let key = pattern.to_string();
        let regex = match cache.get(&key) {
            Some(cached) => cached,
            None => {
                let compiled = RegexBuilder::new(pattern)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .ok()
                    .map(Arc::new);
                cache.put(key, compiled.clone());
                compiled
            }
        };

        regex.is_some_and(|r| r.is_match(s))
    }

    /// 日期比较，两侧统一转换为毫秒时间戳
    fn date_compare(
        left: Option<&Value>,
        operator: Operator,
        right: Option<&Value>,
        env: &CompareEnv<'_>,
    ) -> bool {
        let to_ms = |v: Option<&Value>| v.and_then(|v| dates::to_epoch_ms(v, env.locale));
        let Some(l) = to_ms(left) else {
            return false;
        };

        match operator {
            Operator::DateBetween => {
                let Some([start, end]) = right
                    .and_then(Value::as_array)
                    .and_then(|arr| <&[Value; 2]>::try_from(arr.as_slice()).ok())
                else {
                    return false;
                };
                match (to_ms(Some(start)), to_ms(Some(end))) {
                    (Some(start), Some(end)) => start <= l && l <= end,
                    _ => false,
                }
            }
            Operator::DateWithinDays => {
                let Some(days) = right.and_then(as_number) else {
                    return false;
                };
                let offset = (days * MS_PER_DAY as f64) as i64;
                let bound = env.now_ms.saturating_add(offset);
                if offset >= 0 {
                    env.now_ms <= l && l <= bound
                } else {
                    bound <= l && l <= env.now_ms
                }
            }
            _ => {
                let Some(r) = to_ms(right) else {
                    return false;
                };
                match operator {
                    Operator::DateEq => l == r,
                    Operator::DateBefore => l < r,
                    Operator::DateAfter => l > r,
                    Operator::DateOn => dates::same_day(l, r),
                    _ => false,
                }
            }
        }
    }
}

/// 结构化深度相等：数组按顺序比较，对象要求键集合一致，数值按大小比较
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| deep_equal(v, other)))
        }
        _ => a == b,
    }
}

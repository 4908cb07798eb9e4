//! 内置纯函数变换
//!
//! 条件中的 `{"$transform": name, "args": [...]}` 与 `transform` 动作共用这组函数。
//! 集合是封闭的：只有数值、字符串和日期平移，不存在循环或任意代码执行。
//! 参数类型不符时结果为 `None`（未定义），未知的函数名返回错误。

use crate::dates;
use crate::error::{Result, RuleError};
use serde_json::{Number, Value};

/// 变换执行时依赖的环境
#[derive(Debug, Clone, Copy)]
pub struct TransformEnv<'a> {
    pub now_ms: i64,
    pub locale: Option<&'a str>,
}

/// 变换函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Abs,
    Round,
    Floor,
    Ceil,
    Trim,
    Upper,
    Lower,
    Concat,
    DateShift,
    Now,
}

impl Transform {
    pub fn parse(name: &str) -> Result<Self> {
        let transform = match name {
            "add" | "sum" => Self::Add,
            "subtract" | "sub" => Self::Subtract,
            "multiply" | "mul" => Self::Multiply,
            "divide" | "div" => Self::Divide,
            "mod" => Self::Mod,
            "abs" => Self::Abs,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "trim" => Self::Trim,
            "upper" | "uppercase" => Self::Upper,
            "lower" | "lowercase" => Self::Lower,
            "concat" => Self::Concat,
            "dateShift" | "dateAdd" | "date_shift" => Self::DateShift,
            "now" => Self::Now,
            other => return Err(RuleError::UnknownTransform(other.to_string())),
        };
        Ok(transform)
    }
}

/// 按名称执行变换
pub fn apply(name: &str, args: &[Option<Value>], env: TransformEnv<'_>) -> Result<Option<Value>> {
    Ok(Transform::parse(name)?.apply(args, env))
}

impl Transform {
    pub fn apply(self, args: &[Option<Value>], env: TransformEnv<'_>) -> Option<Value> {
        match self {
            Self::Add => fold_numbers(args, |a, b| Some(a + b)),
            Self::Subtract => fold_numbers(args, |a, b| Some(a - b)),
            Self::Multiply => fold_numbers(args, |a, b| Some(a * b)),
            Self::Divide => fold_numbers(args, |a, b| (b != 0.0).then(|| a / b)),
            Self::Mod => fold_numbers(args, |a, b| (b != 0.0).then(|| a % b)),
            Self::Abs => unary_number(args, f64::abs),
            Self::Floor => unary_number(args, f64::floor),
            Self::Ceil => unary_number(args, f64::ceil),
            Self::Round => {
                let x = number_arg(args, 0)?;
                let digits = args.get(1).and_then(|a| a.as_ref()).and_then(Value::as_f64);
                match digits {
                    Some(d) if d > 0.0 => {
                        let factor = 10f64.powi(d.min(15.0) as i32);
                        to_number((x * factor).round() / factor)
                    }
                    _ => to_number(x.round()),
                }
            }
            Self::Trim => unary_str(args, |s| s.trim().to_string()),
            Self::Upper => unary_str(args, str::to_uppercase),
            Self::Lower => unary_str(args, str::to_lowercase),
            Self::Concat => Some(Value::String(
                args.iter().map(|a| stringify(a.as_ref())).collect(),
            )),
            Self::DateShift => {
                let base = dates::to_epoch_ms(args.first()?.as_ref()?, env.locale)?;
                let amount = number_arg(args, 1)?;
                let unit = args
                    .get(2)
                    .and_then(|a| a.as_ref())
                    .and_then(Value::as_str)
                    .unwrap_or("days");
                dates::shift_ms(base, amount, unit)
                    .and_then(dates::to_iso)
                    .map(Value::String)
            }
            Self::Now => dates::to_iso(env.now_ms).map(Value::String),
        }
    }
}

/// 严格的数值读取，不做字符串到数字的隐式转换
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// 将 f64 转回 JSON 数值，整数值保持整数形式
pub fn to_number(x: f64) -> Option<Value> {
    if !x.is_finite() {
        return None;
    }
    if x.fract() == 0.0 && x.abs() < 9_007_199_254_740_992.0 {
        return Some(Value::from(x as i64));
    }
    Number::from_f64(x).map(Value::Number)
}

/// 用于拼接与模板插值的字符串化
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn number_arg(args: &[Option<Value>], index: usize) -> Option<f64> {
    args.get(index)?.as_ref().and_then(as_number)
}

fn fold_numbers(args: &[Option<Value>], op: impl Fn(f64, f64) -> Option<f64>) -> Option<Value> {
    let mut numbers = args.iter().map(|a| a.as_ref().and_then(as_number));
    let mut acc = numbers.next()??;
    for n in numbers {
        acc = op(acc, n?)?;
    }
    to_number(acc)
}

fn unary_number(args: &[Option<Value>], op: impl Fn(f64) -> f64) -> Option<Value> {
    to_number(op(number_arg(args, 0)?))
}

fn unary_str(args: &[Option<Value>], op: impl Fn(&str) -> String) -> Option<Value> {
    let s = args.first()?.as_ref()?.as_str()?;
    Some(Value::String(op(s)))
}

//! 日期解析与转换
//!
//! 日期比较的两侧操作数都被转换为毫秒时间戳，解析分层进行：
//! 1. 数值：直接视为毫秒时间戳
//! 2. `YYYY-MM-DD`
//! 3. 带时区或不带时区的 ISO-8601 日期时间（不带时区的按 UTC 处理）
//! 4. 按执行上下文的 locale 推断年月日顺序的本地格式，两位年份按 70 为界补全世纪

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

pub const MS_PER_DAY: i64 = 86_400_000;

/// 本地日期格式中年月日的排列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrder {
    YearMonthDay,
    MonthDayYear,
    DayMonthYear,
}

impl FieldOrder {
    /// 根据 locale 推断日期字段顺序
    ///
    /// 与常见日历格式化结果一致：美式英语等为月/日/年，东亚及少数欧洲语言为年/月/日，其余为日/月/年。
    pub fn for_locale(locale: &str) -> Self {
        let normalized = locale.replace('_', "-").to_ascii_lowercase();
        let mut parts = normalized.split('-');
        let language = parts.next().unwrap_or_default();
        let region = parts.find(|p| p.len() == 2).unwrap_or_default();

        match (language, region) {
            ("en", "" | "us" | "ph" | "as" | "gu" | "pr" | "um" | "vi") => Self::MonthDayYear,
            ("en", "ca") | ("fr", "ca") => Self::YearMonthDay,
            ("fil", _) => Self::MonthDayYear,
            ("zh" | "ja" | "ko" | "hu" | "lt" | "mn" | "eu" | "sv", _) => Self::YearMonthDay,
            _ => Self::DayMonthYear,
        }
    }
}

/// 将操作数转换为毫秒时间戳，无法识别时返回 `None`
pub fn to_epoch_ms(value: &Value, locale: Option<&str>) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let ms = n.as_f64()?;
            ms.is_finite().then_some(ms as i64)
        }
        Value::String(s) => parse_date_str(s.trim(), locale),
        _ => None,
    }
}

fn parse_date_str(s: &str, locale: Option<&str>) -> Option<i64> {
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(midnight_ms(date));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.timestamp_millis());
        }
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }

    parse_locale_date(s, locale.unwrap_or("en-US"))
}

/// 本地格式兜底解析，如 `06/01/2024`、`1.6.24`
fn parse_locale_date(s: &str, locale: &str) -> Option<i64> {
    let parts: Vec<&str> = s
        .split(|c: char| matches!(c, '/' | '.' | '-' | ' ' | ','))
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 || !parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let order = if parts[0].len() == 4 {
        FieldOrder::YearMonthDay
    } else {
        FieldOrder::for_locale(locale)
    };

    let nums: Vec<u32> = parts.iter().map(|p| p.parse().ok()).collect::<Option<_>>()?;
    let (year, month, day) = match order {
        FieldOrder::YearMonthDay => (nums[0], nums[1], nums[2]),
        FieldOrder::MonthDayYear => (nums[2], nums[0], nums[1]),
        FieldOrder::DayMonthYear => (nums[2], nums[1], nums[0]),
    };

    let year_digits = match order {
        FieldOrder::YearMonthDay => parts[0].len(),
        _ => parts[2].len(),
    };
    let year = if year_digits <= 2 { pivot_year(year) } else { year as i32 };

    NaiveDate::from_ymd_opt(year, month, day).map(midnight_ms)
}

/// 两位年份补全世纪：`>= 70` 归入 1900 年代，否则归入 2000 年代
pub fn pivot_year(two_digit: u32) -> i32 {
    if two_digit >= 70 {
        1900 + two_digit as i32
    } else {
        2000 + two_digit as i32
    }
}

fn midnight_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// 是否同一 UTC 自然日
pub fn same_day(a_ms: i64, b_ms: i64) -> bool {
    match (DateTime::from_timestamp_millis(a_ms), DateTime::from_timestamp_millis(b_ms)) {
        (Some(a), Some(b)) => a.date_naive() == b.date_naive(),
        _ => false,
    }
}

/// 按单位平移时间戳
pub fn shift_ms(base_ms: i64, amount: f64, unit: &str) -> Option<i64> {
    if !amount.is_finite() {
        return None;
    }
    let base = DateTime::from_timestamp_millis(base_ms)?;
    let unit_ms = match unit {
        "ms" | "milliseconds" => 1.0,
        "seconds" | "second" | "s" => 1_000.0,
        "minutes" | "minute" | "m" => 60_000.0,
        "hours" | "hour" | "h" => 3_600_000.0,
        "days" | "day" | "d" => MS_PER_DAY as f64,
        "weeks" | "week" | "w" => 7.0 * MS_PER_DAY as f64,
        "months" | "month" => return shift_months(base, amount as i32).map(|d| d.timestamp_millis()),
        "years" | "year" | "y" => {
            return shift_months(base, (amount as i32).checked_mul(12)?).map(|d| d.timestamp_millis());
        }
        _ => return None,
    };
    let delta = Duration::try_milliseconds((amount * unit_ms) as i64)?;
    base.checked_add_signed(delta).map(|d| d.timestamp_millis())
}

fn shift_months(base: DateTime<Utc>, months: i32) -> Option<DateTime<Utc>> {
    let total = base.year().checked_mul(12)?.checked_add(base.month0() as i32)?.checked_add(months)?;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
    // 目标月份天数不足时落在月末
    let mut day = base.day();
    loop {
        if let Some(date) = base.with_day(1)?.with_year(year)?.with_month0(month0)?.with_day(day) {
            return Some(date);
        }
        day = day.checked_sub(1).filter(|d| *d > 0)?;
    }
}

/// 格式化为带毫秒的 UTC ISO-8601 字符串
pub fn to_iso(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

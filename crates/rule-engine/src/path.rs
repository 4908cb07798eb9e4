//! 属性路径引擎
//!
//! 把 `a.b.c`、`a[0].b`、`a["x.y"]` 形式的路径切分为键/下标序列，
//! 并在 JSON 结构上读取、写入、删除值。分词结果按原始路径字符串缓存在有界 LRU 中。
//!
//! 任何等于 `__proto__`、`constructor`、`prototype` 的键都会让整个操作变成空操作：
//! 读取返回 `None`，写入和删除静默跳过。

use crate::cache::BoundedCache;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// 分词缓存默认容量
pub const DEFAULT_PATH_CACHE_SIZE: usize = 500;

/// 写入时允许的最大下标，路径中任一下标超出时整个写入为空操作
pub const MAX_ARRAY_INDEX: usize = 10_000;

const GUARDED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// 路径片段
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathToken {
    Key(String),
    Index(usize),
}

impl PathToken {
    fn is_guarded(&self) -> bool {
        matches!(self, Self::Key(k) if GUARDED_KEYS.contains(&k.as_str()))
    }

    /// 为缺失的中间节点创建容器：下一个片段是下标时建数组，否则建对象
    fn empty_container(&self) -> Value {
        match self {
            Self::Index(_) => Value::Array(Vec::new()),
            Self::Key(_) => Value::Object(Map::new()),
        }
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{}", k),
            Self::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// 路径作用目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Data,
    Context,
}

/// 拆分 `data.` / `context.` 前缀，无前缀的路径默认指向 data
pub fn split_target(path: &str) -> (Target, &str) {
    if let Some(rest) = path.strip_prefix("context.") {
        (Target::Context, rest)
    } else if path == "context" {
        (Target::Context, "")
    } else if let Some(rest) = path.strip_prefix("data.") {
        (Target::Data, rest)
    } else if path == "data" {
        (Target::Data, "")
    } else {
        (Target::Data, path)
    }
}

/// 将路径字符串切分为片段序列
///
/// 纯数字的点分片段（如 `items.0.name` 中的 `0`）视为下标。
pub fn tokenize(path: &str) -> Vec<PathToken> {
    let mut tokens = Vec::new();
    let mut segment = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => flush_segment(&mut segment, &mut tokens),
            '[' => {
                flush_segment(&mut segment, &mut tokens);
                let mut inner = String::new();
                let mut quote: Option<char> = None;
                let mut quoted = false;
                for c in chars.by_ref() {
                    match (quote, c) {
                        (None, ']') => break,
                        (None, '"' | '\'') if inner.is_empty() => {
                            quote = Some(c);
                            quoted = true;
                        }
                        (Some(q), c) if c == q => quote = None,
                        (_, c) => inner.push(c),
                    }
                }
                if !quoted && !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
                    match inner.parse() {
                        Ok(i) => tokens.push(PathToken::Index(i)),
                        Err(_) => tokens.push(PathToken::Key(inner)),
                    }
                } else if !inner.is_empty() {
                    tokens.push(PathToken::Key(inner));
                }
            }
            c => segment.push(c),
        }
    }
    flush_segment(&mut segment, &mut tokens);

    tokens
}

fn flush_segment(segment: &mut String, tokens: &mut Vec<PathToken>) {
    if segment.is_empty() {
        return;
    }
    let raw = std::mem::take(segment);
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = trimmed.parse() {
            tokens.push(PathToken::Index(i));
            return;
        }
    }
    tokens.push(PathToken::Key(trimmed.to_string()));
}

fn is_guarded(tokens: &[PathToken]) -> bool {
    tokens.iter().any(PathToken::is_guarded)
}

fn exceeds_index_limit(tokens: &[PathToken]) -> bool {
    tokens
        .iter()
        .any(|t| matches!(t, PathToken::Index(i) if *i > MAX_ARRAY_INDEX))
}

/// 按片段序列读取值
pub fn get_in<'a>(root: &'a Value, tokens: &[PathToken]) -> Option<&'a Value> {
    if is_guarded(tokens) {
        return None;
    }

    let mut current = root;
    for token in tokens {
        current = step(current, token)?;
    }
    Some(current)
}

fn step<'a>(current: &'a Value, token: &PathToken) -> Option<&'a Value> {
    match (current, token) {
        (Value::Object(map), PathToken::Key(k)) => map.get(k),
        (Value::Object(map), PathToken::Index(i)) => map.get(&i.to_string()),
        (Value::Array(arr), PathToken::Index(i)) => arr.get(*i),
        _ => None,
    }
}

/// 按片段序列写入值，自动创建缺失的中间容器
///
/// 返回是否真正写入。
pub fn set_in(root: &mut Value, tokens: &[PathToken], value: Value) -> bool {
    if tokens.is_empty() || is_guarded(tokens) || exceeds_index_limit(tokens) {
        return false;
    }

    let mut current = root;
    for (i, token) in tokens.iter().enumerate() {
        if current.is_null() {
            *current = token.empty_container();
        }

        let Some(next) = tokens.get(i + 1) else {
            return assign(current, token, value);
        };

        let slot = match (current, token) {
            (Value::Object(map), PathToken::Key(k)) => map.entry(k.clone()).or_insert(Value::Null),
            (Value::Object(map), PathToken::Index(idx)) => {
                map.entry(idx.to_string()).or_insert(Value::Null)
            }
            (Value::Array(arr), PathToken::Index(idx)) => match grow_to(arr, *idx) {
                Some(slot) => slot,
                None => return false,
            },
            _ => return false,
        };

        if !matches!(slot, Value::Object(_) | Value::Array(_)) {
            *slot = next.empty_container();
        }
        current = slot;
    }

    false
}

fn assign(container: &mut Value, token: &PathToken, value: Value) -> bool {
    match (container, token) {
        (Value::Object(map), PathToken::Key(k)) => {
            map.insert(k.clone(), value);
            true
        }
        (Value::Object(map), PathToken::Index(i)) => {
            map.insert(i.to_string(), value);
            true
        }
        (Value::Array(arr), PathToken::Index(i)) => match grow_to(arr, *i) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// 以 null 填充数组直到下标可写；下标超过 [`MAX_ARRAY_INDEX`] 时返回 `None`
fn grow_to(arr: &mut Vec<Value>, idx: usize) -> Option<&mut Value> {
    if idx > MAX_ARRAY_INDEX {
        return None;
    }
    if arr.len() <= idx {
        arr.resize(idx.checked_add(1)?, Value::Null);
    }
    arr.get_mut(idx)
}

/// 删除对象键或数组元素（数组按 splice 语义移除），任一中间节点缺失时为空操作
pub fn remove_in(root: &mut Value, tokens: &[PathToken]) -> Option<Value> {
    let (last, parents) = tokens.split_last()?;
    if is_guarded(tokens) {
        return None;
    }

    let mut current = root;
    for token in parents {
        current = match (current, token) {
            (Value::Object(map), PathToken::Key(k)) => map.get_mut(k)?,
            (Value::Object(map), PathToken::Index(i)) => map.get_mut(&i.to_string())?,
            (Value::Array(arr), PathToken::Index(i)) => arr.get_mut(*i)?,
            _ => return None,
        };
    }

    match (current, last) {
        (Value::Object(map), PathToken::Key(k)) => map.remove(k),
        (Value::Object(map), PathToken::Index(i)) => map.remove(&i.to_string()),
        (Value::Array(arr), PathToken::Index(i)) if *i < arr.len() => Some(arr.remove(*i)),
        _ => None,
    }
}

/// 带分词缓存的路径引擎
pub struct PathEngine {
    cache: BoundedCache<String, Arc<[PathToken]>>,
}

impl PathEngine {
    pub fn new(cache_size: usize) -> Self {
        Self {
            cache: BoundedCache::new(cache_size),
        }
    }

    /// 获取路径分词结果（优先读缓存）
    pub fn tokens(&self, path: &str) -> Arc<[PathToken]> {
        let key = path.to_string();
        if let Some(tokens) = self.cache.get(&key) {
            return tokens;
        }

        let tokens: Arc<[PathToken]> = tokenize(path).into();
        self.cache.put(key, Arc::clone(&tokens));
        tokens
    }

    pub fn get<'a>(&self, root: &'a Value, path: &str) -> Option<&'a Value> {
        get_in(root, &self.tokens(path))
    }

    pub fn set(&self, root: &mut Value, path: &str, value: Value) -> bool {
        set_in(root, &self.tokens(path), value)
    }

    pub fn remove(&self, root: &mut Value, path: &str) -> Option<Value> {
        remove_in(root, &self.tokens(path))
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }

    /// 运行期调整分词缓存容量
    pub fn resize_cache(&self, capacity: usize) {
        self.cache.resize(capacity);
    }
}

impl Default for PathEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PATH_CACHE_SIZE)
    }
}

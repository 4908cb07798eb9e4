//! 条件求值记忆化
//!
//! 键由条件树的稳定序列化和变更纪元组成。每次评估调用领取一个新纪元，
//! 动作每修改一次 data / context 再领取一个，因此缓存结果不会跨修改或跨调用复用。

use crate::cache::BoundedCache;
use crate::error::Result;
use crate::executor::Evaluation;
use crate::models::Condition;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 记忆化缓存默认容量
pub const DEFAULT_CONDITION_MEMO_SIZE: usize = 2048;

type MemoKey = (String, u64);

/// 条件求值结果缓存
pub struct ConditionMemo {
    cache: BoundedCache<MemoKey, Arc<Evaluation>>,
    epoch: AtomicU64,
}

impl ConditionMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new(capacity),
            epoch: AtomicU64::new(0),
        }
    }

    /// 领取一个新的变更纪元
    pub fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 条件树的稳定序列化（对象键有序）
    pub fn key(condition: &Condition) -> Result<String> {
        let value = serde_json::to_value(condition)?;
        let mut out = String::new();
        write_canonical(&value, &mut out)?;
        Ok(out)
    }

    pub fn get(&self, key: &str, epoch: u64) -> Option<Arc<Evaluation>> {
        self.cache.get(&(key.to_string(), epoch))
    }

    pub fn put(&self, key: String, epoch: u64, evaluation: Arc<Evaluation>) {
        self.cache.put((key, epoch), evaluation);
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn resize(&self, capacity: usize) {
        self.cache.resize(capacity);
    }
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k)?);
                out.push(':');
                write_canonical(v, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

impl Default for ConditionMemo {
    fn default() -> Self {
        Self::new(DEFAULT_CONDITION_MEMO_SIZE)
    }
}

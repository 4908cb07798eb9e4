//! 有界 LRU 缓存
//!
//! 引擎实例持有的共享缓存（路径分词、条件记忆化、正则编译）都基于它。
//! 容量可以在运行期调整，调小时按最久未使用的顺序淘汰。

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// 线程安全的有界 LRU 缓存
///
/// 容量为 0 表示禁用缓存：`get` 总是未命中，`put` 直接丢弃。
pub struct BoundedCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<Option<LruCache<K, V>>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(NonZeroUsize::new(capacity).map(LruCache::new)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().as_mut()?.get(key).cloned()
    }

    pub fn put(&self, key: K, value: V) {
        if let Some(cache) = self.inner.lock().as_mut() {
            cache.put(key, value);
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .as_ref()
            .map(|c| c.cap().get())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 调整容量，超出部分按 LRU 顺序淘汰
    pub fn resize(&self, capacity: usize) {
        let mut guard = self.inner.lock();
        match (NonZeroUsize::new(capacity), guard.as_mut()) {
            (Some(cap), Some(cache)) => {
                if cache.cap() != cap {
                    cache.resize(cap);
                }
            }
            (Some(cap), None) => *guard = Some(LruCache::new(cap)),
            (None, _) => *guard = None,
        }
    }
}

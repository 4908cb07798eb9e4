//! 引擎配置
//!
//! 生效配置按以下顺序叠加，后者覆盖前者：
//! 1. 编译期默认值
//! 2. `RULES_ENGINE_` 前缀的环境变量
//! 3. 进程级 [`configure`] 覆盖
//! 4. 引擎实例覆盖（`RuleEngine::with_overrides`）
//! 5. 单次调用的 [`EvaluateOptions`]

use crate::error::{Result, RuleError};
use crate::evaluator::DEFAULT_REGEX_CACHE_SIZE;
use crate::memo::DEFAULT_CONDITION_MEMO_SIZE;
use crate::path::DEFAULT_PATH_CACHE_SIZE;
use crate::trace::Mode;
use config::{Config, Environment};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::warn;

pub const DEFAULT_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_MAX_RULES: usize = 1000;
pub const DEFAULT_MAX_DEPTH: usize = 10;

const ENV_PREFIX: &str = "RULES_ENGINE";

/// 生效的引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub timeout_ms: u64,
    pub max_rules: usize,
    pub max_depth: usize,
    pub actions: ActionPolicy,
    pub performance: PerformancePolicy,
    /// 是否把完整 trace 输出到日志
    pub trace_log: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_rules: DEFAULT_MAX_RULES,
            max_depth: DEFAULT_MAX_DEPTH,
            actions: ActionPolicy::default(),
            performance: PerformancePolicy::default(),
            trace_log: false,
        }
    }
}

/// 动作策略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPolicy {
    pub allow_custom_actions: bool,
    /// 自定义动作白名单，`None` 表示不限制
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_action_types: Option<Vec<String>>,
}

/// 性能相关设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePolicy {
    pub path_cache_size: usize,
    pub condition_memo_size: usize,
    pub regex_cache_size: usize,
    pub memoize_condition_evaluations: bool,
}

impl Default for PerformancePolicy {
    fn default() -> Self {
        Self {
            path_cache_size: DEFAULT_PATH_CACHE_SIZE,
            condition_memo_size: DEFAULT_CONDITION_MEMO_SIZE,
            regex_cache_size: DEFAULT_REGEX_CACHE_SIZE,
            memoize_condition_evaluations: true,
        }
    }
}

/// 可选的配置覆盖项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rules: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_custom_actions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_action_types: Option<Vec<String>>,
    /// 缓存容量只在引擎级生效（环境变量、进程级或实例级覆盖），单次调用的值被忽略
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_cache_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_memo_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memoize_condition_evaluations: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_log: Option<bool>,
}

impl ConfigOverrides {
    /// 合并另一组覆盖项，对方已设置的字段优先
    pub fn merge(&mut self, other: &ConfigOverrides) {
        fn take<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
            if other.is_some() {
                slot.clone_from(other);
            }
        }
        take(&mut self.timeout_ms, &other.timeout_ms);
        take(&mut self.max_rules, &other.max_rules);
        take(&mut self.max_depth, &other.max_depth);
        take(&mut self.allow_custom_actions, &other.allow_custom_actions);
        take(&mut self.allowed_action_types, &other.allowed_action_types);
        take(&mut self.path_cache_size, &other.path_cache_size);
        take(&mut self.condition_memo_size, &other.condition_memo_size);
        take(&mut self.memoize_condition_evaluations, &other.memoize_condition_evaluations);
        take(&mut self.trace_log, &other.trace_log);
    }

    /// 应用到一份配置上
    pub fn apply_to(&self, config: &mut EngineConfig) {
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.max_rules {
            config.max_rules = v;
        }
        if let Some(v) = self.max_depth {
            config.max_depth = v;
        }
        if let Some(v) = self.allow_custom_actions {
            config.actions.allow_custom_actions = v;
        }
        if let Some(v) = &self.allowed_action_types {
            config.actions.allowed_action_types = Some(v.clone());
        }
        if let Some(v) = self.path_cache_size {
            config.performance.path_cache_size = v;
        }
        if let Some(v) = self.condition_memo_size {
            config.performance.condition_memo_size = v;
        }
        if let Some(v) = self.memoize_condition_evaluations {
            config.performance.memoize_condition_evaluations = v;
        }
        if let Some(v) = self.trace_log {
            config.trace_log = v;
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_rules(mut self, max_rules: usize) -> Self {
        self.max_rules = Some(max_rules);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_custom_actions(mut self, allow: bool) -> Self {
        self.allow_custom_actions = Some(allow);
        self
    }

    pub fn with_memoization(mut self, enabled: bool) -> Self {
        self.memoize_condition_evaluations = Some(enabled);
        self
    }

    pub fn with_path_cache_size(mut self, size: usize) -> Self {
        self.path_cache_size = Some(size);
        self
    }

    pub fn with_condition_memo_size(mut self, size: usize) -> Self {
        self.condition_memo_size = Some(size);
        self
    }
}

/// 单次评估调用的选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluateOptions {
    #[serde(flatten)]
    pub overrides: ConfigOverrides,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// 固定评估时钟（毫秒时间戳），缺省取调用开始时的系统时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now_ms: Option<i64>,
}

impl EvaluateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只评估条件，不执行动作
    pub fn predicate() -> Self {
        Self {
            mode: Mode::Predicate,
            ..Default::default()
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides.merge(&overrides);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_now_ms(mut self, now_ms: i64) -> Self {
        self.now_ms = Some(now_ms);
        self
    }
}

/// 环境变量中的覆盖项（键名为去掉前缀后的小写形式）
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvOverrides {
    timeout_ms: Option<u64>,
    max_rules: Option<usize>,
    max_depth: Option<usize>,
    allow_custom_actions: Option<bool>,
    allowed_action_types: Option<Vec<String>>,
    path_cache_size: Option<usize>,
    condition_memo_size: Option<usize>,
    memoize_condition_evaluations: Option<bool>,
    trace_log: Option<bool>,
}

impl From<EnvOverrides> for ConfigOverrides {
    fn from(env: EnvOverrides) -> Self {
        Self {
            timeout_ms: env.timeout_ms,
            max_rules: env.max_rules,
            max_depth: env.max_depth,
            allow_custom_actions: env.allow_custom_actions,
            allowed_action_types: env.allowed_action_types,
            path_cache_size: env.path_cache_size,
            condition_memo_size: env.condition_memo_size,
            memoize_condition_evaluations: env.memoize_condition_evaluations,
            trace_log: env.trace_log,
        }
    }
}

/// 从环境变量读取覆盖项
///
/// `source` 为 `None` 时读取进程环境；测试可以传入固定的键值表。
pub fn overrides_from_env(source: Option<config::Map<String, String>>) -> Result<ConfigOverrides> {
    let environment = Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .ignore_empty(true)
        .list_separator(",")
        .with_list_parse_key("allowed_action_types")
        .source(source);

    let env: EnvOverrides = Config::builder()
        .add_source(environment)
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| RuleError::Config(e.to_string()))?;

    Ok(env.into())
}

/// 进程环境中的覆盖项，首次使用时读取一次
static ENV_OVERRIDES: LazyLock<ConfigOverrides> = LazyLock::new(|| {
    overrides_from_env(None).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring invalid RULES_ENGINE_* environment overrides");
        ConfigOverrides::default()
    })
});

static GLOBAL_OVERRIDES: LazyLock<RwLock<ConfigOverrides>> = LazyLock::new(Default::default);

/// 合并进程级覆盖项
pub fn configure(overrides: ConfigOverrides) {
    GLOBAL_OVERRIDES.write().merge(&overrides);
}

/// 清除进程级覆盖项
pub fn reset() {
    *GLOBAL_OVERRIDES.write() = ConfigOverrides::default();
}

/// 当前的进程级覆盖项
pub fn current_overrides() -> ConfigOverrides {
    GLOBAL_OVERRIDES.read().clone()
}

impl EngineConfig {
    /// 按优先级解析生效配置
    pub fn resolve(instance: &ConfigOverrides, call: &ConfigOverrides) -> Self {
        let mut config = Self::default();
        ENV_OVERRIDES.apply_to(&mut config);
        GLOBAL_OVERRIDES.read().apply_to(&mut config);
        instance.apply_to(&mut config);
        call.apply_to(&mut config);
        config
    }
}

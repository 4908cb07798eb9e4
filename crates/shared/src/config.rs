//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn is_json(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RULES_ 前缀，如 RULES_OBSERVABILITY__LOG_LEVEL -> observability.log_level）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("RULES_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir), None)
    }

    /// 指定配置目录和环境变量来源加载
    pub fn load_from(
        service_name: &str,
        env: &str,
        config_dir: &Path,
        env_source: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", service_name))).required(false))
            .add_source(
                Environment::with_prefix("RULES")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env_source),
            );

        builder.build()?.try_deserialize()
    }

    /// 加载失败时回退到默认配置
    pub fn load_or_default(service_name: &str) -> Self {
        Self::load(service_name).unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Self {
                service_name: service_name.to_string(),
                environment: "development".to_string(),
                ..Default::default()
            }
        })
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.observability.is_json());
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_load_with_env_overrides() {
        let env: config::Map<String, String> = [
            ("RULES_OBSERVABILITY__LOG_LEVEL", "debug"),
            ("RULES_OBSERVABILITY__LOG_FORMAT", "json"),
            ("RULES_OBSERVABILITY__METRICS_ENABLED", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = AppConfig::load_from(
            "rule-engine",
            "test",
            Path::new("does-not-exist"),
            Some(env),
        )
        .unwrap();

        assert_eq!(config.service_name, "rule-engine");
        assert_eq!(config.environment, "test");
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.observability.is_json());
        assert!(config.observability.metrics_enabled);
        assert!(!config.is_production());
    }
}

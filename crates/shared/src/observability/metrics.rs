//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 宿主进程安装 recorder 后，可以通过 [`get_handle`] 渲染指标快照。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

pub const EVALUATION_DURATION_MS: &str = "rules.evaluation.duration_ms";
pub const EVALUATION_MATCHED_COUNT: &str = "rules.evaluation.matched_count";
pub const EVALUATION_TOTAL: &str = "rules.evaluation.total";

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 安装 Prometheus recorder
///
/// 重复调用返回首次安装的 handle。
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let handle = PROMETHEUS_HANDLE.get_or_init(|| handle).clone();
    describe_rule_metrics();
    info!("Prometheus recorder installed");

    Ok(handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 注册指标描述，出现在渲染结果的 HELP 注释中
fn describe_rule_metrics() {
    metrics::describe_histogram!(EVALUATION_DURATION_MS, "Rule evaluation call duration in milliseconds");
    metrics::describe_histogram!(EVALUATION_MATCHED_COUNT, "Number of rules matched per evaluation call");
    metrics::describe_counter!(EVALUATION_TOTAL, "Total number of rule evaluation calls");
}

/// 记录一次规则评估调用
#[inline]
pub fn record_rule_evaluation(duration_ms: f64, matched_count: usize, outcome: &'static str) {
    metrics::histogram!(EVALUATION_DURATION_MS).record(duration_ms);
    metrics::histogram!(EVALUATION_MATCHED_COUNT).record(matched_count as f64);
    metrics::counter!(EVALUATION_TOTAL, "outcome" => outcome).increment(1);
}

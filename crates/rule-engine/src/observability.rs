//! 评估指标与 trace 日志
//!
//! 每次评估调用结束后向 [`MetricsSink`] 上报耗时和匹配数。默认实现转发到 `metrics` 门面，
//! 宿主安装 Prometheus recorder 后即可导出。

use crate::trace::Trace;
use rules_shared::observability::metrics::record_rule_evaluation;
use tracing::{info, warn};

/// 评估调用的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    Completed,
    Aborted,
}

impl EvaluationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// 指标接收端
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn record_evaluation(&self, duration_ms: f64, matched_count: usize, outcome: EvaluationOutcome);
}

/// 转发到 `metrics` 门面的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsFacadeSink;

impl MetricsSink for MetricsFacadeSink {
    fn record_evaluation(&self, duration_ms: f64, matched_count: usize, outcome: EvaluationOutcome) {
        record_rule_evaluation(duration_ms, matched_count, outcome.as_str());
    }
}

/// 丢弃所有指标
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_evaluation(&self, _duration_ms: f64, _matched_count: usize, _outcome: EvaluationOutcome) {}
}

/// 把完整 trace 以 JSON 输出到 `rule_engine::trace` 日志目标
pub fn log_trace(trace: &Trace) {
    match serde_json::to_string(trace) {
        Ok(json) => info!(
            target: "rule_engine::trace",
            correlation_id = %trace.correlation_id,
            matched = trace.rules_matched.len(),
            errors = trace.errors.len(),
            trace = %json,
            "Rule evaluation trace"
        ),
        Err(e) => warn!(
            target: "rule_engine::trace",
            correlation_id = %trace.correlation_id,
            error = %e,
            "Failed to serialize rule evaluation trace"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Mode;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(EvaluationOutcome::Completed.as_str(), "completed");
        assert_eq!(EvaluationOutcome::Aborted.as_str(), "aborted");
    }

    #[test]
    fn test_default_sinks_do_not_panic() {
        MetricsFacadeSink.record_evaluation(1.0, 1, EvaluationOutcome::Completed);
        NoopMetricsSink.record_evaluation(1.0, 1, EvaluationOutcome::Aborted);
        log_trace(&Trace::new("c-1", None, Mode::Apply));
    }
}

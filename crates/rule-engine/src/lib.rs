//! 声明式业务规则引擎
//!
//! 对 JSON 描述的规则集求值：按作用域和优先级选出规则，求值条件树，
//! 对命中的规则执行动作（修改数据副本、发事件、中止），并产出完整的审计 trace。
//! - 路径引擎：点号/方括号路径的读写与分词缓存
//! - 条件求值：严格类型的比较操作符、日期操作符、动态字面量
//! - 动作执行：内置动作与可注册的自定义动作
//! - 规则选择：作用域过滤、排序、数量与时间上限
//!
//! ```no_run
//! use rule_engine::{EvaluateOptions, RuleEngine, RuleInput};
//! use serde_json::json;
//!
//! let rules: RuleInput = serde_json::from_value(json!([{
//!     "ruleId": "high-value",
//!     "condition": {"op": "gt", "left": {"path": "orderTotal"}, "right": {"value": 1000}},
//!     "actions": [{"type": "setField", "path": "riskLevel", "value": "High"}]
//! }]))?;
//!
//! let engine = RuleEngine::new();
//! let out = engine.evaluate_input(&rules, &json!({}), &json!({"orderTotal": 1500}), &EvaluateOptions::default())?;
//! assert_eq!(out.data["riskLevel"], "High");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod actions;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod explain;
pub mod memo;
pub mod models;
pub mod observability;
pub mod operand;
pub mod operators;
pub mod path;
pub mod registry;
pub mod trace;
pub mod transforms;

pub use actions::{Action, ActionScope, CustomAction};
pub use compiler::{RuleCompiler, ValidationIssue};
pub use config::{ConfigOverrides, EngineConfig, EvaluateOptions, configure, reset};
pub use engine::{EvaluationOutput, RuleEngine, evaluate_rules, global, register_custom_action};
pub use error::{AbortedEvaluation, Result, RuleError};
pub use executor::{ConditionExecutor, Evaluation};
pub use explain::{ExplainNode, OperandExplain, ReadRecord};
pub use models::{Comparison, Condition, Operand, Rule, RuleInput, RuleSet, Scope};
pub use observability::{EvaluationOutcome, MetricsSink, NoopMetricsSink};
pub use operators::Operator;
pub use path::PathEngine;
pub use registry::{ActionRegistry, CustomActionHandler};
pub use trace::{Mode, Trace};

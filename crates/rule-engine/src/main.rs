//! 规则引擎命令行
//!
//! `eval` 对本地 JSON 文件求值并输出 `{data, context, trace}`，`validate` 检查规则集。

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rule_engine::{
    ConfigOverrides, EvaluateOptions, Mode, RuleCompiler, RuleEngine, RuleError, RuleInput,
};
use rules_shared::config::AppConfig;
use rules_shared::observability::{init_logging, metrics::install_prometheus_recorder};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rule-engine")]
#[command(about = "Evaluate and validate declarative business rules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a rule set against context and data files
    Eval(EvalArgs),
    /// Report problems in a rule set
    Validate(ValidateArgs),
}

#[derive(Args)]
struct EvalArgs {
    /// Rule list or RuleSet JSON file
    #[arg(long)]
    rules: PathBuf,
    #[arg(long)]
    context: Option<PathBuf>,
    #[arg(long)]
    data: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ModeArg::Apply)]
    mode: ModeArg,
    #[arg(long)]
    max_rules: Option<usize>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    max_depth: Option<usize>,
    /// Pin the evaluation clock (epoch milliseconds)
    #[arg(long)]
    now_ms: Option<i64>,
    #[arg(long)]
    correlation_id: Option<String>,
    /// Log the full trace at info level
    #[arg(long, default_value_t = false)]
    trace_log: bool,
    /// Print a Prometheus metrics snapshot to stderr after evaluation
    #[arg(long, default_value_t = false)]
    metrics: bool,
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(long)]
    rules: PathBuf,
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Apply,
    Predicate,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Apply => Mode::Apply,
            ModeArg::Predicate => Mode::Predicate,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default("rule-engine");
    init_logging(&config.observability)?;

    match cli.command {
        Commands::Eval(args) => {
            let handle = if args.metrics || config.observability.metrics_enabled {
                Some(install_prometheus_recorder()?)
            } else {
                None
            };
            let result = eval(args);
            if let Some(handle) = handle {
                eprintln!("{}", handle.render());
            }
            result
        }
        Commands::Validate(args) => validate(args),
    }
}

fn eval(args: EvalArgs) -> Result<()> {
    let input: RuleInput = serde_json::from_value(read_json(&args.rules)?)
        .with_context(|| format!("Invalid rules in {}", args.rules.display()))?;
    let context = read_optional_json(args.context.as_deref())?;
    let data = read_optional_json(args.data.as_deref())?;

    let overrides = ConfigOverrides {
        max_rules: args.max_rules,
        timeout_ms: args.timeout_ms,
        max_depth: args.max_depth,
        trace_log: args.trace_log.then_some(true),
        ..Default::default()
    };
    let options = EvaluateOptions {
        overrides,
        mode: args.mode.into(),
        correlation_id: args.correlation_id,
        version_id: None,
        now_ms: args.now_ms,
    };

    let engine = RuleEngine::new();
    info!(rules = input.rules().len(), "Evaluating rule set");

    match engine.evaluate_input(&input, &context, &data, &options) {
        Ok(out) => {
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Err(RuleError::Aborted(aborted)) => {
            let partial = json!({
                "data": aborted.data,
                "context": aborted.context,
                "trace": aborted.trace,
                "aborted": {"ruleId": aborted.rule_id, "message": aborted.message},
            });
            println!("{}", serde_json::to_string_pretty(&partial)?);
            bail!("Evaluation aborted by rule {}: {}", aborted.rule_id, aborted.message)
        }
        Err(e) => Err(e.into()),
    }
}

fn validate(args: ValidateArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.rules)
        .with_context(|| format!("Failed to read {}", args.rules.display()))?;
    let input = RuleCompiler::parse(&raw)
        .with_context(|| format!("Invalid rules in {}", args.rules.display()))?;

    let compiler = args
        .max_depth
        .map(RuleCompiler::with_max_depth)
        .unwrap_or_default();
    let issues = compiler.check(input.rules());

    if issues.is_empty() {
        println!("{} rules OK", input.rules().len());
        return Ok(());
    }

    for issue in &issues {
        warn!(issue = %issue, "Rule validation issue");
    }
    println!("{}", serde_json::to_string_pretty(&issues)?);
    bail!("{} validation issue(s) found", issues.len())
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_optional_json(path: Option<&Path>) -> Result<Value> {
    match path {
        Some(path) => read_json(path),
        None => Ok(json!({})),
    }
}

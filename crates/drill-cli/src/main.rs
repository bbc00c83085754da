//! Drillbench CLI
//!
//! The `drill` command grades learner submissions against the built-in
//! exercise catalogue.
//!
//! ## Commands
//!
//! - `list`: Show every exercise key, kind and title
//! - `show`: Print one exercise's prompt and starter
//! - `evaluate`: Grade a submission read from a file or stdin
//! - `verify`: Grade every canonical solution

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drill_core::{
    catalog, Comparator, EvaluationResult, Exercise, ExerciseKind, ExerciseRegistry, Submission,
    METRICS,
};
use drill_engine::{Engine, EngineConfig, EvaluatorKind};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "drill")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grade exercise submissions in isolation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and command output
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "DRILL_CONFIG")]
    config: Option<PathBuf>,

    /// Evaluator for scripted exercises (interpreted or process)
    #[arg(long, global = true)]
    evaluator: Option<EvaluatorKind>,

    /// Wall-clock ceiling per submission, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Python interpreter used by the process evaluator
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every exercise
    List,

    /// Show an exercise's prompt and starter code
    Show {
        /// Exercise key
        key: String,

        /// Also print the canonical solution
        #[arg(long)]
        solution: bool,
    },

    /// Grade one submission
    Evaluate {
        /// Exercise key
        key: String,

        /// Submission file (default: read stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Grade every canonical solution; exits non-zero if any does not pass
    Verify,
}

impl Cli {
    /// File and environment configuration with command-line overrides on top.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config =
            EngineConfig::load(self.config.as_deref()).context("Failed to load configuration")?;
        if let Some(evaluator) = self.evaluator {
            config.evaluator = evaluator;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.limits.timeout_ms = timeout_ms;
        }
        if let Some(python) = &self.python {
            config.python = python.clone();
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    drill_core::init_tracing(cli.json, level);

    let code = match &cli.command {
        Commands::List => cmd_list(cli.json)?,
        Commands::Show { key, solution } => cmd_show(key, *solution, cli.json)?,
        Commands::Evaluate { key, file } => {
            let engine = bootstrap(&cli).await?;
            cmd_evaluate(&engine, key, file.as_deref(), cli.json).await?
        }
        Commands::Verify => {
            let engine = bootstrap(&cli).await?;
            cmd_verify(&engine, cli.json).await?
        }
    };

    METRICS.flush();
    Ok(code)
}

async fn bootstrap(cli: &Cli) -> Result<Engine> {
    let config = cli.engine_config()?;
    Engine::bootstrap(config)
        .await
        .context("Failed to start the grading engine")
}

fn builtin_registry() -> Result<ExerciseRegistry> {
    ExerciseRegistry::new(catalog::builtin()).context("Built-in catalogue is invalid")
}

// ── list / show ──────────────────────────────────────────────

#[derive(Serialize)]
struct ExerciseSummary<'a> {
    key: &'a str,
    kind: &'static str,
    title: &'a str,
}

#[derive(Serialize)]
struct ExerciseDetail<'a> {
    key: &'a str,
    kind: &'static str,
    title: &'a str,
    prompt: &'a str,
    /// What the submission must define (`result`, `twoSum(nums, target)`).
    defines: Option<String>,
    helpers: Vec<&'static str>,
    comparator: &'a Comparator,
    starter: Option<&'a str>,
    solution: Option<&'a str>,
}

impl<'a> ExerciseDetail<'a> {
    fn new(exercise: &'a Exercise, with_solution: bool) -> Self {
        let (defines, helpers) = match &exercise.kind {
            ExerciseKind::Scripted { slot, helpers } => (
                Some(slot.to_string()),
                helpers.iter().map(|h| h.module_name()).collect(),
            ),
            ExerciseKind::Query => (None, Vec::new()),
        };
        Self {
            key: &exercise.key,
            kind: exercise.kind.label(),
            title: &exercise.title,
            prompt: &exercise.prompt,
            defines,
            helpers,
            comparator: &exercise.comparator,
            starter: exercise.starter.as_deref(),
            solution: with_solution.then_some(exercise.solution.as_str()),
        }
    }
}

fn cmd_list(json: bool) -> Result<ExitCode> {
    let registry = builtin_registry()?;
    let summaries: Vec<ExerciseSummary> = registry
        .iter()
        .map(|e| ExerciseSummary {
            key: &e.key,
            kind: e.kind.label(),
            title: &e.title,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for s in &summaries {
            println!("{:<22} {:<9} {}", s.key, s.kind, s.title);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(key: &str, with_solution: bool, json: bool) -> Result<ExitCode> {
    let registry = builtin_registry()?;
    let Some(exercise) = registry.get(key) else {
        eprintln!("Unknown exercise '{}'. Run 'drill list' to see all keys.", key);
        return Ok(ExitCode::FAILURE);
    };
    let detail = ExerciseDetail::new(exercise, with_solution);

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} ({})", detail.title, detail.key);
    println!("Kind:    {}", detail.kind);
    if let Some(defines) = &detail.defines {
        println!("Defines: {}", defines);
    }
    if !detail.helpers.is_empty() {
        println!("Imports: {}", detail.helpers.join(", "));
    }
    println!();
    println!("{}", detail.prompt);
    if let Some(starter) = detail.starter {
        println!();
        println!("Starter:");
        print!("{}", starter);
    }
    if let Some(solution) = detail.solution {
        println!();
        println!("Solution:");
        print!("{}", solution);
    }
    Ok(ExitCode::SUCCESS)
}

// ── evaluate / verify ────────────────────────────────────────

fn read_submission(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read submission {:?}", path)),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read submission from stdin")?;
            Ok(text)
        }
    }
}

fn describe(result: &EvaluationResult) -> String {
    match result {
        EvaluationResult::Passed => "passed".to_string(),
        EvaluationResult::Failed { explanation } => format!("failed: {}", explanation),
        EvaluationResult::Errored { message } => format!("errored: {}", message),
    }
}

async fn cmd_evaluate(engine: &Engine, key: &str, file: Option<&Path>, json: bool) -> Result<ExitCode> {
    let text = read_submission(file)?;
    let result = engine.evaluate(&Submission::new(key, text)).await;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!("{}", describe(&result));
    }
    Ok(if result.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[derive(Serialize)]
struct VerifyEntry<'a> {
    key: &'a str,
    #[serde(flatten)]
    result: EvaluationResult,
}

async fn cmd_verify(engine: &Engine, json: bool) -> Result<ExitCode> {
    let mut entries = Vec::with_capacity(engine.registry().len());
    for exercise in engine.registry().iter() {
        let result = engine
            .evaluate(&Submission::new(&exercise.key, &exercise.solution))
            .await;
        if !json {
            let mark = if result.passed() { "ok  " } else { "FAIL" };
            println!("{} {:<22} {}", mark, exercise.key, describe(&result));
        }
        entries.push(VerifyEntry {
            key: &exercise.key,
            result,
        });
    }

    let failures = entries.iter().filter(|e| !e.result.passed()).count();
    info!(
        evaluator = engine.evaluator_name(),
        checked = entries.len(),
        failures = failures,
        "verification finished"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!();
        println!("{} passed, {} failed", entries.len() - failures, failures);
    }
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "drill",
            "evaluate",
            "pair-sum",
            "--file",
            "answer.py",
            "--evaluator",
            "process",
            "--timeout-ms",
            "750",
            "--json",
        ])
        .expect("parses");
        assert!(cli.json);
        assert_eq!(cli.evaluator, Some(EvaluatorKind::Process));
        assert_eq!(cli.timeout_ms, Some(750));
        match cli.command {
            Commands::Evaluate { key, file } => {
                assert_eq!(key, "pair-sum");
                assert_eq!(file, Some(PathBuf::from("answer.py")));
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_evaluator() {
        assert!(Cli::try_parse_from(["drill", "verify", "--evaluator", "docker"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[limits]\ntimeout_ms = 900\nmax_steps = 1234").expect("write");
        let path = file.path().display().to_string();
        let cli = Cli::try_parse_from([
            "drill",
            "verify",
            "--config",
            path.as_str(),
            "--timeout-ms",
            "100",
            "--python",
            "/opt/python3",
        ])
        .expect("parses");
        let config = cli.engine_config().expect("config");
        assert_eq!(config.limits.timeout_ms, 100);
        assert_eq!(config.limits.max_steps, 1234);
        assert_eq!(config.python, PathBuf::from("/opt/python3"));
    }

    #[test]
    fn test_describe_results() {
        assert_eq!(describe(&EvaluationResult::Passed), "passed");
        assert_eq!(
            describe(&EvaluationResult::Failed {
                explanation: "index 0 differs: expected 0, got 1".into()
            }),
            "failed: index 0 differs: expected 0, got 1"
        );
        assert_eq!(
            describe(&EvaluationResult::errored("line 1: ValueError: bad")),
            "errored: line 1: ValueError: bad"
        );
    }

    #[test]
    fn test_read_submission_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "result = 42").expect("write");
        let text = read_submission(Some(file.path())).expect("read");
        assert_eq!(text, "result = 42\n");
    }

    #[test]
    fn test_exercise_detail_for_scripted_and_query() {
        let registry = builtin_registry().expect("registry");
        let pair_sum = ExerciseDetail::new(registry.get("pair-sum").expect("exists"), false);
        assert_eq!(pair_sum.defines.as_deref(), Some("twoSum(nums, target)"));
        assert!(pair_sum.solution.is_none());

        let sql = ExerciseDetail::new(registry.get("sql-total-sales").expect("exists"), true);
        assert_eq!(sql.kind, "query");
        assert!(sql.defines.is_none());
        assert!(sql.solution.is_some_and(|s| s.contains("SUM")));
    }

    #[test]
    fn test_verify_entry_serializes_flat() {
        let entry = VerifyEntry {
            key: "pair-sum",
            result: EvaluationResult::Passed,
        };
        assert_eq!(
            serde_json::to_string(&entry).expect("json"),
            r#"{"key":"pair-sum","status":"passed"}"#
        );
    }
}

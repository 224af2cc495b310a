//! Command-line entry points: run a case tree file, or print the plan it
//! expands to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::domain::{DefaultValueRecord, RunReport};
use crate::engine::expand::{expand_with_defaults, Step};
use crate::engine::report::{ConsoleSink, Reporter};
use crate::engine::{verify, CaseExecutor, Engine, Registry, RunAggregator};
use crate::store;

#[derive(Parser, Debug)]
#[command(name = "casetree", version, about = "Runs declarative HTTP test-case trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand a case tree and run every case
    Run(RunArgs),
    /// Print the expanded plan without sending any request
    Plan(PlanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Case tree JSON file (one case object or a list of cases)
    pub tree: PathBuf,

    /// JSON object whose fields fill in anything a case leaves unset
    #[arg(short = 'd', long = "defaults")]
    pub defaults: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(short = 'r', long = "report")]
    pub report: Option<PathBuf>,

    /// Output format: text, json
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Case tree JSON file
    pub tree: PathBuf,

    /// Defaults merged into each case before its directives are read
    #[arg(short = 'd', long = "defaults")]
    pub defaults: Option<PathBuf>,
}

/// Output format for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Process exit codes for CI use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Passed,
    Failed,
    Error,
}

impl ExitStatus {
    pub fn from_report(report: &RunReport) -> Self {
        if report.failed == 0 {
            ExitStatus::Passed
        } else {
            ExitStatus::Failed
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Passed => 0,
            ExitStatus::Failed => 1,
            ExitStatus::Error => 2,
        }
    }
}

impl Command {
    pub fn verbosity(&self) -> u8 {
        match self {
            Command::Run(args) => args.verbose,
            Command::Plan(_) => 0,
        }
    }
}

/// `RUST_LOG` wins over this when set.
pub fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "casetree=info",
        1 => "casetree=debug",
        _ => "casetree=trace",
    }
}

pub async fn run(args: &RunArgs) -> anyhow::Result<RunReport> {
    let tree = store::load_tree(&args.tree)?;
    let defaults = load_defaults(args.defaults.as_deref())?;

    let mut registry = Registry::new();
    verify::register_builtin(&mut registry).context("Failed to register built-in verifiers")?;

    // JSON output owns stdout; banners move to stderr.
    let sink = ConsoleSink {
        stderr: args.format == OutputFormat::Json,
    };
    let executor = CaseExecutor::new(Arc::new(RunAggregator::new()))
        .with_registry(registry)
        .with_defaults(defaults)
        .with_reporter(Reporter::new(Arc::new(sink)));

    let report = Engine::new(executor)
        .run_fresh(&tree)
        .await
        .with_context(|| format!("Failed to run `{}`", args.tree.display()))?;

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if let Some(path) = &args.report {
        store::write_report(path, &report)?;
    }
    Ok(report)
}

/// One line per case, indented under the fan-out branch it belongs to.
pub fn plan(args: &PlanArgs) -> anyhow::Result<Vec<String>> {
    let tree = store::load_tree(&args.tree)?;
    let defaults = load_defaults(args.defaults.as_deref())?;
    let steps = expand_with_defaults(&tree, &defaults)
        .with_context(|| format!("Failed to expand `{}`", args.tree.display()))?;

    let mut lines = Vec::new();
    render_plan(&steps, 0, &mut lines);
    Ok(lines)
}

fn load_defaults(path: Option<&Path>) -> anyhow::Result<DefaultValueRecord> {
    match path {
        Some(path) => Ok(store::load_defaults(path)?),
        None => Ok(DefaultValueRecord::default()),
    }
}

fn render_plan(steps: &[Step], depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    for step in steps {
        match step {
            Step::Run(case) => lines.push(format!("{indent}{}", case.label())),
            Step::FanOut(branches) => {
                lines.push(format!("{indent}parallel x{}", branches.len()));
                for branch in branches {
                    render_plan(branch, depth + 1, lines);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tree(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("tree.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "casetree", "run", "tree.json", "-d", "defaults.json", "--format", "json", "-vv",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.tree, PathBuf::from("tree.json"));
        assert_eq!(args.defaults, Some(PathBuf::from("defaults.json")));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(log_filter(args.verbose), "casetree=trace");
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["casetree", "run", "t.json", "-f", "xml"]).is_err());
    }

    #[test]
    fn exit_status_follows_failures() {
        let mut report = RunReport {
            total: 2,
            passed: 2,
            skipped: 0,
            failed: 0,
            elapsed_ms: 0,
            cases: Vec::new(),
        };
        assert_eq!(ExitStatus::from_report(&report).code(), 0);
        report.failed = 1;
        assert_eq!(ExitStatus::from_report(&report).code(), 1);
        assert_eq!(ExitStatus::Error.code(), 2);
    }

    #[test]
    fn plan_shows_fan_out_branches() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tree(
            &dir,
            r#"[{"id":"a","description":"first"},{"id":"p","description":"par","parallel":2}]"#,
        );

        let lines = plan(&PlanArgs {
            tree: path,
            defaults: None,
        })
        .unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "a. first");
        assert_eq!(lines[1], "parallel x2");
        assert!(lines[2].starts_with("  p parallel=0 llid="));
        assert!(lines[3].starts_with("  p parallel=1 llid="));
    }

    #[test]
    fn plan_reads_directives_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let tree = write_tree(&dir, r#"[{"id":"a"}]"#);
        let defaults = dir.path().join("defaults.json");
        fs::write(&defaults, r#"{"repeats":2}"#).unwrap();

        let lines = plan(&PlanArgs {
            tree,
            defaults: Some(defaults),
        })
        .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a repeat=1 uuid="), "{}", lines[0]);
        assert!(lines[1].starts_with("a repeat=2 uuid="), "{}", lines[1]);
    }

    #[tokio::test]
    async fn skipped_tree_runs_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let tree = write_tree(&dir, r#"[{"id":"1","skipTest":true,"suppressMessage":true}]"#);
        let report_path = dir.path().join("report.json");

        let report = run(&RunArgs {
            tree,
            defaults: None,
            report: Some(report_path.clone()),
            format: OutputFormat::Text,
            verbose: 0,
        })
        .await
        .unwrap();

        assert_eq!((report.total, report.skipped, report.failed), (0, 1, 0));
        assert!(report_path.exists());
    }

    #[tokio::test]
    async fn malformed_directive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tree = write_tree(&dir, r#"[{"id":"1","repeats":"many"}]"#);

        let result = run(&RunArgs {
            tree,
            defaults: None,
            report: None,
            format: OutputFormat::Text,
            verbose: 0,
        })
        .await;
        assert!(result.is_err());
    }
}

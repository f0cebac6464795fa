use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use skipbench_analysis::AggregateReport;
use skipbench_runner::{SweepConfig, SweepSummary, HOST_MARKER_ENV};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "skipbench",
    version,
    about = "Sweep and aggregate benchmarks of concurrent key-value structures"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configuration point, then write averages and the manifest.
    Run {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Regenerate averages from existing raw logs.
    Aggregate {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Describe {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write a template sweep file.
    Init {
        #[arg(long, default_value = "sweep.yaml")]
        out: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            error!("{:#}", err);
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err)));
            }
            std::process::exit(1);
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run { config, json } => {
            let sweep_config = SweepConfig::load(&config)?;
            let marker = std::env::var(HOST_MARKER_ENV).ok();
            if skipbench_runner::needs_host_process(&sweep_config, marker.as_deref()) {
                let exe = std::env::current_exe()?;
                let args: Vec<OsString> = std::env::args_os().skip(1).collect();
                let status = skipbench_runner::run_in_host_process(&sweep_config, &exe, &args)?;
                std::process::exit(status.code().unwrap_or(1));
            }
            let mut invoker = skipbench_runner::load_native_invoker(&sweep_config)?;
            let result = skipbench_runner::run_and_aggregate(&sweep_config, &mut invoker)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "subject": result.sweep.subject_name,
                    "started_at": result.sweep.started_at.to_rfc3339(),
                    "finished_at": result.sweep.finished_at.to_rfc3339(),
                    "keys": result.sweep.keys.iter().map(|k| json!({
                        "key": k.key.to_string(),
                        "raw_path": k.raw_path.display().to_string(),
                        "rows_written": k.rows_written,
                        "integrity_warnings": k.integrity_warnings,
                    })).collect::<Vec<_>>(),
                    "aggregates": result.aggregates.iter().map(aggregate_to_json).collect::<Vec<_>>(),
                    "manifest": result.manifest_path.display().to_string(),
                })));
            }
            for outcome in &result.sweep.keys {
                println!(
                    "raw: {} ({} rows, {} integrity warnings)",
                    outcome.raw_path.display(),
                    outcome.rows_written,
                    outcome.integrity_warnings
                );
            }
            print_aggregates(&result.aggregates);
            println!("manifest: {}", result.manifest_path.display());
        }
        Commands::Aggregate { config, json } => {
            let sweep_config = SweepConfig::load(&config)?;
            let reports = skipbench_runner::aggregate_config(&sweep_config)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "aggregate",
                    "aggregates": reports.iter().map(aggregate_to_json).collect::<Vec<_>>(),
                })));
            }
            print_aggregates(&reports);
        }
        Commands::Describe { config, json } => {
            let sweep_config = SweepConfig::load(&config)?;
            let summary = skipbench_runner::describe_sweep(&sweep_config);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": summary_to_json(&summary),
                })));
            }
            print_summary(&summary);
        }
        Commands::Init { out, force } => {
            if !force && out.exists() {
                return Err(anyhow::anyhow!(
                    "init file already exists (use --force): {}",
                    out.display()
                ));
            }
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&out, SWEEP_TEMPLATE)?;
            println!("wrote: {}", out.display());
            println!("next: skipbench describe {}", out.display());
        }
    }
    Ok(None)
}

const SWEEP_TEMPLATE: &str = "\
subject:
  name: lock_free                      # directory name under output.base_dir
  library: build/library_lockfree.so   # relative to this file
  symbol: bench
  env:                                 # applied only to the subject host process
    OMP_STACKSIZE: 64k
sweep:
  threads: [1, 2, 4, 8, 10, 20, 40, 64]
  durations: [1, 5]
  mixes:                               # insert, delete, contains; sums to 100
    - [10, 10, 80]
    - [40, 40, 20]
  range_modes: [shared, disjoint]
  repetitions: 3
  key_range: [0, 100000]
  selection_strategy: 0                # 0 = random
  prefill_count: 0
  basic_testing: false
  seed: 42
output:
  base_dir: data
";

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\"}}}}"
        ),
    }
}

fn json_error(code: &str, message: String) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Aggregate { json, .. }
        | Commands::Describe { json, .. } => *json,
        Commands::Init { .. } => false,
    }
}

fn aggregate_to_json(report: &AggregateReport) -> Value {
    json!({
        "raw_path": report.raw_path.display().to_string(),
        "summary_path": report.summary_path.display().to_string(),
        "rows_read": report.rows_read,
        "rows_skipped": report.rows_skipped,
        "threads": report.summaries.iter().map(|s| s.threads).collect::<Vec<_>>(),
    })
}

fn print_aggregates(reports: &[AggregateReport]) {
    for report in reports {
        println!(
            "averages: {} ({} rows, {} skipped, {} thread groups)",
            report.summary_path.display(),
            report.rows_read,
            report.rows_skipped,
            report.summaries.len()
        );
    }
}

fn summary_to_json(summary: &SweepSummary) -> Value {
    json!({
        "subject": summary.subject_name,
        "library": summary.library.as_ref().map(|p| p.display().to_string()),
        "symbol": summary.symbol,
        "base_dir": summary.base_dir.display().to_string(),
        "keys": summary.keys,
        "points_per_key": summary.points_per_key,
        "repetitions": summary.repetitions,
        "total_invocations": summary.total_invocations,
        "sweep_order": summary.sweep_order,
        "raw_paths": summary.raw_paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        "subject_env": summary.env,
    })
}

fn print_summary(summary: &SweepSummary) {
    println!("subject: {}", summary.subject_name);
    match &summary.library {
        Some(library) => println!("library: {}", library.display()),
        None => println!("library: none"),
    }
    println!("symbol: {}", summary.symbol);
    println!("base_dir: {}", summary.base_dir.display());
    println!("keys: {}", summary.keys);
    println!("points_per_key: {}", summary.points_per_key);
    println!("repetitions: {}", summary.repetitions);
    println!("total_invocations: {}", summary.total_invocations);
    println!("sweep_order: {}", summary.sweep_order.join(" > "));
    for (k, v) in &summary.env {
        println!("subject_env: {}={}", k, v);
    }
    for path in &summary.raw_paths {
        println!("raw_path: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_template_loads_and_validates() {
        let dir = std::env::temp_dir().join(format!("skipbench_cli_template_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("sweep.yaml");
        std::fs::write(&path, SWEEP_TEMPLATE).expect("write template");
        let config = SweepConfig::load(&path).expect("template must be a valid sweep");
        assert_eq!(config.subject.name, "lock_free");
        assert_eq!(config.sweep.threads.len(), 8);
        assert_eq!(config.sweep.total_invocations(), 8 * 2 * 2 * 2 * 3);
        assert_eq!(config.output.base_dir, dir.join("data"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn json_mode_follows_flag() {
        let cli = Cli::parse_from(["skipbench", "describe", "sweep.yaml", "--json"]);
        assert!(command_json_mode(&cli.command));
        let cli = Cli::parse_from(["skipbench", "init"]);
        assert!(!command_json_mode(&cli.command));
    }
}

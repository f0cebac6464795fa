use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::{json, Value};
use skipbench_analysis::{aggregate, AggregateReport};
use skipbench_core::{atomic_write_json_pretty, canonical_json_digest, subject_dir};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod config;
pub mod host;
pub mod invoker;
pub mod sink;
pub mod sweep;

pub use config::{OutputConfig, SubjectConfig, SweepConfig, SweepPlan, SWEEP_ORDER};
pub use host::{
    host_command, host_environment, needs_host_process, run_in_host_process, HOST_MARKER_ENV,
    PASSTHROUGH_ENV,
};
pub use invoker::{call_entry, Invoker, NativeInvoker};
pub use sink::RawResultSink;
pub use sweep::{run_sweep, sweep_key, KeyOutcome, SweepReport};

#[derive(Debug)]
pub struct RunResult {
    pub sweep: SweepReport,
    pub aggregates: Vec<AggregateReport>,
    pub manifest_path: PathBuf,
}

#[derive(Debug)]
pub struct SweepSummary {
    pub subject_name: String,
    pub library: Option<PathBuf>,
    pub symbol: String,
    pub base_dir: PathBuf,
    pub keys: usize,
    pub points_per_key: usize,
    pub repetitions: u32,
    pub total_invocations: usize,
    pub sweep_order: Vec<&'static str>,
    pub raw_paths: Vec<PathBuf>,
    pub env: BTreeMap<String, String>,
}

pub fn describe_sweep(config: &SweepConfig) -> SweepSummary {
    let keys = config.sweep.storage_keys(&config.subject.name);
    SweepSummary {
        subject_name: config.subject.name.clone(),
        library: config.subject.library.clone(),
        symbol: config.subject.symbol.clone(),
        base_dir: config.output.base_dir.clone(),
        keys: keys.len(),
        points_per_key: config.sweep.threads.len(),
        repetitions: config.sweep.repetitions,
        total_invocations: config.sweep.total_invocations(),
        sweep_order: SWEEP_ORDER.to_vec(),
        raw_paths: keys
            .iter()
            .map(|k| k.raw_log_path(&config.output.base_dir))
            .collect(),
        env: config.subject.env.clone(),
    }
}

pub fn load_native_invoker(config: &SweepConfig) -> Result<NativeInvoker> {
    let library = config
        .subject
        .library
        .as_ref()
        .ok_or_else(|| anyhow!("subject.library is required to run a native sweep"))?;
    Ok(NativeInvoker::load(library, &config.subject.symbol)?)
}

/// Runs the full sweep, then averages every key and records the manifest.
pub fn run_and_aggregate<I: Invoker + ?Sized>(
    config: &SweepConfig,
    invoker: &mut I,
) -> Result<RunResult> {
    config.validate()?;
    let base_dir = &config.output.base_dir;
    let sweep = run_sweep(&config.subject.name, &config.sweep, base_dir, invoker)?;
    let mut aggregates = Vec::with_capacity(sweep.keys.len());
    for outcome in &sweep.keys {
        aggregates.push(aggregate(&outcome.key, base_dir)?);
    }
    let manifest_path = write_sweep_manifest(config, &sweep, &aggregates)?;
    Ok(RunResult {
        sweep,
        aggregates,
        manifest_path,
    })
}

/// Regenerates summaries from whatever raw logs exist for `config`.
pub fn aggregate_config(config: &SweepConfig) -> Result<Vec<AggregateReport>> {
    let base_dir = &config.output.base_dir;
    let mut reports = Vec::new();
    for key in config.sweep.storage_keys(&config.subject.name) {
        let report =
            aggregate(&key, base_dir).map_err(|e| anyhow!("aggregation failed for {}: {}", key, e))?;
        reports.push(report);
    }
    Ok(reports)
}

pub fn manifest_path(config: &SweepConfig) -> PathBuf {
    subject_dir(&config.output.base_dir, &config.subject.name).join("sweep_manifest.json")
}

pub fn write_sweep_manifest(
    config: &SweepConfig,
    sweep: &SweepReport,
    aggregates: &[AggregateReport],
) -> Result<PathBuf> {
    let resolved = serde_json::to_value(config)?;
    let digest = canonical_json_digest(&resolved);
    let keys: Vec<Value> = sweep
        .keys
        .iter()
        .map(|outcome| {
            let aggregate = aggregates
                .iter()
                .find(|a| a.raw_path == outcome.raw_path);
            json!({
                "key": outcome.key.to_string(),
                "raw_path": display_relative(&outcome.raw_path, &config.output.base_dir),
                "rows_written": outcome.rows_written,
                "integrity_warnings": outcome.integrity_warnings,
                "summary_path": aggregate.map(|a| display_relative(&a.summary_path, &config.output.base_dir)),
                "rows_skipped": aggregate.map(|a| a.rows_skipped),
                "thread_groups": aggregate.map(|a| a.summaries.len()),
            })
        })
        .collect();
    let manifest = json!({
        "schema_version": "sweep_manifest_v1",
        "subject": config.subject.name,
        "runner_version": concat!("rust-", env!("CARGO_PKG_VERSION")),
        "started_at": sweep.started_at.to_rfc3339(),
        "finished_at": sweep.finished_at.to_rfc3339(),
        "written_at": Utc::now().to_rfc3339(),
        "sweep_order": SWEEP_ORDER,
        "resolved_config": resolved,
        "resolved_config_digest": digest,
        "keys": keys,
    });
    let path = manifest_path(config);
    atomic_write_json_pretty(&path, &manifest)?;
    info!("sweep manifest written to {}", path.display());
    Ok(path)
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

use chrono::{DateTime, Utc};
use skipbench_core::{HarnessError, HarnessResult, StorageKey};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::SweepPlan;
use crate::invoker::Invoker;
use crate::sink::RawResultSink;

#[derive(Debug, Clone)]
pub struct KeyOutcome {
    pub key: StorageKey,
    pub raw_path: PathBuf,
    pub rows_written: usize,
    pub integrity_warnings: usize,
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub subject_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub keys: Vec<KeyOutcome>,
}

/// Runs every key of `plan` in sweep order, strictly sequentially.
///
/// The first invocation failure aborts the sweep; rows already appended for
/// the failing key stay on disk.
pub fn run_sweep<I: Invoker + ?Sized>(
    subject_name: &str,
    plan: &SweepPlan,
    base_dir: &Path,
    invoker: &mut I,
) -> HarnessResult<SweepReport> {
    let started_at = Utc::now();
    let keys = plan.storage_keys(subject_name);
    info!(
        subject = subject_name,
        keys = keys.len(),
        invocations = plan.total_invocations(),
        "starting sweep"
    );
    let mut outcomes = Vec::with_capacity(keys.len());
    for key in keys {
        outcomes.push(sweep_key(&key, plan, base_dir, invoker)?);
    }
    Ok(SweepReport {
        subject_name: subject_name.to_string(),
        started_at,
        finished_at: Utc::now(),
        keys: outcomes,
    })
}

/// Performs `plan.repetitions` invocations per thread count for one key,
/// handing each record to the sink before the next call starts.
pub fn sweep_key<I: Invoker + ?Sized>(
    key: &StorageKey,
    plan: &SweepPlan,
    base_dir: &Path,
    invoker: &mut I,
) -> HarnessResult<KeyOutcome> {
    let mut sink = RawResultSink::open(key, base_dir)?;
    let mut integrity_warnings = 0usize;
    for point in plan.points_for(key) {
        for repetition in 0..plan.repetitions {
            debug!(key = %key, point = %point, repetition, "invocation");
            let record = invoker
                .invoke(&point)
                .map_err(|source| HarnessError::Invocation {
                    key: key.to_string(),
                    point: format!("{} repetition={}", point, repetition),
                    source,
                })?;
            for warning in record.integrity_warnings() {
                integrity_warnings += 1;
                warn!(key = %key, point = %point, repetition, "data integrity: {}", warning);
            }
            sink.append(&point, repetition, &record)?;
        }
    }
    Ok(KeyOutcome {
        key: key.clone(),
        raw_path: sink.path().to_path_buf(),
        rows_written: sink.rows_written(),
        integrity_warnings,
    })
}

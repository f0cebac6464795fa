pub mod error;
pub mod naming;
pub mod point;
pub mod record;
pub mod rows;

pub use error::{HarnessError, HarnessResult, InvocationError};
pub use naming::{sanitize_subject_name, subject_dir, StorageKey};
pub use point::{ConfigurationPoint, KeyRange, OperationMix, RangeMode};
pub use record::{
    BenchEntryFn, DataIntegrityWarning, RawBenchResult, ResultRecord, WorkerCounts,
    WORKER_CAPACITY,
};
pub use rows::{RawRow, SummaryRow, RAW_LOG_HEADER, SUMMARY_HEADER};

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest over the compact serialization; object keys are already sorted.
pub fn canonical_json_digest(value: &Value) -> String {
    sha256_bytes(value.to_string().as_bytes())
}

/// Writes through a sibling temp file, fsyncs, then renames into place.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

pub fn atomic_write_json_pretty(path: &Path, value: &Value) -> HarnessResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)?;
    Ok(())
}

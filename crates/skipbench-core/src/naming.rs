use std::fmt;
use std::path::{Path, PathBuf};

use crate::point::{OperationMix, RangeMode};

/// Identifies one raw log and its summary. Sink and aggregator both derive
/// their paths from this key, so it is the join between the two artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageKey {
    pub subject_name: String,
    pub mix: OperationMix,
    pub range_mode: RangeMode,
    pub run_duration_sec: u32,
    pub thread_cardinality: usize,
}

impl StorageKey {
    pub fn new(
        subject_name: &str,
        mix: OperationMix,
        range_mode: RangeMode,
        run_duration_sec: u32,
        thread_cardinality: usize,
    ) -> Self {
        Self {
            subject_name: sanitize_subject_name(subject_name),
            mix,
            range_mode,
            run_duration_sec,
            thread_cardinality,
        }
    }

    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.subject_name).join(format!(
            "{}_{}",
            self.mix.label(),
            self.range_mode.as_str()
        ))
    }

    pub fn raw_log_path(&self, base_dir: &Path) -> PathBuf {
        base_dir
            .join(self.relative_dir())
            .join(format!("{}.csv", self.stem()))
    }

    pub fn summary_path(&self, base_dir: &Path) -> PathBuf {
        base_dir
            .join(self.relative_dir())
            .join(format!("{}_averages.csv", self.stem()))
    }

    fn stem(&self) -> String {
        format!(
            "{}s_{}threads",
            self.run_duration_sec, self.thread_cardinality
        )
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}_{}/{}",
            self.subject_name,
            self.mix.label(),
            self.range_mode.as_str(),
            self.stem()
        )
    }
}

pub fn sanitize_subject_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Directory holding every key of one subject; the sweep manifest lives here.
pub fn subject_dir(base_dir: &Path, subject_name: &str) -> PathBuf {
    base_dir.join(sanitize_subject_name(subject_name))
}

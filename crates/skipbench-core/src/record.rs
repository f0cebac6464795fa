use std::fmt;
use std::os::raw::c_int;

use crate::error::InvocationError;

/// Declared capacity of the per-worker counter array in the foreign record.
pub const WORKER_CAPACITY: usize = 64;

/// Per-worker operation counts backed by the fixed-capacity ABI buffer.
///
/// Only the first `len` slots are meaningful. Trailing capacity is never
/// exposed, so consumers cannot aggregate stale or uninitialised counters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WorkerCounts {
    len: usize,
    slots: [u64; WORKER_CAPACITY],
}

impl WorkerCounts {
    pub fn from_slice(values: &[u64]) -> Option<Self> {
        if values.len() > WORKER_CAPACITY {
            return None;
        }
        let mut slots = [0u64; WORKER_CAPACITY];
        slots[..values.len()].copy_from_slice(values);
        Some(Self {
            len: values.len(),
            slots,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.slots[..self.len]
    }
}

impl fmt::Debug for WorkerCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Outcome of one invocation of the measured subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub elapsed_time_sec: f64,
    pub total_operations: u64,
    pub total_inserts: u64,
    pub successful_inserts: u64,
    pub total_deletes: u64,
    pub successful_deletes: u64,
    pub total_contains: u64,
    pub successful_contains: u64,
    pub correctness: Option<bool>,
    pub per_worker: Option<WorkerCounts>,
}

impl ResultRecord {
    /// Reports every operation kind whose successful count exceeds its total.
    /// The record itself is left untouched.
    pub fn integrity_warnings(&self) -> Vec<DataIntegrityWarning> {
        [
            ("inserts", self.successful_inserts, self.total_inserts),
            ("deletes", self.successful_deletes, self.total_deletes),
            ("contains", self.successful_contains, self.total_contains),
        ]
        .into_iter()
        .filter(|(_, successful, total)| successful > total)
        .map(|(operation, successful, total)| DataIntegrityWarning {
            operation,
            successful,
            total,
        })
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIntegrityWarning {
    pub operation: &'static str,
    pub successful: u64,
    pub total: u64,
}

impl fmt::Display for DataIntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "successful_{} ({}) exceeds total_{} ({})",
            self.operation, self.successful, self.operation, self.total
        )
    }
}

/// Byte layout of the record returned by the subject's `bench` entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawBenchResult {
    pub time: f32,
    pub total_operations: i64,
    pub total_inserts: i64,
    pub successful_inserts: i64,
    pub total_deletes: i64,
    pub successful_deletes: i64,
    pub total_contains: i64,
    pub successful_contains: i64,
    pub basic_correctness_test_success: c_int,
    pub operations_per_thread: [i64; WORKER_CAPACITY],
}

/// `bench(threads, seconds, insert%, delete%, contains%, lower, upper,
/// disjoint, selection_strategy, prefill_count, basic_testing, seed)`
pub type BenchEntryFn = unsafe extern "C" fn(
    c_int,
    c_int,
    f32,
    f32,
    f32,
    c_int,
    c_int,
    c_int,
    c_int,
    c_int,
    c_int,
    c_int,
) -> RawBenchResult;

impl RawBenchResult {
    pub fn zeroed() -> Self {
        Self {
            time: 0.0,
            total_operations: 0,
            total_inserts: 0,
            successful_inserts: 0,
            total_deletes: 0,
            successful_deletes: 0,
            total_contains: 0,
            successful_contains: 0,
            basic_correctness_test_success: 0,
            operations_per_thread: [0; WORKER_CAPACITY],
        }
    }

    /// Converts the foreign record, keeping exactly `thread_count` worker slots.
    pub fn into_record(
        self,
        thread_count: u32,
        basic_testing: bool,
    ) -> Result<ResultRecord, InvocationError> {
        let active = thread_count as usize;
        if active > WORKER_CAPACITY {
            return Err(InvocationError::ImpossibleRecord(format!(
                "thread count {} exceeds worker capacity {}",
                thread_count, WORKER_CAPACITY
            )));
        }
        if !self.time.is_finite() || self.time < 0.0 {
            return Err(InvocationError::Abnormal(format!(
                "subject reported elapsed time {}",
                self.time
            )));
        }
        let mut workers = [0u64; WORKER_CAPACITY];
        for (idx, value) in self.operations_per_thread[..active].iter().enumerate() {
            workers[idx] = counter("operations_per_thread", *value)?;
        }
        Ok(ResultRecord {
            elapsed_time_sec: f64::from(self.time),
            total_operations: counter("total_operations", self.total_operations)?,
            total_inserts: counter("total_inserts", self.total_inserts)?,
            successful_inserts: counter("successful_inserts", self.successful_inserts)?,
            total_deletes: counter("total_deletes", self.total_deletes)?,
            successful_deletes: counter("successful_deletes", self.successful_deletes)?,
            total_contains: counter("total_contains", self.total_contains)?,
            successful_contains: counter("successful_contains", self.successful_contains)?,
            correctness: basic_testing.then_some(self.basic_correctness_test_success != 0),
            per_worker: WorkerCounts::from_slice(&workers[..active]),
        })
    }
}

fn counter(field: &str, value: i64) -> Result<u64, InvocationError> {
    u64::try_from(value).map_err(|_| {
        InvocationError::ImpossibleRecord(format!("negative {} ({})", field, value))
    })
}

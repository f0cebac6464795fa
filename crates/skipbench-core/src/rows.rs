use serde::{Deserialize, Serialize};

use crate::point::ConfigurationPoint;
use crate::record::ResultRecord;

pub const RAW_LOG_HEADER: [&str; 13] = [
    "threads",
    "repetition",
    "prefill_count",
    "time",
    "total_inserts",
    "successful_inserts",
    "total_deletes",
    "successful_deletes",
    "total_contains",
    "successful_contains",
    "total_operations",
    "basic_correctness_test_success",
    "operations_per_thread",
];

pub const SUMMARY_HEADER: [&str; 11] = [
    "threads",
    "time",
    "total_inserts",
    "successful_inserts",
    "total_deletes",
    "successful_deletes",
    "total_contains",
    "successful_contains",
    "total_operations",
    "basic_correctness_test_success",
    "average_operations_per_thread",
];

/// One repetition as stored in a raw log. Field order matches `RAW_LOG_HEADER`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub threads: u32,
    pub repetition: u32,
    pub prefill_count: u32,
    pub time: f64,
    pub total_inserts: u64,
    pub successful_inserts: u64,
    pub total_deletes: u64,
    pub successful_deletes: u64,
    pub total_contains: u64,
    pub successful_contains: u64,
    pub total_operations: u64,
    pub basic_correctness_test_success: Option<bool>,
    /// Bracketed list truncated to `threads` entries, empty when not reported.
    pub operations_per_thread: String,
}

impl RawRow {
    pub fn new(
        point: &ConfigurationPoint,
        repetition: u32,
        record: &ResultRecord,
    ) -> Result<Self, serde_json::Error> {
        let operations_per_thread = match &record.per_worker {
            Some(workers) => serde_json::to_string(workers.as_slice())?,
            None => String::new(),
        };
        Ok(Self {
            threads: point.thread_count,
            repetition,
            prefill_count: point.prefill_count,
            time: record.elapsed_time_sec,
            total_inserts: record.total_inserts,
            successful_inserts: record.successful_inserts,
            total_deletes: record.total_deletes,
            successful_deletes: record.successful_deletes,
            total_contains: record.total_contains,
            successful_contains: record.successful_contains,
            total_operations: record.total_operations,
            basic_correctness_test_success: record.correctness,
            operations_per_thread,
        })
    }

    pub fn per_worker(&self) -> Result<Option<Vec<u64>>, serde_json::Error> {
        let cell = self.operations_per_thread.trim();
        if cell.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(cell).map(Some)
    }
}

/// One averaged thread-count group. Field order matches `SUMMARY_HEADER`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub threads: u32,
    pub time: f64,
    pub total_inserts: f64,
    pub successful_inserts: f64,
    pub total_deletes: f64,
    pub successful_deletes: f64,
    pub total_contains: f64,
    pub successful_contains: f64,
    pub total_operations: f64,
    pub basic_correctness_test_success: Option<bool>,
    pub average_operations_per_thread: String,
}

impl SummaryRow {
    pub fn average_per_worker(&self) -> Result<Option<Vec<f64>>, serde_json::Error> {
        let cell = self.average_operations_per_thread.trim();
        if cell.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(cell).map(Some)
    }
}

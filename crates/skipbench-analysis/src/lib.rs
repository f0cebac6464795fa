use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use skipbench_core::{
    atomic_write_bytes, HarnessError, HarnessResult, RawRow, StorageKey, SummaryRow,
    SUMMARY_HEADER,
};
use std::collections::BTreeMap;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Mean of every repetition observed for one thread count.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub threads: u32,
    pub repetitions: usize,
    pub time: f64,
    pub total_operations: f64,
    pub total_inserts: f64,
    pub successful_inserts: f64,
    pub total_deletes: f64,
    pub successful_deletes: f64,
    pub total_contains: f64,
    pub successful_contains: f64,
    /// `None` when no repetition reported a flag.
    pub correctness: Option<bool>,
    pub average_per_worker: Option<Vec<f64>>,
}

impl SummaryRecord {
    pub fn to_row(&self) -> HarnessResult<SummaryRow> {
        let average_operations_per_thread = match &self.average_per_worker {
            Some(values) => serde_json::to_string(values)?,
            None => String::new(),
        };
        Ok(SummaryRow {
            threads: self.threads,
            time: self.time,
            total_inserts: self.total_inserts,
            successful_inserts: self.successful_inserts,
            total_deletes: self.total_deletes,
            successful_deletes: self.successful_deletes,
            total_contains: self.total_contains,
            successful_contains: self.successful_contains,
            total_operations: self.total_operations,
            basic_correctness_test_success: self.correctness,
            average_operations_per_thread,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub raw_path: PathBuf,
    pub summary_path: PathBuf,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub summaries: Vec<SummaryRecord>,
}

#[derive(Debug, Default)]
struct GroupAccumulator {
    threads: u32,
    rows: usize,
    time: f64,
    total_operations: u128,
    total_inserts: u128,
    successful_inserts: u128,
    total_deletes: u128,
    successful_deletes: u128,
    total_contains: u128,
    successful_contains: u128,
    flags_reported: usize,
    flags_true: usize,
    worker_rows: usize,
    worker_sums: Vec<u128>,
}

impl GroupAccumulator {
    fn new(threads: u32) -> Self {
        Self {
            threads,
            worker_sums: vec![0; threads as usize],
            ..Default::default()
        }
    }

    fn add(&mut self, row: &RawRow, workers: Option<&[u64]>) {
        self.rows += 1;
        self.time += row.time;
        self.total_operations += u128::from(row.total_operations);
        self.total_inserts += u128::from(row.total_inserts);
        self.successful_inserts += u128::from(row.successful_inserts);
        self.total_deletes += u128::from(row.total_deletes);
        self.successful_deletes += u128::from(row.successful_deletes);
        self.total_contains += u128::from(row.total_contains);
        self.successful_contains += u128::from(row.successful_contains);
        if let Some(flag) = row.basic_correctness_test_success {
            self.flags_reported += 1;
            if flag {
                self.flags_true += 1;
            }
        }
        if let Some(workers) = workers {
            self.worker_rows += 1;
            for (sum, value) in self.worker_sums.iter_mut().zip(workers) {
                *sum += u128::from(*value);
            }
        }
    }

    fn finish(self) -> SummaryRecord {
        let n = self.rows as f64;
        let mean = |sum: u128| sum as f64 / n;
        let correctness = if self.flags_reported == 0 {
            None
        } else {
            Some(self.flags_true == self.rows)
        };
        let average_per_worker = if self.worker_rows == 0 {
            None
        } else {
            let w = self.worker_rows as f64;
            Some(self.worker_sums.iter().map(|s| *s as f64 / w).collect())
        };
        SummaryRecord {
            threads: self.threads,
            repetitions: self.rows,
            time: self.time / n,
            total_operations: mean(self.total_operations),
            total_inserts: mean(self.total_inserts),
            successful_inserts: mean(self.successful_inserts),
            total_deletes: mean(self.total_deletes),
            successful_deletes: mean(self.successful_deletes),
            total_contains: mean(self.total_contains),
            successful_contains: mean(self.successful_contains),
            correctness,
            average_per_worker,
        }
    }
}

pub struct RawLogReduction {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub summaries: Vec<SummaryRecord>,
}

/// Streams a raw log and averages repetitions per thread count.
///
/// Each group divides by the rows actually present for it. Rows that cannot
/// be decoded, or whose worker array length disagrees with `threads`, are
/// logged and skipped.
pub fn reduce_raw_log(raw_path: &Path) -> HarnessResult<RawLogReduction> {
    let file = match fs::File::open(raw_path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarnessError::MissingRawLog {
                path: raw_path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));
    let headers = reader.byte_headers()?.clone();

    let mut groups: BTreeMap<u32, GroupAccumulator> = BTreeMap::new();
    let mut rows_read = 0usize;
    let mut rows_skipped = 0usize;
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        rows_read += 1;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        match decode_row(&record, &headers) {
            Ok((row, workers)) => groups
                .entry(row.threads)
                .or_insert_with(|| GroupAccumulator::new(row.threads))
                .add(&row, workers.as_deref()),
            Err(reason) => {
                rows_skipped += 1;
                let err = HarnessError::MalformedRow { line, reason };
                warn!(path = %raw_path.display(), "{}; row skipped", err);
            }
        }
    }

    if rows_read == 0 {
        return Err(HarnessError::MissingRawLog {
            path: raw_path.to_path_buf(),
        });
    }

    Ok(RawLogReduction {
        rows_read,
        rows_skipped,
        summaries: groups.into_values().map(GroupAccumulator::finish).collect(),
    })
}

fn decode_row(
    record: &ByteRecord,
    headers: &ByteRecord,
) -> Result<(RawRow, Option<Vec<u64>>), String> {
    let row: RawRow = record
        .deserialize(Some(headers))
        .map_err(|e| e.to_string())?;
    if row.threads == 0 {
        return Err("threads must be positive".to_string());
    }
    let workers = row
        .per_worker()
        .map_err(|e| format!("unreadable operations_per_thread: {}", e))?;
    if let Some(values) = &workers {
        if values.len() != row.threads as usize {
            return Err(format!(
                "operations_per_thread has {} entries for {} threads",
                values.len(),
                row.threads
            ));
        }
    }
    Ok((row, workers))
}

pub fn render_summary(summaries: &[SummaryRecord]) -> HarnessResult<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(SUMMARY_HEADER)?;
    for summary in summaries {
        writer.serialize(summary.to_row()?)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

pub fn write_summary(summary_path: &Path, summaries: &[SummaryRecord]) -> HarnessResult<()> {
    let bytes = render_summary(summaries)?;
    atomic_write_bytes(summary_path, &bytes)?;
    Ok(())
}

/// Reduces the raw log for `key` and writes its averages artifact.
pub fn aggregate(key: &StorageKey, base_dir: &Path) -> HarnessResult<AggregateReport> {
    let raw_path = key.raw_log_path(base_dir);
    let summary_path = key.summary_path(base_dir);
    let reduction = reduce_raw_log(&raw_path)?;
    write_summary(&summary_path, &reduction.summaries)?;
    info!(
        key = %key,
        rows = reduction.rows_read,
        skipped = reduction.rows_skipped,
        groups = reduction.summaries.len(),
        "averaged data written to {}",
        summary_path.display()
    );
    Ok(AggregateReport {
        raw_path,
        summary_path,
        rows_read: reduction.rows_read,
        rows_skipped: reduction.rows_skipped,
        summaries: reduction.summaries,
    })
}

pub fn read_summary(summary_path: &Path) -> HarnessResult<Vec<SummaryRow>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(summary_path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skipbench_core::{OperationMix, RangeMode, RAW_LOG_HEADER};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "skipbench_analysis_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn key(threads: usize) -> StorageKey {
        StorageKey::new(
            "stub",
            OperationMix::new(10.0, 10.0, 80.0).unwrap(),
            RangeMode::Shared,
            1,
            threads,
        )
    }

    fn write_raw(path: &Path, lines: &[&str]) {
        let mut text = RAW_LOG_HEADER.join(",");
        text.push('\n');
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn per_worker_average_is_positional() {
        let dir = scratch_dir("positional");
        let raw = dir.join("raw.csv");
        write_raw(
            &raw,
            &[
                "3,0,0,1.0,10,10,10,10,40,40,60,true,\"[10,20,30]\"",
                "3,1,0,1.0,10,10,10,10,40,40,60,true,\"[20,10,10]\"",
            ],
        );
        let reduction = reduce_raw_log(&raw).expect("reduce");
        assert_eq!(reduction.summaries.len(), 1);
        assert_eq!(
            reduction.summaries[0].average_per_worker,
            Some(vec![15.0, 15.0, 20.0])
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn correctness_is_logical_and_across_repetitions() {
        let dir = scratch_dir("and");
        let raw = dir.join("raw.csv");
        write_raw(
            &raw,
            &[
                "1,0,0,1.0,1,1,1,1,1,1,3,true,[5]",
                "1,1,0,1.0,1,1,1,1,1,1,3,true,[5]",
                "1,2,0,1.0,1,1,1,1,1,1,3,false,[5]",
                "2,0,0,1.0,1,1,1,1,1,1,3,true,\"[5,5]\"",
                "4,0,0,1.0,1,1,1,1,1,1,3,,",
            ],
        );
        let summaries = reduce_raw_log(&raw).expect("reduce").summaries;
        assert_eq!(summaries[0].correctness, Some(false));
        assert_eq!(summaries[1].correctness, Some(true));
        assert_eq!(summaries[2].correctness, None);
        assert_eq!(summaries[2].average_per_worker, None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn groups_divide_by_observed_rows_and_sort_ascending() {
        let dir = scratch_dir("groups");
        let raw = dir.join("raw.csv");
        write_raw(
            &raw,
            &[
                "8,0,0,2.0,0,0,0,0,0,0,800,,",
                "2,0,0,1.0,0,0,0,0,0,0,100,,",
                "2,1,0,3.0,0,0,0,0,0,0,300,,",
                "8,1,0,4.0,0,0,0,0,0,0,400,,",
                "2,2,0,2.0,0,0,0,0,0,0,200,,",
            ],
        );
        let summaries = reduce_raw_log(&raw).expect("reduce").summaries;
        let threads: Vec<u32> = summaries.iter().map(|s| s.threads).collect();
        assert_eq!(threads, vec![2, 8]);
        assert_eq!(summaries[0].repetitions, 3);
        assert_eq!(summaries[0].time, 2.0);
        assert_eq!(summaries[0].total_operations, 200.0);
        assert_eq!(summaries[1].repetitions, 2);
        assert_eq!(summaries[1].total_operations, 600.0);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let dir = scratch_dir("malformed");
        let raw = dir.join("raw.csv");
        write_raw(
            &raw,
            &[
                "3,0,0,1.0,10,5,10,5,10,5,30,true,\"[1,2]\"",
                "3,1,0,oops,10,5,10,5,10,5,30,true,\"[1,2,3]\"",
                "3,2,0,1.0,10,5,10,5,10,5,30,true,[1;2;3]",
                "3,3,0,1.0,10,5",
                "0,0,0,1.0,10,5,10,5,10,5,30,true,",
                "3,4,0,1.0,10,5,10,5,10,5,30,true,\"[3,3,3]\"",
            ],
        );
        let reduction = reduce_raw_log(&raw).expect("reduce");
        assert_eq!(reduction.rows_read, 6);
        assert_eq!(reduction.rows_skipped, 5);
        assert_eq!(reduction.summaries.len(), 1);
        assert_eq!(reduction.summaries[0].repetitions, 1);
        assert_eq!(
            reduction.summaries[0].average_per_worker,
            Some(vec![3.0, 3.0, 3.0])
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn success_above_total_passes_through_unclamped() {
        let dir = scratch_dir("unclamped");
        let raw = dir.join("raw.csv");
        write_raw(
            &raw,
            &[
                "1,0,0,1.0,10,12,10,10,10,10,30,,",
                "1,1,0,1.0,10,14,10,10,10,10,30,,",
            ],
        );
        let summary = &reduce_raw_log(&raw).expect("reduce").summaries[0];
        assert_eq!(summary.total_inserts, 10.0);
        assert_eq!(summary.successful_inserts, 13.0);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_or_empty_raw_log_is_reported_without_summary() {
        let base = scratch_dir("missing");
        let k = key(2);
        let err = aggregate(&k, &base).expect_err("no raw log");
        assert!(matches!(err, HarnessError::MissingRawLog { .. }));
        assert!(!k.summary_path(&base).exists());

        write_raw(&k.raw_log_path(&base), &[]);
        let err = aggregate(&k, &base).expect_err("header only");
        assert!(matches!(err, HarnessError::MissingRawLog { .. }));
        assert!(!k.summary_path(&base).exists());
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn aggregate_is_byte_stable_across_reruns() {
        let base = scratch_dir("idempotent");
        let k = key(2);
        write_raw(
            &k.raw_log_path(&base),
            &[
                "1,0,0,0.5,5,4,5,4,90,80,100,true,[100]",
                "1,1,0,1.5,7,6,5,5,88,70,100,true,[100]",
                "2,0,0,1.0,9,9,9,9,9,9,27,false,\"[13,14]\"",
            ],
        );
        let report = aggregate(&k, &base).expect("first pass");
        let first = fs::read(&report.summary_path).unwrap();
        aggregate(&k, &base).expect("second pass");
        let second = fs::read(&report.summary_path).unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(first).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), SUMMARY_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "1,1.0,6.0,5.0,5.0,4.5,89.0,75.0,100.0,true,[100.0]"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2,1.0,9.0,9.0,9.0,9.0,9.0,9.0,27.0,false,\"[13.0,14.0]\""
        );

        let rows = read_summary(&report.summary_path).unwrap();
        assert_eq!(rows[1].average_per_worker().unwrap(), Some(vec![13.0, 14.0]));
        let _ = fs::remove_dir_all(base);
    }
}

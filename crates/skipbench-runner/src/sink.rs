use csv::{Writer, WriterBuilder};
use skipbench_core::{
    ensure_dir, ConfigurationPoint, HarnessResult, RawRow, ResultRecord, StorageKey,
    RAW_LOG_HEADER,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Append-only raw log for one storage key.
///
/// Opening truncates any earlier log under the same key. Every append is
/// flushed and synced before returning, so a crash after N appends leaves
/// exactly N readable rows.
pub struct RawResultSink {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl RawResultSink {
    pub fn open(key: &StorageKey, base_dir: &Path) -> HarnessResult<Self> {
        let path = key.raw_log_path(base_dir);
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let file = File::create(&path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(RAW_LOG_HEADER)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        info!(key = %key, "saving results to {}", path.display());
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn append(
        &mut self,
        point: &ConfigurationPoint,
        repetition: u32,
        record: &ResultRecord,
    ) -> HarnessResult<()> {
        let row = RawRow::new(point, repetition, record)?;
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }
}

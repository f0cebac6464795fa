use libloading::Library;
use skipbench_core::{
    BenchEntryFn, ConfigurationPoint, InvocationError, ResultRecord, WORKER_CAPACITY,
};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One blocking, single-shot call into the measured subject.
///
/// Implementations never retry; repetitions are the sweep's concern.
pub trait Invoker {
    fn invoke(&mut self, point: &ConfigurationPoint) -> Result<ResultRecord, InvocationError>;
}

impl<T: Invoker + ?Sized> Invoker for Box<T> {
    fn invoke(&mut self, point: &ConfigurationPoint) -> Result<ResultRecord, InvocationError> {
        (**self).invoke(point)
    }
}

/// Calls the `bench` entry point of a shared library.
pub struct NativeInvoker {
    entry: BenchEntryFn,
    library_path: PathBuf,
    // Keeps `entry` mapped; must outlive every call.
    _library: Library,
}

impl NativeInvoker {
    pub fn load(library_path: &Path, symbol: &str) -> Result<Self, InvocationError> {
        let library = unsafe { Library::new(library_path) }.map_err(|e| {
            InvocationError::Unavailable(format!(
                "failed to load {}: {}",
                library_path.display(),
                e
            ))
        })?;
        let entry = unsafe { library.get::<BenchEntryFn>(symbol.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|e| {
                InvocationError::Unavailable(format!(
                    "missing entry point '{}' in {}: {}",
                    symbol,
                    library_path.display(),
                    e
                ))
            })?;
        Ok(Self {
            entry,
            library_path: library_path.to_path_buf(),
            _library: library,
        })
    }

    pub fn library_path(&self) -> &Path {
        &self.library_path
    }
}

impl Invoker for NativeInvoker {
    fn invoke(&mut self, point: &ConfigurationPoint) -> Result<ResultRecord, InvocationError> {
        debug!(point = %point, library = %self.library_path.display(), "invoking subject");
        call_entry(self.entry, point)
    }
}

/// Marshals `point` into the entry point's argument list and converts the
/// returned record. The subject writes one worker slot per thread, so counts
/// beyond `WORKER_CAPACITY` are refused before the call.
pub fn call_entry(
    entry: BenchEntryFn,
    point: &ConfigurationPoint,
) -> Result<ResultRecord, InvocationError> {
    if point.thread_count as usize > WORKER_CAPACITY {
        return Err(InvocationError::InvalidArgument(format!(
            "thread_count = {} exceeds worker capacity {}",
            point.thread_count, WORKER_CAPACITY
        )));
    }
    let threads = abi_int("thread_count", point.thread_count)?;
    let duration = abi_int("run_duration_sec", point.run_duration_sec)?;
    let prefill = abi_int("prefill_count", point.prefill_count)?;
    let raw = unsafe {
        entry(
            threads,
            duration,
            point.mix.insert_pct as f32,
            point.mix.delete_pct as f32,
            point.mix.contains_pct as f32,
            point.key_range.lower,
            point.key_range.upper,
            point.range_mode.abi_flag(),
            point.selection_strategy,
            prefill,
            c_int::from(point.basic_testing),
            point.seed,
        )
    };
    raw.into_record(point.thread_count, point.basic_testing)
}

fn abi_int(name: &str, value: u32) -> Result<c_int, InvocationError> {
    c_int::try_from(value)
        .map_err(|_| InvocationError::InvalidArgument(format!("{} = {}", name, value)))
}

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use skipbench_core::{
    ConfigurationPoint, HarnessError, KeyRange, OperationMix, RangeMode, StorageKey,
    WORKER_CAPACITY,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub subject: SubjectConfig,
    pub sweep: SweepPlan,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfig {
    pub name: String,
    #[serde(default)]
    pub library: Option<PathBuf>,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Environment the subject's host process runs with, e.g. `OMP_STACKSIZE`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPlan {
    pub threads: Vec<u32>,
    pub durations: Vec<u32>,
    pub mixes: Vec<OperationMix>,
    pub range_modes: Vec<RangeMode>,
    pub repetitions: u32,
    #[serde(default)]
    pub key_range: KeyRange,
    #[serde(default)]
    pub selection_strategy: i32,
    #[serde(default)]
    pub prefill_count: u32,
    #[serde(default)]
    pub basic_testing: bool,
    #[serde(default = "default_seed")]
    pub seed: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

fn default_symbol() -> String {
    "bench".to_string()
}

fn default_seed() -> i32 {
    42
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data")
}

pub const SWEEP_ORDER: [&str; 5] = [
    "run_duration",
    "operation_mix",
    "range_mode",
    "thread_count",
    "repetition",
];

impl SweepConfig {
    /// Loads a YAML sweep file. Relative `library` and `base_dir` paths are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw_yaml = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read sweep config {}: {}", path.display(), e))?;
        let mut config: SweepConfig = serde_yaml::from_str(&raw_yaml)
            .map_err(|e| anyhow!("failed to parse sweep config {}: {}", path.display(), e))?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        if let Some(library) = config.subject.library.as_ref() {
            if library.is_relative() {
                config.subject.library = Some(config_dir.join(library));
            }
        }
        if config.output.base_dir.is_relative() {
            config.output.base_dir = config_dir.join(&config.output.base_dir);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        let mut problems = Vec::new();
        if self.subject.name.trim().is_empty() {
            problems.push("subject.name must not be empty".to_string());
        }
        if self.subject.symbol.trim().is_empty() {
            problems.push("subject.symbol must not be empty".to_string());
        }
        problems.extend(self.sweep.problems());
        if problems.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::InvalidConfig(problems.join("; ")))
        }
    }
}

impl SweepPlan {
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, empty) in [
            ("threads", self.threads.is_empty()),
            ("durations", self.durations.is_empty()),
            ("mixes", self.mixes.is_empty()),
            ("range_modes", self.range_modes.is_empty()),
        ] {
            if empty {
                problems.push(format!("sweep.{} must list at least one candidate", name));
            }
        }
        for t in &self.threads {
            if *t == 0 || *t as usize > WORKER_CAPACITY {
                problems.push(format!(
                    "sweep.threads entry {} outside 1..={}",
                    t, WORKER_CAPACITY
                ));
            }
        }
        if self.durations.iter().any(|d| *d == 0) {
            problems.push("sweep.durations entries must be positive".to_string());
        }
        if self.repetitions == 0 {
            problems.push("sweep.repetitions must be positive".to_string());
        }
        if self.key_range.lower >= self.key_range.upper {
            problems.push(format!(
                "sweep.key_range [{}, {}] must have lower < upper",
                self.key_range.lower, self.key_range.upper
            ));
        }
        if has_duplicates(&self.threads) {
            problems.push("sweep.threads contains duplicates".to_string());
        }
        if has_duplicates(&self.durations) {
            problems.push("sweep.durations contains duplicates".to_string());
        }
        if has_duplicates(&self.mixes) {
            problems.push("sweep.mixes contains duplicates".to_string());
        }
        if has_duplicates(&self.range_modes) {
            problems.push("sweep.range_modes contains duplicates".to_string());
        }
        for (label, mixes) in colliding_mix_labels(&self.mixes) {
            let listed: Vec<String> = mixes
                .iter()
                .map(|m| format!("[{}, {}, {}]", m.insert_pct, m.delete_pct, m.contains_pct))
                .collect();
            problems.push(format!(
                "sweep.mixes {} share the directory label '{}'",
                listed.join(", "),
                label
            ));
        }
        problems
    }

    /// Keys in sweep order: duration, then mix, then range mode.
    pub fn storage_keys(&self, subject_name: &str) -> Vec<StorageKey> {
        let mut keys = Vec::new();
        for duration in &self.durations {
            for mix in &self.mixes {
                for mode in &self.range_modes {
                    keys.push(StorageKey::new(
                        subject_name,
                        *mix,
                        *mode,
                        *duration,
                        self.threads.len(),
                    ));
                }
            }
        }
        keys
    }

    /// Points of one key, one per thread count in declared order.
    pub fn points_for(&self, key: &StorageKey) -> Vec<ConfigurationPoint> {
        self.threads
            .iter()
            .map(|threads| ConfigurationPoint {
                thread_count: *threads,
                run_duration_sec: key.run_duration_sec,
                mix: key.mix,
                range_mode: key.range_mode,
                selection_strategy: self.selection_strategy,
                prefill_count: self.prefill_count,
                seed: self.seed,
                key_range: self.key_range,
                basic_testing: self.basic_testing,
            })
            .collect()
    }

    pub fn total_invocations(&self) -> usize {
        self.threads.len()
            * self.durations.len()
            * self.mixes.len()
            * self.range_modes.len()
            * self.repetitions as usize
    }
}

/// Distinct mixes that would write to the same raw log.
fn colliding_mix_labels(mixes: &[OperationMix]) -> Vec<(String, Vec<OperationMix>)> {
    let mut by_label: BTreeMap<String, Vec<OperationMix>> = BTreeMap::new();
    for mix in mixes {
        let group = by_label.entry(mix.label()).or_default();
        if !group.contains(mix) {
            group.push(*mix);
        }
    }
    by_label
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .collect()
}

fn has_duplicates<T: PartialEq>(values: &[T]) -> bool {
    values
        .iter()
        .enumerate()
        .any(|(idx, v)| values[..idx].contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
subject:
  name: lock free
  library: build/library_lockfree.so
  env:
    OMP_STACKSIZE: 64k
sweep:
  threads: [1, 2, 4]
  durations: [1, 5]
  mixes: [[10, 10, 80], [40, 40, 20]]
  range_modes: [shared, disjoint]
  repetitions: 3
  basic_testing: true
";

    #[test]
    fn parses_and_applies_defaults() {
        let config: SweepConfig = serde_yaml::from_str(SAMPLE).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.subject.symbol, "bench");
        assert_eq!(config.subject.env.get("OMP_STACKSIZE").unwrap(), "64k");
        assert_eq!(config.sweep.seed, 42);
        assert_eq!(config.sweep.key_range, KeyRange { lower: 0, upper: 100_000 });
        assert_eq!(config.output.base_dir, PathBuf::from("data"));
        assert_eq!(config.sweep.total_invocations(), 3 * 2 * 2 * 2 * 3);
    }

    #[test]
    fn storage_keys_follow_documented_order() {
        let config: SweepConfig = serde_yaml::from_str(SAMPLE).expect("parse");
        let keys: Vec<String> = config
            .sweep
            .storage_keys(&config.subject.name)
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "lock_free/101080_shared/1s_3threads",
                "lock_free/101080_disjoint/1s_3threads",
                "lock_free/404020_shared/1s_3threads",
                "lock_free/404020_disjoint/1s_3threads",
                "lock_free/101080_shared/5s_3threads",
                "lock_free/101080_disjoint/5s_3threads",
                "lock_free/404020_shared/5s_3threads",
                "lock_free/404020_disjoint/5s_3threads",
            ]
        );
    }

    #[test]
    fn points_carry_fixed_parameters() {
        let config: SweepConfig = serde_yaml::from_str(SAMPLE).expect("parse");
        let key = &config.sweep.storage_keys(&config.subject.name)[1];
        let points = config.sweep.points_for(key);
        assert_eq!(
            points.iter().map(|p| p.thread_count).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
        assert!(points.iter().all(|p| p.range_mode == RangeMode::Disjoint));
        assert!(points.iter().all(|p| p.basic_testing && p.seed == 42));
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut config: SweepConfig = serde_yaml::from_str(SAMPLE).expect("parse");
        config.subject.name = " ".to_string();
        config.sweep.threads = vec![0, 2, 2, 65];
        config.sweep.repetitions = 0;
        config.sweep.key_range = KeyRange { lower: 10, upper: 10 };
        let err = config.validate().expect_err("invalid").to_string();
        for needle in [
            "subject.name",
            "entry 0 outside",
            "entry 65 outside",
            "repetitions",
            "key_range",
            "threads contains duplicates",
        ] {
            assert!(err.contains(needle), "missing '{}' in: {}", needle, err);
        }
    }

    #[test]
    fn mixes_sharing_a_directory_label_are_rejected() {
        let yaml = SAMPLE.replace("[[10, 10, 80], [40, 40, 20]]", "[[1, 10, 89], [11, 0, 89]]");
        let config: SweepConfig = serde_yaml::from_str(&yaml).expect("parse");
        let labels: Vec<String> = config.sweep.mixes.iter().map(|m| m.label()).collect();
        assert_eq!(labels, vec!["11089", "11089"]);
        let err = config.validate().expect_err("colliding labels").to_string();
        assert!(err.contains("'11089'"), "{}", err);
        assert!(err.contains("[1, 10, 89]") && err.contains("[11, 0, 89]"), "{}", err);

        let yaml = SAMPLE.replace("[[10, 10, 80], [40, 40, 20]]", "[[10.5, 10, 79.5], [10.7, 10, 79.3]]");
        let config: SweepConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = config.validate().expect_err("truncated labels collide").to_string();
        assert!(err.contains("'101079'"), "{}", err);
    }

    #[test]
    fn exact_duplicate_mix_is_not_reported_as_label_collision() {
        let yaml = SAMPLE.replace("[40, 40, 20]", "[10, 10, 80]");
        let config: SweepConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = config.validate().expect_err("duplicate").to_string();
        assert!(err.contains("mixes contains duplicates"), "{}", err);
        assert!(!err.contains("directory label"), "{}", err);
    }

    #[test]
    fn bad_mix_is_rejected_at_parse_time() {
        let yaml = SAMPLE.replace("[40, 40, 20]", "[40, 40, 40]");
        assert!(serde_yaml::from_str::<SweepConfig>(&yaml).is_err());
    }

    #[test]
    fn load_resolves_relative_paths_against_config_dir() {
        let dir = std::env::temp_dir().join(format!(
            "skipbench_config_test_{}_{}",
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sweep.yaml");
        fs::write(&path, SAMPLE).unwrap();
        let config = SweepConfig::load(&path).expect("load");
        assert_eq!(
            config.subject.library,
            Some(dir.join("build/library_lockfree.so"))
        );
        assert_eq!(config.output.base_dir, dir.join("data"));
        let _ = fs::remove_dir_all(dir);
    }
}

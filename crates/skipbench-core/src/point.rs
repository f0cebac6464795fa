use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::raw::c_int;

const MIX_TOLERANCE: f64 = 1e-6;

/// Percentage split of insert/delete/contains operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct OperationMix {
    pub insert_pct: f64,
    pub delete_pct: f64,
    pub contains_pct: f64,
}

impl OperationMix {
    pub fn new(insert_pct: f64, delete_pct: f64, contains_pct: f64) -> Result<Self, String> {
        let parts = [insert_pct, delete_pct, contains_pct];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(format!(
                "operation mix {:?} must contain non-negative percentages",
                parts
            ));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 100.0).abs() > MIX_TOLERANCE {
            return Err(format!(
                "operation mix {:?} sums to {}, expected 100",
                parts, sum
            ));
        }
        Ok(Self {
            insert_pct,
            delete_pct,
            contains_pct,
        })
    }

    /// Directory label: each percentage truncated and concatenated, `101080`.
    pub fn label(&self) -> String {
        format!(
            "{}{}{}",
            self.insert_pct.trunc() as i64,
            self.delete_pct.trunc() as i64,
            self.contains_pct.trunc() as i64
        )
    }
}

impl TryFrom<[f64; 3]> for OperationMix {
    type Error = String;

    fn try_from(value: [f64; 3]) -> Result<Self, Self::Error> {
        Self::new(value[0], value[1], value[2])
    }
}

impl From<OperationMix> for [f64; 3] {
    fn from(mix: OperationMix) -> Self {
        [mix.insert_pct, mix.delete_pct, mix.contains_pct]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    Shared,
    Disjoint,
}

impl RangeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeMode::Shared => "shared",
            RangeMode::Disjoint => "disjoint",
        }
    }

    pub fn abi_flag(&self) -> c_int {
        match self {
            RangeMode::Shared => 0,
            RangeMode::Disjoint => 1,
        }
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct KeyRange {
    pub lower: i32,
    pub upper: i32,
}

impl Default for KeyRange {
    fn default() -> Self {
        Self {
            lower: 0,
            upper: 100_000,
        }
    }
}

impl From<[i32; 2]> for KeyRange {
    fn from(value: [i32; 2]) -> Self {
        Self {
            lower: value[0],
            upper: value[1],
        }
    }
}

impl From<KeyRange> for [i32; 2] {
    fn from(range: KeyRange) -> Self {
        [range.lower, range.upper]
    }
}

/// One combination of sweep parameters. Equality is field-wise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigurationPoint {
    pub thread_count: u32,
    pub run_duration_sec: u32,
    pub mix: OperationMix,
    pub range_mode: RangeMode,
    pub selection_strategy: i32,
    pub prefill_count: u32,
    pub seed: i32,
    pub key_range: KeyRange,
    pub basic_testing: bool,
}

impl fmt::Display for ConfigurationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threads={} duration={}s mix={} mode={} strategy={} prefill={} seed={}",
            self.thread_count,
            self.run_duration_sec,
            self.mix.label(),
            self.range_mode,
            self.selection_strategy,
            self.prefill_count,
            self.seed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_label_truncates_percentages() {
        let mix = OperationMix::new(10.0, 10.0, 80.0).unwrap();
        assert_eq!(mix.label(), "101080");
        let mix = OperationMix::new(33.3, 33.3, 33.4).unwrap();
        assert_eq!(mix.label(), "333333");
    }

    #[test]
    fn mix_must_sum_to_one_hundred() {
        assert!(OperationMix::new(40.0, 40.0, 10.0).is_err());
        assert!(OperationMix::new(-10.0, 10.0, 100.0).is_err());
        assert!(OperationMix::new(40.0, 40.0, 20.0).is_ok());
    }

    #[test]
    fn mix_deserializes_from_triple() {
        let mix: OperationMix = serde_json::from_str("[40, 40, 20]").unwrap();
        assert_eq!(mix.label(), "404020");
        assert!(serde_json::from_str::<OperationMix>("[50, 40, 20]").is_err());
    }

    #[test]
    fn range_mode_maps_to_abi_flag() {
        assert_eq!(RangeMode::Shared.abi_flag(), 0);
        assert_eq!(RangeMode::Disjoint.abi_flag(), 1);
        let mode: RangeMode = serde_json::from_str("\"disjoint\"").unwrap();
        assert_eq!(mode, RangeMode::Disjoint);
    }
}

use std::collections::BTreeMap;
use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::TargetKind;
use crate::workload::{Workload, WorkloadKey};

use super::Configuration;

/// Format tag written into every tuning log.
pub const TUNING_LOG_VERSION: &str = "dwconv.tuning.v1";

fn default_version() -> String {
    TUNING_LOG_VERSION.to_string()
}

/// One measured configuration for a workload on a target family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningRecord {
    pub target: TargetKind,
    pub workload: Workload,
    pub config: Configuration,
    /// Measured kernel time, when the search collaborator reported one.
    #[serde(default)]
    pub cost_ns: Option<u64>,
}

#[derive(Debug, Error)]
pub enum TuningLogError {
    #[error("tuning log serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tuning log io failed: {0}")]
    Io(#[from] io::Error),
    #[error("tuning log version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

#[derive(Serialize, Deserialize)]
struct TuningLogFile {
    #[serde(default = "default_version")]
    version: String,
    records: Vec<TuningRecord>,
}

/// Caller-owned store of tuned configurations keyed by workload signature.
///
/// Only the best (lowest cost) record per `(target, workload)` is retained.
#[derive(Debug, Clone, Default)]
pub struct TuningLog {
    records: BTreeMap<(TargetKind, WorkloadKey), TuningRecord>,
}

impl TuningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record`, returning `false` when an existing record measured faster.
    pub fn insert(&mut self, record: TuningRecord) -> bool {
        let key = (record.target, record.workload.key());
        if let Some(existing) = self.records.get(&key) {
            let better = match (record.cost_ns, existing.cost_ns) {
                (Some(new), Some(old)) => new < old,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => true,
            };
            if !better {
                return false;
            }
        }
        self.records.insert(key, record);
        true
    }

    pub fn lookup(&self, target: TargetKind, workload: &Workload) -> Option<&Configuration> {
        self.records
            .get(&(target, workload.key()))
            .filter(|record| record.workload == *workload)
            .map(|record| &record.config)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TuningRecord> {
        self.records.values()
    }

    pub fn to_json_string(&self) -> Result<String, TuningLogError> {
        let file = TuningLogFile {
            version: default_version(),
            records: self.records.values().cloned().collect(),
        };
        serde_json::to_string_pretty(&file).map_err(TuningLogError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, TuningLogError> {
        let file: TuningLogFile = serde_json::from_str(src)?;
        if file.version != TUNING_LOG_VERSION {
            return Err(TuningLogError::VersionMismatch {
                expected: TUNING_LOG_VERSION.to_string(),
                found: file.version,
            });
        }
        let mut log = TuningLog::new();
        for record in file.records {
            log.insert(record);
        }
        Ok(log)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), TuningLogError> {
        let contents = self.to_json_string()?;
        fs::write(path, contents).map_err(TuningLogError::from)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, TuningLogError> {
        let contents = fs::read_to_string(path)?;
        TuningLog::from_json_str(&contents)
    }
}

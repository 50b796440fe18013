use crate::config::TuningLog;
use crate::dtype::DType;
use crate::target::TargetDesc;

/// Per-compilation state threaded through declaration and scheduling.
///
/// Whether the call happens inside a search trial is carried here explicitly
/// rather than read from any process-wide mode.
#[derive(Debug, Clone, Default)]
pub struct ScheduleContext<'a> {
    pub target: TargetDesc,
    /// Set by the search collaborator while it measures candidate configurations.
    pub search_trial: bool,
    /// Tuned configurations to consult before falling back.
    pub records: Option<&'a TuningLog>,
}

impl<'a> ScheduleContext<'a> {
    pub fn new(target: TargetDesc) -> Self {
        Self {
            target,
            search_trial: false,
            records: None,
        }
    }

    pub fn with_records(mut self, records: &'a TuningLog) -> Self {
        self.records = Some(records);
        self
    }

    pub fn in_search_trial(mut self) -> Self {
        self.search_trial = true;
        self
    }

    pub fn simd_lanes(&self, dtype: DType) -> usize {
        self.target.simd_lanes(dtype)
    }
}

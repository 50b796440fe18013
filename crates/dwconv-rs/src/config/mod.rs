//! Blocking configurations, their search space and the tuning-record store.

mod records;
mod space;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};
use crate::workload::Workload;

pub use records::{TuningLog, TuningLogError, TuningRecord, TUNING_LOG_VERSION};
pub use space::ConfigSpace;

/// Upper bound on the register-blocked output-width factor.
pub const MAX_REG_N: usize = 31;

/// Two-way factorization of one loop dimension, `outer * inner == extent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitFactor {
    pub outer: usize,
    pub inner: usize,
}

impl SplitFactor {
    pub const fn new(outer: usize, inner: usize) -> Self {
        Self { outer, inner }
    }

    /// Factorization of `extent` with the given inner block; `inner` must divide `extent`.
    ///
    /// A zero `inner` yields `[0, 0]`, which validation rejects.
    pub fn from_inner(extent: usize, inner: usize) -> Self {
        Self {
            outer: extent.checked_div(inner).unwrap_or(0),
            inner,
        }
    }

    fn check(&self, knob: &str, extent: usize) -> ScheduleResult<()> {
        if self.outer.checked_mul(self.inner) != Some(extent) {
            return Err(ScheduleError::UnschedulableSplit {
                stage: "config".to_string(),
                axis: knob.to_string(),
                extent,
                factor: self.inner,
            });
        }
        Ok(())
    }
}

impl fmt::Display for SplitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.outer, self.inner)
    }
}

/// Channel and width blocking for one workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub tile_ic: SplitFactor,
    pub tile_oc: SplitFactor,
    pub tile_ow: SplitFactor,
}

impl Configuration {
    pub const fn new(tile_ic: SplitFactor, tile_oc: SplitFactor, tile_ow: SplitFactor) -> Self {
        Self {
            tile_ic,
            tile_oc,
            tile_ow,
        }
    }

    /// Input-channel block (`ic_bn`).
    pub fn ic_bn(&self) -> usize {
        self.tile_ic.inner
    }

    /// Output-channel block (`oc_bn`).
    pub fn oc_bn(&self) -> usize {
        self.tile_oc.inner
    }

    /// Register-blocked output width (`reg_n`).
    pub fn reg_n(&self) -> usize {
        self.tile_ow.inner
    }

    /// Checks every factor against the workload it is about to schedule.
    pub fn validate(&self, workload: &Workload) -> ScheduleResult<()> {
        self.tile_ic.check("tile_ic", workload.in_channels())?;
        self.tile_oc.check("tile_oc", workload.out_channels())?;
        self.tile_ow.check("tile_ow", workload.out_width())?;
        if self.tile_ow.inner > MAX_REG_N {
            return Err(ScheduleError::invalid_config(format!(
                "tile_ow inner factor {} exceeds {MAX_REG_N}",
                self.tile_ow.inner
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tile_ic={} tile_oc={} tile_ow={}",
            self.tile_ic, self.tile_oc, self.tile_ow
        )
    }
}

/// Where a configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigOrigin {
    Fallback,
    Tuned,
}

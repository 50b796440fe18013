//! Target descriptors and native SIMD width.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::env;
use crate::error::{ScheduleError, ScheduleResult};

/// CPU families a strategy can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    X86,
    ArmCpu,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::X86 => "x86",
            TargetKind::ArmCpu => "arm_cpu",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPUs whose vector registers are 512 bits wide.
const AVX512_MCPUS: &[&str] = &["skylake-avx512", "cascadelake"];

/// Describes the CPU a schedule is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDesc {
    kind: TargetKind,
    mcpu: Option<String>,
    vector_bits: usize,
}

impl TargetDesc {
    /// x86 target; AVX-512 parts get 512-bit vectors, everything else 256.
    pub fn x86(mcpu: Option<&str>) -> Self {
        let vector_bits = match mcpu {
            Some(cpu) if AVX512_MCPUS.contains(&cpu) => 512,
            _ => 256,
        };
        Self {
            kind: TargetKind::X86,
            mcpu: mcpu.map(str::to_string),
            vector_bits,
        }
    }

    /// ARM target with 128-bit NEON vectors.
    pub fn arm_cpu(mcpu: Option<&str>) -> Self {
        Self {
            kind: TargetKind::ArmCpu,
            mcpu: mcpu.map(str::to_string),
            vector_bits: 128,
        }
    }

    pub fn with_vector_bits(mut self, vector_bits: usize) -> Self {
        self.vector_bits = vector_bits;
        self
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn mcpu(&self) -> Option<&str> {
        self.mcpu.as_deref()
    }

    pub fn vector_bits(&self) -> usize {
        self.vector_bits
    }

    /// Native SIMD width in elements of `dtype`, never below one.
    ///
    /// `DWCONV_SIMD_LANES` takes precedence when set to a positive integer.
    pub fn simd_lanes(&self, dtype: DType) -> usize {
        if let Some(lanes) = env::simd_lanes_override() {
            return lanes;
        }
        (self.vector_bits / dtype.bitwidth()).max(1)
    }
}

impl Default for TargetDesc {
    fn default() -> Self {
        TargetDesc::x86(None)
    }
}

impl FromStr for TargetDesc {
    type Err = ScheduleError;

    /// Parses strings such as `llvm -mcpu=skylake-avx512` or `llvm -device=arm_cpu`.
    fn from_str(spec: &str) -> ScheduleResult<Self> {
        let invalid = |reason: &str| ScheduleError::InvalidTarget {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut tokens = spec.split_whitespace();
        match tokens.next() {
            Some("llvm") => {}
            Some(other) => return Err(invalid(&format!("unsupported target kind `{other}`"))),
            None => return Err(invalid("empty target string")),
        }

        let mut mcpu = None;
        let mut arm = false;
        for token in tokens {
            let Some((key, value)) = token.strip_prefix('-').and_then(|t| t.split_once('=')) else {
                return Err(invalid(&format!("malformed option `{token}`")));
            };
            match key {
                "mcpu" => mcpu = Some(value),
                "device" => arm = value == "arm_cpu",
                "mtriple" => arm = arm || value.starts_with("aarch64") || value.starts_with("arm"),
                _ => {}
            }
        }

        Ok(if arm {
            TargetDesc::arm_cpu(mcpu)
        } else {
            TargetDesc::x86(mcpu)
        })
    }
}

impl fmt::Display for TargetDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("llvm")?;
        if self.kind == TargetKind::ArmCpu {
            f.write_str(" -device=arm_cpu")?;
        }
        if let Some(mcpu) = &self.mcpu {
            write!(f, " -mcpu={mcpu}")?;
        }
        Ok(())
    }
}

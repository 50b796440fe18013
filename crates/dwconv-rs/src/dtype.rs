use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar element types a depthwise workload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Si8,
    Ui8,
    Si16,
    Si32,
    Bf16,
    F16,
    F32,
    F64,
}

impl DType {
    /// Storage bit-width of one element.
    pub fn bitwidth(self) -> usize {
        match self {
            DType::Si8 | DType::Ui8 => 8,
            DType::Si16 | DType::Bf16 | DType::F16 => 16,
            DType::Si32 | DType::F32 => 32,
            DType::F64 => 64,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::Si8 => "si8",
            DType::Ui8 => "ui8",
            DType::Si16 => "si16",
            DType::Si32 => "si32",
            DType::Bf16 => "bf16",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

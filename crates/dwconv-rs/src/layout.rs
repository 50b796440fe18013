//! Blocked `NCHW[x]c` layout descriptors handed to neighbouring graph operators.

use std::fmt;
use std::str::FromStr;

use crate::error::{ScheduleError, ScheduleResult};

/// `NCHW{block}c`: channels split into chunks of `block` lanes, block axis innermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockedLayout {
    block: usize,
}

impl BlockedLayout {
    pub fn new(block: usize) -> ScheduleResult<Self> {
        if block == 0 {
            return Err(ScheduleError::layout_mismatch(
                "layout",
                "positive channel block",
                "0",
            ));
        }
        Ok(Self { block })
    }

    pub fn block(&self) -> usize {
        self.block
    }

    /// Blocks a plain `NCHW` shape.
    pub fn blocked_shape(&self, plain: [usize; 4]) -> ScheduleResult<[usize; 5]> {
        let [n, c, h, w] = plain;
        if c % self.block != 0 {
            return Err(ScheduleError::layout_mismatch(
                "layout",
                format!("channels divisible by {}", self.block),
                format!("{c}"),
            ));
        }
        Ok([n, c / self.block, h, w, self.block])
    }

    /// Recovers the plain `NCHW` shape of a blocked shape in this layout.
    pub fn plain_shape(&self, blocked: [usize; 5]) -> ScheduleResult<[usize; 4]> {
        let [n, chunks, h, w, block] = blocked;
        if block != self.block {
            return Err(ScheduleError::layout_mismatch(
                "layout",
                format!("block {}", self.block),
                format!("block {block}"),
            ));
        }
        Ok([n, chunks * block, h, w])
    }
}

impl fmt::Display for BlockedLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NCHW{}c", self.block)
    }
}

impl FromStr for BlockedLayout {
    type Err = ScheduleError;

    fn from_str(tag: &str) -> ScheduleResult<Self> {
        let block = tag
            .strip_prefix("NCHW")
            .and_then(|rest| rest.strip_suffix('c'))
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| ScheduleError::layout_mismatch("layout", "NCHW<block>c", tag))?;
        BlockedLayout::new(block)
    }
}

/// Shape plus layout tag of one operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutDescriptor {
    pub shape: Vec<usize>,
    pub layout: BlockedLayout,
}

impl LayoutDescriptor {
    pub fn tag(&self) -> String {
        self.layout.to_string()
    }
}

/// Layouts an operator expects on its inputs and produces on its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InferredLayout {
    pub inputs: Vec<LayoutDescriptor>,
    pub outputs: Vec<LayoutDescriptor>,
}

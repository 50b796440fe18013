//! Minimal tensor-expression model.
//!
//! A [`ComputeGraph`] declares placeholders and computations; a [`Schedule`]
//! records the loop transformations applied to the stages of those
//! computations. Neither executes anything: the schedule is a plan consumed by
//! a lowering step that lives outside this crate.

mod graph;
mod printer;
mod schedule;

pub use graph::{
    ComputeDecl, ComputeGraph, ComputeKind, ComputeNode, Node, NodeKind, OpPattern, ReduceAxis,
    TensorId,
};
pub use schedule::{
    Attach, AxisId, AxisKind, AxisList, IterVar, LoopAnnotation, Pragma, Schedule, ScheduleStep,
    Stage, StageId, StageOrigin,
};

//! Scheduling core for depthwise 2-D convolution on SIMD CPUs.
//!
//! The crate owns the pieces every target strategy shares: the normalized
//! [`Workload`] descriptor, blocking [`Configuration`]s and their search space,
//! a small tensor-expression model ([`te`]) that records loop transformations
//! as a [`Schedule`], blocked layout descriptors, and the strategy registry that
//! maps an operator/target pair to the crate implementing it.
//!
//! Target crates (for example `dwconv-rs-backend-x86`) register an
//! [`OpStrategy`] and are reached through [`pipeline::compile_depthwise`].

pub mod config;
pub mod context;
pub mod dtype;
mod env;
pub mod error;
pub mod hashing;
pub mod layout;
pub mod pipeline;
pub mod registry;
pub mod shape_helpers;
pub mod target;
pub mod te;
pub mod workload;

pub use config::{ConfigOrigin, ConfigSpace, Configuration, SplitFactor, TuningLog, MAX_REG_N};
pub use context::ScheduleContext;
pub use dtype::DType;
pub use error::{ScheduleError, ScheduleResult};
pub use layout::{BlockedLayout, InferredLayout, LayoutDescriptor};
pub use registry::{OpKind, OpStrategy};
pub use target::{TargetDesc, TargetKind};
pub use te::{ComputeGraph, Schedule, TensorId};
pub use workload::{Conv2dAttrs, Padding, PaddingSpec, Workload, WorkloadKey};

//! x86 strategy for depthwise conv2d in `NCHW[x]c` layout.

use std::sync::Arc;

use dwconv_rs::config::Configuration;
use dwconv_rs::layout::InferredLayout;
use dwconv_rs::pipeline::{Declared, DepthwiseCall};
use dwconv_rs::registry::register_strategy;
use dwconv_rs::te::{ComputeGraph, Schedule};
use dwconv_rs::{OpKind, OpStrategy, ScheduleContext, ScheduleResult, TargetKind, Workload};

pub mod compute;
pub mod fallback;
pub mod layout;
pub mod pack;
pub mod schedule;

pub use fallback::{fallback_config, fallback_for_target};
pub use pack::{pack_data, pack_kernel, unpack_data, unpack_kernel, BlockedTensor};

#[derive(Debug, Default, Clone)]
pub struct X86DepthwiseStrategy;

impl X86DepthwiseStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl OpStrategy for X86DepthwiseStrategy {
    fn name(&self) -> &str {
        "depthwise_conv2d_NCHWc.x86"
    }

    fn fallback_config(&self, workload: &Workload, ctx: &ScheduleContext<'_>) -> Configuration {
        fallback_for_target(workload, ctx)
    }

    fn declare(
        &self,
        graph: &mut ComputeGraph,
        call: &DepthwiseCall,
        ctx: &ScheduleContext<'_>,
    ) -> ScheduleResult<Declared> {
        compute::declare_depthwise_conv2d_nchwc(self, graph, call, ctx)
    }

    fn schedule(
        &self,
        graph: &ComputeGraph,
        declared: &Declared,
        ctx: &ScheduleContext<'_>,
    ) -> ScheduleResult<Schedule> {
        schedule::schedule_depthwise_conv2d_nchwc(graph, declared, ctx)
    }

    fn infer_layout(
        &self,
        workload: &Workload,
        config: &Configuration,
    ) -> ScheduleResult<InferredLayout> {
        layout::infer_layout(workload, config)
    }
}

/// Register the x86 depthwise strategy with the global strategy registry.
///
/// Called automatically via a static initializer on Linux; call it manually
/// elsewhere, or to make the registration explicit.
pub fn register_x86_strategies() {
    register_strategy(
        OpKind::DepthwiseConv2dNchwc,
        TargetKind::X86,
        Arc::new(X86DepthwiseStrategy::new()),
    );
}

#[cfg(target_os = "linux")]
#[used]
#[link_section = ".init_array"]
static REGISTER_X86_STRATEGIES: extern "C" fn() = {
    extern "C" fn register() {
        register_x86_strategies();
    }
    register
};

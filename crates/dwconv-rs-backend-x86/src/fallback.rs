use dwconv_rs::config::{Configuration, SplitFactor, MAX_REG_N};
use dwconv_rs::{ScheduleContext, Workload};
use tracing::debug;

/// Default blocking for a workload nobody has tuned.
///
/// The output-channel block fills at most one vector of `simd_width` lanes,
/// the input-channel block never exceeds it, and the register-blocked width
/// is the largest divisor of the output width up to [`MAX_REG_N`].
pub fn fallback_config(workload: &Workload, simd_width: usize) -> Configuration {
    let oc_bn = largest_divisor_at_most(workload.out_channels(), simd_width);
    let ic_bn = largest_divisor_at_most(workload.in_channels(), oc_bn);
    let out_width = workload.out_width();
    let reg_n = largest_divisor_at_most(out_width, MAX_REG_N);

    let config = Configuration::new(
        SplitFactor::from_inner(workload.in_channels(), ic_bn),
        SplitFactor::from_inner(workload.out_channels(), oc_bn),
        SplitFactor::from_inner(out_width, reg_n),
    );
    debug!(workload = %workload, simd_width, config = %config, "fallback configuration");
    config
}

/// [`fallback_config`] with the SIMD width of the context's target for the workload dtype.
pub fn fallback_for_target(workload: &Workload, ctx: &ScheduleContext<'_>) -> Configuration {
    fallback_config(workload, ctx.simd_lanes(workload.dtype()))
}

fn largest_divisor_at_most(value: usize, bound: usize) -> usize {
    (1..=bound.min(value))
        .rev()
        .find(|candidate| value % candidate == 0)
        .unwrap_or(1)
}

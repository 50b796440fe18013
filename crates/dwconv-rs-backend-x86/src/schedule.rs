use std::collections::HashSet;

use dwconv_rs::config::Configuration;
use dwconv_rs::pipeline::Declared;
use dwconv_rs::te::{ComputeGraph, Pragma, Schedule, StageId, TensorId};
use dwconv_rs::{ScheduleContext, ScheduleError, ScheduleResult};
use tracing::{debug, trace};

use crate::compute::DEPTHWISE_TAG;

/// Builds the x86 schedule for a declared depthwise convolution and its fused consumers.
///
/// Broadcast-or-simpler consumers that are not outputs get inlined; the
/// convolution stage is scheduled once it is reached.
pub fn schedule_depthwise_conv2d_nchwc(
    graph: &ComputeGraph,
    declared: &Declared,
    ctx: &ScheduleContext<'_>,
) -> ScheduleResult<Schedule> {
    let outputs = [declared.output];
    let mut s = Schedule::create(graph, &outputs);

    let mut visited = HashSet::new();
    let mut worklist = vec![declared.output];
    while let Some(tensor) = worklist.pop() {
        if !visited.insert(tensor) {
            continue;
        }
        let Some(node) = graph.compute_node(tensor) else {
            continue;
        };
        if node.pattern.is_broadcast() {
            if !outputs.contains(&tensor) {
                let stage = stage_for(&s, graph, tensor)?;
                s.compute_inline(stage)?;
                trace!(stage = %graph.node(tensor).name, "inlined");
            }
            worklist.extend(
                node.inputs
                    .iter()
                    .copied()
                    .filter(|input| graph.compute_node(*input).is_some()),
            );
        }
        if node.tag.contains(DEPTHWISE_TAG) {
            schedule_conv(
                &mut s,
                graph,
                tensor,
                declared.output,
                &declared.config,
                declared.packed && ctx.search_trial,
            )?;
        }
    }
    Ok(s)
}

fn stage_for(s: &Schedule, graph: &ComputeGraph, tensor: TensorId) -> ScheduleResult<StageId> {
    s.stage_of(tensor).ok_or_else(|| {
        ScheduleError::invalid_primitive(&graph.node(tensor).name, "tensor has no stage")
    })
}

fn schedule_conv(
    s: &mut Schedule,
    graph: &ComputeGraph,
    conv: TensorId,
    output: TensorId,
    config: &Configuration,
    skip_pack: bool,
) -> ScheduleResult<()> {
    let tile_ow = config.reg_n();
    let inputs = graph.inputs(conv);
    let (mut data_vec, kernel_vec) = (inputs[0], inputs[1]);

    if let Some(pad) = graph.compute_node(data_vec).filter(|node| node.tag.contains("pad")) {
        let stage = stage_for(s, graph, data_vec)?;
        let axes = s.op_axes(stage)?;
        let fused = s.fuse(stage, &axes[..3])?;
        s.parallel(stage, fused)?;
        debug!(extent = s.axis(fused).extent, "pad stage parallel over batch, chunk, height");
        data_vec = pad.inputs[0];
    }

    if skip_pack {
        for packed in [data_vec, kernel_vec] {
            let stage = stage_for(s, graph, packed)?;
            let outer = s.op_axes(stage)?[0];
            s.pragma(stage, outer, Pragma::DebugSkipRegion)?;
        }
        debug!("pack stages excluded from search-trial measurement");
    }

    let c = stage_for(s, graph, conv)?;
    let cc = s.cache_write(c)?;

    let axes = s.op_axes(c)?;
    let (ic_chunk, oh, ow, ic_block) = (axes[1], axes[2], axes[3], axes[4]);
    let (ow_chunk, ow_block) = s.split(c, ow, tile_ow)?;
    s.reorder(c, &[ic_chunk, oh, ow_chunk, ow_block, ic_block])?;
    let parallel_axis = s.fuse(c, &[ic_chunk, oh])?;
    s.parallel(c, parallel_axis)?;
    s.compute_at(cc, c, ow_chunk)?;

    let axes = s.op_axes(cc)?;
    let reduce = s.reduce_axes(cc)?;
    let (ic_chunk, oh, ow, ic_block) = (axes[1], axes[2], axes[3], axes[4]);
    let (kh, kw) = (reduce[0], reduce[1]);
    let (_, ow_block) = s.split(cc, ow, tile_ow)?;
    s.reorder(cc, &[ic_chunk, oh, kh, kw, ow_block, ic_block])?;
    s.vectorize(cc, ic_block)?;
    s.unroll(cc, ow_block)?;

    if conv != output {
        let o = stage_for(s, graph, output)?;
        let axes = s.op_axes(o)?;
        let (oc_chunk, oh, ow, oc_block) = (axes[1], axes[2], axes[3], axes[4]);
        let (ow_chunk, ow_block) = s.split(o, ow, tile_ow)?;
        s.reorder(o, &[oc_chunk, oh, ow_chunk, ow_block, oc_block])?;
        let parallel_axis = s.fuse(o, &[oc_chunk, oh])?;
        s.compute_at(c, o, parallel_axis)?;
        s.vectorize(o, oc_block)?;
        s.parallel(o, parallel_axis)?;
    }
    Ok(())
}

use dwconv_rs::pipeline::{select_configuration, Declared, DepthwiseCall, InputLayout};
use dwconv_rs::te::{ComputeDecl, ComputeGraph, ComputeKind, OpPattern, ReduceAxis};
use dwconv_rs::{OpStrategy, ScheduleContext, ScheduleResult};
use tracing::debug;

use crate::pack::declare_pack;

/// Tag carried by the depthwise convolution node; the schedule builder keys on it.
pub const DEPTHWISE_TAG: &str = "depthwise_conv2d_NCHWc";

/// Declares packing (plain input only), padding and the `NCHW[x]c` depthwise convolution.
///
/// `out[b, oco, oh, ow, oci] = sum_{kh, kw} pad[b, ic / ic_bn, oh*sh + kh, ow*sw + kw, ic % ic_bn]
///     * kernel[oco, 0, kh, kw, 0, oci]` with `ic = (oco * oc_bn + oci) / multiplier`.
pub fn declare_depthwise_conv2d_nchwc(
    strategy: &dyn OpStrategy,
    graph: &mut ComputeGraph,
    call: &DepthwiseCall,
    ctx: &ScheduleContext<'_>,
) -> ScheduleResult<Declared> {
    call.attrs.check_supported()?;
    let data_shape = graph.shape(call.data).to_vec();
    let kernel_shape = graph.shape(call.kernel).to_vec();
    let dtype = graph.node(call.data).dtype;
    let workload = call
        .layout
        .workload(&data_shape, &kernel_shape, &call.attrs, dtype)?;
    let (config, origin) = select_configuration(
        strategy,
        &workload,
        call.layout,
        &data_shape,
        &kernel_shape,
        call.config,
        ctx,
    )?;

    let (data, kernel, packed) = match call.layout {
        InputLayout::Plain => {
            debug!(ic_bn = config.ic_bn(), oc_bn = config.oc_bn(), "packing plain input");
            let (data, kernel) = declare_pack(graph, call.data, call.kernel, &workload, &config);
            (data, kernel, true)
        }
        InputLayout::Blocked => {
            debug!("input already blocked, skipping pack");
            (call.data, call.kernel, false)
        }
    };

    let p = workload.padding();
    let data_pad = if p.is_zero() {
        data
    } else {
        let before = vec![0, 0, p.top, p.left, 0];
        let after = vec![0, 0, p.bottom, p.right, 0];
        let shape: Vec<usize> = graph
            .shape(data)
            .iter()
            .zip(before.iter().zip(&after))
            .map(|(dim, (lo, hi))| dim + lo + hi)
            .collect();
        graph.compute(ComputeDecl {
            name: "PaddedInput".to_string(),
            shape,
            dtype,
            axis_names: (0..5).map(|i| format!("i{i}")).collect(),
            reduce_axes: Vec::new(),
            tag: "injective,pad".to_string(),
            pattern: OpPattern::Injective,
            inputs: vec![data],
            kind: ComputeKind::Pad { before, after },
        })
    };

    let conv = graph.compute(ComputeDecl {
        name: "DepthwiseConv2d".to_string(),
        shape: vec![
            workload.batch(),
            workload.out_channels() / config.oc_bn(),
            workload.out_height(),
            workload.out_width(),
            config.oc_bn(),
        ],
        dtype: workload.out_dtype(),
        axis_names: ["b", "oco", "oh", "ow", "oci"]
            .iter()
            .map(|name| name.to_string())
            .collect(),
        reduce_axes: vec![
            ReduceAxis::new("kh", workload.kernel_height()),
            ReduceAxis::new("kw", workload.kernel_width()),
        ],
        tag: DEPTHWISE_TAG.to_string(),
        pattern: OpPattern::OutEwiseFusable,
        inputs: vec![data_pad, kernel],
        kind: ComputeKind::DepthwiseConv {
            strides: (workload.stride_h(), workload.stride_w()),
            channel_multiplier: workload.channel_multiplier(),
            in_block: config.ic_bn(),
            out_block: config.oc_bn(),
        },
    });

    Ok(Declared {
        output: conv,
        conv,
        workload,
        config,
        origin,
        packed,
    })
}

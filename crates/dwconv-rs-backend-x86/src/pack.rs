//! Channel blocking of data and kernel, as graph nodes and over host buffers.

use dwconv_rs::config::Configuration;
use dwconv_rs::shape_helpers::{
    checked_element_count_or_error, contiguous_strides_or_error, linear_offset,
};
use dwconv_rs::te::{ComputeDecl, ComputeGraph, ComputeKind, OpPattern, TensorId};
use dwconv_rs::{ScheduleError, ScheduleResult, Workload};

/// Declares `data_vec` (`NCHW[x]c`) and `kernel_vec` (`(OC_chunk, 1, KH, KW, 1, OC_block)`)
/// over plain placeholders.
pub fn declare_pack(
    graph: &mut ComputeGraph,
    data: TensorId,
    kernel: TensorId,
    workload: &Workload,
    config: &Configuration,
) -> (TensorId, TensorId) {
    let ic_bn = config.ic_bn();
    let oc_bn = config.oc_bn();
    let data_dtype = graph.node(data).dtype;
    let kernel_dtype = graph.node(kernel).dtype;

    let data_vec = graph.compute(ComputeDecl {
        name: "data_vec".to_string(),
        shape: vec![
            workload.batch(),
            workload.in_channels() / ic_bn,
            workload.in_height(),
            workload.in_width(),
            ic_bn,
        ],
        dtype: data_dtype,
        axis_names: names(&["bs", "c", "h", "w", "vc"]),
        reduce_axes: Vec::new(),
        tag: "pack".to_string(),
        pattern: OpPattern::Injective,
        inputs: vec![data],
        kind: ComputeKind::PackData { block: ic_bn },
    });

    let kernel_vec = graph.compute(ComputeDecl {
        name: "kernel_vec".to_string(),
        shape: vec![
            workload.out_channels() / oc_bn,
            1,
            workload.kernel_height(),
            workload.kernel_width(),
            1,
            oc_bn,
        ],
        dtype: kernel_dtype,
        axis_names: names(&["occ", "icc", "k_h", "k_w", "icb", "ocb"]),
        reduce_axes: Vec::new(),
        tag: "pack".to_string(),
        pattern: OpPattern::Injective,
        inputs: vec![kernel],
        kind: ComputeKind::PackKernel {
            block: oc_bn,
            channel_multiplier: workload.channel_multiplier(),
        },
    });

    (data_vec, kernel_vec)
}

fn names(axes: &[&str]) -> Vec<String> {
    axes.iter().map(|name| name.to_string()).collect()
}

/// Host buffer in a channel-blocked layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedTensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> BlockedTensor<T> {
    /// Channel block of a packed data tensor (last axis).
    pub fn block(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }
}

fn overflow() -> ScheduleError {
    ScheduleError::unsupported("tensor element count overflows usize")
}

fn check_len(tensor: &str, shape: &[usize], len: usize) -> ScheduleResult<()> {
    let expected = checked_element_count_or_error(shape, overflow)?;
    if expected != len {
        return Err(ScheduleError::layout_mismatch(
            tensor,
            format!("{expected} elements for shape {shape:?}"),
            format!("{len} elements"),
        ));
    }
    Ok(())
}

fn check_block(tensor: &str, channels: usize, block: usize) -> ScheduleResult<()> {
    if block == 0 || channels % block != 0 {
        return Err(ScheduleError::layout_mismatch(
            tensor,
            format!("channels divisible by block {block}"),
            format!("{channels} channels"),
        ));
    }
    Ok(())
}

/// `packed[n, c_chunk, h, w, c_block] = data[n, c_chunk * block + c_block, h, w]`.
pub fn pack_data<T: Copy>(
    data: &[T],
    shape: [usize; 4],
    block: usize,
) -> ScheduleResult<BlockedTensor<T>> {
    check_len("data", &shape, data.len())?;
    let [n, c, h, w] = shape;
    check_block("data", c, block)?;

    let plain_strides = contiguous_strides_or_error(&shape, overflow)?;
    let packed_shape = vec![n, c / block, h, w, block];
    let mut packed = Vec::with_capacity(data.len());
    for bs in 0..n {
        for chunk in 0..c / block {
            for y in 0..h {
                for x in 0..w {
                    for cb in 0..block {
                        let src = linear_offset(&[bs, chunk * block + cb, y, x], &plain_strides);
                        packed.push(data[src]);
                    }
                }
            }
        }
    }
    Ok(BlockedTensor {
        shape: packed_shape,
        data: packed,
    })
}

/// Inverse of [`pack_data`]: gathers a blocked tensor back into plain `NCHW`.
pub fn unpack_data<T: Copy>(packed: &BlockedTensor<T>) -> ScheduleResult<Vec<T>> {
    let [n, chunks, h, w, block] = <[usize; 5]>::try_from(packed.shape.as_slice())
        .map_err(|_| {
            ScheduleError::layout_mismatch(
                "data",
                "rank 5 (NCHW[x]c)",
                format!("{:?}", packed.shape),
            )
        })?;
    check_len("data", &packed.shape, packed.data.len())?;

    let packed_strides = contiguous_strides_or_error(&packed.shape, overflow)?;
    let mut plain = Vec::with_capacity(packed.data.len());
    for bs in 0..n {
        for c in 0..chunks * block {
            for y in 0..h {
                for x in 0..w {
                    let src = linear_offset(&[bs, c / block, y, x, c % block], &packed_strides);
                    plain.push(packed.data[src]);
                }
            }
        }
    }
    Ok(plain)
}

/// Packs a `(C, M, KH, KW)` kernel into `(OC_chunk, 1, KH, KW, 1, OC_block)`,
/// where output channel `oc` reads `kernel[oc / M, oc % M, kh, kw]`.
pub fn pack_kernel<T: Copy>(
    kernel: &[T],
    shape: [usize; 4],
    block: usize,
) -> ScheduleResult<BlockedTensor<T>> {
    check_len("kernel", &shape, kernel.len())?;
    let [filter, multiplier, kh, kw] = shape;
    let out_channels = filter * multiplier;
    check_block("kernel", out_channels, block)?;

    let plain_strides = contiguous_strides_or_error(&shape, overflow)?;
    let packed_shape = vec![out_channels / block, 1, kh, kw, 1, block];
    let mut packed = Vec::with_capacity(kernel.len());
    for occ in 0..out_channels / block {
        for y in 0..kh {
            for x in 0..kw {
                for ocb in 0..block {
                    let oc = occ * block + ocb;
                    let src =
                        linear_offset(&[oc / multiplier, oc % multiplier, y, x], &plain_strides);
                    packed.push(kernel[src]);
                }
            }
        }
    }
    Ok(BlockedTensor {
        shape: packed_shape,
        data: packed,
    })
}

/// Inverse of [`pack_kernel`] for a kernel with the given channel multiplier.
pub fn unpack_kernel<T: Copy>(
    packed: &BlockedTensor<T>,
    channel_multiplier: usize,
) -> ScheduleResult<Vec<T>> {
    let [chunks, one_in, kh, kw, one_block, block] =
        <[usize; 6]>::try_from(packed.shape.as_slice()).map_err(|_| {
            ScheduleError::layout_mismatch(
                "kernel",
                "rank 6 (OC_chunk, 1, KH, KW, 1, OC_block)",
                format!("{:?}", packed.shape),
            )
        })?;
    if one_in != 1 || one_block != 1 {
        return Err(ScheduleError::layout_mismatch(
            "kernel",
            "unit axes at positions 1 and 4",
            format!("{:?}", packed.shape),
        ));
    }
    check_len("kernel", &packed.shape, packed.data.len())?;
    let out_channels = chunks * block;
    check_block("kernel", out_channels, channel_multiplier)?;

    let packed_strides = contiguous_strides_or_error(&packed.shape, overflow)?;
    let mut plain = Vec::with_capacity(packed.data.len());
    for filter in 0..out_channels / channel_multiplier {
        for m in 0..channel_multiplier {
            let oc = filter * channel_multiplier + m;
            for y in 0..kh {
                for x in 0..kw {
                    let src = linear_offset(&[oc / block, 0, y, x, 0, oc % block], &packed_strides);
                    plain.push(packed.data[src]);
                }
            }
        }
    }
    Ok(plain)
}

//! Normalized description of one depthwise convolution instance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::{ScheduleError, ScheduleResult};
use crate::hashing::Fingerprint;
use crate::shape_helpers::conv_out_extent;

/// Padding as requested by the caller, before resolution against the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingSpec {
    /// Same amount on all four sides.
    Uniform(usize),
    /// `h` above and below, `w` left and right.
    Symmetric { h: usize, w: usize },
    Explicit {
        top: usize,
        left: usize,
        bottom: usize,
        right: usize,
    },
    /// Keeps the spatial extent at stride 1; odd totals put the extra row/column on top/left.
    Same,
    Valid,
}

impl PaddingSpec {
    pub fn resolve(self, kernel_h: usize, kernel_w: usize) -> Padding {
        match self {
            PaddingSpec::Uniform(p) => Padding::new(p, p, p, p),
            PaddingSpec::Symmetric { h, w } => Padding::new(h, w, h, w),
            PaddingSpec::Explicit {
                top,
                left,
                bottom,
                right,
            } => Padding::new(top, left, bottom, right),
            PaddingSpec::Same => {
                let pad_h = kernel_h.saturating_sub(1);
                let pad_w = kernel_w.saturating_sub(1);
                let top = (pad_h + 1) / 2;
                let left = (pad_w + 1) / 2;
                Padding::new(top, left, pad_h - top, pad_w - left)
            }
            PaddingSpec::Valid => Padding::default(),
        }
    }
}

/// Resolved four-sided padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Padding {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Padding {
    pub const fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.top == 0 && self.left == 0 && self.bottom == 0 && self.right == 0
    }
}

/// Operator attributes of a depthwise conv2d call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conv2dAttrs {
    pub strides: (usize, usize),
    pub padding: PaddingSpec,
    pub dilation: (usize, usize),
    pub out_dtype: Option<DType>,
}

impl Default for Conv2dAttrs {
    fn default() -> Self {
        Self {
            strides: (1, 1),
            padding: PaddingSpec::Valid,
            dilation: (1, 1),
            out_dtype: None,
        }
    }
}

impl Conv2dAttrs {
    /// Rejects attribute combinations no strategy can schedule.
    ///
    /// Runs before any shape is inspected so dilated requests fail the same way
    /// regardless of the tensors attached to them.
    pub fn check_supported(&self) -> ScheduleResult<()> {
        if self.dilation != (1, 1) {
            return Err(ScheduleError::unsupported(format!(
                "dilation {:?} is not supported for depthwise conv2d",
                self.dilation
            )));
        }
        if self.strides.0 == 0 || self.strides.1 == 0 {
            return Err(ScheduleError::unsupported(format!(
                "strides must be positive, got {:?}",
                self.strides
            )));
        }
        Ok(())
    }
}

/// Stable 64-bit signature of a [`Workload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadKey(pub u64);

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Shape, stride, padding and dtype of one depthwise convolution.
///
/// Only the constructors and deserialization produce values, and both check
/// `out_channels == in_channels * channel_multiplier` and that the kernel fits
/// the padded input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WorkloadFields")]
pub struct Workload {
    batch: usize,
    in_channels: usize,
    in_height: usize,
    in_width: usize,
    out_channels: usize,
    channel_multiplier: usize,
    kernel_height: usize,
    kernel_width: usize,
    stride_h: usize,
    stride_w: usize,
    padding: Padding,
    dtype: DType,
    out_dtype: DType,
}

/// Serialized form of [`Workload`], checked before it becomes one.
#[derive(Deserialize)]
struct WorkloadFields {
    batch: usize,
    in_channels: usize,
    in_height: usize,
    in_width: usize,
    out_channels: usize,
    channel_multiplier: usize,
    kernel_height: usize,
    kernel_width: usize,
    stride_h: usize,
    stride_w: usize,
    padding: Padding,
    dtype: DType,
    out_dtype: DType,
}

impl TryFrom<WorkloadFields> for Workload {
    type Error = ScheduleError;

    fn try_from(raw: WorkloadFields) -> ScheduleResult<Self> {
        let workload = Self {
            batch: raw.batch,
            in_channels: raw.in_channels,
            in_height: raw.in_height,
            in_width: raw.in_width,
            out_channels: raw.out_channels,
            channel_multiplier: raw.channel_multiplier,
            kernel_height: raw.kernel_height,
            kernel_width: raw.kernel_width,
            stride_h: raw.stride_h,
            stride_w: raw.stride_w,
            padding: raw.padding,
            dtype: raw.dtype,
            out_dtype: raw.out_dtype,
        };
        workload.check()?;
        Ok(workload)
    }
}

impl Workload {
    /// Builds a workload from `NCHW` data and `(in_channels, multiplier, kh, kw)` kernel shapes.
    pub fn from_plain_shapes(
        data_shape: &[usize],
        kernel_shape: &[usize],
        attrs: &Conv2dAttrs,
        dtype: DType,
    ) -> ScheduleResult<Self> {
        attrs.check_supported()?;
        let [batch, in_channels, in_height, in_width] =
            rank_array::<4>("data", data_shape, "NCHW")?;
        let [filter, channel_multiplier, kernel_height, kernel_width] =
            rank_array::<4>("kernel", kernel_shape, "(C, M, KH, KW)")?;
        if filter != in_channels {
            return Err(ScheduleError::layout_mismatch(
                "kernel",
                format!("{in_channels} filter channels"),
                format!("{filter}"),
            ));
        }
        Self::build(
            [batch, in_channels, in_height, in_width],
            channel_multiplier,
            [kernel_height, kernel_width],
            attrs,
            dtype,
        )
    }

    /// Builds a workload from already blocked `NCHW[x]c` data and
    /// `(OC_chunk, 1, KH, KW, 1, OC_block)` kernel shapes.
    pub fn from_blocked_shapes(
        data_shape: &[usize],
        kernel_shape: &[usize],
        attrs: &Conv2dAttrs,
        dtype: DType,
    ) -> ScheduleResult<Self> {
        attrs.check_supported()?;
        let [batch, ic_chunk, in_height, in_width, ic_block] =
            rank_array::<5>("data", data_shape, "NCHW[x]c")?;
        let [oc_chunk, one_in, kernel_height, kernel_width, one_block, oc_block] =
            rank_array::<6>("kernel", kernel_shape, "(OC_chunk, 1, KH, KW, 1, OC_block)")?;
        if one_in != 1 || one_block != 1 {
            return Err(ScheduleError::layout_mismatch(
                "kernel",
                "unit axes at positions 1 and 4",
                format!("{kernel_shape:?}"),
            ));
        }
        let (Some(in_channels), Some(out_channels)) =
            (ic_chunk.checked_mul(ic_block), oc_chunk.checked_mul(oc_block))
        else {
            return Err(ScheduleError::unsupported(format!(
                "blocked channel count overflows: data {data_shape:?}, kernel {kernel_shape:?}"
            )));
        };
        if in_channels == 0 || out_channels % in_channels != 0 {
            return Err(ScheduleError::layout_mismatch(
                "kernel",
                format!("output channels divisible by {in_channels} input channels"),
                format!("{out_channels}"),
            ));
        }
        Self::build(
            [batch, in_channels, in_height, in_width],
            out_channels / in_channels,
            [kernel_height, kernel_width],
            attrs,
            dtype,
        )
    }

    fn build(
        data: [usize; 4],
        channel_multiplier: usize,
        kernel: [usize; 2],
        attrs: &Conv2dAttrs,
        dtype: DType,
    ) -> ScheduleResult<Self> {
        let [batch, in_channels, in_height, in_width] = data;
        let [kernel_height, kernel_width] = kernel;
        let out_channels = in_channels.checked_mul(channel_multiplier).ok_or_else(|| {
            ScheduleError::unsupported(format!(
                "{in_channels} channels x multiplier {channel_multiplier} overflows"
            ))
        })?;

        let workload = Self {
            batch,
            in_channels,
            in_height,
            in_width,
            out_channels,
            channel_multiplier,
            kernel_height,
            kernel_width,
            stride_h: attrs.strides.0,
            stride_w: attrs.strides.1,
            padding: attrs.padding.resolve(kernel_height, kernel_width),
            dtype,
            out_dtype: attrs.out_dtype.unwrap_or(dtype),
        };
        workload.check()?;
        Ok(workload)
    }

    fn check(&self) -> ScheduleResult<()> {
        let dims = [
            self.batch,
            self.in_channels,
            self.in_height,
            self.in_width,
            self.channel_multiplier,
            self.kernel_height,
            self.kernel_width,
        ];
        if dims.contains(&0) {
            return Err(ScheduleError::unsupported(format!(
                "zero-sized dimension in data {:?}, kernel {:?} or multiplier {}",
                self.data_shape(),
                [self.kernel_height, self.kernel_width],
                self.channel_multiplier
            )));
        }
        if self.stride_h == 0 || self.stride_w == 0 {
            return Err(ScheduleError::unsupported(format!(
                "strides must be positive, got {:?}",
                (self.stride_h, self.stride_w)
            )));
        }
        if self.in_channels.checked_mul(self.channel_multiplier) != Some(self.out_channels) {
            return Err(ScheduleError::unsupported(format!(
                "{} output channels do not equal {} channels x multiplier {}",
                self.out_channels, self.in_channels, self.channel_multiplier
            )));
        }
        self.output_extent().map(|_| ())
    }

    fn output_extent(&self) -> ScheduleResult<(usize, usize)> {
        let p = self.padding;
        let h = conv_out_extent(self.in_height, p.top, p.bottom, self.kernel_height, self.stride_h);
        let w = conv_out_extent(self.in_width, p.left, p.right, self.kernel_width, self.stride_w);
        match (h, w) {
            (Some(h), Some(w)) => Ok((h, w)),
            _ => Err(ScheduleError::unsupported(format!(
                "kernel {}x{} does not fit input {}x{} padded by {:?}",
                self.kernel_height, self.kernel_width, self.in_height, self.in_width, p
            ))),
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn in_height(&self) -> usize {
        self.in_height
    }

    pub fn in_width(&self) -> usize {
        self.in_width
    }

    /// `in_channels * channel_multiplier`.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn channel_multiplier(&self) -> usize {
        self.channel_multiplier
    }

    pub fn kernel_height(&self) -> usize {
        self.kernel_height
    }

    pub fn kernel_width(&self) -> usize {
        self.kernel_width
    }

    pub fn stride_h(&self) -> usize {
        self.stride_h
    }

    pub fn stride_w(&self) -> usize {
        self.stride_w
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn out_dtype(&self) -> DType {
        self.out_dtype
    }

    pub fn out_height(&self) -> usize {
        let p = self.padding;
        (self.in_height + p.top + p.bottom - self.kernel_height) / self.stride_h + 1
    }

    pub fn out_width(&self) -> usize {
        let p = self.padding;
        (self.in_width + p.left + p.right - self.kernel_width) / self.stride_w + 1
    }

    /// Plain `NCHW` data shape.
    pub fn data_shape(&self) -> [usize; 4] {
        [self.batch, self.in_channels, self.in_height, self.in_width]
    }

    /// Plain `(C, M, KH, KW)` kernel shape.
    pub fn kernel_shape(&self) -> [usize; 4] {
        [
            self.in_channels,
            self.channel_multiplier,
            self.kernel_height,
            self.kernel_width,
        ]
    }

    /// Plain `NCHW` output shape.
    pub fn output_shape(&self) -> [usize; 4] {
        [
            self.batch,
            self.out_channels,
            self.out_height(),
            self.out_width(),
        ]
    }

    pub fn key(&self) -> WorkloadKey {
        let mut fp = Fingerprint::new();
        fp.write_str("depthwise_conv2d");
        for value in [
            self.batch,
            self.in_channels,
            self.in_height,
            self.in_width,
            self.out_channels,
            self.channel_multiplier,
            self.kernel_height,
            self.kernel_width,
            self.stride_h,
            self.stride_w,
            self.padding.top,
            self.padding.left,
            self.padding.bottom,
            self.padding.right,
        ] {
            fp.write_usize(value);
        }
        fp.write_str(self.dtype.as_str());
        fp.write_str(self.out_dtype.as_str());
        WorkloadKey(fp.finish())
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.padding;
        write!(
            f,
            "dwconv2d(n={}, c={}x{}, hw={}x{}, k={}x{}, s={}x{}, pad=[{},{},{},{}], {}->{})",
            self.batch,
            self.in_channels,
            self.channel_multiplier,
            self.in_height,
            self.in_width,
            self.kernel_height,
            self.kernel_width,
            self.stride_h,
            self.stride_w,
            p.top,
            p.left,
            p.bottom,
            p.right,
            self.dtype,
            self.out_dtype
        )
    }
}

fn rank_array<const N: usize>(
    tensor: &str,
    shape: &[usize],
    layout: &str,
) -> ScheduleResult<[usize; N]> {
    <[usize; N]>::try_from(shape).map_err(|_| {
        ScheduleError::layout_mismatch(
            tensor,
            format!("rank {N} ({layout})"),
            format!("rank {} {shape:?}", shape.len()),
        )
    })
}

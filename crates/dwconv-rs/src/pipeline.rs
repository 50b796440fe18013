//! End-to-end entry point: shapes in, declared graph plus schedule and layouts out.

use tracing::{debug, info};

use crate::config::{ConfigOrigin, Configuration, SplitFactor};
use crate::context::ScheduleContext;
use crate::dtype::DType;
use crate::error::{ScheduleError, ScheduleResult};
use crate::layout::InferredLayout;
use crate::registry::{resolve_strategy, OpKind, OpStrategy};
use crate::te::{ComputeGraph, OpPattern, Schedule, TensorId};
use crate::workload::{Conv2dAttrs, Workload};

/// Layout of the data and kernel tensors handed to the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputLayout {
    /// `NCHW` data and `(C, M, KH, KW)` kernel; packed inside the operator.
    #[default]
    Plain,
    /// `NCHW[x]c` data and `(OC_chunk, 1, KH, KW, 1, OC_block)` kernel, already packed.
    Blocked,
}

impl InputLayout {
    /// Builds the workload, rejecting shapes whose rank does not match this layout.
    pub fn workload(
        self,
        data_shape: &[usize],
        kernel_shape: &[usize],
        attrs: &Conv2dAttrs,
        dtype: DType,
    ) -> ScheduleResult<Workload> {
        match self {
            InputLayout::Plain => {
                Workload::from_plain_shapes(data_shape, kernel_shape, attrs, dtype)
            }
            InputLayout::Blocked => {
                Workload::from_blocked_shapes(data_shape, kernel_shape, attrs, dtype)
            }
        }
    }
}

/// Operands of one depthwise convolution inside a graph.
#[derive(Debug, Clone)]
pub struct DepthwiseCall {
    pub data: TensorId,
    pub kernel: TensorId,
    pub layout: InputLayout,
    pub attrs: Conv2dAttrs,
    /// Caller-chosen blocking; takes precedence over tuning records.
    pub config: Option<Configuration>,
}

/// What a strategy added to the graph for one call.
#[derive(Debug, Clone)]
pub struct Declared {
    /// Final tensor of the operator, after any fused epilogue.
    pub output: TensorId,
    /// The depthwise convolution node itself.
    pub conv: TensorId,
    pub workload: Workload,
    pub config: Configuration,
    pub origin: ConfigOrigin,
    /// Whether `data_vec`/`kernel_vec` pack nodes were declared.
    pub packed: bool,
}

/// Picks the blocking for `workload`: explicit request, then tuning records, then fallback.
///
/// With blocked input the channel blocks are fixed by the tensors, so a
/// fallback adopts them and a tuned or requested configuration must agree.
pub fn select_configuration(
    strategy: &dyn OpStrategy,
    workload: &Workload,
    layout: InputLayout,
    data_shape: &[usize],
    kernel_shape: &[usize],
    requested: Option<Configuration>,
    ctx: &ScheduleContext<'_>,
) -> ScheduleResult<(Configuration, ConfigOrigin)> {
    let target = ctx.target.kind();
    let (config, origin) = if let Some(config) = requested {
        (config, ConfigOrigin::Tuned)
    } else if let Some(config) = ctx.records.and_then(|log| log.lookup(target, workload)) {
        debug!(workload = %workload, config = %config, "tuning record hit");
        (*config, ConfigOrigin::Tuned)
    } else {
        if ctx.records.is_some() {
            debug!(workload = %workload, "tuning record miss");
        }
        let mut config = strategy.fallback_config(workload, ctx);
        if layout == InputLayout::Blocked {
            config.tile_ic = SplitFactor::from_inner(workload.in_channels(), data_shape[4]);
            config.tile_oc = SplitFactor::from_inner(workload.out_channels(), kernel_shape[5]);
        }
        (config, ConfigOrigin::Fallback)
    };

    if layout == InputLayout::Blocked {
        if config.ic_bn() != data_shape[4] {
            return Err(ScheduleError::layout_mismatch(
                "data",
                format!("channel block {}", config.ic_bn()),
                format!("{data_shape:?}"),
            ));
        }
        if config.oc_bn() != kernel_shape[5] {
            return Err(ScheduleError::layout_mismatch(
                "kernel",
                format!("channel block {}", config.oc_bn()),
                format!("{kernel_shape:?}"),
            ));
        }
    }
    config.validate(workload)?;
    Ok((config, origin))
}

/// Elementwise consumer fused behind the convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Epilogue {
    /// Adds a per-output-channel bias of shape `(1, OC_chunk, 1, 1, OC_block)`.
    BiasAdd,
    Relu,
}

#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub data_shape: Vec<usize>,
    pub kernel_shape: Vec<usize>,
    pub dtype: DType,
    pub layout: InputLayout,
    pub attrs: Conv2dAttrs,
    pub config: Option<Configuration>,
    pub epilogue: Vec<Epilogue>,
}

impl CompileRequest {
    /// Request over plain `NCHW` data and a `(C, M, KH, KW)` kernel.
    pub fn plain(data_shape: &[usize], kernel_shape: &[usize], dtype: DType) -> Self {
        Self {
            data_shape: data_shape.to_vec(),
            kernel_shape: kernel_shape.to_vec(),
            dtype,
            layout: InputLayout::Plain,
            attrs: Conv2dAttrs::default(),
            config: None,
            epilogue: Vec::new(),
        }
    }

    /// Request over already blocked operands.
    pub fn blocked(data_shape: &[usize], kernel_shape: &[usize], dtype: DType) -> Self {
        Self {
            layout: InputLayout::Blocked,
            ..Self::plain(data_shape, kernel_shape, dtype)
        }
    }

    pub fn with_attrs(mut self, attrs: Conv2dAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_config(mut self, config: Configuration) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_epilogue(mut self, epilogue: Epilogue) -> Self {
        self.epilogue.push(epilogue);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompiledDepthwise {
    pub graph: ComputeGraph,
    pub declared: Declared,
    pub schedule: Schedule,
    pub layout: InferredLayout,
    /// Name of the strategy that produced the schedule.
    pub strategy: String,
}

impl CompiledDepthwise {
    pub fn output(&self) -> TensorId {
        self.declared.output
    }

    pub fn workload(&self) -> &Workload {
        &self.declared.workload
    }

    pub fn config(&self) -> &Configuration {
        &self.declared.config
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.declared.origin
    }
}

/// Declares, schedules and infers layouts for one depthwise convolution.
pub fn compile_depthwise(
    request: &CompileRequest,
    ctx: &ScheduleContext<'_>,
) -> ScheduleResult<CompiledDepthwise> {
    request.attrs.check_supported()?;
    let strategy = resolve_strategy(OpKind::DepthwiseConv2dNchwc, ctx.target.kind())?;
    debug!(
        strategy = strategy.name(),
        target = %ctx.target,
        search_trial = ctx.search_trial,
        "resolved depthwise strategy"
    );

    let mut graph = ComputeGraph::new();
    let data = graph.placeholder("data", &request.data_shape, request.dtype);
    let kernel = graph.placeholder("kernel", &request.kernel_shape, request.dtype);
    let call = DepthwiseCall {
        data,
        kernel,
        layout: request.layout,
        attrs: request.attrs,
        config: request.config,
    };
    let mut declared = strategy.declare(&mut graph, &call, ctx)?;
    declared.output = declare_epilogue(&mut graph, declared.output, &request.epilogue);

    let schedule = strategy.schedule(&graph, &declared, ctx)?;
    let layout = strategy.infer_layout(&declared.workload, &declared.config)?;
    info!(
        workload = %declared.workload,
        config = %declared.config,
        origin = ?declared.origin,
        stages = schedule.stages().count(),
        "compiled depthwise conv2d"
    );
    Ok(CompiledDepthwise {
        graph,
        declared,
        schedule,
        layout,
        strategy: strategy.name().to_string(),
    })
}

fn declare_epilogue(graph: &mut ComputeGraph, input: TensorId, epilogue: &[Epilogue]) -> TensorId {
    let mut output = input;
    for op in epilogue {
        output = match op {
            Epilogue::BiasAdd => {
                let shape = graph.shape(output);
                let bias_shape = [1, shape[1], 1, 1, shape[4]];
                let dtype = graph.node(output).dtype;
                let bias = graph.placeholder("bias", &bias_shape, dtype);
                graph.elementwise("T_add", "add", &[output, bias], OpPattern::Broadcast)
            }
            Epilogue::Relu => graph.elementwise("T_relu", "relu", &[output], OpPattern::Elemwise),
        };
    }
    output
}

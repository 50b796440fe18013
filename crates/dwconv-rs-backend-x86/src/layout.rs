use dwconv_rs::config::Configuration;
use dwconv_rs::layout::{BlockedLayout, InferredLayout, LayoutDescriptor};
use dwconv_rs::{Conv2dAttrs, DType, ScheduleResult, Workload};

/// Blocked input and output layouts a configuration imposes on its neighbours.
pub fn infer_layout(workload: &Workload, config: &Configuration) -> ScheduleResult<InferredLayout> {
    let in_layout = BlockedLayout::new(config.ic_bn())?;
    let out_layout = BlockedLayout::new(config.oc_bn())?;
    Ok(InferredLayout {
        inputs: vec![LayoutDescriptor {
            shape: in_layout.blocked_shape(workload.data_shape())?.to_vec(),
            layout: in_layout,
        }],
        outputs: vec![LayoutDescriptor {
            shape: out_layout.blocked_shape(workload.output_shape())?.to_vec(),
            layout: out_layout,
        }],
    })
}

/// [`infer_layout`] starting from plain `NCHW` data and `(C, M, KH, KW)` kernel shapes.
pub fn infer_layout_from_shapes(
    data_shape: &[usize],
    kernel_shape: &[usize],
    attrs: &Conv2dAttrs,
    dtype: DType,
    config: &Configuration,
) -> ScheduleResult<InferredLayout> {
    let workload = Workload::from_plain_shapes(data_shape, kernel_shape, attrs, dtype)?;
    infer_layout(&workload, config)
}

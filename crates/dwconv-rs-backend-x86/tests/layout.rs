use anyhow::Result;
use dwconv_rs::config::TuningRecord;
use dwconv_rs::pipeline::{compile_depthwise, CompileRequest};
use dwconv_rs::{
    ConfigOrigin, Configuration, Conv2dAttrs, DType, PaddingSpec, ScheduleContext, SplitFactor,
    TargetKind, TuningLog, Workload,
};
use dwconv_rs_backend_x86::layout::{infer_layout, infer_layout_from_shapes};
use dwconv_rs_backend_x86::register_x86_strategies;

fn strided() -> Conv2dAttrs {
    Conv2dAttrs {
        strides: (2, 2),
        padding: PaddingSpec::Explicit {
            top: 1,
            left: 1,
            bottom: 0,
            right: 0,
        },
        ..Conv2dAttrs::default()
    }
}

fn config() -> Configuration {
    Configuration::new(
        SplitFactor::new(6, 4),
        SplitFactor::new(6, 8),
        SplitFactor::new(1, 14),
    )
}

#[test]
fn inferred_layout_uses_resolved_padding() -> Result<()> {
    // (28 + 1 - 3) / 2 + 1 = 14
    let layout = infer_layout_from_shapes(
        &[2, 24, 28, 28],
        &[24, 2, 3, 3],
        &strided(),
        DType::F32,
        &config(),
    )?;
    assert_eq!(layout.inputs.len(), 1);
    assert_eq!(layout.inputs[0].shape, vec![2, 6, 28, 28, 4]);
    assert_eq!(layout.inputs[0].tag(), "NCHW4c");
    assert_eq!(layout.outputs[0].shape, vec![2, 6, 14, 14, 8]);
    assert_eq!(layout.outputs[0].tag(), "NCHW8c");
    Ok(())
}

#[test]
fn inferred_layout_is_idempotent() -> Result<()> {
    let workload =
        Workload::from_plain_shapes(&[2, 24, 28, 28], &[24, 2, 3, 3], &strided(), DType::F32)?;
    let first = infer_layout(&workload, &config())?;
    let second = infer_layout(&workload, &config())?;
    assert_eq!(first, second);

    let from_shapes = infer_layout_from_shapes(
        &workload.data_shape(),
        &workload.kernel_shape(),
        &strided(),
        DType::F32,
        &config(),
    )?;
    assert_eq!(first, from_shapes);
    Ok(())
}

#[test]
fn compiled_layouts_match_declared_output() -> Result<()> {
    register_x86_strategies();
    let request = CompileRequest::plain(&[2, 24, 28, 28], &[24, 2, 3, 3], DType::F32)
        .with_attrs(strided())
        .with_config(config());
    let compiled = compile_depthwise(&request, &ScheduleContext::default())?;

    assert_eq!(compiled.strategy, "depthwise_conv2d_NCHWc.x86");
    assert_eq!(compiled.origin(), ConfigOrigin::Tuned);
    assert_eq!(
        compiled.layout.outputs[0].shape.as_slice(),
        compiled.graph.shape(compiled.output())
    );
    assert_eq!(
        compiled.layout.inputs[0].shape.as_slice(),
        compiled.graph.shape(compiled.graph.inputs(compiled.declared.conv)[0])
            .iter()
            .zip([0, 0, 1, 1, 0])
            .map(|(dim, pad)| dim - pad)
            .collect::<Vec<_>>()
            .as_slice()
    );
    Ok(())
}

#[test]
fn tuning_record_overrides_fallback() -> Result<()> {
    register_x86_strategies();
    let workload =
        Workload::from_plain_shapes(&[2, 24, 28, 28], &[24, 2, 3, 3], &strided(), DType::F32)?;
    let mut log = TuningLog::new();
    log.insert(TuningRecord {
        target: TargetKind::X86,
        workload,
        config: config(),
        cost_ns: Some(1_000),
    });

    let request =
        CompileRequest::plain(&[2, 24, 28, 28], &[24, 2, 3, 3], DType::F32).with_attrs(strided());
    let tuned = compile_depthwise(&request, &ScheduleContext::default().with_records(&log))?;
    assert_eq!(tuned.origin(), ConfigOrigin::Tuned);
    assert_eq!(*tuned.config(), config());

    let fallback = compile_depthwise(&request, &ScheduleContext::default())?;
    assert_eq!(fallback.origin(), ConfigOrigin::Fallback);
    assert_eq!(fallback.config().reg_n(), 14);
    Ok(())
}

use anyhow::Result;
use dwconv_rs::pipeline::{compile_depthwise, CompileRequest, CompiledDepthwise, Epilogue};
use dwconv_rs::te::{Attach, LoopAnnotation, Pragma, Schedule};
use dwconv_rs::{
    Configuration, Conv2dAttrs, DType, PaddingSpec, ScheduleContext, ScheduleError, SplitFactor,
    TargetDesc,
};
use dwconv_rs_backend_x86::register_x86_strategies;

fn padded() -> Conv2dAttrs {
    Conv2dAttrs {
        padding: PaddingSpec::Uniform(1),
        ..Conv2dAttrs::default()
    }
}

/// 32 channels x2 at 56x56 with a 3x3 window; blocks 8/8, width block 28.
fn mobilenet(attrs: Conv2dAttrs) -> CompileRequest {
    let out_width = if attrs.padding == PaddingSpec::Valid { 54 } else { 56 };
    CompileRequest::plain(&[1, 32, 56, 56], &[32, 2, 3, 3], DType::F32)
        .with_attrs(attrs)
        .with_config(Configuration::new(
            SplitFactor::new(4, 8),
            SplitFactor::new(8, 8),
            SplitFactor::from_inner(out_width, if out_width == 56 { 28 } else { 27 }),
        ))
}

fn compile(request: &CompileRequest, ctx: &ScheduleContext<'_>) -> Result<CompiledDepthwise> {
    register_x86_strategies();
    Ok(compile_depthwise(request, ctx)?)
}

fn stage_names(s: &Schedule) -> Vec<&str> {
    s.stages().map(|(_, stage)| stage.name()).collect()
}

fn leaf_names(s: &Schedule, stage: &str) -> Vec<String> {
    let id = s.find_stage(stage).unwrap();
    s.stage(id)
        .leaf_axes()
        .iter()
        .map(|&axis| s.axis(axis).name.clone())
        .collect()
}

fn annotation_of(s: &Schedule, stage: &str, axis: &str) -> LoopAnnotation {
    let id = s.find_stage(stage).unwrap();
    let axis = s
        .stage(id)
        .leaf_axes()
        .iter()
        .copied()
        .find(|&a| s.axis(a).name == axis)
        .unwrap();
    s.axis(axis).annotation
}

#[test]
fn padded_workload_gets_parallel_pad_stage() -> Result<()> {
    let compiled = compile(&mobilenet(padded()), &ScheduleContext::default())?;
    let s = &compiled.schedule;

    assert_eq!(
        stage_names(s),
        [
            "data_vec",
            "PaddedInput",
            "kernel_vec",
            "DepthwiseConv2d.global",
            "DepthwiseConv2d"
        ]
    );
    assert_eq!(leaf_names(s, "PaddedInput"), ["i0.i1.i2.fused", "i3", "i4"]);
    assert_eq!(
        annotation_of(s, "PaddedInput", "i0.i1.i2.fused"),
        LoopAnnotation::Parallel
    );
    let pad = s.find_stage("PaddedInput").unwrap();
    let fused = s.stage(pad).leaf_axes()[0];
    assert_eq!(s.axis(fused).extent, 4 * 58);
    Ok(())
}

#[test]
fn unpadded_workload_feeds_pack_into_conv() -> Result<()> {
    let compiled = compile(&mobilenet(Conv2dAttrs::default()), &ScheduleContext::default())?;
    let s = &compiled.schedule;

    assert!(s.find_stage("PaddedInput").is_none());
    let conv = compiled.declared.conv;
    let data_vec = compiled.graph.inputs(conv)[0];
    assert_eq!(compiled.graph.node(data_vec).name, "data_vec");
    assert_eq!(compiled.graph.shape(conv), &[1, 8, 54, 54, 8]);
    Ok(())
}

#[test]
fn conv_and_accumulation_stage_loop_nests() -> Result<()> {
    let compiled = compile(&mobilenet(padded()), &ScheduleContext::default())?;
    let s = &compiled.schedule;

    assert_eq!(
        leaf_names(s, "DepthwiseConv2d"),
        ["b", "oco.oh.fused", "ow.outer", "ow.inner", "oci"]
    );
    assert_eq!(
        annotation_of(s, "DepthwiseConv2d", "oco.oh.fused"),
        LoopAnnotation::Parallel
    );

    assert_eq!(
        leaf_names(s, "DepthwiseConv2d.global"),
        ["b", "oco", "oh", "ow.outer", "kh", "kw", "ow.inner", "oci"]
    );
    assert_eq!(
        annotation_of(s, "DepthwiseConv2d.global", "oci"),
        LoopAnnotation::Vectorized
    );
    assert_eq!(
        annotation_of(s, "DepthwiseConv2d.global", "ow.inner"),
        LoopAnnotation::Unrolled
    );

    let conv = s.find_stage("DepthwiseConv2d").unwrap();
    let cache = s.find_stage("DepthwiseConv2d.global").unwrap();
    let ow_outer = s.stage(conv).leaf_axes()[2];
    assert_eq!(s.stage(cache).attach(), Attach::At { parent: conv, axis: ow_outer });
    assert_eq!(s.axis(ow_outer).extent, 2);
    assert!(s.stage(conv).is_output());
    Ok(())
}

#[test]
fn search_trial_marks_pack_stages_only() -> Result<()> {
    let ctx = ScheduleContext::default().in_search_trial();
    let compiled = compile(&mobilenet(padded()), &ctx)?;
    let s = &compiled.schedule;
    for (stage, axis) in [("data_vec", "bs"), ("kernel_vec", "occ")] {
        let id = s.find_stage(stage).unwrap();
        let outer = s.stage(id).leaf_axes()[0];
        assert_eq!(s.axis(outer).name, axis);
        assert_eq!(s.axis(outer).pragmas.as_slice(), &[Pragma::DebugSkipRegion]);
    }
    let pad = s.find_stage("PaddedInput").unwrap();
    assert!(s.axis(s.stage(pad).leaf_axes()[0]).pragmas.is_empty());
    assert!(s.to_string().contains("@pragma(debug_skip_region)"));

    let outside = compile(&mobilenet(padded()), &ScheduleContext::default())?;
    assert!(!outside.schedule.to_string().contains("debug_skip_region"));
    Ok(())
}

#[test]
fn blocked_input_skips_packing_even_in_search_trial() -> Result<()> {
    let request = CompileRequest::blocked(&[1, 4, 56, 56, 8], &[8, 1, 3, 3, 1, 8], DType::F32)
        .with_attrs(padded());
    let ctx = ScheduleContext::default().in_search_trial();
    let compiled = compile(&request, &ctx)?;

    assert!(!compiled.declared.packed);
    assert_eq!(
        stage_names(&compiled.schedule),
        ["PaddedInput", "DepthwiseConv2d.global", "DepthwiseConv2d"]
    );
    assert!(!compiled.schedule.to_string().contains("debug_skip_region"));
    assert_eq!(compiled.config().ic_bn(), 8);
    assert_eq!(compiled.config().oc_bn(), 8);
    assert_eq!(compiled.config().reg_n(), 28);
    Ok(())
}

#[test]
fn relu_epilogue_becomes_the_output_stage() -> Result<()> {
    let request = mobilenet(padded())
        .with_epilogue(Epilogue::BiasAdd)
        .with_epilogue(Epilogue::Relu);
    let compiled = compile(&request, &ScheduleContext::default())?;
    let s = &compiled.schedule;

    let add = s.find_stage("T_add").unwrap();
    assert_eq!(s.stage(add).attach(), Attach::Inline);

    let relu = s.find_stage("T_relu").unwrap();
    assert!(s.stage(relu).is_output());
    assert_eq!(
        leaf_names(s, "T_relu"),
        ["b", "oco.oh.fused", "ow.outer", "ow.inner", "oci"]
    );
    assert_eq!(annotation_of(s, "T_relu", "oco.oh.fused"), LoopAnnotation::Parallel);
    assert_eq!(annotation_of(s, "T_relu", "oci"), LoopAnnotation::Vectorized);

    let conv = s.find_stage("DepthwiseConv2d").unwrap();
    let fused = s.stage(relu).leaf_axes()[1];
    assert_eq!(s.stage(conv).attach(), Attach::At { parent: relu, axis: fused });
    assert!(!s.stage(conv).is_output());

    let bias = compiled.graph.inputs(compiled.graph.inputs(compiled.output())[0])[1];
    assert_eq!(compiled.graph.shape(bias), &[1, 8, 1, 1, 8]);
    Ok(())
}

#[test]
fn bias_only_epilogue_stays_at_root() -> Result<()> {
    let request = mobilenet(padded()).with_epilogue(Epilogue::BiasAdd);
    let compiled = compile(&request, &ScheduleContext::default())?;
    let s = &compiled.schedule;

    let add = s.find_stage("T_add").unwrap();
    assert_eq!(s.stage(add).attach(), Attach::Root);
    let conv = s.find_stage("DepthwiseConv2d").unwrap();
    assert!(matches!(s.stage(conv).attach(), Attach::At { parent, .. } if parent == add));
    Ok(())
}

#[test]
fn dilation_fails_before_configuration() {
    register_x86_strategies();
    let request = mobilenet(Conv2dAttrs {
        dilation: (2, 1),
        ..padded()
    });
    let err = compile_depthwise(&request, &ScheduleContext::default()).unwrap_err();
    assert!(matches!(err, ScheduleError::UnsupportedWorkload { .. }));
}

#[test]
fn non_dividing_width_block_is_unschedulable() {
    register_x86_strategies();
    let request = mobilenet(padded()).with_config(Configuration::new(
        SplitFactor::new(4, 8),
        SplitFactor::new(8, 8),
        SplitFactor::new(2, 27),
    ));
    let err = compile_depthwise(&request, &ScheduleContext::default()).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::UnschedulableSplit { ref axis, factor: 27, .. } if axis == "tile_ow"
    ));
}

#[test]
fn arm_target_has_no_strategy() {
    register_x86_strategies();
    let ctx = ScheduleContext::new(TargetDesc::arm_cpu(None));
    let err = compile_depthwise(&mobilenet(padded()), &ctx).unwrap_err();
    assert!(matches!(err, ScheduleError::NoStrategy { .. }));
}

#[test]
fn overflowing_requested_split_is_rejected() {
    register_x86_strategies();
    let request = CompileRequest::plain(&[1, 32, 8, 8], &[32, 1, 3, 3], DType::F32).with_config(
        Configuration::new(
            SplitFactor::new(usize::MAX / 2, 8),
            SplitFactor::new(4, 8),
            SplitFactor::new(1, 6),
        ),
    );
    let err = compile_depthwise(&request, &ScheduleContext::default()).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::UnschedulableSplit { ref axis, .. } if axis == "tile_ic"
    ));
}

#[test]
fn overflowing_channel_multiplier_is_unsupported() {
    register_x86_strategies();
    let channels = usize::MAX / 2 + 1;
    let request = CompileRequest::plain(&[1, channels, 1, 1], &[channels, 2, 1, 1], DType::F32);
    let err = compile_depthwise(&request, &ScheduleContext::default()).unwrap_err();
    assert!(matches!(err, ScheduleError::UnsupportedWorkload { .. }));
}

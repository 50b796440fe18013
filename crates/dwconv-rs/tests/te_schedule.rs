use dwconv_rs::te::{
    Attach, AxisKind, ComputeDecl, ComputeGraph, ComputeKind, LoopAnnotation, OpPattern, Pragma,
    ReduceAxis, Schedule, ScheduleStep, StageOrigin, TensorId,
};
use dwconv_rs::{DType, ScheduleError};

struct Fixture {
    graph: ComputeGraph,
    copy: TensorId,
    sum: TensorId,
    relu: TensorId,
}

/// `input -> copy (injective) -> sum over k (reduce) -> relu (elemwise)`.
fn fixture() -> Fixture {
    let mut graph = ComputeGraph::new();
    let input = graph.placeholder("input", &[4, 6, 8], DType::F32);
    let copy = graph.compute(ComputeDecl {
        name: "copy".to_string(),
        shape: vec![4, 6, 8],
        dtype: DType::F32,
        axis_names: vec!["a".into(), "b".into(), "c".into()],
        reduce_axes: Vec::new(),
        tag: "injective".to_string(),
        pattern: OpPattern::Injective,
        inputs: vec![input],
        kind: ComputeKind::Elementwise {
            op: "copy".to_string(),
        },
    });
    let sum = graph.compute(ComputeDecl {
        name: "sum".to_string(),
        shape: vec![4, 6, 8],
        dtype: DType::F32,
        axis_names: vec!["n".into(), "h".into(), "w".into()],
        reduce_axes: vec![ReduceAxis::new("k", 3)],
        tag: "window_sum".to_string(),
        pattern: OpPattern::CommReduce,
        inputs: vec![copy],
        kind: ComputeKind::Elementwise {
            op: "window_sum".to_string(),
        },
    });
    let relu = graph.elementwise("relu", "relu", &[sum], OpPattern::Elemwise);
    Fixture {
        graph,
        copy,
        sum,
        relu,
    }
}

fn leaf_names(s: &Schedule, stage: dwconv_rs::te::StageId) -> Vec<String> {
    s.leaf_axes(stage)
        .unwrap()
        .iter()
        .map(|&axis| s.axis(axis).name.clone())
        .collect()
}

#[test]
fn create_orders_stages_producers_first() {
    let f = fixture();
    let s = Schedule::create(&f.graph, &[f.relu]);
    let names: Vec<&str> = s.stages().map(|(_, stage)| stage.name()).collect();
    assert_eq!(names, vec!["copy", "sum", "relu"]);

    let relu = s.stage_of(f.relu).expect("relu stage");
    assert!(s.stage(relu).is_output());
    assert!(!s.stage(s.stage_of(f.sum).unwrap()).is_output());
    assert_eq!(leaf_names(&s, s.stage_of(f.sum).unwrap()), ["n", "h", "w", "k"]);
    assert!(s.steps().is_empty());
}

#[test]
fn split_replaces_axis_with_outer_and_inner() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let stage = s.stage_of(f.sum).unwrap();
    let w = s.op_axes(stage).unwrap()[2];

    let (outer, inner) = s.split(stage, w, 4).unwrap();
    assert_eq!(s.axis(outer).extent, 2);
    assert_eq!(s.axis(inner).extent, 4);
    assert_eq!(leaf_names(&s, stage), ["n", "h", "w.outer", "w.inner", "k"]);
    assert!(matches!(s.steps()[0], ScheduleStep::Split { factor: 4, .. }));
}

#[test]
fn split_rejects_non_dividing_factor() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let stage = s.stage_of(f.sum).unwrap();
    let h = s.op_axes(stage).unwrap()[1];

    let err = s.split(stage, h, 4).unwrap_err();
    assert_eq!(
        err,
        ScheduleError::UnschedulableSplit {
            stage: "sum".to_string(),
            axis: "h".to_string(),
            extent: 6,
            factor: 4,
        }
    );
    assert!(matches!(
        s.split(stage, h, 0),
        Err(ScheduleError::UnschedulableSplit { factor: 0, .. })
    ));
    assert_eq!(leaf_names(&s, stage), ["n", "h", "w", "k"]);
}

#[test]
fn split_of_replaced_axis_is_axis_not_found() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let stage = s.stage_of(f.sum).unwrap();
    let w = s.op_axes(stage).unwrap()[2];
    s.split(stage, w, 2).unwrap();

    assert!(matches!(
        s.split(stage, w, 2),
        Err(ScheduleError::AxisNotFound { ref axis, .. }) if axis == "w"
    ));
}

#[test]
fn reorder_fills_the_positions_of_the_listed_axes() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let stage = s.stage_of(f.sum).unwrap();
    let axes = s.op_axes(stage).unwrap();
    let k = s.reduce_axes(stage).unwrap()[0];
    let (w_outer, w_inner) = s.split(stage, axes[2], 2).unwrap();

    s.reorder(stage, &[axes[1], k, w_inner]).unwrap();
    assert_eq!(leaf_names(&s, stage), ["n", "h", "w.outer", "k", "w.inner"]);

    s.reorder(stage, &[w_outer, axes[0]]).unwrap();
    assert_eq!(leaf_names(&s, stage), ["w.outer", "h", "n", "k", "w.inner"]);

    assert!(matches!(
        s.reorder(stage, &[k, k]),
        Err(ScheduleError::InvalidPrimitive { .. })
    ));
}

#[test]
fn fuse_requires_adjacent_axes_of_one_kind() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let stage = s.stage_of(f.sum).unwrap();
    let axes = s.op_axes(stage).unwrap();
    let k = s.reduce_axes(stage).unwrap()[0];

    assert!(matches!(
        s.fuse(stage, &[axes[0], axes[2]]),
        Err(ScheduleError::InvalidPrimitive { .. })
    ));
    assert!(matches!(
        s.fuse(stage, &[axes[2], k]),
        Err(ScheduleError::InvalidPrimitive { .. })
    ));

    let fused = s.fuse(stage, &[axes[0], axes[1]]).unwrap();
    assert_eq!(s.axis(fused).name, "n.h.fused");
    assert_eq!(s.axis(fused).extent, 24);
    assert_eq!(s.axis(fused).kind, AxisKind::Data);
    assert_eq!(leaf_names(&s, stage), ["n.h.fused", "w", "k"]);
}

#[test]
fn annotations_and_pragmas_land_on_axes() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let stage = s.stage_of(f.sum).unwrap();
    let axes = s.op_axes(stage).unwrap();
    let k = s.reduce_axes(stage).unwrap()[0];

    s.parallel(stage, axes[0]).unwrap();
    s.vectorize(stage, axes[2]).unwrap();
    s.unroll(stage, k).unwrap();
    s.pragma(stage, axes[0], Pragma::DebugSkipRegion).unwrap();
    s.pragma(stage, axes[0], Pragma::DebugSkipRegion).unwrap();

    assert_eq!(s.axis(axes[0]).annotation, LoopAnnotation::Parallel);
    assert_eq!(s.axis(axes[2]).annotation, LoopAnnotation::Vectorized);
    assert_eq!(s.axis(k).annotation, LoopAnnotation::Unrolled);
    assert_eq!(s.axis(axes[0]).pragmas.as_slice(), &[Pragma::DebugSkipRegion]);
    assert!(matches!(
        s.parallel(stage, k),
        Err(ScheduleError::InvalidPrimitive { .. })
    ));
}

#[test]
fn cache_write_moves_reduction_into_new_stage() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let stage = s.stage_of(f.sum).unwrap();
    let old_axes = s.op_axes(stage).unwrap();

    let cache = s.cache_write(stage).unwrap();
    assert_eq!(s.stage(cache).name(), "sum.global");
    assert_eq!(s.stage(cache).origin(), StageOrigin::CacheWrite(f.sum));
    assert_eq!(s.stage(stage).origin(), StageOrigin::Op(f.sum));
    assert_eq!(s.op_axes(cache).unwrap(), old_axes);
    assert_eq!(s.reduce_axes(cache).unwrap().len(), 1);
    assert!(s.reduce_axes(stage).unwrap().is_empty());
    assert_eq!(leaf_names(&s, stage), ["n", "h", "w"]);
    assert_ne!(s.op_axes(stage).unwrap(), old_axes);
    assert_eq!(s.stage_of(f.sum), Some(stage));

    let names: Vec<&str> = s.stages().map(|(_, st)| st.name()).collect();
    assert_eq!(names, vec!["copy", "sum.global", "sum", "relu"]);
    assert!(matches!(
        s.cache_write(cache),
        Err(ScheduleError::InvalidPrimitive { .. })
    ));
}

#[test]
fn compute_at_and_inline_respect_outputs_and_cycles() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let copy = s.stage_of(f.copy).unwrap();
    let sum = s.stage_of(f.sum).unwrap();
    let relu = s.stage_of(f.relu).unwrap();
    let relu_outer = s.op_axes(relu).unwrap()[0];
    let sum_outer = s.op_axes(sum).unwrap()[0];

    s.compute_at(sum, relu, relu_outer).unwrap();
    assert_eq!(s.stage(sum).attach(), Attach::At { parent: relu, axis: relu_outer });
    assert_eq!(s.attached_at(relu, relu_outer), vec![sum]);

    assert!(matches!(
        s.compute_at(relu, sum, sum_outer),
        Err(ScheduleError::InvalidPrimitive { .. })
    ));
    assert!(s.compute_inline(relu).is_err());
    assert!(s.compute_inline(sum).is_err());

    s.compute_inline(copy).unwrap();
    assert_eq!(s.stage(copy).attach(), Attach::Inline);
}

#[test]
fn display_nests_attached_stages_and_marks_inlined_ones() {
    let f = fixture();
    let mut s = Schedule::create(&f.graph, &[f.relu]);
    let copy = s.stage_of(f.copy).unwrap();
    let sum = s.stage_of(f.sum).unwrap();
    let relu = s.stage_of(f.relu).unwrap();
    let relu_axes = s.op_axes(relu).unwrap();
    s.compute_inline(copy).unwrap();
    s.parallel(relu, relu_axes[0]).unwrap();
    s.compute_at(sum, relu, relu_axes[0]).unwrap();

    let text = s.to_string();
    assert!(text.starts_with("schedule {"));
    assert!(text.contains("// copy inlined"));
    assert!(text.contains("parallel n in 0..4 {"));

    let parallel_line = text.find("parallel n in 0..4").unwrap();
    let sum_body = text.find("sum [window_sum]").unwrap();
    let relu_body = text.find("relu [broadcast]").unwrap();
    assert!(parallel_line < sum_body && sum_body < relu_body);
}

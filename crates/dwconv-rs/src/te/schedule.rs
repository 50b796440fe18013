use std::collections::HashMap;
use std::fmt;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{ScheduleError, ScheduleResult};

use super::graph::{ComputeGraph, TensorId};

/// Handle of a stage inside a [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u32);

/// Handle of a loop axis inside a [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxisId(pub u32);

pub type AxisList = SmallVec<[AxisId; 8]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Data,
    Reduce,
}

/// How a loop is executed once lowered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopAnnotation {
    #[default]
    Serial,
    Parallel,
    Vectorized,
    Unrolled,
}

impl LoopAnnotation {
    pub fn keyword(self) -> &'static str {
        match self {
            LoopAnnotation::Serial => "for",
            LoopAnnotation::Parallel => "parallel",
            LoopAnnotation::Vectorized => "vectorized",
            LoopAnnotation::Unrolled => "unrolled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pragma {
    /// Region excluded from correctness and timing accounting by the lowering step.
    DebugSkipRegion,
}

impl fmt::Display for Pragma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pragma::DebugSkipRegion => f.write_str("debug_skip_region"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterVar {
    pub name: String,
    pub extent: usize,
    pub kind: AxisKind,
    pub annotation: LoopAnnotation,
    pub pragmas: SmallVec<[Pragma; 1]>,
}

/// Where a stage's loop nest is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    Root,
    Inline,
    At { parent: StageId, axis: AxisId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOrigin {
    /// Stage computing a graph node.
    Op(TensorId),
    /// Accumulation buffer introduced by `cache_write` on the node's stage.
    CacheWrite(TensorId),
}

#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    origin: StageOrigin,
    tag: String,
    op_axes: AxisList,
    reduce_axes: AxisList,
    leaf: AxisList,
    attach: Attach,
    is_output: bool,
}

impl Stage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> StageOrigin {
        self.origin
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Data axes of the computation, before any transformation.
    pub fn op_axes(&self) -> &[AxisId] {
        &self.op_axes
    }

    pub fn reduce_axes(&self) -> &[AxisId] {
        &self.reduce_axes
    }

    /// Current loop order, outermost first.
    pub fn leaf_axes(&self) -> &[AxisId] {
        &self.leaf
    }

    pub fn attach(&self) -> Attach {
        self.attach
    }

    pub fn is_output(&self) -> bool {
        self.is_output
    }
}

/// One applied loop transformation, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleStep {
    Split {
        stage: StageId,
        axis: AxisId,
        factor: usize,
        outer: AxisId,
        inner: AxisId,
    },
    Fuse {
        stage: StageId,
        axes: AxisList,
        fused: AxisId,
    },
    Reorder {
        stage: StageId,
        order: AxisList,
    },
    Annotate {
        stage: StageId,
        axis: AxisId,
        annotation: LoopAnnotation,
    },
    Pragma {
        stage: StageId,
        axis: AxisId,
        pragma: Pragma,
    },
    CacheWrite {
        stage: StageId,
        cache: StageId,
    },
    ComputeAt {
        stage: StageId,
        parent: StageId,
        axis: AxisId,
    },
    ComputeInline {
        stage: StageId,
    },
}

/// Loop-nest plan over the compute stages reachable from a set of outputs.
#[derive(Debug, Clone)]
pub struct Schedule {
    stages: Vec<Stage>,
    order: Vec<StageId>,
    axes: Vec<IterVar>,
    steps: Vec<ScheduleStep>,
    stage_of: HashMap<TensorId, StageId>,
}

impl Schedule {
    /// Creates one untransformed stage per compute node reachable from `outputs`.
    pub fn create(graph: &ComputeGraph, outputs: &[TensorId]) -> Self {
        let mut schedule = Schedule {
            stages: Vec::new(),
            order: Vec::new(),
            axes: Vec::new(),
            steps: Vec::new(),
            stage_of: HashMap::new(),
        };

        for id in graph.post_order(outputs) {
            let Some(node) = graph.compute_node(id) else {
                continue;
            };
            let op_axes: AxisList = node
                .axis_names
                .iter()
                .zip(graph.shape(id))
                .map(|(name, &extent)| schedule.new_axis(name.clone(), extent, AxisKind::Data))
                .collect();
            let reduce_axes: AxisList = node
                .reduce_axes
                .iter()
                .map(|axis| schedule.new_axis(axis.name.clone(), axis.extent, AxisKind::Reduce))
                .collect();
            let leaf = op_axes.iter().chain(reduce_axes.iter()).copied().collect();
            let stage = schedule.push_stage(Stage {
                name: graph.node(id).name.clone(),
                origin: StageOrigin::Op(id),
                tag: node.tag.clone(),
                op_axes,
                reduce_axes,
                leaf,
                attach: Attach::Root,
                is_output: outputs.contains(&id),
            });
            schedule.order.push(stage);
            schedule.stage_of.insert(id, stage);
        }
        schedule
    }

    fn new_axis(&mut self, name: String, extent: usize, kind: AxisKind) -> AxisId {
        let id = AxisId(self.axes.len() as u32);
        self.axes.push(IterVar {
            name,
            extent,
            kind,
            annotation: LoopAnnotation::Serial,
            pragmas: SmallVec::new(),
        });
        id
    }

    fn push_stage(&mut self, stage: Stage) -> StageId {
        let id = StageId(self.stages.len() as u32);
        self.stages.push(stage);
        id
    }

    pub fn steps(&self) -> &[ScheduleStep] {
        &self.steps
    }

    /// Stage computing `tensor`; after `cache_write` this is still the copy-out stage.
    pub fn stage_of(&self, tensor: TensorId) -> Option<StageId> {
        self.stage_of.get(&tensor).copied()
    }

    pub fn find_stage(&self, name: &str) -> Option<StageId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.stages[id.0 as usize].name == name)
    }

    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.0 as usize]
    }

    /// Stages in producer-before-consumer order.
    pub fn stages(&self) -> impl Iterator<Item = (StageId, &Stage)> {
        self.order
            .iter()
            .map(move |&id| (id, &self.stages[id.0 as usize]))
    }

    pub fn axis(&self, id: AxisId) -> &IterVar {
        &self.axes[id.0 as usize]
    }

    pub fn op_axes(&self, stage: StageId) -> ScheduleResult<AxisList> {
        Ok(self.stage_ref(stage)?.op_axes.clone())
    }

    pub fn reduce_axes(&self, stage: StageId) -> ScheduleResult<AxisList> {
        Ok(self.stage_ref(stage)?.reduce_axes.clone())
    }

    pub fn leaf_axes(&self, stage: StageId) -> ScheduleResult<AxisList> {
        Ok(self.stage_ref(stage)?.leaf.clone())
    }

    /// Stages whose loop nest sits directly under `axis` of `parent`.
    pub fn attached_at(&self, parent: StageId, axis: AxisId) -> Vec<StageId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                self.stages[id.0 as usize].attach == Attach::At { parent, axis }
            })
            .collect()
    }

    fn stage_ref(&self, id: StageId) -> ScheduleResult<&Stage> {
        self.stages
            .get(id.0 as usize)
            .ok_or_else(|| ScheduleError::invalid_primitive(format!("#{}", id.0), "unknown stage"))
    }

    fn stage_name(&self, id: StageId) -> String {
        self.stages
            .get(id.0 as usize)
            .map(|stage| stage.name.clone())
            .unwrap_or_else(|| format!("#{}", id.0))
    }

    fn leaf_position(&self, stage: StageId, axis: AxisId) -> ScheduleResult<usize> {
        let stage_ref = self.stage_ref(stage)?;
        stage_ref
            .leaf
            .iter()
            .position(|&leaf| leaf == axis)
            .ok_or_else(|| ScheduleError::AxisNotFound {
                stage: stage_ref.name.clone(),
                axis: self
                    .axes
                    .get(axis.0 as usize)
                    .map(|iv| iv.name.clone())
                    .unwrap_or_else(|| format!("#{}", axis.0)),
            })
    }

    /// Splits a leaf axis into `(outer, inner)` with `inner` of extent `factor`.
    pub fn split(
        &mut self,
        stage: StageId,
        axis: AxisId,
        factor: usize,
    ) -> ScheduleResult<(AxisId, AxisId)> {
        let pos = self.leaf_position(stage, axis)?;
        let (name, extent, kind) = {
            let iv = self.axis(axis);
            (iv.name.clone(), iv.extent, iv.kind)
        };
        if factor == 0 || extent % factor != 0 {
            return Err(ScheduleError::UnschedulableSplit {
                stage: self.stage_name(stage),
                axis: name,
                extent,
                factor,
            });
        }

        let outer = self.new_axis(format!("{name}.outer"), extent / factor, kind);
        let inner = self.new_axis(format!("{name}.inner"), factor, kind);
        let leaf = &mut self.stages[stage.0 as usize].leaf;
        leaf[pos] = inner;
        leaf.insert(pos, outer);
        trace!(stage = %self.stage_name(stage), axis = %name, factor, "split");
        self.steps.push(ScheduleStep::Split {
            stage,
            axis,
            factor,
            outer,
            inner,
        });
        Ok((outer, inner))
    }

    /// Fuses adjacent leaf axes, given outermost first, into one axis.
    pub fn fuse(&mut self, stage: StageId, axes: &[AxisId]) -> ScheduleResult<AxisId> {
        let Some(&first) = axes.first() else {
            return Err(ScheduleError::invalid_primitive(
                self.stage_name(stage),
                "fuse needs at least one axis",
            ));
        };
        let start = self.leaf_position(stage, first)?;
        for (offset, &axis) in axes.iter().enumerate() {
            if self.leaf_position(stage, axis)? != start + offset {
                return Err(ScheduleError::invalid_primitive(
                    self.stage_name(stage),
                    format!("fused axes {} are not adjacent", self.axis_names(axes)),
                ));
            }
        }
        let kind = self.axis(first).kind;
        if axes.iter().any(|&axis| self.axis(axis).kind != kind) {
            return Err(ScheduleError::invalid_primitive(
                self.stage_name(stage),
                "cannot fuse data and reduction axes",
            ));
        }
        if axes.len() == 1 {
            return Ok(first);
        }

        let extent: usize = axes.iter().map(|&axis| self.axis(axis).extent).product();
        let fused = self.new_axis(format!("{}.fused", self.axis_names(axes)), extent, kind);
        let leaf = &mut self.stages[stage.0 as usize].leaf;
        leaf.drain(start..start + axes.len());
        leaf.insert(start, fused);
        self.steps.push(ScheduleStep::Fuse {
            stage,
            axes: axes.iter().copied().collect(),
            fused,
        });
        Ok(fused)
    }

    /// Rearranges `order` within the leaf positions those axes currently occupy.
    pub fn reorder(&mut self, stage: StageId, order: &[AxisId]) -> ScheduleResult<()> {
        let mut slots = Vec::with_capacity(order.len());
        for &axis in order {
            slots.push(self.leaf_position(stage, axis)?);
        }
        slots.sort_unstable();
        if slots.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ScheduleError::invalid_primitive(
                self.stage_name(stage),
                "reorder lists an axis twice",
            ));
        }

        let leaf = &mut self.stages[stage.0 as usize].leaf;
        for (&slot, &axis) in slots.iter().zip(order) {
            leaf[slot] = axis;
        }
        self.steps.push(ScheduleStep::Reorder {
            stage,
            order: order.iter().copied().collect(),
        });
        Ok(())
    }

    pub fn parallel(&mut self, stage: StageId, axis: AxisId) -> ScheduleResult<()> {
        self.annotate(stage, axis, LoopAnnotation::Parallel)
    }

    pub fn vectorize(&mut self, stage: StageId, axis: AxisId) -> ScheduleResult<()> {
        self.annotate(stage, axis, LoopAnnotation::Vectorized)
    }

    pub fn unroll(&mut self, stage: StageId, axis: AxisId) -> ScheduleResult<()> {
        self.annotate(stage, axis, LoopAnnotation::Unrolled)
    }

    fn annotate(
        &mut self,
        stage: StageId,
        axis: AxisId,
        annotation: LoopAnnotation,
    ) -> ScheduleResult<()> {
        self.leaf_position(stage, axis)?;
        if annotation == LoopAnnotation::Parallel && self.axis(axis).kind == AxisKind::Reduce {
            return Err(ScheduleError::invalid_primitive(
                self.stage_name(stage),
                format!("reduction axis `{}` cannot run in parallel", self.axis(axis).name),
            ));
        }
        self.axes[axis.0 as usize].annotation = annotation;
        self.steps.push(ScheduleStep::Annotate {
            stage,
            axis,
            annotation,
        });
        Ok(())
    }

    pub fn pragma(&mut self, stage: StageId, axis: AxisId, pragma: Pragma) -> ScheduleResult<()> {
        self.leaf_position(stage, axis)?;
        let pragmas = &mut self.axes[axis.0 as usize].pragmas;
        if !pragmas.contains(&pragma) {
            pragmas.push(pragma);
        }
        self.steps.push(ScheduleStep::Pragma {
            stage,
            axis,
            pragma,
        });
        Ok(())
    }

    /// Moves the computation of `stage` into a new accumulation stage placed
    /// just before it; `stage` keeps fresh data axes and only copies results out.
    pub fn cache_write(&mut self, stage: StageId) -> ScheduleResult<StageId> {
        let original = self.stage_ref(stage)?.clone();
        let tensor = match original.origin {
            StageOrigin::Op(tensor) => tensor,
            StageOrigin::CacheWrite(_) => {
                return Err(ScheduleError::invalid_primitive(
                    original.name,
                    "stage is already a cache stage",
                ))
            }
        };
        if original.attach == Attach::Inline {
            return Err(ScheduleError::invalid_primitive(
                original.name,
                "cannot cache an inlined stage",
            ));
        }
        let position = self
            .order
            .iter()
            .position(|&id| id == stage)
            .ok_or_else(|| ScheduleError::invalid_primitive(&original.name, "stage not ordered"))?;

        let cache = self.push_stage(Stage {
            name: format!("{}.global", original.name),
            origin: StageOrigin::CacheWrite(tensor),
            tag: original.tag.clone(),
            op_axes: original.op_axes.clone(),
            reduce_axes: original.reduce_axes.clone(),
            leaf: original.leaf.clone(),
            attach: Attach::Root,
            is_output: false,
        });

        let fresh: AxisList = original
            .op_axes
            .iter()
            .map(|&axis| {
                let iv = self.axis(axis);
                (iv.name.clone(), iv.extent)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(name, extent)| self.new_axis(name, extent, AxisKind::Data))
            .collect();
        let copy_out = &mut self.stages[stage.0 as usize];
        copy_out.op_axes = fresh.clone();
        copy_out.reduce_axes.clear();
        copy_out.leaf = fresh;

        self.order.insert(position, cache);
        self.steps.push(ScheduleStep::CacheWrite { stage, cache });
        Ok(cache)
    }

    /// Places the loop nest of `stage` inside `axis` of `parent`.
    pub fn compute_at(
        &mut self,
        stage: StageId,
        parent: StageId,
        axis: AxisId,
    ) -> ScheduleResult<()> {
        self.leaf_position(parent, axis)?;
        if self.stage_ref(stage)?.is_output {
            return Err(ScheduleError::invalid_primitive(
                self.stage_name(stage),
                "output stages stay at root",
            ));
        }
        let mut cursor = parent;
        loop {
            if cursor == stage {
                return Err(ScheduleError::invalid_primitive(
                    self.stage_name(stage),
                    format!("attaching under `{}` forms a cycle", self.stage_name(parent)),
                ));
            }
            match self.stage_ref(cursor)?.attach {
                Attach::At { parent: next, .. } => cursor = next,
                Attach::Root | Attach::Inline => break,
            }
        }

        self.stages[stage.0 as usize].attach = Attach::At { parent, axis };
        self.steps.push(ScheduleStep::ComputeAt {
            stage,
            parent,
            axis,
        });
        Ok(())
    }

    /// Folds `stage` into its consumers; reductions and outputs cannot be inlined.
    pub fn compute_inline(&mut self, stage: StageId) -> ScheduleResult<()> {
        let stage_ref = self.stage_ref(stage)?;
        if stage_ref.is_output || !stage_ref.reduce_axes.is_empty() {
            return Err(ScheduleError::invalid_primitive(
                stage_ref.name.clone(),
                "only non-output, non-reducing stages can be inlined",
            ));
        }
        self.stages[stage.0 as usize].attach = Attach::Inline;
        self.steps.push(ScheduleStep::ComputeInline { stage });
        Ok(())
    }

    fn axis_names(&self, axes: &[AxisId]) -> String {
        axes.iter()
            .map(|&axis| self.axis(axis).name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

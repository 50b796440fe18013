//! Process-wide table of schedule strategies keyed by operator and target.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;

use crate::config::Configuration;
use crate::context::ScheduleContext;
use crate::error::{ScheduleError, ScheduleResult};
use crate::layout::InferredLayout;
use crate::pipeline::{Declared, DepthwiseCall};
use crate::target::TargetKind;
use crate::te::{ComputeGraph, Schedule};
use crate::workload::Workload;

/// Operators a strategy can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    DepthwiseConv2dNchwc,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::DepthwiseConv2dNchwc => "depthwise_conv2d_NCHWc",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target-specific compute declaration, schedule and layout rules for one operator.
pub trait OpStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Priority among strategies registered for the same operator and target.
    fn plevel(&self) -> i32 {
        10
    }

    /// Blocking used when neither the caller nor the tuning records supply one.
    fn fallback_config(&self, workload: &Workload, ctx: &ScheduleContext<'_>) -> Configuration;

    /// Adds the operator's compute nodes to `graph`.
    fn declare(
        &self,
        graph: &mut ComputeGraph,
        call: &DepthwiseCall,
        ctx: &ScheduleContext<'_>,
    ) -> ScheduleResult<Declared>;

    /// Builds the loop-nest plan for everything reachable from `declared.output`.
    fn schedule(
        &self,
        graph: &ComputeGraph,
        declared: &Declared,
        ctx: &ScheduleContext<'_>,
    ) -> ScheduleResult<Schedule>;

    fn infer_layout(
        &self,
        workload: &Workload,
        config: &Configuration,
    ) -> ScheduleResult<InferredLayout>;
}

type StrategyKey = (OpKind, TargetKind);

struct StrategyRegistry {
    strategies: RwLock<HashMap<StrategyKey, Vec<Arc<dyn OpStrategy>>>>,
}

impl StrategyRegistry {
    fn new() -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, op: OpKind, target: TargetKind, strategy: Arc<dyn OpStrategy>) {
        let mut strategies = self.strategies.write().expect("strategy registry poisoned");
        let entries = strategies.entry((op, target)).or_default();
        match entries
            .iter_mut()
            .find(|existing| existing.name() == strategy.name())
        {
            Some(slot) => *slot = strategy,
            None => entries.push(strategy),
        }
    }

    fn resolve(&self, op: OpKind, target: TargetKind) -> Option<Arc<dyn OpStrategy>> {
        let strategies = self.strategies.read().expect("strategy registry poisoned");
        let mut best: Option<&Arc<dyn OpStrategy>> = None;
        for candidate in strategies.get(&(op, target))? {
            if best.map_or(true, |current| candidate.plevel() > current.plevel()) {
                best = Some(candidate);
            }
        }
        best.cloned()
    }

    fn list(&self) -> Vec<(OpKind, TargetKind, String)> {
        let mut entries: Vec<(OpKind, TargetKind, String)> = self
            .strategies
            .read()
            .expect("strategy registry poisoned")
            .iter()
            .flat_map(|(&(op, target), strategies)| {
                strategies
                    .iter()
                    .map(move |strategy| (op, target, strategy.name().to_string()))
            })
            .collect();
        entries.sort();
        entries
    }
}

static GLOBAL_REGISTRY: OnceLock<StrategyRegistry> = OnceLock::new();

fn registry() -> &'static StrategyRegistry {
    GLOBAL_REGISTRY.get_or_init(StrategyRegistry::new)
}

/// Registers `strategy`, replacing any entry of the same name for this operator and target.
pub fn register_strategy(op: OpKind, target: TargetKind, strategy: Arc<dyn OpStrategy>) {
    debug!(op = %op, target = target.as_str(), strategy = strategy.name(), "register strategy");
    registry().register(op, target, strategy);
}

/// Highest-priority strategy for `op` on `target`; ties go to the earliest registration.
pub fn resolve_strategy(op: OpKind, target: TargetKind) -> ScheduleResult<Arc<dyn OpStrategy>> {
    registry()
        .resolve(op, target)
        .ok_or_else(|| ScheduleError::NoStrategy {
            op: op.to_string(),
            target: target.as_str().to_string(),
        })
}

pub fn list_strategies() -> Vec<(OpKind, TargetKind, String)> {
    registry().list()
}

use crate::workload::Workload;

use super::{Configuration, SplitFactor, MAX_REG_N};

/// Every configuration that satisfies the blocking invariants of a workload.
///
/// Knob order is `tile_ic`, `tile_oc`, `tile_ow`; flat indices run with
/// `tile_ic` fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSpace {
    tile_ic: Vec<SplitFactor>,
    tile_oc: Vec<SplitFactor>,
    tile_ow: Vec<SplitFactor>,
}

impl ConfigSpace {
    pub fn for_workload(workload: &Workload) -> Self {
        Self {
            tile_ic: split_candidates(workload.in_channels(), usize::MAX),
            tile_oc: split_candidates(workload.out_channels(), usize::MAX),
            tile_ow: split_candidates(workload.out_width(), MAX_REG_N),
        }
    }

    pub fn knob_sizes(&self) -> [usize; 3] {
        [self.tile_ic.len(), self.tile_oc.len(), self.tile_ow.len()]
    }

    pub fn len(&self) -> usize {
        self.knob_sizes().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Configuration> {
        if index >= self.len() {
            return None;
        }
        let ic = index % self.tile_ic.len();
        let rest = index / self.tile_ic.len();
        let oc = rest % self.tile_oc.len();
        let ow = rest / self.tile_oc.len();
        Some(Configuration::new(
            self.tile_ic[ic],
            self.tile_oc[oc],
            self.tile_ow[ow],
        ))
    }

    /// Flat index of `config`, if it belongs to this space.
    pub fn index_of(&self, config: &Configuration) -> Option<usize> {
        let ic = self.tile_ic.iter().position(|f| *f == config.tile_ic)?;
        let oc = self.tile_oc.iter().position(|f| *f == config.tile_oc)?;
        let ow = self.tile_ow.iter().position(|f| *f == config.tile_ow)?;
        Some(ic + self.tile_ic.len() * (oc + self.tile_oc.len() * ow))
    }

    pub fn iter(&self) -> impl Iterator<Item = Configuration> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }
}

fn split_candidates(extent: usize, max_inner: usize) -> Vec<SplitFactor> {
    (1..=extent.min(max_inner))
        .filter(|inner| extent % inner == 0)
        .map(|inner| SplitFactor::from_inner(extent, inner))
        .collect()
}

use std::collections::HashSet;

use crate::dtype::DType;

/// Handle of a node inside a [`ComputeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub u32);

/// Fusion pattern of an operator, ordered from most to least fusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpPattern {
    Elemwise,
    Broadcast,
    Injective,
    CommReduce,
    OutEwiseFusable,
    Opaque,
}

impl OpPattern {
    /// Elementwise and broadcast ops can be inlined into their consumer.
    pub fn is_broadcast(self) -> bool {
        self <= OpPattern::Broadcast
    }
}

/// Index remap performed by a compute node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeKind {
    /// `out[n, c_chunk, h, w, c_block] = in[n, c_chunk * block + c_block, h, w]`.
    PackData { block: usize },
    /// `out[oc_chunk, 0, kh, kw, 0, oc_block] = in[oc / multiplier, oc % multiplier, kh, kw]`
    /// with `oc = oc_chunk * block + oc_block`.
    PackKernel {
        block: usize,
        channel_multiplier: usize,
    },
    /// Zero padding with per-axis amounts.
    Pad {
        before: Vec<usize>,
        after: Vec<usize>,
    },
    /// Depthwise convolution in `NCHW[x]c`, reducing over the kernel window.
    DepthwiseConv {
        strides: (usize, usize),
        channel_multiplier: usize,
        in_block: usize,
        out_block: usize,
    },
    /// Named elementwise epilogue (bias add, relu, ...).
    Elementwise { op: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceAxis {
    pub name: String,
    pub extent: usize,
}

impl ReduceAxis {
    pub fn new(name: impl Into<String>, extent: usize) -> Self {
        Self {
            name: name.into(),
            extent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeNode {
    pub kind: ComputeKind,
    pub tag: String,
    pub pattern: OpPattern,
    pub axis_names: Vec<String>,
    pub reduce_axes: Vec<ReduceAxis>,
    pub inputs: Vec<TensorId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Placeholder,
    Compute(ComputeNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub kind: NodeKind,
}

/// Everything needed to declare one compute node.
#[derive(Debug, Clone)]
pub struct ComputeDecl {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub axis_names: Vec<String>,
    pub reduce_axes: Vec<ReduceAxis>,
    pub tag: String,
    pub pattern: OpPattern,
    pub inputs: Vec<TensorId>,
    pub kind: ComputeKind,
}

/// Arena of placeholder and compute nodes.
#[derive(Debug, Clone, Default)]
pub struct ComputeGraph {
    nodes: Vec<Node>,
}

impl ComputeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node) -> TensorId {
        let id = TensorId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn placeholder(
        &mut self,
        name: impl Into<String>,
        shape: &[usize],
        dtype: DType,
    ) -> TensorId {
        self.push(Node {
            name: name.into(),
            shape: shape.to_vec(),
            dtype,
            kind: NodeKind::Placeholder,
        })
    }

    pub fn compute(&mut self, decl: ComputeDecl) -> TensorId {
        debug_assert_eq!(decl.axis_names.len(), decl.shape.len());
        debug_assert!(decl.inputs.iter().all(|id| (id.0 as usize) < self.nodes.len()));
        self.push(Node {
            name: decl.name,
            shape: decl.shape,
            dtype: decl.dtype,
            kind: NodeKind::Compute(ComputeNode {
                kind: decl.kind,
                tag: decl.tag,
                pattern: decl.pattern,
                axis_names: decl.axis_names,
                reduce_axes: decl.reduce_axes,
                inputs: decl.inputs,
            }),
        })
    }

    /// Declares an elementwise consumer shaped like its first input.
    pub fn elementwise(
        &mut self,
        name: impl Into<String>,
        op: impl Into<String>,
        inputs: &[TensorId],
        pattern: OpPattern,
    ) -> TensorId {
        let first = inputs[0];
        let shape = self.shape(first).to_vec();
        let axis_names = match self.compute_node(first) {
            Some(node) => node.axis_names.clone(),
            None => (0..shape.len()).map(|i| format!("ax{i}")).collect(),
        };
        let dtype = self.node(first).dtype;
        let op = op.into();
        self.compute(ComputeDecl {
            name: name.into(),
            dtype,
            shape,
            axis_names,
            reduce_axes: Vec::new(),
            tag: if pattern.is_broadcast() {
                "broadcast".to_string()
            } else {
                "injective".to_string()
            },
            pattern,
            inputs: inputs.to_vec(),
            kind: ComputeKind::Elementwise { op },
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: TensorId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn shape(&self, id: TensorId) -> &[usize] {
        &self.node(id).shape
    }

    pub fn compute_node(&self, id: TensorId) -> Option<&ComputeNode> {
        match &self.node(id).kind {
            NodeKind::Compute(node) => Some(node),
            NodeKind::Placeholder => None,
        }
    }

    pub fn inputs(&self, id: TensorId) -> &[TensorId] {
        self.compute_node(id)
            .map(|node| node.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes reachable from `outputs`, producers before consumers.
    ///
    /// Iterative depth-first walk with a visited set, so deep producer chains
    /// cannot exhaust the call stack.
    pub fn post_order(&self, outputs: &[TensorId]) -> Vec<TensorId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(TensorId, bool)> =
            outputs.iter().rev().map(|&id| (id, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for &input in self.inputs(id).iter().rev() {
                if !visited.contains(&input) {
                    stack.push((input, false));
                }
            }
        }
        order
    }
}

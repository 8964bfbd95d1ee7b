use std::ops::Range;

use crate::{tensor::TensorBuffer, GnnError, Result};

use super::FeatureWidths;

/// Node, edge and global features of one graph, together with its adjacency.
///
/// Invariants, checked at construction:
/// - the edge buffer, `senders` and `receivers` all have `num_edges` rows/entries;
/// - every sender and receiver lies in `[0, num_nodes)`;
/// - the global buffer has exactly one row.
///
/// Feature buffers are rewritten by every message passing round, the adjacency
/// never changes once the state is built.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphState {
    nodes: TensorBuffer,
    edges: TensorBuffer,
    globals: TensorBuffer,
    senders: Vec<usize>,
    receivers: Vec<usize>,
}

impl GraphState {
    pub fn new(
        nodes: TensorBuffer,
        edges: TensorBuffer,
        globals: TensorBuffer,
        senders: Vec<usize>,
        receivers: Vec<usize>,
    ) -> Result<Self> {
        if senders.len() != receivers.len() {
            return Err(GnnError::Shape(format!(
                "{} senders but {} receivers",
                senders.len(),
                receivers.len()
            )));
        }
        if edges.rows() != senders.len() {
            return Err(GnnError::Shape(format!(
                "Edge buffer has {} rows but the adjacency lists {} edges",
                edges.rows(),
                senders.len()
            )));
        }
        if globals.rows() != 1 {
            return Err(GnnError::Shape(format!(
                "Global buffer must have exactly one row, found {}",
                globals.rows()
            )));
        }
        check_adjacency(nodes.rows(), &senders, &receivers)?;
        Ok(Self {
            nodes,
            edges,
            globals,
            senders,
            receivers,
        })
    }

    /// Builds a state from `(sender, receiver)` pairs.
    pub fn from_edge_list(
        nodes: TensorBuffer,
        edges: TensorBuffer,
        globals: TensorBuffer,
        edge_list: &[(usize, usize)],
    ) -> Result<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) = edge_list.iter().copied().unzip();
        Self::new(nodes, edges, globals, senders, receivers)
    }

    /// A zero-filled state with the given topology and feature widths.
    pub fn zeros(
        num_nodes: usize,
        edge_list: &[(usize, usize)],
        widths: FeatureWidths,
    ) -> Result<Self> {
        Self::from_edge_list(
            TensorBuffer::try_zeros(num_nodes, widths.nodes)?,
            TensorBuffer::try_zeros(edge_list.len(), widths.edges)?,
            TensorBuffer::try_zeros(1, widths.globals)?,
            edge_list,
        )
    }

    pub fn nodes(&self) -> &TensorBuffer {
        &self.nodes
    }

    pub fn edges(&self) -> &TensorBuffer {
        &self.edges
    }

    pub fn globals(&self) -> &TensorBuffer {
        &self.globals
    }

    pub fn senders(&self) -> &[usize] {
        &self.senders
    }

    pub fn receivers(&self) -> &[usize] {
        &self.receivers
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.rows()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.rows()
    }

    pub fn widths(&self) -> FeatureWidths {
        FeatureWidths::new(self.nodes.cols(), self.edges.cols(), self.globals.cols())
    }

    /// A fully independent snapshot of this state.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Concatenates node, edge and global features of `self` and `other` along the
    /// feature axis, `self` first. Both states must describe the same graph.
    pub fn concatenate(&self, other: &GraphState) -> Result<GraphState> {
        for (entity, a, b) in [
            ("node", self.num_nodes(), other.num_nodes()),
            ("edge", self.num_edges(), other.num_edges()),
        ] {
            if a != b {
                return Err(GnnError::Shape(format!(
                    "Cannot concatenate graphs with {a} and {b} {entity} rows"
                )));
            }
        }
        if self.senders != other.senders || self.receivers != other.receivers {
            return Err(GnnError::Adjacency(
                "Cannot concatenate graphs with different adjacency".to_string(),
            ));
        }
        Ok(GraphState {
            nodes: TensorBuffer::hstack(&[&self.nodes, &other.nodes]),
            edges: TensorBuffer::hstack(&[&self.edges, &other.edges]),
            globals: TensorBuffer::hstack(&[&self.globals, &other.globals]),
            senders: self.senders.clone(),
            receivers: self.receivers.clone(),
        })
    }

    /// Keeps only the given feature columns of each entity type.
    pub fn slice_features(
        &self,
        nodes: Range<usize>,
        edges: Range<usize>,
        globals: Range<usize>,
    ) -> Result<GraphState> {
        Ok(GraphState {
            nodes: self.nodes.slice_columns(nodes)?,
            edges: self.edges.slice_columns(edges)?,
            globals: self.globals.slice_columns(globals)?,
            senders: self.senders.clone(),
            receivers: self.receivers.clone(),
        })
    }

    /// Splits the features of every entity type at the widths in `at`. This is the
    /// inverse of [`GraphState::concatenate`].
    pub fn split(&self, at: FeatureWidths) -> Result<(GraphState, GraphState)> {
        let widths = self.widths();
        let head = self.slice_features(0..at.nodes, 0..at.edges, 0..at.globals)?;
        let tail = self.slice_features(
            at.nodes..widths.nodes,
            at.edges..widths.edges,
            at.globals..widths.globals,
        )?;
        Ok((head, tail))
    }

    pub(crate) fn set_nodes(&mut self, nodes: TensorBuffer) {
        debug_assert_eq!(nodes.rows(), self.nodes.rows());
        self.nodes = nodes;
    }

    pub(crate) fn set_edges(&mut self, edges: TensorBuffer) {
        debug_assert_eq!(edges.rows(), self.edges.rows());
        self.edges = edges;
    }

    pub(crate) fn set_globals(&mut self, globals: TensorBuffer) {
        debug_assert_eq!(globals.rows(), 1);
        self.globals = globals;
    }
}

/// Checks that every index of the adjacency refers to an existing node.
pub(crate) fn check_adjacency(
    num_nodes: usize,
    senders: &[usize],
    receivers: &[usize],
) -> Result<()> {
    for (role, indices) in [("sender", senders), ("receiver", receivers)] {
        if let Some((edge, node)) = indices.iter().enumerate().find(|(_, &n)| n >= num_nodes) {
            return Err(GnnError::Adjacency(format!(
                "Edge {edge} has {role} {node}, but the graph only has {num_nodes} nodes"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::random_graph;

    #[test]
    fn test_shape_invariants() {
        let state = random_graph(5, 8, FeatureWidths::new(3, 2, 4), 7);
        assert_eq!(state.edges().rows(), state.senders().len());
        assert_eq!(state.senders().len(), state.receivers().len());
        assert!(state
            .senders()
            .iter()
            .chain(state.receivers())
            .all(|&i| i < state.num_nodes()));
    }

    #[test]
    fn test_rejects_out_of_range_adjacency() {
        let err =
            GraphState::zeros(2, &[(0, 1), (1, 2)], FeatureWidths::new(1, 1, 1)).unwrap_err();
        assert!(matches!(err, GnnError::Adjacency(_)));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let err = GraphState::new(
            TensorBuffer::zeros(2, 1),
            TensorBuffer::zeros(2, 1),
            TensorBuffer::zeros(1, 1),
            vec![0],
            vec![1],
        )
        .unwrap_err();
        assert!(matches!(err, GnnError::Shape(_)));

        let err = GraphState::new(
            TensorBuffer::zeros(2, 1),
            TensorBuffer::zeros(1, 1),
            TensorBuffer::zeros(2, 1),
            vec![0],
            vec![1],
        )
        .unwrap_err();
        assert!(matches!(err, GnnError::Shape(_)));
    }

    #[test]
    fn test_copy_is_independent() {
        let state = random_graph(3, 2, FeatureWidths::new(2, 2, 2), 1);
        let mut copy = state.copy();
        copy.set_nodes(TensorBuffer::zeros(3, 2));
        copy.set_globals(TensorBuffer::zeros(1, 5));
        assert_ne!(copy, state);
        assert_eq!(state, random_graph(3, 2, FeatureWidths::new(2, 2, 2), 1));
    }

    #[test]
    fn test_concatenate_then_split() {
        let a = random_graph(4, 3, FeatureWidths::new(2, 1, 3), 11);
        let b_base = random_graph(4, 3, FeatureWidths::new(5, 2, 1), 12);
        // same topology as `a`, different features
        let b = GraphState::new(
            b_base.nodes().clone(),
            b_base.edges().clone(),
            b_base.globals().clone(),
            a.senders().to_vec(),
            a.receivers().to_vec(),
        )
        .unwrap();

        let c = a.concatenate(&b).unwrap();
        assert_eq!(c.widths(), a.widths() + b.widths());
        let (head, tail) = c.split(a.widths()).unwrap();
        assert_eq!(head, a);
        assert_eq!(tail, b);
    }

    #[test]
    fn test_concatenate_mismatch() {
        let a = random_graph(4, 3, FeatureWidths::new(2, 2, 2), 1);
        let b = random_graph(5, 3, FeatureWidths::new(2, 2, 2), 1);
        assert!(matches!(a.concatenate(&b), Err(GnnError::Shape(_))));

        let widths = FeatureWidths::new(2, 2, 2);
        let c = GraphState::zeros(4, &[(0, 0), (1, 1), (2, 2)], widths).unwrap();
        let d = GraphState::zeros(4, &[(0, 1), (1, 1), (2, 2)], widths).unwrap();
        assert!(matches!(c.concatenate(&d), Err(GnnError::Adjacency(_))));
    }
}

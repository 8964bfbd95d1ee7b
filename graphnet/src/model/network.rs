use std::borrow::Cow;

use derive_more::Display;
use tracing::{debug, debug_span};

use crate::{
    functions::{AggregateFunction, Relation, UpdateFunction},
    graph::{FeatureWidths, GraphState},
    tensor::TensorBuffer,
};

use super::{
    description::{EdgeInput, GlobalInput, InputComposition, NodeInput},
    Infer,
};

/// The five stages of one graph network round, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Stage {
    #[display("edge_update")]
    EdgeUpdate,
    #[display("node_aggregate")]
    NodeAggregate,
    #[display("node_update")]
    NodeUpdate,
    #[display("global_aggregate")]
    GlobalAggregate,
    #[display("global_update")]
    GlobalUpdate,
}

/// Full message passing block: edges are updated from their endpoints, nodes from
/// the edges they receive, and the global row from everything.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNetworkBlock {
    name: String,
    edge_update: UpdateFunction,
    node_update: UpdateFunction,
    global_update: UpdateFunction,
    edge_node_aggregate: AggregateFunction,
    node_global_aggregate: AggregateFunction,
    edge_global_aggregate: AggregateFunction,
    inputs: InputComposition,
    input_widths: FeatureWidths,
}

impl GraphNetworkBlock {
    /// Assembles a block from already bound functions. The widths are expected to
    /// have been checked by the compiler.
    pub(crate) fn new(
        name: String,
        updates: [UpdateFunction; 3],
        aggregates: [AggregateFunction; 3],
        inputs: InputComposition,
        input_widths: FeatureWidths,
    ) -> Self {
        let [edge_update, node_update, global_update] = updates;
        let [edge_node_aggregate, node_global_aggregate, edge_global_aggregate] = aggregates;
        Self {
            name,
            edge_update,
            node_update,
            global_update,
            edge_node_aggregate,
            node_global_aggregate,
            edge_global_aggregate,
            inputs,
            input_widths,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edge_update(&self) -> &UpdateFunction {
        &self.edge_update
    }

    pub fn node_update(&self) -> &UpdateFunction {
        &self.node_update
    }

    pub fn global_update(&self) -> &UpdateFunction {
        &self.global_update
    }

    pub fn edge_node_aggregate(&self) -> AggregateFunction {
        self.edge_node_aggregate
    }

    pub fn node_global_aggregate(&self) -> AggregateFunction {
        self.node_global_aggregate
    }

    pub fn edge_global_aggregate(&self) -> AggregateFunction {
        self.edge_global_aggregate
    }

    pub fn inputs(&self) -> &InputComposition {
        &self.inputs
    }

    fn edge_input(&self, state: &GraphState) -> TensorBuffer {
        let parts = self
            .inputs
            .edge
            .iter()
            .map(|input| match input {
                EdgeInput::Edges => Cow::Borrowed(state.edges()),
                EdgeInput::Senders => Cow::Owned(state.nodes().gather_unchecked(state.senders())),
                EdgeInput::Receivers => {
                    Cow::Owned(state.nodes().gather_unchecked(state.receivers()))
                }
                EdgeInput::Globals => {
                    Cow::Owned(state.globals().broadcast_unchecked(state.num_edges()))
                }
            })
            .collect::<Vec<_>>();
        TensorBuffer::hstack(&parts.iter().map(|p| &**p).collect::<Vec<_>>())
    }

    fn node_input(&self, state: &GraphState, received: &TensorBuffer) -> TensorBuffer {
        let parts = self
            .inputs
            .node
            .iter()
            .map(|input| match input {
                NodeInput::Nodes => Cow::Borrowed(state.nodes()),
                NodeInput::ReceivedEdges => Cow::Borrowed(received),
                NodeInput::Globals => {
                    Cow::Owned(state.globals().broadcast_unchecked(state.num_nodes()))
                }
            })
            .collect::<Vec<_>>();
        TensorBuffer::hstack(&parts.iter().map(|p| &**p).collect::<Vec<_>>())
    }

    fn global_input(
        &self,
        state: &GraphState,
        node_summary: &TensorBuffer,
        edge_summary: &TensorBuffer,
    ) -> TensorBuffer {
        let parts = self
            .inputs
            .global
            .iter()
            .map(|input| match input {
                GlobalInput::Globals => state.globals(),
                GlobalInput::Nodes => node_summary,
                GlobalInput::Edges => edge_summary,
            })
            .collect::<Vec<_>>();
        TensorBuffer::hstack(&parts)
    }
}

impl Infer for GraphNetworkBlock {
    fn infer(&self, state: &mut GraphState) {
        let _span = debug_span!(
            "graph_network",
            name = %self.name,
            nodes = state.num_nodes(),
            edges = state.num_edges()
        )
        .entered();

        let edges = self.edge_update.apply(&self.edge_input(state));
        debug!(stage = %Stage::EdgeUpdate, width = edges.cols());
        state.set_edges(edges);

        let received =
            self.edge_node_aggregate
                .reduce(state.edges(), state.receivers(), state.num_nodes());
        debug!(stage = %Stage::NodeAggregate, reducer = %self.edge_node_aggregate);

        let nodes = self.node_update.apply(&self.node_input(state, &received));
        debug!(stage = %Stage::NodeUpdate, width = nodes.cols());
        state.set_nodes(nodes);

        let node_summary = self.node_global_aggregate.reduce_all(state.nodes());
        let edge_summary = self.edge_global_aggregate.reduce_all(state.edges());
        debug!(
            stage = %Stage::GlobalAggregate,
            nodes = %self.node_global_aggregate,
            edges = %self.edge_global_aggregate
        );

        let globals = self
            .global_update
            .apply(&self.global_input(state, &node_summary, &edge_summary));
        debug!(stage = %Stage::GlobalUpdate, width = globals.cols());
        state.set_globals(globals);
    }

    fn input_widths(&self) -> FeatureWidths {
        self.input_widths
    }

    fn output_widths(&self) -> FeatureWidths {
        FeatureWidths::new(
            self.node_update.output_width(),
            self.edge_update.output_width(),
            self.global_update.output_width(),
        )
    }

    fn describe(&self) -> String {
        format!(
            "GraphNetwork {}: edges {} | {} {} | nodes {} | {} {}, {} {} | globals {}",
            self.name,
            self.edge_update,
            Relation::NodesEdges,
            self.edge_node_aggregate,
            self.node_update,
            Relation::NodesGlobals,
            self.node_global_aggregate,
            Relation::EdgesGlobals,
            self.edge_global_aggregate,
            self.global_update,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        functions::{Activation, Dense, Mlp},
        GnnError,
    };

    fn constant_mlp(input: usize, output: usize, value: f32) -> UpdateFunction {
        // zero weights: the output is the bias whatever the input
        let dense =
            Dense::new(vec![0.0; input * output], vec![value; output], input, output).unwrap();
        UpdateFunction::Mlp(Mlp::new(vec![dense], Activation::Identity, false).unwrap())
    }

    fn summing_mlp(input: usize) -> UpdateFunction {
        let dense = Dense::new(vec![1.0; input], vec![0.0], input, 1).unwrap();
        UpdateFunction::Mlp(Mlp::new(vec![dense], Activation::Identity, false).unwrap())
    }

    #[test]
    fn test_stage_order_and_wiring() {
        // every edge becomes 1, nodes sum what they receive, globals sum everything
        let widths = FeatureWidths::new(1, 1, 1);
        let inputs = InputComposition::default();
        let block = GraphNetworkBlock::new(
            "toy".to_string(),
            [
                constant_mlp(inputs.edge_width(widths), 1, 1.0),
                summing_mlp(inputs.node_width(widths, 1)),
                summing_mlp(inputs.global_width(widths, 1, 1)),
            ],
            [AggregateFunction::Sum; 3],
            inputs,
            widths,
        );
        let mut state = GraphState::zeros(3, &[(0, 1), (2, 1), (1, 0)], widths).unwrap();
        block.try_infer(&mut state).unwrap();

        assert_eq!(state.edges().flatten(), &[1.0, 1.0, 1.0]);
        // node features and globals were zero, so nodes hold their in-degree
        assert_eq!(state.nodes().flatten(), &[1.0, 2.0, 0.0]);
        // globals: 0 + sum(nodes) + sum(edges)
        assert_eq!(state.globals().flatten(), &[6.0]);
        assert_eq!(state.receivers(), &[1, 1, 0]);
    }

    #[test]
    fn test_isolated_node_gets_zero_aggregate() {
        let widths = FeatureWidths::new(1, 1, 1);
        let inputs = InputComposition {
            node: vec![NodeInput::ReceivedEdges],
            ..InputComposition::default()
        };
        let block = GraphNetworkBlock::new(
            "toy".to_string(),
            [
                constant_mlp(inputs.edge_width(widths), 1, 3.0),
                summing_mlp(1),
                constant_mlp(inputs.global_width(widths, 1, 1), 1, 0.0),
            ],
            [AggregateFunction::Mean; 3],
            inputs,
            widths,
        );
        let mut state = GraphState::zeros(3, &[(0, 1), (2, 1)], widths).unwrap();
        block.infer(&mut state);
        assert_eq!(state.nodes().flatten(), &[0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_try_infer_rejects_widths() {
        let widths = FeatureWidths::new(2, 1, 1);
        let inputs = InputComposition::own_features();
        let block = GraphNetworkBlock::new(
            "toy".to_string(),
            [
                constant_mlp(1, 1, 0.0),
                constant_mlp(2, 1, 0.0),
                constant_mlp(1, 1, 0.0),
            ],
            [AggregateFunction::Sum; 3],
            inputs,
            widths,
        );
        assert_eq!(block.output_widths(), FeatureWidths::new(1, 1, 1));
        let mut state = GraphState::zeros(2, &[(0, 1)], FeatureWidths::new(1, 1, 1)).unwrap();
        assert!(matches!(block.try_infer(&mut state), Err(GnnError::Shape(_))));
    }
}

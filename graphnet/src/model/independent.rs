use tracing::debug_span;

use crate::{
    functions::UpdateFunction,
    graph::{FeatureWidths, GraphState},
};

use super::Infer;

/// Updates every entity type from its own features only; no aggregation, no
/// dependence on the adjacency. Typically used as encoder or decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphIndependentBlock {
    name: String,
    edge_update: UpdateFunction,
    node_update: UpdateFunction,
    global_update: UpdateFunction,
}

impl GraphIndependentBlock {
    /// `updates` are the edge, node and global functions, in that order.
    pub(crate) fn new(name: String, updates: [UpdateFunction; 3]) -> Self {
        let [edge_update, node_update, global_update] = updates;
        Self {
            name,
            edge_update,
            node_update,
            global_update,
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
}

impl Infer for GraphIndependentBlock {
    fn infer(&self, state: &mut GraphState) {
        let _span = debug_span!("graph_independent", name = %self.name).entered();
        let edges = self.edge_update.apply(state.edges());
        state.set_edges(edges);
        let nodes = self.node_update.apply(state.nodes());
        state.set_nodes(nodes);
        let globals = self.global_update.apply(state.globals());
        state.set_globals(globals);
    }

    fn input_widths(&self) -> FeatureWidths {
        FeatureWidths::new(
            self.node_update.input_width(),
            self.edge_update.input_width(),
            self.global_update.input_width(),
        )
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
            "GraphIndependent {}: edges {} | nodes {} | globals {}",
            self.name, self.edge_update, self.node_update, self.global_update
        )
    }
}

use serde::{Deserialize, Serialize};

use crate::{tensor::TensorBuffer, Element, GnnError};

use super::{FeatureWidths, GraphState};

/// Serialisable form of a [`GraphState`], laid out like a graph-nets data dict:
/// one inner vector per node or edge, a flat global vector and the adjacency as
/// two index lists.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDict {
    pub nodes: Vec<Vec<Element>>,
    pub edges: Vec<Vec<Element>>,
    pub globals: Vec<Element>,
    pub senders: Vec<usize>,
    pub receivers: Vec<usize>,
}

impl GraphDict {
    pub fn from_reader<R: std::io::Read>(reader: R) -> anyhow::Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Builds a state with the given feature widths. Unlike the `TryFrom`
    /// conversion, which infers widths from the first row, this keeps the width
    /// of an entity that has no rows, such as a graph without edges.
    pub fn into_state(self, widths: FeatureWidths) -> Result<GraphState, GnnError> {
        let nodes = TensorBuffer::from_rows_with_width(&self.nodes, widths.nodes)?;
        let edges = TensorBuffer::from_rows_with_width(&self.edges, widths.edges)?;
        let globals = TensorBuffer::from_flat(self.globals, 1, widths.globals)?;
        GraphState::new(nodes, edges, globals, self.senders, self.receivers)
    }
}

impl TryFrom<GraphDict> for GraphState {
    type Error = GnnError;

    fn try_from(dict: GraphDict) -> Result<Self, Self::Error> {
        let nodes = TensorBuffer::from_rows(&dict.nodes)?;
        let edges = TensorBuffer::from_rows(&dict.edges)?;
        let width = dict.globals.len();
        let globals = TensorBuffer::from_flat(dict.globals, 1, width)?;
        GraphState::new(nodes, edges, globals, dict.senders, dict.receivers)
    }
}

impl From<&GraphState> for GraphDict {
    fn from(state: &GraphState) -> Self {
        GraphDict {
            nodes: state.nodes().iter_rows().map(<[Element]>::to_vec).collect(),
            edges: state.edges().iter_rows().map(<[Element]>::to_vec).collect(),
            globals: state.globals().flatten().to_vec(),
            senders: state.senders().to_vec(),
            receivers: state.receivers().to_vec(),
        }
    }
}

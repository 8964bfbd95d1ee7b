//! The [`GraphState`] container and its serialisable [`GraphDict`] form.

mod dict;
mod state;

use derive_more::Display;
use serde::{Deserialize, Serialize};

pub use dict::GraphDict;
pub use state::GraphState;
pub(crate) use state::check_adjacency;

/// Feature widths of the three entity types of a graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("(nodes: {nodes}, edges: {edges}, globals: {globals})")]
pub struct FeatureWidths {
    pub nodes: usize,
    pub edges: usize,
    pub globals: usize,
}

impl FeatureWidths {
    pub fn new(nodes: usize, edges: usize, globals: usize) -> Self {
        Self {
            nodes,
            edges,
            globals,
        }
    }
}

impl std::ops::Add for FeatureWidths {
    type Output = FeatureWidths;

    fn add(self, rhs: Self) -> Self::Output {
        FeatureWidths {
            nodes: self.nodes + rhs.nodes,
            edges: self.edges + rhs.edges,
            globals: self.globals + rhs.globals,
        }
    }
}

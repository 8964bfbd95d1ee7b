pub mod activation;
pub mod aggregate;
pub mod mlp;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::tensor::TensorBuffer;

pub use activation::Activation;
pub use aggregate::AggregateFunction;
pub use mlp::{Dense, Mlp};

/// The entity type an update function rewrites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionTarget {
    #[display("nodes")]
    Nodes,
    #[display("edges")]
    Edges,
    #[display("globals")]
    Globals,
}

/// Source and destination of an aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Edges reduced per receiving node.
    #[display("edges -> nodes")]
    NodesEdges,
    /// All nodes reduced into the global row.
    #[display("nodes -> globals")]
    NodesGlobals,
    /// All edges reduced into the global row.
    #[display("edges -> globals")]
    EdgesGlobals,
}

/// Per-entity transform applied row by row to a feature buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateFunction {
    Mlp(Mlp),
}

impl UpdateFunction {
    pub fn apply(&self, input: &TensorBuffer) -> TensorBuffer {
        match self {
            UpdateFunction::Mlp(mlp) => mlp.apply(input),
        }
    }

    pub fn input_width(&self) -> usize {
        match self {
            UpdateFunction::Mlp(mlp) => mlp.input_width(),
        }
    }

    pub fn output_width(&self) -> usize {
        match self {
            UpdateFunction::Mlp(mlp) => mlp.output_width(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            UpdateFunction::Mlp(mlp) => mlp.describe(),
        }
    }
}

impl std::fmt::Display for UpdateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

//! Compiled graph models and the [`Infer`] contract they share.

pub mod description;
mod independent;
mod network;
mod pipeline;
mod stack;

use crate::{
    graph::{FeatureWidths, GraphState},
    GnnError, Result,
};

pub use description::{
    AggregateDescription, Architecture, EdgeInput, GlobalInput, GraphDescription,
    InputComposition, NodeInput, UpdateDescription, UpdateKind,
};
pub use independent::GraphIndependentBlock;
pub use network::{GraphNetworkBlock, Stage};
pub use pipeline::EncodeProcessDecode;
pub use stack::GraphStack;

/// A model able to rewrite a [`GraphState`] in place.
pub trait Infer {
    /// Runs the model on `state`. Features are replaced, the adjacency is kept.
    ///
    /// # Panics
    /// May panic if the feature widths of `state` differ from [`Infer::input_widths`],
    /// use [`Infer::try_infer`] for untrusted input.
    fn infer(&self, state: &mut GraphState);

    /// Feature widths the model expects.
    fn input_widths(&self) -> FeatureWidths;

    /// Feature widths of the state after [`Infer::infer`].
    fn output_widths(&self) -> FeatureWidths;

    fn describe(&self) -> String;

    /// Checks the widths of `state` before running [`Infer::infer`].
    fn try_infer(&self, state: &mut GraphState) -> Result<()> {
        let expected = self.input_widths();
        if state.widths() != expected {
            return Err(GnnError::Shape(format!(
                "model expects feature widths {expected}, got {}",
                state.widths()
            )));
        }
        self.infer(state);
        Ok(())
    }
}

/// A single compiled message passing block.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphBlock {
    Network(GraphNetworkBlock),
    Independent(GraphIndependentBlock),
}

impl GraphBlock {
    pub fn name(&self) -> &str {
        match self {
            GraphBlock::Network(block) => block.name(),
            GraphBlock::Independent(block) => block.name(),
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            GraphBlock::Network(_) => Architecture::GraphNetwork,
            GraphBlock::Independent(_) => Architecture::GraphIndependent,
        }
    }
}

impl Infer for GraphBlock {
    fn infer(&self, state: &mut GraphState) {
        match self {
            GraphBlock::Network(block) => block.infer(state),
            GraphBlock::Independent(block) => block.infer(state),
        }
    }

    fn input_widths(&self) -> FeatureWidths {
        match self {
            GraphBlock::Network(block) => block.input_widths(),
            GraphBlock::Independent(block) => block.input_widths(),
        }
    }

    fn output_widths(&self) -> FeatureWidths {
        match self {
            GraphBlock::Network(block) => block.output_widths(),
            GraphBlock::Independent(block) => block.output_widths(),
        }
    }

    fn describe(&self) -> String {
        match self {
            GraphBlock::Network(block) => block.describe(),
            GraphBlock::Independent(block) => block.describe(),
        }
    }
}

impl std::fmt::Display for GraphBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

impl<T: Infer + ?Sized> Infer for Box<T> {
    fn infer(&self, state: &mut GraphState) {
        (**self).infer(state)
    }

    fn input_widths(&self) -> FeatureWidths {
        (**self).input_widths()
    }

    fn output_widths(&self) -> FeatureWidths {
        (**self).output_widths()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

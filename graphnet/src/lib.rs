//! Graph neural network inference engine.
//!
//! A [`GraphDescription`] names the feature widths of a graph, the update function
//! of every entity type and the aggregations wiring them together. The
//! [`ModelCompiler`] binds it to trained parameters and produces a block running
//! message passing rounds on a [`GraphState`], plus equivalent standalone Rust code.

pub mod compiler;
mod error;
pub mod functions;
pub mod graph;
pub mod model;
pub mod parameters;
pub mod tensor;
pub mod testing;

pub use compiler::{CompiledModel, GeneratedCode, ModelCompiler};
pub use error::{GnnError, Result};
pub use graph::{FeatureWidths, GraphDict, GraphState};
pub use model::{
    Architecture, EncodeProcessDecode, GraphBlock, GraphDescription, GraphStack, Infer,
};
pub use parameters::{extract_parameters, ParameterMap, StateDict, WeightLayout};
pub use tensor::TensorBuffer;

/// Scalar type of every feature, weight and bias.
pub type Element = f32;

//! Module containing the [`GnnError`] type shared by the whole crate.

/// Errors raised while building buffers and graph states or while compiling a
/// [`GraphDescription`](crate::model::GraphDescription).
///
/// All of them are detected before inference runs: a compiled block fed with a
/// shape-consistent [`GraphState`](crate::graph::GraphState) cannot fail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GnnError {
    /// Buffer, row or column counts do not line up.
    #[error("Shape mismatch: {0}")]
    Shape(String),
    /// A trained tensor is missing or its length does not match the declared layer shape.
    #[error("Parameter mismatch: {0}")]
    ParameterMismatch(String),
    /// An update, aggregate or activation kind is not recognised.
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),
    /// A sender or receiver index falls outside of the node range.
    #[error("Invalid adjacency: {0}")]
    Adjacency(String),
}

pub type Result<T, E = GnnError> = std::result::Result<T, E>;

//! Row-major feature storage used for node, edge and global attributes.

mod buffer;

pub use buffer::TensorBuffer;

//! Reductions collapsing per-edge or per-node rows into one row per destination.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{tensor::TensorBuffer, GnnError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    #[display("sum")]
    Sum,
    #[display("mean")]
    Mean,
}

impl AggregateFunction {
    /// Parses the reducer tag used in model descriptions.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "sum" => Ok(AggregateFunction::Sum),
            "mean" => Ok(AggregateFunction::Mean),
            other => Err(GnnError::UnsupportedFunction(format!(
                "aggregator '{other}' is not supported"
            ))),
        }
    }

    /// Reduces the rows of `source` into `segments` rows: output row `j` combines
    /// every source row `k` with `index[k] == j`. Destinations without any
    /// contribution stay zero, for both reducers.
    pub fn aggregate(
        &self,
        source: &TensorBuffer,
        index: &[usize],
        segments: usize,
    ) -> Result<TensorBuffer> {
        if index.len() != source.rows() {
            return Err(GnnError::Shape(format!(
                "aggregation index has {} entries for {} source rows",
                index.len(),
                source.rows()
            )));
        }
        if let Some(bad) = index.iter().find(|&&j| j >= segments) {
            return Err(GnnError::Adjacency(format!(
                "aggregation index {bad} is outside of {segments} destinations"
            )));
        }
        Ok(self.reduce(source, index, segments))
    }

    /// Reduces every row of `source` into a single row.
    pub fn reduce_all(&self, source: &TensorBuffer) -> TensorBuffer {
        self.reduce(source, &vec![0; source.rows()], 1)
    }

    pub(crate) fn reduce(
        &self,
        source: &TensorBuffer,
        index: &[usize],
        segments: usize,
    ) -> TensorBuffer {
        let cols = source.cols();
        let mut totals = vec![0.0; segments * cols];
        let mut counts = vec![0usize; segments];
        for (row, &j) in source.iter_rows().zip(index) {
            counts[j] += 1;
            for (t, v) in totals[j * cols..(j + 1) * cols].iter_mut().zip(row) {
                *t += v;
            }
        }
        if let AggregateFunction::Mean = self {
            for (j, &count) in counts.iter().enumerate().filter(|(_, &c)| c > 0) {
                totals[j * cols..(j + 1) * cols]
                    .iter_mut()
                    .for_each(|t| *t /= count as f32);
            }
        }
        TensorBuffer::from_flat_unchecked(totals, segments, cols)
    }
}

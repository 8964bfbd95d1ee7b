use std::ops::Range;

use rayon::prelude::*;

use crate::{Element, GnnError, Result};

#[derive(Debug, Clone, PartialEq, Default)]
/// A resizable two dimensional buffer: one row per entity, one column per feature.
///
/// The flat storage is row-major and always holds exactly `rows * cols` values.
pub struct TensorBuffer {
    rows: usize,
    cols: usize,
    data: Vec<Element>,
}

impl TensorBuffer {
    /// Buffer of the given shape filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Zero-filled buffer whose shape comes from untrusted input.
    pub fn try_zeros(rows: usize, cols: usize) -> Result<Self> {
        Ok(Self {
            rows,
            cols,
            data: vec![0.0; element_count(rows, cols)?],
        })
    }

    /// Wraps a flat row-major sequence, checking that its length matches the shape.
    pub fn from_flat(values: Vec<Element>, rows: usize, cols: usize) -> Result<Self> {
        let len = element_count(rows, cols)?;
        if values.len() != len {
            return Err(GnnError::Shape(format!(
                "Could not construct TensorBuffer, expected data length to be {len} ({rows}x{cols}), supplied data had length: {}",
                values.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data: values,
        })
    }

    pub(crate) fn from_flat_unchecked(values: Vec<Element>, rows: usize, cols: usize) -> Self {
        debug_assert_eq!(values.len(), rows * cols);
        Self {
            rows,
            cols,
            data: values,
        }
    }

    /// Builds a buffer from a list of rows. An empty list gives a `0x0` buffer.
    pub fn from_rows(rows: &[Vec<Element>]) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or_default();
        Self::from_rows_with_width(rows, cols)
    }

    /// Builds a `rows.len() x cols` buffer. Every row must hold `cols` values; an
    /// empty list keeps the width.
    pub fn from_rows_with_width(rows: &[Vec<Element>], cols: usize) -> Result<Self> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(GnnError::Shape(format!(
                "Row {i} has {} features, expected {cols}",
                row.len()
            )));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.concat(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    /// Changes the shape in place. Values whose (row, column) position exists in
    /// both shapes are kept, new positions are zero.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if cols == self.cols {
            self.data.resize(rows * cols, 0.0);
            self.rows = rows;
            return;
        }
        let mut data = vec![0.0; rows * cols];
        let kept = cols.min(self.cols);
        for r in 0..rows.min(self.rows) {
            data[r * cols..r * cols + kept].copy_from_slice(&self.row(r)[..kept]);
        }
        *self = Self { rows, cols, data };
    }

    /// Returns row `i`, or `None` when it is out of range.
    pub fn get_row(&self, i: usize) -> Option<&[Element]> {
        (i < self.rows).then(|| self.row(i))
    }

    /// Returns row `i`.
    ///
    /// # Panics
    /// Panics if `i >= self.rows()`.
    pub fn row(&self, i: usize) -> &[Element] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Overwrites row `i` with `values`.
    pub fn set_row(&mut self, i: usize, values: &[Element]) -> Result<()> {
        if i >= self.rows {
            return Err(GnnError::Shape(format!(
                "Cannot set row {i}, buffer only has {} rows",
                self.rows
            )));
        }
        if values.len() != self.cols {
            return Err(GnnError::Shape(format!(
                "Cannot set row {i}: got {} values, buffer has {} columns",
                values.len(),
                self.cols
            )));
        }
        let cols = self.cols;
        self.data[i * cols..(i + 1) * cols].copy_from_slice(values);
        Ok(())
    }

    /// The flat row-major storage.
    pub fn flatten(&self) -> &[Element] {
        &self.data
    }

    pub fn into_flat(self) -> Vec<Element> {
        self.data
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[Element]> + '_ {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Concatenates buffers along the feature axis. All parts must have the same row count.
    pub fn concat_columns(parts: &[&TensorBuffer]) -> Result<TensorBuffer> {
        if let Some(first) = parts.first() {
            if let Some(other) = parts.iter().find(|p| p.rows != first.rows) {
                return Err(GnnError::Shape(format!(
                    "Cannot concatenate buffers with {} and {} rows",
                    first.rows, other.rows
                )));
            }
        }
        Ok(Self::hstack(parts))
    }

    /// Column concatenation for parts already known to share their row count.
    pub(crate) fn hstack(parts: &[&TensorBuffer]) -> TensorBuffer {
        let rows = parts.first().map(|p| p.rows).unwrap_or_default();
        debug_assert!(parts.iter().all(|p| p.rows == rows));
        let cols = parts.iter().map(|p| p.cols).sum::<usize>();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(r));
            }
        }
        TensorBuffer { rows, cols, data }
    }

    /// Copies the columns in `range` of every row into a new buffer.
    pub fn slice_columns(&self, range: Range<usize>) -> Result<TensorBuffer> {
        if range.start > range.end || range.end > self.cols {
            return Err(GnnError::Shape(format!(
                "Column range {range:?} is outside of a buffer with {} columns",
                self.cols
            )));
        }
        let data = self
            .iter_rows()
            .flat_map(|row| row[range.clone()].iter().copied())
            .collect();
        Ok(TensorBuffer {
            rows: self.rows,
            cols: range.len(),
            data,
        })
    }

    /// Row `k` of the result is row `indices[k]` of `self`. Indices must be in range.
    pub(crate) fn gather_unchecked(&self, indices: &[usize]) -> TensorBuffer {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        TensorBuffer {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Repeats row 0 `rows` times.
    pub(crate) fn broadcast_unchecked(&self, rows: usize) -> TensorBuffer {
        debug_assert_eq!(self.rows, 1);
        TensorBuffer {
            rows,
            cols: self.cols,
            data: self.row(0).repeat(rows),
        }
    }

    /// Applies `f` to every row independently, producing rows of `out_cols` values.
    /// Rows are processed in parallel; the output order is the input order.
    pub fn map_rows<F>(&self, out_cols: usize, f: F) -> TensorBuffer
    where
        F: Fn(&[Element], &mut [Element]) + Send + Sync,
    {
        let mut out = TensorBuffer::zeros(self.rows, out_cols);
        if out_cols == 0 {
            return out;
        }
        out.data
            .par_chunks_mut(out_cols)
            .enumerate()
            .for_each(|(r, out_row)| f(self.row(r), out_row));
        out
    }
}

fn element_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols)
        .ok_or_else(|| GnnError::Shape(format!("A {rows}x{cols} buffer does not fit in memory")))
}

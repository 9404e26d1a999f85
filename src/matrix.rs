//! Dense row-major f32 matrix used throughout the amplification pipeline.
//!
//! Atom tables, heightmaps, masks and the synthesis canvas are all
//! `DenseMatrix` values. Block operations take [`Span`] arguments so a whole
//! axis can be selected without building a range for it.

use std::io::{self, Read, Write};
use std::ops::Range;

use rayon::prelude::*;

/// Selects either a full axis or an explicit half-open index range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Span {
    /// The whole axis, regardless of its length.
    All,
    Of(Range<usize>),
}

impl Span {
    fn resolve(&self, len: usize) -> Range<usize> {
        match self {
            Span::All => 0..len,
            Span::Of(range) => range.clone(),
        }
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::Of(range)
    }
}

/// A dense 2-D matrix of `f32` stored row-major in a flat buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    columns: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    /// Create a zero-filled matrix.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            data: vec![0.0; rows * columns],
        }
    }

    /// Wrap an existing buffer. The buffer length must be `rows * columns`.
    pub fn from_vec(rows: usize, columns: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            rows * columns,
            "buffer length {} does not match {}x{}",
            data.len(),
            rows,
            columns
        );
        Self { rows, columns, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat backing slice, row-major.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    fn index(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> f32 {
        self.data[self.index(row, column)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, column: usize, value: f32) {
        let idx = self.index(row, column);
        self.data[idx] = value;
    }

    /// Copy out a rectangular block.
    pub fn block(&self, rows: Span, columns: Span) -> DenseMatrix {
        let row_range = rows.resolve(self.rows);
        let column_range = columns.resolve(self.columns);
        let mut output = DenseMatrix::new(row_range.len(), column_range.len());
        for (row_index, row) in row_range.enumerate() {
            for (column_index, column) in column_range.clone().enumerate() {
                output.set(row_index, column_index, self.get(row, column));
            }
        }
        output
    }

    /// Overwrite a rectangular block with `values`, which must be at least
    /// as large as the selected block.
    pub fn set_block(&mut self, rows: Span, columns: Span, values: &DenseMatrix) {
        let row_range = rows.resolve(self.rows);
        let column_range = columns.resolve(self.columns);
        for (row_index, row) in row_range.enumerate() {
            for (column_index, column) in column_range.clone().enumerate() {
                self.set(row, column, values.get(row_index, column_index));
            }
        }
    }

    /// Mean over a rectangular block. Returns NaN for an empty selection.
    pub fn mean_block(&self, rows: Span, columns: Span) -> f32 {
        let row_range = rows.resolve(self.rows);
        let column_range = columns.resolve(self.columns);
        let count = row_range.len() * column_range.len();
        if count == 0 {
            return f32::NAN;
        }
        let mut sum = 0.0f64;
        for row in row_range {
            let offset = row * self.columns;
            for column in column_range.clone() {
                sum += self.data[offset + column] as f64;
            }
        }
        (sum / count as f64) as f32
    }

    /// Sum over a rectangular block.
    pub fn sum_block(&self, rows: Span, columns: Span) -> f32 {
        let row_range = rows.resolve(self.rows);
        let column_range = columns.resolve(self.columns);
        let mut sum = 0.0f64;
        for row in row_range {
            let offset = row * self.columns;
            for column in column_range.clone() {
                sum += self.data[offset + column] as f64;
            }
        }
        sum as f32
    }

    /// Sum of a slice of one row.
    pub fn sum_row(&self, row: usize, columns: Span) -> f32 {
        let column_range = columns.resolve(self.columns);
        let offset = row * self.columns;
        let mut sum = 0.0f64;
        for column in column_range {
            sum += self.data[offset + column] as f64;
        }
        sum as f32
    }

    /// Sum of a slice of one column.
    pub fn sum_column(&self, rows: Span, column: usize) -> f32 {
        let row_range = rows.resolve(self.rows);
        let mut sum = 0.0f64;
        for row in row_range {
            sum += self.data[row * self.columns + column] as f64;
        }
        sum as f32
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return f32::NAN;
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::NAN, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NAN, f32::max)
    }

    pub fn transpose(&self) -> DenseMatrix {
        let mut output = DenseMatrix::new(self.columns, self.rows);
        for row in 0..self.rows {
            for column in 0..self.columns {
                output.set(column, row, self.get(row, column));
            }
        }
        output
    }

    /// Transpose with one rayon task per output row.
    pub fn par_transpose(&self) -> DenseMatrix {
        let rows = self.rows;
        let mut output = DenseMatrix::new(self.columns, self.rows);
        output
            .data
            .par_chunks_mut(rows)
            .enumerate()
            .for_each(|(column, out_row)| {
                for (row, slot) in out_row.iter_mut().enumerate() {
                    *slot = self.data[row * self.columns + column];
                }
            });
        output
    }

    /// Naive triple-loop matrix product, skipping zero entries on the
    /// contraction index. Panics on a dimension mismatch.
    pub fn matrix_multiply(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(
            self.columns, other.rows,
            "left columns {} did not match right rows {}",
            self.columns, other.rows
        );
        let mut output = DenseMatrix::new(self.rows, other.columns);
        for i in 0..self.rows {
            let out_offset = i * other.columns;
            for k in 0..self.columns {
                let ik = self.data[i * self.columns + k];
                if ik == 0.0 {
                    continue;
                }
                let other_offset = k * other.columns;
                for j in 0..other.columns {
                    output.data[out_offset + j] += ik * other.data[other_offset + j];
                }
            }
        }
        output
    }

    /// Parallel matrix product, one rayon task per output row.
    pub fn par_matrix_multiply(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(
            self.columns, other.rows,
            "left columns {} did not match right rows {}",
            self.columns, other.rows
        );
        let mut output = DenseMatrix::new(self.rows, other.columns);
        output
            .data
            .par_chunks_mut(other.columns)
            .enumerate()
            .for_each(|(i, out_row)| {
                for k in 0..self.columns {
                    let ik = self.data[i * self.columns + k];
                    if ik == 0.0 {
                        continue;
                    }
                    let other_offset = k * other.columns;
                    for (j, slot) in out_row.iter_mut().enumerate() {
                        *slot += ik * other.data[other_offset + j];
                    }
                }
            });
        output
    }

    /// Rotate a square matrix 90 degrees clockwise in place.
    pub fn rotate_90_clockwise(&mut self) {
        assert_eq!(self.rows, self.columns, "rotation requires a square matrix");
        let n = self.rows;
        for i in 0..n / 2 {
            for j in i..n - i - 1 {
                let last = n - 1;
                let temp = self.get(i, j);
                self.set(i, j, self.get(last - j, i));
                self.set(last - j, i, self.get(last - i, last - j));
                self.set(last - i, last - j, self.get(j, last - i));
                self.set(j, last - i, temp);
            }
        }
    }

    /// Serialize as big-endian `i32 rows, i32 columns, f32 data`.
    pub fn write_to<W: Write>(&self, output: &mut W) -> io::Result<()> {
        output.write_all(&(self.rows as i32).to_be_bytes())?;
        output.write_all(&(self.columns as i32).to_be_bytes())?;
        for &value in &self.data {
            output.write_all(&value.to_be_bytes())?;
        }
        Ok(())
    }

    /// Inverse of [`DenseMatrix::write_to`].
    pub fn read_from<R: Read>(input: &mut R) -> io::Result<DenseMatrix> {
        let rows = read_i32(input)? as usize;
        let columns = read_i32(input)? as usize;
        let mut data = vec![0.0f32; rows * columns];
        let mut buf = [0u8; 4];
        for value in &mut data {
            input.read_exact(&mut buf)?;
            *value = f32::from_be_bytes(buf);
        }
        Ok(DenseMatrix { rows, columns, data })
    }
}

pub(crate) fn read_i32<R: Read>(input: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub(crate) fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

macro_rules! elementwise {
    ($trait:ident, $method:ident, $op:tt) => {
        impl std::ops::$trait<&DenseMatrix> for &DenseMatrix {
            type Output = DenseMatrix;

            fn $method(self, other: &DenseMatrix) -> DenseMatrix {
                assert_eq!(
                    (self.rows, self.columns),
                    (other.rows, other.columns),
                    "elementwise operand shapes differ"
                );
                let data = self
                    .data
                    .iter()
                    .zip(&other.data)
                    .map(|(&a, &b)| a $op b)
                    .collect();
                DenseMatrix::from_vec(self.rows, self.columns, data)
            }
        }

        impl std::ops::$trait<f32> for &DenseMatrix {
            type Output = DenseMatrix;

            fn $method(self, scalar: f32) -> DenseMatrix {
                let data = self.data.iter().map(|&a| a $op scalar).collect();
                DenseMatrix::from_vec(self.rows, self.columns, data)
            }
        }
    };
}

elementwise!(Add, add, +);
elementwise!(Sub, sub, -);
elementwise!(Mul, mul, *);
elementwise!(Div, div, /);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DenseMatrix {
        DenseMatrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
    }

    #[test]
    fn test_block_whole_axis() {
        let m = sample();
        let column = m.block(Span::All, Span::Of(1..2));
        assert_eq!(column.rows(), 2);
        assert_eq!(column.columns(), 1);
        assert_eq!(column.data(), &[2.0, 5.0]);
    }

    #[test]
    fn test_set_block() {
        let mut m = DenseMatrix::new(3, 3);
        let patch = DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        m.set_block(Span::Of(1..3), Span::Of(1..3), &patch);
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(2, 2), 4.0);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn test_elementwise_and_scalar_ops() {
        let m = sample();
        let sum = &m + &m;
        assert_eq!(sum.get(1, 2), 12.0);
        let scaled = &m * 2.0;
        assert_eq!(scaled.get(0, 1), 4.0);
        let diff = &scaled - &m;
        assert_eq!(diff.data(), m.data());
        let halves = &m / 2.0;
        assert!((halves.get(0, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reductions() {
        let m = sample();
        assert!((m.mean() - 3.5).abs() < 1e-6);
        assert_eq!(m.min(), 1.0);
        assert_eq!(m.max(), 6.0);
        assert!((m.mean_block(Span::Of(0..1), Span::All) - 2.0).abs() < 1e-6);
        assert!((m.sum_row(1, Span::Of(0..2)) - 9.0).abs() < 1e-6);
        assert!((m.sum_column(Span::All, 2) - 9.0).abs() < 1e-6);
        assert!((m.sum_block(Span::All, Span::All) - 21.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_of_empty_block_is_nan() {
        let m = sample();
        assert!(m.mean_block(Span::Of(1..1), Span::All).is_nan());
    }

    #[test]
    fn test_transpose_matches_parallel_transpose() {
        let m = sample();
        let t = m.transpose();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.columns(), 2);
        assert_eq!(t.get(2, 1), 6.0);
        assert_eq!(m.par_transpose(), t);
    }

    #[test]
    fn test_matrix_multiply() {
        let a = DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = DenseMatrix::from_vec(2, 2, vec![0.0, 1.0, 1.0, 0.0]);
        let product = a.matrix_multiply(&b);
        assert_eq!(product.data(), &[2.0, 1.0, 4.0, 3.0]);
        assert_eq!(a.par_matrix_multiply(&b), product);
    }

    #[test]
    #[should_panic(expected = "did not match")]
    fn test_matrix_multiply_dimension_mismatch_panics() {
        let a = DenseMatrix::new(2, 3);
        let b = DenseMatrix::new(2, 2);
        let _ = a.matrix_multiply(&b);
    }

    #[test]
    fn test_rotate_90_clockwise() {
        let mut m = DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        m.rotate_90_clockwise();
        assert_eq!(m.data(), &[3.0, 1.0, 4.0, 2.0]);
    }

    #[test]
    fn test_stream_round_trip() {
        let m = sample();
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();
        let read = DenseMatrix::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(read, m);
    }
}

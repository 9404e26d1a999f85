//! Patch extraction: per-patch means, mean-subtracted weighted atoms, and
//! the region-label index mask.
//!
//! All three scans are embarrassingly parallel; each task writes a disjoint
//! slice of the output, so no locking is involved.

use rayon::prelude::*;

use crate::matrix::{DenseMatrix, Span};

/// Byte-valued region-label grid, row-major like [`DenseMatrix`].
#[derive(Clone, Debug)]
pub struct LabelMap {
    rows: usize,
    columns: usize,
    data: Vec<u8>,
}

impl LabelMap {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            data: vec![0; rows * columns],
        }
    }

    pub fn from_vec(rows: usize, columns: usize, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), rows * columns, "label buffer length mismatch");
        Self { rows, columns, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> u8 {
        self.data[row * self.columns + column]
    }

    #[inline]
    pub fn set(&mut self, row: usize, column: usize, value: u8) {
        self.data[row * self.columns + column] = value;
    }
}

/// Mean of the terrain under each patch footprint, one value per grid cell.
pub fn build_means(
    mask_size: usize,
    offset: usize,
    grid_rows: usize,
    grid_cols: usize,
    terrain: &DenseMatrix,
) -> DenseMatrix {
    let mut means = DenseMatrix::new(grid_rows, grid_cols);
    means
        .data_mut()
        .par_chunks_mut(grid_cols)
        .enumerate()
        .for_each(|(i, row)| {
            let row_range = i * offset..i * offset + mask_size;
            for (j, slot) in row.iter_mut().enumerate() {
                *slot = terrain.mean_block(
                    Span::Of(row_range.clone()),
                    Span::Of(j * offset..j * offset + mask_size),
                );
            }
        });
    means
}

/// Extract one atom per grid cell: the patch flattened column-major
/// (patch columns outer, rows inner), mean-subtracted and weighted by the
/// radial mask. The result has shape `(patch_area, patch_count)` with one
/// atom per column.
pub fn build_atoms(
    mask: &DenseMatrix,
    offset: usize,
    grid_rows: usize,
    grid_cols: usize,
    means: &DenseMatrix,
    terrain: &DenseMatrix,
) -> DenseMatrix {
    let mask_size = mask.columns();
    let patch_area = mask_size * mask_size;
    let terrain_columns = terrain.columns();
    let terrain_data = terrain.data();
    let mask_data = mask.data();

    // Patch-major staging keeps every write contiguous per task; the final
    // transpose puts atoms into columns.
    let mut patch_major = DenseMatrix::new(grid_rows * grid_cols, patch_area);
    patch_major
        .data_mut()
        .par_chunks_mut(patch_area)
        .enumerate()
        .for_each(|(cell, atom)| {
            let i = cell / grid_cols;
            let j = cell % grid_cols;
            let mean = means.get(i, j);
            let mut t = 0;
            for column in j * offset..j * offset + mask_size {
                for row in i * offset..i * offset + mask_size {
                    atom[t] = (terrain_data[row * terrain_columns + column] - mean) * mask_data[t];
                    t += 1;
                }
            }
        });
    patch_major.par_transpose()
}

/// Pick the governing dictionary per grid cell from the region labels under
/// its footprint.
///
/// This is a running-max scan, not a majority vote: the result is the
/// largest label in `[1, dictionary_count - 1]` that appears anywhere in
/// the footprint, or 0 when none does. Downstream dictionary selection
/// depends on this exact behavior.
pub fn region_index_mask(
    mask_size: usize,
    offset: usize,
    grid_cols: usize,
    grid_rows: usize,
    labels: &LabelMap,
    dictionary_count: usize,
) -> Vec<usize> {
    let mut index_mask = vec![0usize; grid_rows * grid_cols];
    index_mask
        .par_chunks_mut(grid_cols)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, slot) in row.iter_mut().enumerate() {
                *slot = footprint_label_max(
                    labels,
                    i * offset,
                    j * offset,
                    mask_size,
                    dictionary_count,
                );
            }
        });
    index_mask
}

fn footprint_label_max(
    labels: &LabelMap,
    row_start: usize,
    column_start: usize,
    mask_size: usize,
    cap: usize,
) -> usize {
    let mut max = 0usize;
    let mut count = 0usize;
    for row in row_start..row_start + mask_size {
        for column in column_start..column_start + mask_size {
            let current = labels.get(row, column) as usize;
            if current > max && current < cap {
                max = current;
                count += 1;
            }
        }
    }
    if count == 0 {
        0
    } else {
        max
    }
}

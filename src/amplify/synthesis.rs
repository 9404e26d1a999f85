//! Overlap-add synthesis: scatter matched high-res atoms into the output
//! canvas, restore per-patch means, and normalize overlapping mask weights
//! with a precomputed divisor mask.
//!
//! Row blocks run in parallel. Adjacent blocks share the bottom
//! `mask_size_high - offset_high` canvas rows, so each block takes the
//! mutex for its own boundary and the next one, always in ascending index
//! order; non-adjacent blocks share no locks and proceed concurrently.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::coefficients::Coefficients;
use crate::dictionary::Dictionary;
use crate::matrix::{DenseMatrix, Span};

/// Raw shared view of the canvas buffer.
///
/// Safety contract: a caller may only touch indices inside canvas rows whose
/// boundary locks it currently holds. Blocks that could overlap always share
/// a boundary lock, so no two threads ever write the same cell.
struct SharedCanvas {
    ptr: *mut f32,
    len: usize,
}

unsafe impl Sync for SharedCanvas {}

impl SharedCanvas {
    fn new(data: &mut [f32]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
        }
    }

    /// Accumulate `value` at `index` and return the new cell value.
    #[inline]
    unsafe fn accumulate(&self, index: usize, value: f32) -> f32 {
        debug_assert!(index < self.len);
        let cell = self.ptr.add(index);
        let updated = *cell + value;
        *cell = updated;
        updated
    }
}

/// Reciprocal-of-overlap-sum tile, one entry per output-offset residue.
///
/// The mask is tiled at every offset-aligned position over a synthetic
/// canvas large enough for three full periods per axis; the stable interior
/// tile is extracted and inverted, so a multiply during synthesis directly
/// normalizes the overlap-add accumulation.
pub fn build_divisor_mask(mask_high: &DenseMatrix, offset_high: usize) -> DenseMatrix {
    let mask_size_high = mask_high.rows();
    let offsets_per_mask = (mask_size_high + offset_high - 1) / offset_high;
    let iterations = offsets_per_mask * 3;
    let width = (iterations - 1) * offset_high + mask_size_high;
    let mut tiled = DenseMatrix::new(width, width);
    for i in 0..iterations {
        for j in 0..iterations {
            for row_index in 0..mask_size_high {
                let row = i * offset_high + row_index;
                let mask_offset = row_index * mask_size_high;
                let tiled_offset = row * width + j * offset_high;
                for column_index in 0..mask_size_high {
                    tiled.data_mut()[tiled_offset + column_index] +=
                        mask_high.data()[mask_offset + column_index];
                }
            }
        }
    }
    let start = offset_high * offsets_per_mask;
    let mut divisor = tiled.block(
        Span::Of(start..start + offset_high),
        Span::Of(start..start + offset_high),
    );
    for value in divisor.data_mut() {
        *value = 1.0 / *value;
    }
    divisor
}

/// Reconstruct the high-resolution canvas.
///
/// Every patch writes `coefficient-scaled atom + mask * mean * divisor`
/// into its footprint; the atom term is zero for unmatched patches or
/// out-of-bounds dictionary indices, so no patch ever leaves a hole.
/// Returns the canvas together with the min/max of every value written.
#[allow(clippy::too_many_arguments)]
pub fn synthesize(
    dilated: &DenseMatrix,
    mask_size: usize,
    offset: usize,
    coefficients: &Coefficients,
    dictionaries: &[Dictionary],
    index_mask: &[usize],
    input_rows: usize,
    input_columns: usize,
    factor: usize,
    mask_size_high: usize,
    offset_high: usize,
    means: &DenseMatrix,
    mask_high: &DenseMatrix,
    divisor_mask: &DenseMatrix,
) -> (DenseMatrix, f32, f32) {
    let d1 = (dilated.rows() - mask_size) / offset;
    let d2 = (dilated.columns() - mask_size) / offset;
    let canvas_rows = input_rows * factor + 2 * mask_size_high;
    let canvas_columns = input_columns * factor + 2 * mask_size_high;
    let mut data = vec![0.0f32; canvas_rows * canvas_columns];

    let canvas = SharedCanvas::new(&mut data);
    let locks: Vec<Mutex<()>> = (0..=d1).map(|_| Mutex::new(())).collect();
    let mask_data = mask_high.data();
    let divisor_data = divisor_mask.data();

    let (min, max) = (0..d1)
        .into_par_iter()
        .map(|i| {
            // Ascending acquisition order cannot deadlock between
            // neighboring blocks racing for the shared boundary.
            let _lower = locks[i].lock().unwrap();
            let _upper = locks[i + 1].lock().unwrap();

            let mut local_min = f32::MAX;
            let mut local_max = f32::MIN;
            let block_cells = i * d2;
            for j in 0..d2 {
                let cell = block_cells + j;
                let high = index_mask
                    .get(cell)
                    .and_then(|&index| dictionaries.get(index))
                    .map(|dictionary| &dictionary.high);
                let mean = means.get(i, j);
                for row_index in 0..mask_size_high {
                    let row = i * offset_high + row_index;
                    let mask_offset = row_index * mask_size_high;
                    let divisor_offset = row % offset_high * offset_high;
                    let row_offset = row * canvas_columns;
                    for column_index in 0..mask_size_high {
                        let mask_value = mask_data[mask_offset + column_index];
                        if mask_value == 0.0 {
                            continue;
                        }
                        let column = j * offset_high + column_index;
                        let atom_value = match high {
                            Some(high) => coefficients.weighted(
                                cell,
                                column_index * mask_size_high + row_index,
                                high,
                            ),
                            None => 0.0,
                        };
                        let contribution = atom_value
                            + mask_value * mean * divisor_data[divisor_offset + column % offset_high];
                        let current = unsafe { canvas.accumulate(row_offset + column, contribution) };
                        if current < local_min {
                            local_min = current;
                        }
                        if current > local_max {
                            local_max = current;
                        }
                    }
                }
            }
            (local_min, local_max)
        })
        .reduce(
            || (f32::MAX, f32::MIN),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        );

    (
        DenseMatrix::from_vec(canvas_rows, canvas_columns, data),
        min,
        max,
    )
}

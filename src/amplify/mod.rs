//! Dictionary-based heightmap amplification.
//!
//! The pipeline takes a low-resolution heightmap, a per-patch dictionary
//! index mask, and the loaded dictionaries, then:
//! 1. dilates the input so boundary patches see plausible terrain,
//! 2. extracts mean-subtracted, radially-weighted patches ("atoms"),
//! 3. greedily matches each patch to its single best dictionary atom,
//! 4. scatters the matched high-res atoms into an overlap-add canvas,
//!    restoring per-patch means and normalizing overlapping weights.

pub mod matching;
pub mod patches;
pub mod synthesis;

use std::time::Instant;

use crate::dictionary::Dictionary;
use crate::matrix::DenseMatrix;

pub use patches::LabelMap;

/// The synthesized canvas and the value range observed while writing it.
/// The range drives the final rescale to 16-bit output.
pub struct Amplified {
    pub canvas: DenseMatrix,
    pub min: f32,
    pub max: f32,
}

/// Patch-grid dimensions for an input of the given size. The grid covers
/// the dilated input, so it extends `mask_size` beyond each input edge.
pub fn grid_dims(
    input_rows: usize,
    input_columns: usize,
    mask_size: usize,
    offset: usize,
) -> (usize, usize) {
    (
        (input_rows + mask_size) / offset,
        (input_columns + mask_size) / offset,
    )
}

/// Run the full amplification pipeline.
///
/// `index_mask` selects the governing dictionary per patch position and must
/// have been built for the same grid as [`grid_dims`] reports.
pub fn amplify(
    factor: usize,
    input: &DenseMatrix,
    index_mask: &[usize],
    mask_size: usize,
    offset: usize,
    dictionaries: &[Dictionary],
) -> Amplified {
    let dilated = dilate_terrain(input, mask_size * 2);
    let mask = build_mask(mask_size);
    let mask_size_high = mask_size * factor;
    let mask_high = build_mask(mask_size_high);
    let offset_high = offset * factor;
    let divisor_mask = synthesis::build_divisor_mask(&mask_high, offset_high);
    let useful_rows = build_mask_useful_indices(&mask);

    let start = Instant::now();
    let (grid_rows, grid_cols) = grid_dims(input.rows(), input.columns(), mask_size, offset);
    let means = patches::build_means(mask_size, offset, grid_rows, grid_cols, &dilated);
    let atoms = patches::build_atoms(&mask, offset, grid_rows, grid_cols, &means, &dilated);
    let coefficients = matching::matching(dictionaries, index_mask, &atoms, &useful_rows);
    println!("Matching: {:.3}s", start.elapsed().as_secs_f32());

    let start = Instant::now();
    let (canvas, min, max) = synthesis::synthesize(
        &dilated,
        mask_size,
        offset,
        &coefficients,
        dictionaries,
        index_mask,
        input.rows(),
        input.columns(),
        factor,
        mask_size_high,
        offset_high,
        &means,
        &mask_high,
        &divisor_mask,
    );
    println!("Synthesis: {:.3}s", start.elapsed().as_secs_f32());

    Amplified { canvas, min, max }
}

/// Square radial falloff mask. Values decrease from 1.0 at the center to
/// zero at the corners; the quadratic is squared so the falloff is smooth.
pub fn build_mask(size: usize) -> DenseMatrix {
    let falloff = 1.0 - 1.0 / size as f32;
    let radius = (size - 1) as f32 * 0.5;
    let mut mask = DenseMatrix::new(size, size);
    for i in 0..size {
        let x = (i as f32 - radius) / radius;
        for j in 0..size {
            let y = (j as f32 - radius) / radius;
            let value = (1.0 - falloff * (x * x + y * y)).max(0.0);
            mask.set(i, j, value * value);
        }
    }
    mask
}

/// Flat indices of the non-zero mask cells. Matching restricts its
/// contraction to these rows; the zero corners never contribute.
pub fn build_mask_useful_indices(mask: &DenseMatrix) -> Vec<usize> {
    mask.data()
        .iter()
        .enumerate()
        .filter(|(_, &value)| value != 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// Pad a heightmap by `s / 2` on each side with edge-clamped values, so
/// patches that straddle the border still see plausible terrain.
pub fn dilate_terrain(terrain: &DenseMatrix, s: usize) -> DenseMatrix {
    let radius = (s / 2) as isize;
    let rows = terrain.rows();
    let columns = terrain.columns();
    let mut output = DenseMatrix::new(rows + s, columns + s);
    for row in 0..output.rows() {
        let source_row = (row as isize - radius).clamp(0, rows as isize - 1) as usize;
        for column in 0..output.columns() {
            let source_column =
                (column as isize - radius).clamp(0, columns as isize - 1) as usize;
            output.set(row, column, terrain.get(source_row, source_column));
        }
    }
    output
}

/// Edge-clamped padding for the region-label map, mirroring
/// [`dilate_terrain`].
pub fn dilate_labels(labels: &LabelMap, s: usize) -> LabelMap {
    let radius = (s / 2) as isize;
    let rows = labels.rows();
    let columns = labels.columns();
    let mut output = LabelMap::new(rows + s, columns + s);
    for row in 0..output.rows() {
        let source_row = (row as isize - radius).clamp(0, rows as isize - 1) as usize;
        for column in 0..output.columns() {
            let source_column =
                (column as isize - radius).clamp(0, columns as isize - 1) as usize;
            output.set(row, column, labels.get(source_row, source_column));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Span;

    #[test]
    fn test_mask_center_is_one_and_decreases_outward() {
        let mask = build_mask(9);
        let center = mask.get(4, 4);
        assert!((center - 1.0).abs() < 1e-6);
        // Monotone along the center row from center to edge.
        let mut previous = center;
        for j in 5..9 {
            let value = mask.get(4, j);
            assert!(value <= previous);
            previous = value;
        }
        // Corners fall outside the radial support entirely.
        assert_eq!(mask.get(0, 0), 0.0);
    }

    #[test]
    fn test_useful_indices_skip_zero_cells() {
        let mask = build_mask(8);
        let useful = build_mask_useful_indices(&mask);
        assert!(useful.len() < mask.len());
        for &index in &useful {
            assert!(mask.data()[index] != 0.0);
        }
        let zeros = mask.data().iter().filter(|&&v| v == 0.0).count();
        assert_eq!(useful.len() + zeros, mask.len());
    }

    #[test]
    fn test_dilate_terrain_clamps_to_nearest_edge() {
        let terrain = DenseMatrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let dilated = dilate_terrain(&terrain, 4);
        assert_eq!(dilated.rows(), 6);
        assert_eq!(dilated.columns(), 7);
        // Interior copy is untouched.
        for row in 0..2 {
            for column in 0..3 {
                assert_eq!(dilated.get(row + 2, column + 2), terrain.get(row, column));
            }
        }
        // Corners clamp to the nearest original cell.
        assert_eq!(dilated.get(0, 0), 1.0);
        assert_eq!(dilated.get(5, 6), 6.0);
        assert_eq!(dilated.get(0, 6), 3.0);
        assert_eq!(dilated.get(5, 0), 4.0);
    }

    #[test]
    fn test_dilate_labels_clamps_to_nearest_edge() {
        let labels = LabelMap::from_vec(2, 2, vec![1, 2, 3, 4]);
        let dilated = dilate_labels(&labels, 2);
        assert_eq!(dilated.rows(), 4);
        assert_eq!(dilated.columns(), 4);
        assert_eq!(dilated.get(0, 0), 1);
        assert_eq!(dilated.get(3, 3), 4);
        assert_eq!(dilated.get(1, 1), 1);
    }

    // Uniform input, a zero low atom and a zero high atom: every patch is
    // unmatched, so the canvas interior must reconstruct the constant input
    // value purely from restored means.
    #[test]
    fn test_uniform_input_reconstructs_constant_interior() {
        use crate::dictionary::Dictionary;

        let mask_size = 4;
        let offset = 2;
        let factor = 2;
        let value = 0.37f32;
        let input = DenseMatrix::from_vec(4, 4, vec![value; 16]);

        // One atom, entirely zero: matching scores are all zero, so every
        // patch falls back to mean-only reconstruction.
        let area = mask_size * mask_size;
        let high_area = area * factor * factor;
        let dictionary = Dictionary {
            low: DenseMatrix::new(area, 1),
            high: DenseMatrix::new(1, high_area),
        };

        let (grid_rows, grid_cols) = grid_dims(4, 4, mask_size, offset);
        let index_mask = vec![0usize; grid_rows * grid_cols];
        let result = amplify(factor, &input, &index_mask, mask_size, offset, &[dictionary]);

        let margin = mask_size * factor;
        let interior = result.canvas.block(
            Span::Of(margin..margin + 4 * factor),
            Span::Of(margin..margin + 4 * factor),
        );
        for &v in interior.data() {
            assert!(
                (v - value).abs() < 1e-3,
                "interior value {} differs from input {}",
                v,
                value
            );
        }
    }
}

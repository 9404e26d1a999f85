//! Greedy single-atom matching: each patch keeps the one dictionary atom
//! with the largest positive projection, or nothing at all.

use rayon::prelude::*;

use crate::coefficients::{AtomMatch, Coefficients};
use crate::dictionary::Dictionary;
use crate::matrix::DenseMatrix;

/// Projections below this never produce a match; the patch reconstructs
/// from its local mean alone.
pub const MATCH_THRESHOLD: f32 = 1e-7;

/// Roughly how many rayon work items the patch columns are split into.
const MATCH_CHUNKS: usize = 512;

/// Project one patch column against every atom of `dictionary_low`,
/// restricted to the mask's non-zero rows, and return the argmax.
///
/// The running maximum starts at zero, so a patch whose projections are all
/// non-positive reports a zero score.
pub fn match_atom(
    dictionary_low: &DenseMatrix,
    atoms: &DenseMatrix,
    patch: usize,
    useful_rows: &[usize],
) -> (usize, f32) {
    let atom_count = dictionary_low.columns();
    let patch_count = atoms.columns();
    let dictionary_data = dictionary_low.data();
    let atom_data = atoms.data();

    let mut output = vec![0.0f32; atom_count];
    for &k in useful_rows {
        let kj = atom_data[k * patch_count + patch];
        if kj == 0.0 {
            continue;
        }
        let offset = k * atom_count;
        for (slot, &value) in output.iter_mut().zip(&dictionary_data[offset..offset + atom_count]) {
            *slot += value * kj;
        }
    }

    let mut max = 0.0f32;
    let mut best = 0usize;
    for (i, &value) in output.iter().enumerate() {
        if value > max {
            max = value;
            best = i;
        }
    }
    (best, max)
}

/// Match every patch column against the dictionary its index-mask entry
/// selects. Patches whose best score falls below [`MATCH_THRESHOLD`], or
/// whose dictionary index is out of bounds, stay unmatched.
pub fn matching(
    dictionaries: &[Dictionary],
    index_mask: &[usize],
    atoms: &DenseMatrix,
    useful_rows: &[usize],
) -> Coefficients {
    let patch_count = atoms.columns();
    let min_len = (patch_count / MATCH_CHUNKS).max(1);
    let entries: Vec<Option<AtomMatch>> = (0..patch_count)
        .into_par_iter()
        .with_min_len(min_len)
        .map(|patch| {
            let dictionary = index_mask
                .get(patch)
                .and_then(|&index| dictionaries.get(index))?;
            let (atom, score) = match_atom(&dictionary.low, atoms, patch, useful_rows);
            if score >= MATCH_THRESHOLD {
                Some(AtomMatch { atom, scale: score })
            } else {
                None
            }
        })
        .collect();
    Coefficients::from_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_rows(count: usize) -> Vec<usize> {
        (0..count).collect()
    }

    #[test]
    fn test_match_atom_picks_maximal_projection() {
        // Two atoms in a 4-dim space; the patch equals the second atom, so
        // its self-projection dominates.
        let dictionary_low = DenseMatrix::from_vec(
            4,
            2,
            vec![
                1.0, 0.0, //
                0.0, 1.0, //
                0.0, 1.0, //
                0.0, 0.0,
            ],
        );
        let atoms = DenseMatrix::from_vec(4, 1, vec![0.0, 2.0, 2.0, 0.0]);
        let (atom, score) = match_atom(&dictionary_low, &atoms, 0, &all_rows(4));
        assert_eq!(atom, 1);
        assert!((score - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_match_atom_ignores_rows_outside_useful_set() {
        let dictionary_low = DenseMatrix::from_vec(2, 1, vec![1.0, 1.0]);
        let atoms = DenseMatrix::from_vec(2, 1, vec![1.0, 100.0]);
        let (_, score) = match_atom(&dictionary_low, &atoms, 0, &[0]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_projections_never_match() {
        let dictionary_low = DenseMatrix::from_vec(2, 1, vec![1.0, 1.0]);
        let atoms = DenseMatrix::from_vec(2, 1, vec![-1.0, -1.0]);
        let (atom, score) = match_atom(&dictionary_low, &atoms, 0, &all_rows(2));
        assert_eq!(atom, 0);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_matching_respects_threshold_and_sparsity() {
        let strong = Dictionary {
            low: DenseMatrix::from_vec(2, 1, vec![1.0, 1.0]),
            high: DenseMatrix::new(1, 8),
        };
        // Patch 0 projects positively, patch 1 is orthogonal.
        let atoms = DenseMatrix::from_vec(2, 2, vec![3.0, 0.0, 3.0, 0.0]);
        let coefficients = matching(&[strong], &[0, 0], &atoms, &all_rows(2));
        assert_eq!(coefficients.len(), 2);
        let m = coefficients.get(0).unwrap();
        assert_eq!(m.atom, 0);
        assert!((m.scale - 6.0).abs() < 1e-6);
        assert!(coefficients.get(1).is_none());
    }

    #[test]
    fn test_matching_dispatches_by_index_mask() {
        let zeros = Dictionary {
            low: DenseMatrix::new(2, 1),
            high: DenseMatrix::new(1, 8),
        };
        let ones = Dictionary {
            low: DenseMatrix::from_vec(2, 1, vec![1.0, 1.0]),
            high: DenseMatrix::new(1, 8),
        };
        let atoms = DenseMatrix::from_vec(2, 2, vec![1.0, 1.0, 1.0, 1.0]);
        let coefficients = matching(&[zeros, ones], &[0, 1], &atoms, &all_rows(2));
        // Dictionary 0 is all zeros: no match. Dictionary 1 matches.
        assert!(coefficients.get(0).is_none());
        assert!(coefficients.get(1).is_some());
    }

    #[test]
    fn test_out_of_bounds_dictionary_index_leaves_patch_unmatched() {
        let only = Dictionary {
            low: DenseMatrix::from_vec(2, 1, vec![1.0, 1.0]),
            high: DenseMatrix::new(1, 8),
        };
        let atoms = DenseMatrix::from_vec(2, 1, vec![1.0, 1.0]);
        let coefficients = matching(&[only], &[9], &atoms, &all_rows(2));
        assert!(coefficients.get(0).is_none());
    }
}

//! Sparse per-patch coefficient table produced by the matching stage.

use crate::matrix::DenseMatrix;

/// A single accepted match: which dictionary atom and at what scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtomMatch {
    pub atom: usize,
    pub scale: f32,
}

/// At most one [`AtomMatch`] per patch. Unmatched patches fall back to
/// mean-only reconstruction during synthesis.
#[derive(Clone, Debug)]
pub struct Coefficients {
    entries: Vec<Option<AtomMatch>>,
}

impl Coefficients {
    pub fn new(patches: usize) -> Self {
        Self {
            entries: vec![None; patches],
        }
    }

    pub fn from_entries(entries: Vec<Option<AtomMatch>>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the match for a patch, replacing any previous one.
    pub fn set(&mut self, patch: usize, atom: usize, scale: f32) {
        self.entries[patch] = Some(AtomMatch { atom, scale });
    }

    pub fn get(&self, patch: usize) -> Option<AtomMatch> {
        self.entries[patch]
    }

    /// Coefficient-scaled high-res atom sample at `local`, or 0.0 when the
    /// patch has no match.
    #[inline]
    pub fn weighted(&self, patch: usize, local: usize, high: &DenseMatrix) -> f32 {
        match self.entries[patch] {
            Some(m) => m.scale * high.get(m.atom, local),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_patch_contributes_zero() {
        let high = DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let coefficients = Coefficients::new(3);
        assert_eq!(coefficients.weighted(1, 0, &high), 0.0);
    }

    #[test]
    fn test_weighted_lookup() {
        let high = DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let mut coefficients = Coefficients::new(2);
        coefficients.set(0, 1, 0.5);
        assert!((coefficients.weighted(0, 1, &high) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_reads_atoms_as_rows() {
        // Two distinct atoms: row selects the atom, column the local index.
        let high = DenseMatrix::from_vec(
            2,
            4,
            vec![
                1.0, 2.0, 3.0, 4.0, //
                10.0, 11.0, 12.0, 13.0,
            ],
        );
        let mut coefficients = Coefficients::new(1);
        coefficients.set(0, 1, 0.5);
        assert!((coefficients.weighted(0, 0, &high) - 5.0).abs() < 1e-6);
        assert!((coefficients.weighted(0, 3, &high) - 6.5).abs() < 1e-6);
    }

    #[test]
    fn test_single_entry_per_patch() {
        let mut coefficients = Coefficients::new(1);
        coefficients.set(0, 3, 1.0);
        coefficients.set(0, 7, 2.0);
        let m = coefficients.get(0).unwrap();
        assert_eq!(m.atom, 7);
        assert_eq!(m.scale, 2.0);
    }
}

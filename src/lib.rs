//! Dictionary-based terrain amplification.
//!
//! Synthesizes a higher-resolution heightmap from a low-resolution input by
//! greedy sparse patch-matching against pre-built example dictionaries,
//! followed by overlap-add reconstruction with radial-weighted blending.

pub mod amplify;
pub mod coefficients;
pub mod dictionary;
pub mod io;
pub mod matrix;

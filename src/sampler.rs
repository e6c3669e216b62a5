//! Categorical sampling from probability tables.

use ndarray::{Array1, ArrayView2};
use rand::Rng;

/// Inverse-CDF draw of one 0-based category from a probability row.
///
/// The last category absorbs any floating residue left in the cumulative sum.
#[inline]
pub fn draw_category<R: Rng>(probs: &[f64], rng: &mut R) -> usize {
    let u: f64 = rng.random();
    let mut cumsum = 0.0;
    for (k, &p) in probs.iter().enumerate() {
        cumsum += p;
        if u < cumsum {
            return k;
        }
    }
    probs.len().saturating_sub(1)
}

/// Draw one category per row of an N x K probability table.
pub fn sample_responses<R: Rng>(probs: ArrayView2<f64>, rng: &mut R) -> Array1<i32> {
    let mut row_buf = Vec::with_capacity(probs.ncols());
    probs
        .outer_iter()
        .map(|row| {
            row_buf.clear();
            row_buf.extend(row.iter().copied());
            draw_category(&row_buf, rng) as i32
        })
        .collect()
}

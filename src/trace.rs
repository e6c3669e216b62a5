//! Probability tracing: category probabilities of one item over a trait matrix.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{SimError, SimResult};
use crate::family::{ItemFamily, UnfoldingLink};
use crate::item::{ItemAux, ItemObject};
use crate::theta::ensure_finite;
use crate::utils::{logsumexp, renormalize, sigmoid, softmax_into};

#[inline]
fn linear(a: &[f64], theta: ArrayView1<f64>) -> f64 {
    a.iter().zip(theta.iter()).map(|(a, t)| a * t).sum()
}

#[inline]
fn with_asymptotes(p_star: f64, guess_logit: f64, upper_logit: f64) -> f64 {
    let g = sigmoid(guess_logit);
    let u = sigmoid(upper_logit);
    g + (u - g) * p_star
}

#[inline]
fn set_binary(p: f64, out: &mut [f64]) {
    let p = p.clamp(0.0, 1.0);
    out[0] = 1.0 - p;
    out[1] = p;
}

/// Category probabilities for a single trait vector.
///
/// `scratch` must hold at least `ncat` values.
fn category_probs(item: &ItemObject, theta: ArrayView1<f64>, out: &mut [f64], scratch: &mut [f64]) {
    let par = item.par();
    let f = item.nfact();
    let k = item.ncat();
    let a = item.slopes();
    let log_num = &mut scratch[..k];

    match item.family() {
        ItemFamily::Dichotomous => {
            let p = with_asymptotes(sigmoid(linear(a, theta) + par[f]), par[f + 1], par[f + 2]);
            set_binary(p, out);
        }
        ItemFamily::Graded => {
            let z = linear(a, theta);
            let upper_tail = |c: usize| -> f64 {
                if c == 0 {
                    1.0
                } else if c == k {
                    0.0
                } else {
                    sigmoid(z + par[f + c - 1])
                }
            };
            for (c, o) in out.iter_mut().enumerate() {
                *o = upper_tail(c) - upper_tail(c + 1);
            }
            renormalize(out);
        }
        ItemFamily::Gpcm => {
            let d = &par[par.len() - k..];
            let ItemAux::Gpcm { scoring } = item.aux() else {
                unreachable!("gpcm items always carry a scoring matrix")
            };
            for c in 0..k {
                let score: f64 = (0..f).map(|j| scoring[[c, j]] * a[j] * theta[j]).sum();
                log_num[c] = score + d[c];
            }
            softmax_into(log_num, out);
        }
        ItemFamily::Nominal => {
            let z = linear(a, theta);
            let ak = &par[f..f + k];
            let d = &par[f + k..f + 2 * k];
            for c in 0..k {
                log_num[c] = ak[c] * z + d[c];
            }
            softmax_into(log_num, out);
            if par.len() == f + 2 * k + 2 {
                let p = with_asymptotes(out[1], par[f + 2 * k], par[f + 2 * k + 1]);
                set_binary(p, out);
            }
        }
        ItemFamily::NestedLogit => {
            let correct = match item.aux() {
                ItemAux::NestedLogit { correct_cat } => *correct_cat,
                _ => 1,
            };
            let z = linear(a, theta);
            let p_correct = with_asymptotes(sigmoid(z + par[f]), par[f + 1], par[f + 2]);
            let ak = &par[f + 3..f + 3 + (k - 1)];
            let d = &par[f + 3 + (k - 1)..];
            let distractor_num = &mut log_num[..k - 1];
            for j in 0..k - 1 {
                distractor_num[j] = ak[j] * z + d[j];
            }
            let log_denom = logsumexp(distractor_num);
            let mut j = 0;
            for (c, o) in out.iter_mut().enumerate() {
                if c == correct {
                    *o = p_correct;
                } else {
                    *o = (1.0 - p_correct) * (distractor_num[j] - log_denom).exp();
                    j += 1;
                }
            }
        }
        ItemFamily::PartComp => {
            let d = &par[f..2 * f];
            let ItemAux::PartComp { cpow } = item.aux() else {
                unreachable!("partially compensatory items always carry cpow")
            };
            let p_star: f64 = (0..f)
                .map(|j| sigmoid(a[j] * theta[j] + d[j]).powf(cpow[j]))
                .product();
            let p = with_asymptotes(p_star, par[2 * f], par[2 * f + 1]);
            set_binary(p, out);
        }
        ItemFamily::Ideal => {
            let x = linear(a, theta) + par[f];
            set_binary((-0.5 * x * x).exp(), out);
        }
        ItemFamily::Lca => {
            let ItemAux::Lca { item_q } = item.aux() else {
                unreachable!("lca items always carry an indicator matrix")
            };
            for c in 0..k {
                log_num[c] = (0..f).map(|j| item_q[[c, j]] * a[j] * theta[j]).sum();
            }
            softmax_into(log_num, out);
        }
        ItemFamily::Ggum => ggum_probs(par, f, k, theta, log_num, out),
        ItemFamily::Unfolding(link) => unfolding_probs(link, par, f, k, theta, log_num, out),
    }
}

/// Generalized graded unfolding model with a Euclidean distance over the
/// loaded dimensions.
fn ggum_probs(
    par: &[f64],
    f: usize,
    k: usize,
    theta: ArrayView1<f64>,
    log_num: &mut [f64],
    out: &mut [f64],
) {
    let a = &par[..f];
    let b = &par[f..2 * f];
    let tau = &par[2 * f..];
    let m = (2 * (k - 1) + 1) as f64;

    let dist = (0..f)
        .map(|j| (a[j] * (theta[j] - b[j])).powi(2))
        .sum::<f64>()
        .sqrt();
    let scale = a.iter().map(|x| x * x).sum::<f64>().sqrt();

    let mut cum_tau = 0.0;
    for c in 0..k {
        if c > 0 {
            cum_tau += tau[c - 1];
        }
        let cf = c as f64;
        let shift = scale * cum_tau;
        log_num[c] = logsumexp(&[cf * dist - shift, (m - cf) * dist - shift]);
    }
    softmax_into(log_num, out);
}

/// Luo (2001) ordered unfolding: `P(c) ∝ Π_{l<=c} psi(rho_l) * psi(x)^(K-1-c)`.
fn unfolding_probs(
    link: UnfoldingLink,
    par: &[f64],
    f: usize,
    k: usize,
    theta: ArrayView1<f64>,
    log_num: &mut [f64],
    out: &mut [f64],
) {
    let x = linear(&par[..f], theta) + par[f];
    let log_rho = &par[f + 1..];
    let log_psi_x = link.log_psi(x);

    let mut cum = 0.0;
    for c in 0..k {
        if c > 0 {
            cum += link.log_psi(log_rho[c - 1].exp());
        }
        let remaining = k - 1 - c;
        log_num[c] = if remaining > 0 {
            cum + remaining as f64 * log_psi_x
        } else {
            cum
        };
    }
    softmax_into(log_num, out);
}

/// Trace an item over every row of `theta`, returning an N x K matrix.
///
/// `theta` must have one column per factor and only finite entries.
pub fn trace(item: &ItemObject, theta: ArrayView2<f64>) -> SimResult<Array2<f64>> {
    if theta.ncols() != item.nfact() {
        return Err(SimError::ThetaDimension {
            expected: item.nfact(),
            actual: theta.ncols(),
        });
    }
    ensure_finite(theta)?;

    let n_persons = theta.nrows();
    let k = item.ncat();
    let mut probs = Array2::zeros((n_persons, k));
    let mut buf = vec![0.0; k];
    let mut scratch = vec![0.0; k];

    for (theta_row, mut prob_row) in theta.outer_iter().zip(probs.outer_iter_mut()) {
        category_probs(item, theta_row, &mut buf, &mut scratch);
        for (dst, &p) in prob_row.iter_mut().zip(&buf) {
            *dst = p;
        }
    }

    Ok(probs)
}

impl ItemObject {
    /// Category probability table for every row of `theta`.
    pub fn probtrace(&self, theta: ArrayView2<f64>) -> SimResult<Array2<f64>> {
        trace(self, theta)
    }

    /// Expected item score `sum_k k * P(k)` for every row of `theta`.
    pub fn expected_score(&self, theta: ArrayView2<f64>) -> SimResult<Array1<f64>> {
        let probs = trace(self, theta)?;
        let scores = Array1::from_shape_fn(self.ncat(), |c| c as f64);
        Ok(probs.dot(&scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemBuilder;
    use crate::utils::PROB_TOLERANCE;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    const NAN: f64 = f64::NAN;

    fn grid(nfact: usize) -> Array2<f64> {
        let points: Vec<f64> = (0..41).map(|i| -6.0 + 0.3 * i as f64).collect();
        Array2::from_shape_fn((points.len(), nfact), |(i, j)| {
            points[i] * if j % 2 == 0 { 1.0 } else { -0.5 }
        })
    }

    fn assert_valid(probs: &Array2<f64>) {
        for row in probs.outer_iter() {
            assert!(row.iter().all(|p| p.is_finite() && *p >= 0.0), "{row:?}");
            assert!((row.sum() - 1.0).abs() < PROB_TOLERANCE, "{row:?}");
        }
    }

    fn all_families() -> Vec<ItemObject> {
        vec![
            ItemBuilder::new("4PL", vec![1.3, 0.4], vec![-0.2])
                .guess(0.15)
                .upper(0.9),
            ItemBuilder::new("graded", vec![1.0, NAN], vec![1.5, 0.2, -1.0]),
            ItemBuilder::new("gpcm", vec![0.8, 0.6], vec![0.0, 0.5, -0.3, 0.2]),
            ItemBuilder::new("nominal", vec![1.1, 0.0], vec![0.0, 0.4, -0.6])
                .nominal(vec![0.0, 1.0, 2.2]),
            ItemBuilder::new("nominal", vec![1.1, 0.0], vec![0.0, 0.4])
                .nominal(vec![0.0, 1.0])
                .guess(0.2),
            ItemBuilder::new("nestlogit", vec![1.0, 0.5], vec![0.3, 0.0, 0.5, -0.5])
                .nominal(vec![0.0, 0.0, -0.4, 0.6])
                .guess(0.2),
            ItemBuilder::new("PC3PL", vec![1.0, 1.4], vec![0.5, -0.5]).guess(0.1),
            ItemBuilder::new("ideal", vec![1.2, 0.0], vec![-0.8]),
            ItemBuilder::new("lca", vec![0.7, 1.5], vec![]).lca_cats(3),
            ItemBuilder::new("ggum", vec![1.0, 0.8], vec![0.5, -0.5]).t(vec![-1.2, -0.6, -0.2]),
            ItemBuilder::new("sslm", vec![0.6, NAN], vec![-0.2]).rho(vec![1.0, 0.5]),
            ItemBuilder::new("hcm", vec![1.0, 0.3], vec![0.1]).rho(vec![1.5, 1.0, 0.6]),
            ItemBuilder::new("paralla", vec![1.0, NAN], vec![0.0]).rho(vec![1.2]),
            ItemBuilder::new("Luo2001_alm", vec![0.9, 0.4], vec![0.0]).rho(vec![2.0, 1.0]),
        ]
        .into_iter()
        .map(|b| b.build().unwrap())
        .collect()
    }

    #[test]
    fn every_family_traces_valid_distributions() {
        let theta = grid(2);
        for item in all_families() {
            let probs = item.probtrace(theta.view()).unwrap();
            assert_eq!(probs.dim(), (theta.nrows(), item.ncat()));
            assert_valid(&probs);
        }
    }

    #[test]
    fn paralla_at_location_puts_all_mass_on_top_category() {
        let item = ItemBuilder::new("paralla", vec![1.0], vec![0.0])
            .rho(vec![1.2, 0.7])
            .build()
            .unwrap();
        let theta = Array2::zeros((1, 1));
        let probs = item.probtrace(theta.view()).unwrap();
        assert_relative_eq!(probs[[0, 2]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn dichotomous_matches_four_parameter_curve() {
        let item = ItemBuilder::new("4PL", vec![1.5], vec![-0.5])
            .guess(0.2)
            .upper(0.95)
            .build()
            .unwrap();
        let theta = Array2::from_shape_vec((3, 1), vec![-1.0, 0.0, 2.0]).unwrap();
        let probs = item.probtrace(theta.view()).unwrap();
        for (i, &t) in [-1.0, 0.0, 2.0].iter().enumerate() {
            let expected = 0.2 + 0.75 * sigmoid(1.5 * t - 0.5);
            assert_relative_eq!(probs[[i, 1]], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn two_category_graded_equals_two_parameter_logistic() {
        let graded = ItemBuilder::new("graded", vec![1.2], vec![0.4]).build().unwrap();
        let twopl = ItemBuilder::new("2PL", vec![1.2], vec![0.4]).build().unwrap();
        let theta = grid(1);
        let pg = graded.probtrace(theta.view()).unwrap();
        let pd = twopl.probtrace(theta.view()).unwrap();
        for (x, y) in pg.iter().zip(pd.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn graded_categories_are_cumulative_differences() {
        let item = ItemBuilder::new("graded", vec![1.0], vec![1.0, -1.0])
            .build()
            .unwrap();
        let theta = Array2::zeros((1, 1));
        let probs = item.probtrace(theta.view()).unwrap();
        assert_relative_eq!(probs[[0, 0]], 1.0 - sigmoid(1.0), epsilon = 1e-12);
        assert_relative_eq!(probs[[0, 1]], sigmoid(1.0) - sigmoid(-1.0), epsilon = 1e-12);
        assert_relative_eq!(probs[[0, 2]], sigmoid(-1.0), epsilon = 1e-12);
    }

    #[test]
    fn gpcm_default_scoring_is_partial_credit() {
        let item = ItemBuilder::new("gpcm", vec![1.3], vec![0.0, 0.4, -0.2])
            .build()
            .unwrap();
        let theta = Array2::from_elem((1, 1), 0.7);
        let probs = item.probtrace(theta.view()).unwrap();
        let z = 1.3 * 0.7;
        let nums = [0.0f64, z + 0.4, 2.0 * z - 0.2].map(f64::exp);
        let total: f64 = nums.iter().sum();
        for c in 0..3 {
            assert_relative_eq!(probs[[0, c]], nums[c] / total, epsilon = 1e-12);
        }
    }

    #[test]
    fn nested_logit_correct_category_follows_three_parameter_curve() {
        let item = ItemBuilder::new("3PLNRM", vec![1.0], vec![0.2, 0.0, 0.3])
            .nominal(vec![0.0, 0.0, 0.5])
            .guess(0.25)
            .build()
            .unwrap();
        let theta = Array2::from_elem((1, 1), -0.4);
        let probs = item.probtrace(theta.view()).unwrap();
        let p_correct = 0.25 + 0.75 * sigmoid(-0.4 + 0.2);
        assert_relative_eq!(probs[[0, 1]], p_correct, epsilon = 1e-12);
        let w0 = 1.0f64;
        let w2 = (0.5 * -0.4 + 0.3f64).exp();
        assert_relative_eq!(probs[[0, 0]], (1.0 - p_correct) * w0 / (w0 + w2), epsilon = 1e-12);
    }

    #[test]
    fn partcomp_is_product_of_loaded_dimensions() {
        let item = ItemBuilder::new("PC2PL", vec![1.0, NAN, 2.0], vec![0.5, -1.0])
            .build()
            .unwrap();
        let theta = Array2::from_shape_vec((1, 3), vec![0.3, 5.0, -0.2]).unwrap();
        let probs = item.probtrace(theta.view()).unwrap();
        let expected = sigmoid(0.3 + 0.5) * sigmoid(-0.4 - 1.0);
        assert_relative_eq!(probs[[0, 1]], expected, epsilon = 1e-12);
    }

    #[test]
    fn ggum_is_symmetric_about_location() {
        let item = ItemBuilder::new("ggum", vec![1.2], vec![0.5])
            .t(vec![-1.0, -0.4])
            .build()
            .unwrap();
        let theta = Array2::from_shape_vec((2, 1), vec![0.5 - 1.3, 0.5 + 1.3]).unwrap();
        let probs = item.probtrace(theta.view()).unwrap();
        for c in 0..3 {
            assert_relative_eq!(probs[[0, c]], probs[[1, c]], epsilon = 1e-12);
        }
    }

    #[test]
    fn hcm_top_category_peaks_at_location() {
        let item = ItemBuilder::new("hcm", vec![1.0], vec![-1.0])
            .rho(vec![1.0])
            .build()
            .unwrap();
        let theta = Array2::from_shape_vec((3, 1), vec![-1.0, 1.0, 3.0]).unwrap();
        let probs = item.probtrace(theta.view()).unwrap();
        assert!(probs[[1, 1]] > probs[[0, 1]]);
        assert!(probs[[1, 1]] > probs[[2, 1]]);
        // psi(rho) / (psi(rho) + psi(0)) at the location
        let expected = 1.0f64.cosh() / (1.0f64.cosh() + 1.0);
        assert_relative_eq!(probs[[1, 1]], expected, epsilon = 1e-12);
    }

    #[test]
    fn theta_dimension_mismatch_is_reported() {
        let item = ItemBuilder::new("2PL", vec![1.0, 1.0], vec![0.0]).build().unwrap();
        let theta = Array2::zeros((5, 3));
        assert_eq!(
            item.probtrace(theta.view()).unwrap_err(),
            SimError::ThetaDimension {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn lca_indicator_separates_classes() {
        let q = ndarray::array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let item = ItemBuilder::new("lca", vec![1.0, 1.0], vec![])
            .lca_q(q)
            .build()
            .unwrap();
        let theta = Array2::from_shape_vec((1, 2), vec![1.0, -1.0]).unwrap();
        let probs = item.probtrace(theta.view()).unwrap();
        let total = 1.0 + 1.0f64.exp() + (-1.0f64).exp();
        assert_relative_eq!(probs[[0, 1]], 1.0f64.exp() / total, epsilon = 1e-12);
        assert_relative_eq!(probs[[0, 2]], (-1.0f64).exp() / total, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_theta_is_reported() {
        let item = ItemBuilder::new("gpcm", vec![1.0], vec![0.0, 0.5, -0.5])
            .build()
            .unwrap();
        let theta = Array2::from_shape_vec((3, 1), vec![0.2, NAN, f64::INFINITY]).unwrap();
        assert_eq!(
            item.probtrace(theta.view()).unwrap_err(),
            SimError::NonFiniteTheta { row: 1, col: 0 }
        );
        let theta = Array2::from_elem((1, 1), f64::NEG_INFINITY);
        assert!(item.expected_score(theta.view()).is_err());
    }

    #[test]
    fn expected_score_weights_categories() {
        let item = ItemBuilder::new("graded", vec![1.0], vec![1.0, -1.0])
            .build()
            .unwrap();
        let theta = Array2::zeros((1, 1));
        let probs = item.probtrace(theta.view()).unwrap();
        let score = item.expected_score(theta.view()).unwrap();
        assert_relative_eq!(score[0], probs[[0, 1]] + 2.0 * probs[[0, 2]], epsilon = 1e-12);
    }
}

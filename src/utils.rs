//! Shared numeric helpers for the tracing and sampling code.

pub const EPSILON: f64 = 1e-10;

/// Tolerance used when checking that a probability row sums to one.
pub const PROB_TOLERANCE: f64 = 1e-8;

/// Logit magnitude used to pin an asymptote at 0 or 1.
pub const LOGIT_SENTINEL: f64 = 999.0;

#[inline]
pub fn logsumexp(arr: &[f64]) -> f64 {
    if arr.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max_val = arr.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    let sum: f64 = arr.iter().map(|x| (x - max_val).exp()).sum();
    max_val + sum.ln()
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let exp_x = x.exp();
        exp_x / (1.0 + exp_x)
    }
}

/// Inverse of [`sigmoid`]; maps 0 and 1 to the infinities.
#[inline]
pub fn logit(p: f64) -> f64 {
    if p <= 0.0 {
        f64::NEG_INFINITY
    } else if p >= 1.0 {
        f64::INFINITY
    } else {
        (p / (1.0 - p)).ln()
    }
}

/// `ln(cosh(x))` without overflow for large `|x|`.
#[inline]
pub fn log_cosh(x: f64) -> f64 {
    let ax = x.abs();
    ax + (-2.0 * ax).exp().ln_1p() - std::f64::consts::LN_2
}

/// Softmax of a set of log-numerators, written into `out`.
#[inline]
pub fn softmax_into(log_num: &[f64], out: &mut [f64]) {
    let log_denom = logsumexp(log_num);
    for (o, &z) in out.iter_mut().zip(log_num) {
        *o = (z - log_denom).exp();
    }
}

/// Clamp negatives to zero and rescale so the slice sums to one.
#[inline]
pub fn renormalize(probs: &mut [f64]) {
    for p in probs.iter_mut() {
        if p.is_nan() || *p < 0.0 {
            *p = 0.0;
        }
    }
    let sum: f64 = probs.iter().sum();
    if sum > EPSILON {
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn logit_inverts_sigmoid() {
        for &x in &[-4.0, -0.5, 0.0, 1.25, 6.0] {
            assert_relative_eq!(logit(sigmoid(x)), x, epsilon = 1e-9);
        }
        assert_eq!(logit(0.0), f64::NEG_INFINITY);
        assert_eq!(logit(1.0), f64::INFINITY);
        assert_eq!(sigmoid(f64::NEG_INFINITY), 0.0);
        assert_eq!(sigmoid(f64::INFINITY), 1.0);
    }

    #[test]
    fn log_cosh_matches_direct_form() {
        for &x in &[-3.0, -0.1, 0.0, 0.7, 2.5] {
            assert_relative_eq!(log_cosh(x), f64::cosh(x).ln(), epsilon = 1e-12);
        }
        assert!(log_cosh(1e4).is_finite());
    }

    #[test]
    fn softmax_handles_negative_infinity() {
        let mut out = [0.0; 3];
        softmax_into(&[f64::NEG_INFINITY, 0.0, 0.0], &mut out);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[1], 0.5, epsilon = 1e-12);
    }
}

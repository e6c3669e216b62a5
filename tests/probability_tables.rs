//! Sampling from supplied probability tables and configuration errors.

use approx::assert_abs_diff_eq;
use mirt_sim::{simulate, simulate_from_probs, SimDesign, SimError, SimOptions};
use ndarray::{array, Array2};

const NAN: f64 = f64::NAN;

#[test]
fn degenerate_tables_are_reproduced_exactly() {
    let first = array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
    let second = array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
    let out = simulate_from_probs(&[first, second], &[1, -2], Some(10)).unwrap();
    assert_eq!(out.data, array![[1, -1], [3, -2], [2, -1]]);
    assert_eq!(out.item_names, vec!["Item_1", "Item_2"]);
}

#[test]
fn category_frequencies_follow_the_table() {
    let n = 40_000;
    let table = Array2::from_shape_fn((n, 3), |(_, k)| [0.2, 0.5, 0.3][k]);
    let out = simulate_from_probs(&[table], &[0], Some(12)).unwrap();
    for (k, expected) in [0.2, 0.5, 0.3].into_iter().enumerate() {
        let freq = out.data.iter().filter(|&&v| v == k as i32).count() as f64 / n as f64;
        assert_abs_diff_eq!(freq, expected, epsilon = 0.015);
    }
}

#[test]
fn tables_are_validated_before_sampling() {
    let ok = array![[0.5, 0.5], [0.5, 0.5]];

    let single = array![[1.0], [1.0]];
    assert_eq!(
        simulate_from_probs(&[ok.clone(), single], &[0], None).unwrap_err(),
        SimError::ProbTableSingleColumn { item: 1 }
    );

    let short = array![[0.5, 0.5]];
    assert_eq!(
        simulate_from_probs(&[ok.clone(), short], &[0], None).unwrap_err(),
        SimError::ProbTableRows {
            item: 1,
            expected: 2,
            actual: 1
        }
    );

    let unnormalized = array![[0.5, 0.5], [0.7, 0.7]];
    assert_eq!(
        simulate_from_probs(&[unnormalized], &[0], None).unwrap_err(),
        SimError::ProbTableInvalid { item: 0, row: 1 }
    );

    assert_eq!(
        simulate_from_probs(&[ok.clone(), ok], &[0, 1, 2], None).unwrap_err(),
        SimError::MinsLength {
            expected: 2,
            actual: 3
        }
    );
    assert_eq!(
        simulate_from_probs(&[], &[0], None).unwrap_err(),
        SimError::EmptyProbTables
    );
}

#[test]
fn negative_guess_is_rejected() {
    let design = SimDesign::new(array![[1.0]], vec![vec![0.0]], ["3PL"]).with_guess(vec![-0.1]);
    let err = simulate(&design, &SimOptions::default().with_n(10)).unwrap_err();
    assert_eq!(
        err,
        SimError::OutOfUnitInterval {
            what: "guess",
            item: 0,
            value: -0.1
        }
    );
}

#[test]
fn nominal_item_without_slopes_matrix_is_rejected() {
    let design = SimDesign::new(array![[1.0]], vec![vec![0.0, 0.5, -0.5]], ["nominal"]);
    let err = simulate(&design, &SimOptions::default().with_n(10)).unwrap_err();
    assert!(matches!(
        err,
        SimError::MissingAuxiliary {
            item: 0,
            input: "nominal",
            ..
        }
    ));
}

#[test]
fn ideal_point_item_with_positive_intercept_is_rejected() {
    let design = SimDesign::new(array![[1.0], [1.0]], vec![vec![-0.5], vec![0.5]], ["ideal"]);
    let err = simulate(&design, &SimOptions::default().with_n(10)).unwrap_err();
    assert_eq!(
        err,
        SimError::IdealInterceptNotNegative {
            item: 1,
            value: 0.5
        }
    );
}

#[test]
fn deprecated_and_unknown_tags_are_rejected() {
    for tag in ["Rasch", "rsm", "grsm"] {
        let design = SimDesign::new(array![[1.0]], vec![vec![0.0, NAN]], [tag]);
        assert!(matches!(
            simulate(&design, &SimOptions::default().with_n(5)),
            Err(SimError::DeprecatedItemType { .. })
        ));
    }
    let design = SimDesign::new(array![[1.0]], vec![vec![0.0]], ["5PL"]);
    assert_eq!(
        simulate(&design, &SimOptions::default().with_n(5)).unwrap_err(),
        SimError::UnknownItemType("5PL".into())
    );
}

#[test]
fn invalid_covariance_is_rejected_unless_unchecked() {
    let design = SimDesign::new(array![[1.0, 1.0]], vec![vec![0.0]], ["2PL"]);
    let sigma = array![[1.0, 2.0], [2.0, 1.0]];
    let opts = SimOptions::default().with_n(20).with_sigma(sigma).with_seed(1);
    assert_eq!(
        simulate(&design, &opts).unwrap_err(),
        SimError::NotPositiveSemiDefinite
    );
    let out = simulate(&design, &opts.without_sigma_check()).unwrap();
    assert_eq!(out.data.nrows(), 20);
}

//! Python bindings for the simulation entry points.
//!
//! Ragged parameter rows arrive as NaN-padded numpy matrices; the padding is
//! dropped when the items are built.

use ndarray::ArrayView2;
use numpy::{PyArray2, PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::prelude::*;

use crate::item::ItemBuilder;
use crate::options::SimOptions;
use crate::simulate::{simulate, simulate_from_probs, SimDesign};

fn ragged_rows(m: ArrayView2<f64>) -> Vec<Vec<f64>> {
    m.outer_iter().map(|row| row.to_vec()).collect()
}

/// Simulate responses from raw item parameters
#[pyfunction]
#[pyo3(signature = (
    a, d, itemtype, n=None, guess=vec![0.0], upper=vec![1.0], nominal=None, t=None,
    rho=None, theta=None, mu=None, sigma=None, mins=vec![0], lca_cats=None, seed=None
))]
#[allow(clippy::too_many_arguments)]
pub fn simulate_items<'py>(
    py: Python<'py>,
    a: PyReadonlyArray2<f64>,
    d: PyReadonlyArray2<f64>,
    itemtype: Vec<String>,
    n: Option<usize>,
    guess: Vec<f64>,
    upper: Vec<f64>,
    nominal: Option<PyReadonlyArray2<f64>>,
    t: Option<PyReadonlyArray2<f64>>,
    rho: Option<PyReadonlyArray2<f64>>,
    theta: Option<PyReadonlyArray2<f64>>,
    mu: Option<PyReadonlyArray1<f64>>,
    sigma: Option<PyReadonlyArray2<f64>>,
    mins: Vec<i32>,
    lca_cats: Option<Vec<usize>>,
    seed: Option<u64>,
) -> PyResult<Bound<'py, PyArray2<i32>>> {
    let mut design = SimDesign::new(a.as_array().to_owned(), ragged_rows(d.as_array()), itemtype)
        .with_guess(guess)
        .with_upper(upper)
        .with_mins(mins);
    if let Some(nominal) = nominal {
        design = design.with_nominal(ragged_rows(nominal.as_array()));
    }
    if let Some(t) = t {
        design = design.with_t(ragged_rows(t.as_array()));
    }
    if let Some(rho) = rho {
        design = design.with_rho(ragged_rows(rho.as_array()));
    }
    if let Some(cats) = lca_cats {
        design = design.with_lca_cats(cats);
    }

    let opts = SimOptions {
        n,
        seed,
        theta: theta.map(|th| th.as_array().to_owned()),
        mu: mu.map(|m| m.as_array().to_owned()),
        sigma: sigma.map(|s| s.as_array().to_owned()),
        ..SimOptions::default()
    };

    let result = py.detach(|| simulate(&design, &opts))?;
    Ok(result.data.to_pyarray(py))
}

/// Sample responses from per-item probability tables
#[pyfunction]
#[pyo3(signature = (tables, mins=vec![0], seed=None))]
pub fn simulate_from_probability_tables<'py>(
    py: Python<'py>,
    tables: Vec<PyReadonlyArray2<f64>>,
    mins: Vec<i32>,
    seed: Option<u64>,
) -> PyResult<Bound<'py, PyArray2<i32>>> {
    let tables: Vec<_> = tables.iter().map(|t| t.as_array().to_owned()).collect();
    let result = py.detach(|| simulate_from_probs(&tables, &mins, seed))?;
    Ok(result.data.to_pyarray(py))
}

/// Category probabilities of a single item over a trait matrix
#[pyfunction]
#[pyo3(signature = (
    itemtype, slopes, intercepts, theta, guess=0.0, upper=1.0, nominal=None, t=None,
    rho=None, lca_cats=None
))]
#[allow(clippy::too_many_arguments)]
pub fn trace_item_probabilities<'py>(
    py: Python<'py>,
    itemtype: String,
    slopes: Vec<f64>,
    intercepts: Vec<f64>,
    theta: PyReadonlyArray2<f64>,
    guess: f64,
    upper: f64,
    nominal: Option<Vec<f64>>,
    t: Option<Vec<f64>>,
    rho: Option<Vec<f64>>,
    lca_cats: Option<usize>,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let mut builder = ItemBuilder::new(itemtype, slopes, intercepts)
        .guess(guess)
        .upper(upper);
    if let Some(row) = nominal {
        builder = builder.nominal(row);
    }
    if let Some(row) = t {
        builder = builder.t(row);
    }
    if let Some(row) = rho {
        builder = builder.rho(row);
    }
    if let Some(cats) = lca_cats {
        builder = builder.lca_cats(cats);
    }
    let item = builder.build()?;
    let probs = item.probtrace(theta.as_array())?;
    Ok(probs.to_pyarray(py))
}

/// Register simulation functions with the Python module
pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(simulate_items, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_from_probability_tables, m)?)?;
    m.add_function(wrap_pyfunction!(trace_item_probabilities, m)?)?;
    Ok(())
}

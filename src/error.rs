//! Error type shared by item construction, tracing and simulation.
//!
//! Every validation failure aborts the call before any response is drawn.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    // ---- Shape / broadcast problems ----
    #[error("guessing parameter has length {actual}, expected 1 or {expected}")]
    GuessLength { expected: usize, actual: usize },

    #[error("upper bound parameter has length {actual}, expected 1 or {expected}")]
    UpperLength { expected: usize, actual: usize },

    #[error("mins has length {actual}, expected 1 or {expected}")]
    MinsLength { expected: usize, actual: usize },

    #[error("{what} has {actual} rows, expected {expected}")]
    RowCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("item {item}: intercept row contains no usable values")]
    EmptyIntercepts { item: usize },

    #[error("Theta has {actual} columns but the items use {expected} factors")]
    ThetaDimension { expected: usize, actual: usize },

    #[error("Theta[{row}, {col}] is not finite")]
    NonFiniteTheta { row: usize, col: usize },

    #[error("N must be specified when Theta is not supplied")]
    MissingSampleSize,

    // ---- Domain problems ----
    #[error("{what} must be between 0 and 1 (item {item}, value {value})")]
    OutOfUnitInterval {
        what: &'static str,
        item: usize,
        value: f64,
    },

    #[error("item {item}: ideal point intercepts must be negative (got {value})")]
    IdealInterceptNotNegative { item: usize, value: f64 },

    #[error("item {item}: {reason}")]
    InvalidParameter { item: usize, reason: String },

    // ---- Family-specific requirements ----
    #[error("item {item}: {family} items require a '{input}' input")]
    MissingAuxiliary {
        item: usize,
        family: &'static str,
        input: &'static str,
    },

    #[error("item {item}: nominal row has {nominal} values but the intercept row has {intercepts}")]
    NominalCountMismatch {
        item: usize,
        nominal: usize,
        intercepts: usize,
    },

    #[error("item {item}: ggum items need as many locations ({locations}) as slopes ({slopes})")]
    GgumCountMismatch {
        item: usize,
        slopes: usize,
        locations: usize,
    },

    #[error("itemtype '{tag}' is not supported, use '{replacement}' instead")]
    DeprecatedItemType { tag: String, replacement: &'static str },

    #[error("unknown itemtype '{0}'")]
    UnknownItemType(String),

    // ---- Probability-table mode ----
    #[error("probability table {item} has {actual} rows, expected {expected}")]
    ProbTableRows {
        item: usize,
        expected: usize,
        actual: usize,
    },

    #[error("probability table {item} has a single column")]
    ProbTableSingleColumn { item: usize },

    #[error("probability table {item}, row {row} is not a distribution")]
    ProbTableInvalid { item: usize, row: usize },

    #[error("no probability tables were supplied")]
    EmptyProbTables,

    // ---- Population parameters ----
    #[error("covariance matrix is not positive semi-definite")]
    NotPositiveSemiDefinite,

    #[error("mean has length {mean} but covariance is {cov}x{cov}")]
    MeanCovMismatch { mean: usize, cov: usize },

    // ---- Fitted-model mode ----
    #[error("item index {index} is out of range for a model with {nitems} items")]
    ItemIndex { index: usize, nitems: usize },

    #[error("item {item}: equal-K resampling gave up after {draws} draws")]
    EqualKExhausted { item: usize, draws: usize },
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(feature = "python")]
impl From<SimError> for pyo3::PyErr {
    fn from(err: SimError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}

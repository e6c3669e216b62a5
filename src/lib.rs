//! Response simulation for item response theory models.
//!
//! This crate provides:
//! - Parameter validation and packing for dichotomous, graded, gpcm, nominal,
//!   nested-logit, partially compensatory, ideal-point, latent class, ggum and
//!   ordered unfolding items
//! - Category probability tracing for every family
//! - Multivariate normal latent trait generation
//! - Response simulation from raw parameters, fitted models, or probability
//!   tables, with reproducible per-item random streams
//! - Optional Python bindings (feature `python`)

pub mod utils;

pub mod error;
pub mod family;
pub mod fitted;
pub mod item;
pub mod options;
pub mod sampler;
pub mod simulate;
pub mod theta;
pub mod trace;

#[cfg(feature = "python")]
pub mod python;

pub use error::{SimError, SimResult};
pub use family::{ItemFamily, UnfoldingLink};
pub use fitted::{FittedModel, StoredModel};
pub use item::{ItemAux, ItemBuilder, ItemObject};
pub use options::{EqualK, SimOptions};
pub use simulate::{
    simulate, simulate_from_model, simulate_from_probs, simulate_with_items, ResponseData,
    SimBundle, SimDesign,
};
pub use theta::{draw_mvn, Population};
pub use trace::trace;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module for mirt_sim
#[cfg(feature = "python")]
#[pymodule]
fn mirt_sim(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)?;
    Ok(())
}

//! Simulation configuration.

use std::time::Duration;

use ndarray::{Array1, Array2};

/// Re-draw policy keeping a simulated item's realized category count equal to
/// the fitted model's count for that item.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualK {
    /// Give up after this many draws of one item; `None` never gives up.
    pub max_draws: Option<usize>,
    /// Give up once one item has been re-drawn for this long.
    pub timeout: Option<Duration>,
}

impl Default for EqualK {
    fn default() -> Self {
        Self {
            max_draws: Some(10_000),
            timeout: None,
        }
    }
}

impl EqualK {
    /// Retry until the category counts match, however long it takes.
    pub fn unbounded() -> Self {
        Self {
            max_draws: None,
            timeout: None,
        }
    }

    pub fn with_max_draws(mut self, max_draws: usize) -> Self {
        self.max_draws = Some(max_draws);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options shared by the raw-parameter and fitted-model entry points.
///
/// `n` is ignored when `theta` is supplied. `mu` and `sigma` default to a
/// standard normal population in raw-parameter mode and to the model's
/// estimates in fitted-model mode. `which_items` and `equal_k` only apply to
/// fitted-model mode.
#[derive(Debug, Clone, PartialEq)]
pub struct SimOptions {
    pub n: Option<usize>,
    pub theta: Option<Array2<f64>>,
    pub mu: Option<Array1<f64>>,
    pub sigma: Option<Array2<f64>>,
    pub seed: Option<u64>,
    /// Reject covariance matrices that are not positive semi-definite.
    pub check_sigma: bool,
    pub which_items: Option<Vec<usize>>,
    pub equal_k: Option<EqualK>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            n: None,
            theta: None,
            mu: None,
            sigma: None,
            seed: None,
            check_sigma: true,
            which_items: None,
            equal_k: Some(EqualK::default()),
        }
    }
}

impl SimOptions {
    pub fn with_n(mut self, n: usize) -> Self {
        self.n = Some(n);
        self
    }

    pub fn with_theta(mut self, theta: Array2<f64>) -> Self {
        self.theta = Some(theta);
        self
    }

    pub fn with_mu(mut self, mu: Array1<f64>) -> Self {
        self.mu = Some(mu);
        self
    }

    pub fn with_sigma(mut self, sigma: Array2<f64>) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_which_items(mut self, items: Vec<usize>) -> Self {
        self.which_items = Some(items);
        self
    }

    /// `None` turns equal-K re-drawing off.
    pub fn with_equal_k(mut self, equal_k: Option<EqualK>) -> Self {
        self.equal_k = equal_k;
        self
    }

    pub fn without_sigma_check(mut self) -> Self {
        self.check_sigma = false;
        self
    }
}

//! Simulation orchestrator.
//!
//! Three entry points share the tracer and the sampler:
//! - [`simulate`] / [`simulate_with_items`] build items from raw parameter
//!   matrices ([`SimDesign`]);
//! - [`simulate_from_model`] re-uses the items of a [`FittedModel`];
//! - [`simulate_from_probs`] samples externally supplied probability tables.
//!
//! All validation runs before the first response is drawn. Items are sampled
//! in parallel, each from its own generator stream derived from the run seed,
//! so results do not depend on the number of worker threads.

use std::collections::HashSet;
use std::time::Instant;

use ndarray::{Array1, Array2, ArrayView2};
use rand::prelude::*;
use rand_pcg::Pcg64;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{SimError, SimResult};
use crate::fitted::FittedModel;
use crate::item::{ItemBuilder, ItemObject};
use crate::options::{EqualK, SimOptions};
use crate::sampler::sample_responses;
use crate::theta::{latent_traits, Population};
use crate::trace::trace;

const ITEM_STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
const EQUAL_K_NOTICE: usize = 1_000;
const PROB_TABLE_TOLERANCE: f64 = 1e-6;

/// Simulated responses with their column names.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseData {
    /// N x nitems responses, each column shifted by its item's minimum.
    pub data: Array2<i32>,
    pub item_names: Vec<String>,
}

/// Responses together with the items and traits that generated them.
#[derive(Debug, Clone, PartialEq)]
pub struct SimBundle {
    pub data: ResponseData,
    pub items: Vec<ItemObject>,
    pub theta: Array2<f64>,
}

/// Raw item parameters for a battery of items.
///
/// Row `i` of every matrix belongs to item `i`. `a` is nitems x F with NaN
/// marking dimensions an item does not load on. The intercept, nominal, t and
/// rho rows are ragged: each row holds only the values it needs, and NaN
/// entries are treated as absent. `itemtype`, `guess`, `upper`, `lca_cats`
/// and `mins` take either one value for every item or one value per item.
/// `gpcm_mats` and `lca_qs` are per-item overrides; `None` entries keep the
/// family default.
#[derive(Debug, Clone)]
pub struct SimDesign {
    pub a: Array2<f64>,
    pub d: Vec<Vec<f64>>,
    pub itemtype: Vec<String>,
    pub guess: Vec<f64>,
    pub upper: Vec<f64>,
    pub nominal: Option<Vec<Vec<f64>>>,
    pub t: Option<Vec<Vec<f64>>>,
    pub rho: Option<Vec<Vec<f64>>>,
    pub gpcm_mats: Vec<Option<Array2<f64>>>,
    pub lca_cats: Option<Vec<usize>>,
    pub lca_qs: Vec<Option<Array2<f64>>>,
    pub mins: Vec<i32>,
}

fn broadcast<T: Copy>(
    values: &[T],
    n: usize,
    err: impl FnOnce(usize) -> SimError,
) -> SimResult<Vec<T>> {
    match values.len() {
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values.to_vec()),
        len => Err(err(len)),
    }
}

fn check_rows<T>(what: &'static str, rows: &[T], expected: usize) -> SimResult<()> {
    if rows.len() != expected {
        return Err(SimError::RowCount {
            what,
            expected,
            actual: rows.len(),
        });
    }
    Ok(())
}

impl SimDesign {
    pub fn new<S: Into<String>>(
        a: Array2<f64>,
        d: Vec<Vec<f64>>,
        itemtype: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            a,
            d,
            itemtype: itemtype.into_iter().map(Into::into).collect(),
            guess: vec![0.0],
            upper: vec![1.0],
            nominal: None,
            t: None,
            rho: None,
            gpcm_mats: Vec::new(),
            lca_cats: None,
            lca_qs: Vec::new(),
            mins: vec![0],
        }
    }

    pub fn with_guess(mut self, guess: Vec<f64>) -> Self {
        self.guess = guess;
        self
    }

    pub fn with_upper(mut self, upper: Vec<f64>) -> Self {
        self.upper = upper;
        self
    }

    pub fn with_nominal(mut self, nominal: Vec<Vec<f64>>) -> Self {
        self.nominal = Some(nominal);
        self
    }

    pub fn with_t(mut self, t: Vec<Vec<f64>>) -> Self {
        self.t = Some(t);
        self
    }

    pub fn with_rho(mut self, rho: Vec<Vec<f64>>) -> Self {
        self.rho = Some(rho);
        self
    }

    pub fn with_gpcm_mats(mut self, mats: Vec<Option<Array2<f64>>>) -> Self {
        self.gpcm_mats = mats;
        self
    }

    pub fn with_lca_qs(mut self, mats: Vec<Option<Array2<f64>>>) -> Self {
        self.lca_qs = mats;
        self
    }

    pub fn with_lca_cats(mut self, cats: Vec<usize>) -> Self {
        self.lca_cats = Some(cats);
        self
    }

    pub fn with_mins(mut self, mins: Vec<i32>) -> Self {
        self.mins = mins;
        self
    }

    pub fn nitems(&self) -> usize {
        self.a.nrows()
    }

    pub fn nfact(&self) -> usize {
        self.a.ncols()
    }

    /// Broadcast and shape-check the design, yielding one builder per item.
    pub fn item_builders(&self) -> SimResult<Vec<ItemBuilder>> {
        let nitems = self.nitems();
        check_rows("d", &self.d, nitems)?;

        let itemtype = match self.itemtype.len() {
            1 => vec![self.itemtype[0].clone(); nitems],
            len if len == nitems => self.itemtype.clone(),
            len => {
                return Err(SimError::RowCount {
                    what: "itemtype",
                    expected: nitems,
                    actual: len,
                })
            }
        };
        let guess = broadcast(&self.guess, nitems, |actual| SimError::GuessLength {
            expected: nitems,
            actual,
        })?;
        let upper = broadcast(&self.upper, nitems, |actual| SimError::UpperLength {
            expected: nitems,
            actual,
        })?;
        for (what, values) in [("guess", &guess), ("upper", &upper)] {
            if let Some((item, &value)) = values
                .iter()
                .enumerate()
                .find(|(_, v)| !(0.0..=1.0).contains(*v))
            {
                return Err(SimError::OutOfUnitInterval { what, item, value });
            }
        }

        if let Some(rows) = &self.nominal {
            check_rows("nominal", rows, nitems)?;
        }
        if let Some(rows) = &self.t {
            check_rows("t", rows, nitems)?;
        }
        if let Some(rows) = &self.rho {
            check_rows("rho", rows, nitems)?;
        }
        if !self.gpcm_mats.is_empty() {
            check_rows("gpcm_mats", &self.gpcm_mats, nitems)?;
        }
        if !self.lca_qs.is_empty() {
            check_rows("lca_qs", &self.lca_qs, nitems)?;
        }
        let lca_cats = match &self.lca_cats {
            Some(cats) => Some(broadcast(cats, nitems, |actual| SimError::RowCount {
                what: "lca_cats",
                expected: nitems,
                actual,
            })?),
            None => None,
        };

        let builders = (0..nitems)
            .map(|i| {
                let mut builder =
                    ItemBuilder::new(itemtype[i].clone(), self.a.row(i).to_vec(), self.d[i].clone())
                        .index(i)
                        .guess(guess[i])
                        .upper(upper[i]);
                if let Some(rows) = &self.nominal {
                    builder = builder.nominal(rows[i].clone());
                }
                if let Some(rows) = &self.t {
                    builder = builder.t(rows[i].clone());
                }
                if let Some(rows) = &self.rho {
                    builder = builder.rho(rows[i].clone());
                }
                if let Some(Some(mat)) = self.gpcm_mats.get(i) {
                    builder = builder.gpcm_mat(mat.clone());
                }
                if let Some(Some(q)) = self.lca_qs.get(i) {
                    builder = builder.lca_q(q.clone());
                }
                if let Some(cats) = &lca_cats {
                    builder = builder.lca_cats(cats[i]);
                }
                builder
            })
            .collect();
        Ok(builders)
    }

    /// Validate the whole design and build every item.
    pub fn build_items(&self) -> SimResult<Vec<ItemObject>> {
        self.item_builders()?
            .into_iter()
            .map(ItemBuilder::build)
            .collect()
    }
}

fn run_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(rand::random)
}

/// Independent generator for one item, derived from the run seed.
fn item_rng(seed: u64, item: usize) -> Pcg64 {
    Pcg64::seed_from_u64(seed ^ (item as u64 + 1).wrapping_mul(ITEM_STREAM_STRIDE))
}

fn default_names(nitems: usize) -> Vec<String> {
    (1..=nitems).map(|i| format!("Item_{i}")).collect()
}

fn assemble(
    n_persons: usize,
    columns: &[Array1<i32>],
    mins: &[i32],
    item_names: Vec<String>,
) -> ResponseData {
    let mut data = Array2::zeros((n_persons, columns.len()));
    for (j, (column, &min)) in columns.iter().zip(mins).enumerate() {
        data.column_mut(j).assign(&column.mapv(|v| v + min));
    }
    ResponseData { data, item_names }
}

fn sample_items(items: &[ItemObject], theta: ArrayView2<f64>, seed: u64) -> SimResult<Vec<Array1<i32>>> {
    items
        .par_iter()
        .enumerate()
        .map(|(j, item)| {
            let probs = trace(item, theta)?;
            let mut rng = item_rng(seed, j);
            debug!(item = j, family = %item.family(), ncat = item.ncat(), "sampling item");
            Ok(sample_responses(probs.view(), &mut rng))
        })
        .collect()
}

/// Simulate responses from raw item parameters.
pub fn simulate(design: &SimDesign, opts: &SimOptions) -> SimResult<ResponseData> {
    simulate_with_items(design, opts).map(|bundle| bundle.data)
}

/// Like [`simulate`], also returning the constructed items and the trait
/// matrix.
pub fn simulate_with_items(design: &SimDesign, opts: &SimOptions) -> SimResult<SimBundle> {
    let items = design.build_items()?;
    let nitems = items.len();
    let nfact = design.nfact();
    let mins = broadcast(&design.mins, nitems, |actual| SimError::MinsLength {
        expected: nitems,
        actual,
    })?;

    let seed = run_seed(opts.seed);
    let mut rng = Pcg64::seed_from_u64(seed);
    let population = Population {
        mean: opts.mu.clone().unwrap_or_else(|| Array1::zeros(nfact)),
        cov: opts.sigma.clone().unwrap_or_else(|| Array2::eye(nfact)),
    };
    let theta = latent_traits(
        opts.theta.as_ref(),
        opts.n,
        nfact,
        &population,
        opts.check_sigma,
        &mut rng,
    )?;

    info!(
        n_persons = theta.nrows(),
        nitems,
        nfact,
        seed,
        "simulating from raw item parameters"
    );
    let columns = sample_items(&items, theta.view(), seed)?;
    let data = assemble(theta.nrows(), &columns, &mins, default_names(nitems));

    Ok(SimBundle { data, items, theta })
}

/// Sample one response per row of each supplied N x K probability table.
///
/// Tables must share their row count, have at least two columns and hold
/// non-negative rows summing to one.
pub fn simulate_from_probs(
    tables: &[Array2<f64>],
    mins: &[i32],
    seed: Option<u64>,
) -> SimResult<ResponseData> {
    let first = tables.first().ok_or(SimError::EmptyProbTables)?;
    let n_persons = first.nrows();

    for (item, table) in tables.iter().enumerate() {
        if table.nrows() != n_persons {
            return Err(SimError::ProbTableRows {
                item,
                expected: n_persons,
                actual: table.nrows(),
            });
        }
        if table.ncols() < 2 {
            return Err(SimError::ProbTableSingleColumn { item });
        }
        for (row, probs) in table.outer_iter().enumerate() {
            let valid = probs.iter().all(|p| p.is_finite() && *p >= 0.0)
                && (probs.sum() - 1.0).abs() <= PROB_TABLE_TOLERANCE;
            if !valid {
                return Err(SimError::ProbTableInvalid { item, row });
            }
        }
    }

    let nitems = tables.len();
    let mins = broadcast(mins, nitems, |actual| SimError::MinsLength {
        expected: nitems,
        actual,
    })?;
    let seed = run_seed(seed);
    info!(n_persons, nitems, seed, "simulating from probability tables");

    let columns: Vec<Array1<i32>> = tables
        .par_iter()
        .enumerate()
        .map(|(j, table)| {
            let mut rng = item_rng(seed, j);
            sample_responses(table.view(), &mut rng)
        })
        .collect();

    Ok(assemble(n_persons, &columns, &mins, default_names(nitems)))
}

fn distinct_count(column: &Array1<i32>) -> usize {
    column.iter().collect::<HashSet<_>>().len()
}

/// Re-draw one item until its realized category count equals `target`.
fn draw_equal_k<R: Rng>(
    item: usize,
    probs: ArrayView2<f64>,
    target: usize,
    policy: &EqualK,
    rng: &mut R,
) -> SimResult<Array1<i32>> {
    let started = Instant::now();
    let mut draws = 0usize;
    loop {
        let column = sample_responses(probs, rng);
        draws += 1;
        if distinct_count(&column) == target {
            if draws > 1 {
                debug!(item, draws, "equal-K draw accepted");
            }
            return Ok(column);
        }
        if draws == EQUAL_K_NOTICE {
            warn!(item, draws, target, "equal-K resampling still has not matched");
        }
        let out_of_draws = policy.max_draws.is_some_and(|max| draws >= max);
        let out_of_time = policy.timeout.is_some_and(|limit| started.elapsed() >= limit);
        if out_of_draws || out_of_time {
            return Err(SimError::EqualKExhausted { item, draws });
        }
    }
}

/// Simulate new responses from a fitted model's items.
///
/// Without a supplied `theta`, traits are drawn from the model's population
/// estimates (or the `mu` / `sigma` overrides) with `n` defaulting to the
/// number of rows of the fitted data. Only `which_items` are returned, in the
/// order given, shifted by the model's minimum categories.
pub fn simulate_from_model<M: FittedModel + ?Sized>(
    model: &M,
    opts: &SimOptions,
) -> SimResult<ResponseData> {
    let nitems = model.nitems();
    let which: Vec<usize> = opts
        .which_items
        .clone()
        .unwrap_or_else(|| (0..nitems).collect());
    if let Some(&index) = which.iter().find(|&&i| i >= nitems) {
        return Err(SimError::ItemIndex { index, nitems });
    }

    let nfact = model.nfact();
    let seed = run_seed(opts.seed);
    let mut rng = Pcg64::seed_from_u64(seed);
    let population = Population {
        mean: opts.mu.clone().unwrap_or_else(|| model.factor_means()),
        cov: opts.sigma.clone().unwrap_or_else(|| model.factor_cov()),
    };
    let n = opts.n.unwrap_or_else(|| model.data().nrows());
    let theta = latent_traits(
        opts.theta.as_ref(),
        Some(n),
        nfact,
        &population,
        opts.check_sigma,
        &mut rng,
    )?;

    let items: Vec<ItemObject> = which
        .iter()
        .map(|&i| model.extract_item(i))
        .collect::<SimResult<_>>()?;
    let ncat = model.ncat();
    let model_mins = model.mins();
    let model_names = model.item_names();

    info!(
        n_persons = theta.nrows(),
        nitems = which.len(),
        nfact,
        seed,
        equal_k = opts.equal_k.is_some(),
        "simulating from fitted model"
    );

    let theta_view = theta.view();
    let columns: Vec<Array1<i32>> = which
        .par_iter()
        .zip(items.par_iter())
        .map(|(&i, item)| {
            let probs = trace(item, theta_view)?;
            let mut rng = item_rng(seed, i);
            match &opts.equal_k {
                Some(policy) => draw_equal_k(i, probs.view(), ncat[i], policy, &mut rng),
                None => Ok(sample_responses(probs.view(), &mut rng)),
            }
        })
        .collect::<SimResult<_>>()?;

    let mins: Vec<i32> = which.iter().map(|&i| model_mins[i]).collect();
    let names: Vec<String> = which.iter().map(|&i| model_names[i].clone()).collect();
    Ok(assemble(theta.nrows(), &columns, &mins, names))
}

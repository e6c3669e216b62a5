//! Item objects and their one-step validated construction.
//!
//! An [`ItemBuilder`] collects one item's raw input rows (slopes, ragged
//! intercepts, optional nominal / t / rho rows, gpcm scoring matrix, lca
//! category count and asymptotes) and turns them into an immutable
//! [`ItemObject`] holding the family's packed parameter vector.
//!
//! Missing entries in the ragged rows are NaN and are dropped before packing.
//! A NaN slope marks a dimension the item does not load on and is packed as 0.

use ndarray::Array2;

use crate::error::{SimError, SimResult};
use crate::family::ItemFamily;
use crate::utils::{logit, LOGIT_SENTINEL};

/// Family-specific data carried next to the packed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemAux {
    None,
    /// Effective K x F scoring matrix of a gpcm item.
    Gpcm { scoring: Array2<f64> },
    /// Index of the correct category of a nested-logit item.
    NestedLogit { correct_cat: usize },
    /// Per-dimension compensation exponents.
    PartComp { cpow: Vec<f64> },
    /// K x F class indicator matrix; row 0 is the baseline and is all zero.
    ///
    /// The default indicator sets every other row to one, which makes
    /// categories `1..K` exchangeable. Supply a matrix through
    /// [`ItemBuilder::lca_q`] to tell them apart.
    Lca { item_q: Array2<f64> },
}

/// Normalized item ready for probability tracing.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemObject {
    family: ItemFamily,
    par: Vec<f64>,
    nfact: usize,
    ncat: usize,
    aux: ItemAux,
}

impl ItemObject {
    /// Build an item from an already packed parameter vector, e.g. one read
    /// back from a fitted model. The auxiliary fields are derived from the
    /// parameters the same way [`ItemBuilder::build`] derives them; lca items
    /// get the default indicator matrix.
    ///
    /// # Arguments
    /// * `index` - position of the item in its model, reported in errors
    pub fn from_packed(
        index: usize,
        family: ItemFamily,
        par: Vec<f64>,
        nfact: usize,
        ncat: usize,
    ) -> SimResult<Self> {
        let bad = |reason: String| SimError::InvalidParameter { item: index, reason };
        if ncat < 2 {
            return Err(bad(format!("{family} items need at least 2 categories")));
        }
        if let Some(pos) = par.iter().position(|p| p.is_nan()) {
            return Err(bad(format!("packed parameter {pos} is NaN")));
        }

        let f = nfact;
        let k = ncat;
        let allowed: Vec<usize> = match family {
            ItemFamily::Dichotomous => vec![f + 3],
            ItemFamily::Graded => vec![f + k - 1],
            ItemFamily::Gpcm => vec![f + 2 * k, f + k * f + k],
            ItemFamily::Nominal if k == 2 => vec![f + 2 * k, f + 2 * k + 2],
            ItemFamily::Nominal => vec![f + 2 * k],
            ItemFamily::NestedLogit => vec![f + 3 + 2 * (k - 1)],
            ItemFamily::PartComp => vec![2 * f + 2],
            ItemFamily::Ideal => vec![f + 1],
            ItemFamily::Lca => vec![f],
            ItemFamily::Ggum => vec![2 * f + k - 1],
            ItemFamily::Unfolding(_) => vec![f + k],
        };
        if !allowed.contains(&par.len()) {
            return Err(bad(format!(
                "{family} item with {f} factors and {k} categories cannot hold {} parameters",
                par.len()
            )));
        }
        if matches!(family, ItemFamily::Dichotomous | ItemFamily::PartComp | ItemFamily::Ideal)
            && k != 2
        {
            return Err(bad(format!("{family} items are dichotomous")));
        }

        if family == ItemFamily::Graded && k == 2 {
            let mut par = par;
            par.extend([-LOGIT_SENTINEL, LOGIT_SENTINEL]);
            return Ok(Self {
                family: ItemFamily::Dichotomous,
                par,
                nfact,
                ncat,
                aux: ItemAux::None,
            });
        }

        let aux = match family {
            ItemFamily::Gpcm => {
                let scoring = &par[f..par.len() - k];
                let matrix = if scoring.len() == k * f && f > 1 {
                    Array2::from_shape_vec((k, f), scoring.to_vec()).map_err(|e| bad(e.to_string()))?
                } else {
                    Array2::from_shape_fn((k, f), |(c, _)| scoring[c])
                };
                ItemAux::Gpcm { scoring: matrix }
            }
            ItemFamily::NestedLogit => ItemAux::NestedLogit { correct_cat: 1 },
            ItemFamily::PartComp => ItemAux::PartComp {
                cpow: par[..f].iter().map(|&a| if a != 0.0 { 1.0 } else { 0.0 }).collect(),
            },
            ItemFamily::Lca => ItemAux::Lca {
                item_q: lca_indicator(k, f),
            },
            _ => ItemAux::None,
        };

        Ok(Self {
            family,
            par,
            nfact,
            ncat,
            aux,
        })
    }

    pub fn family(&self) -> ItemFamily {
        self.family
    }

    /// Packed parameter vector in the family's layout.
    pub fn par(&self) -> &[f64] {
        &self.par
    }

    pub fn nfact(&self) -> usize {
        self.nfact
    }

    pub fn ncat(&self) -> usize {
        self.ncat
    }

    pub fn aux(&self) -> &ItemAux {
        &self.aux
    }

    pub fn slopes(&self) -> &[f64] {
        &self.par[..self.nfact]
    }
}

fn lca_indicator(ncat: usize, nfact: usize) -> Array2<f64> {
    Array2::from_shape_fn((ncat, nfact), |(k, _)| if k == 0 { 0.0 } else { 1.0 })
}

/// Non-missing entries of a ragged row.
fn present(row: &[f64]) -> Vec<f64> {
    row.iter().copied().filter(|x| !x.is_nan()).collect()
}

/// Collects one item's raw inputs and validates them in a single step.
#[derive(Debug, Clone)]
pub struct ItemBuilder {
    index: usize,
    itemtype: String,
    slopes: Vec<f64>,
    intercepts: Vec<f64>,
    guess: f64,
    upper: f64,
    nominal: Option<Vec<f64>>,
    t: Option<Vec<f64>>,
    rho: Option<Vec<f64>>,
    gpcm_mat: Option<Array2<f64>>,
    lca_cats: Option<usize>,
    lca_q: Option<Array2<f64>>,
}

impl ItemBuilder {
    pub fn new(itemtype: impl Into<String>, slopes: Vec<f64>, intercepts: Vec<f64>) -> Self {
        Self {
            index: 0,
            itemtype: itemtype.into(),
            slopes,
            intercepts,
            guess: 0.0,
            upper: 1.0,
            nominal: None,
            t: None,
            rho: None,
            gpcm_mat: None,
            lca_cats: None,
            lca_q: None,
        }
    }

    /// Position of the item in its battery, used in error messages.
    pub fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Lower asymptote on the probability scale.
    pub fn guess(mut self, guess: f64) -> Self {
        self.guess = guess;
        self
    }

    /// Upper asymptote on the probability scale.
    pub fn upper(mut self, upper: f64) -> Self {
        self.upper = upper;
        self
    }

    pub fn nominal(mut self, row: Vec<f64>) -> Self {
        self.nominal = Some(row);
        self
    }

    pub fn t(mut self, row: Vec<f64>) -> Self {
        self.t = Some(row);
        self
    }

    pub fn rho(mut self, row: Vec<f64>) -> Self {
        self.rho = Some(row);
        self
    }

    /// K x F scoring matrix replacing the default gpcm scores `0..K-1`.
    pub fn gpcm_mat(mut self, mat: Array2<f64>) -> Self {
        self.gpcm_mat = Some(mat);
        self
    }

    pub fn lca_cats(mut self, ncat: usize) -> Self {
        self.lca_cats = Some(ncat);
        self
    }

    /// K x F class indicator matrix for an lca item. Row 0 must be zero; the
    /// row count sets K unless [`lca_cats`](Self::lca_cats) is also given.
    pub fn lca_q(mut self, mat: Array2<f64>) -> Self {
        self.lca_q = Some(mat);
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> SimError {
        SimError::InvalidParameter {
            item: self.index,
            reason: reason.into(),
        }
    }

    fn missing(&self, family: ItemFamily, input: &'static str) -> SimError {
        SimError::MissingAuxiliary {
            item: self.index,
            family: family.name(),
            input,
        }
    }

    fn finite(&self, what: &str, values: &[f64]) -> SimResult<()> {
        match values.iter().find(|v| !v.is_finite()) {
            Some(v) => Err(self.invalid(format!("{what} contains non-finite value {v}"))),
            None => Ok(()),
        }
    }

    pub fn build(self) -> SimResult<ItemObject> {
        let family = ItemFamily::from_tag(&self.itemtype)?;
        let item = self.index;

        for (what, value) in [("guess", self.guess), ("upper", self.upper)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::OutOfUnitInterval { what, item, value });
            }
        }

        let nfact = self.slopes.len();
        if nfact == 0 {
            return Err(self.invalid("slope row is empty"));
        }
        let raw_slopes = present(&self.slopes);
        self.finite("slope row", &raw_slopes)?;
        let a: Vec<f64> = self
            .slopes
            .iter()
            .map(|&x| if x.is_nan() { 0.0 } else { x })
            .collect();

        let d = present(&self.intercepts);
        if d.is_empty() && family != ItemFamily::Lca {
            return Err(SimError::EmptyIntercepts { item });
        }
        self.finite("intercept row", &d)?;

        let t = self.t.as_deref().map(present);
        let rho = self.rho.as_deref().map(present);
        let auxiliary = match family {
            ItemFamily::Ggum => Some(t.as_ref().ok_or_else(|| self.missing(family, "t"))?.len()),
            ItemFamily::Unfolding(_) => {
                Some(rho.as_ref().ok_or_else(|| self.missing(family, "rho"))?.len())
            }
            ItemFamily::Lca => self.lca_cats.or(self.lca_q.as_ref().map(|q| q.nrows())),
            _ => None,
        };
        let ncat = family.category_count(d.len(), auxiliary);
        if ncat < 2 {
            return Err(self.invalid(format!("{family} item has only {ncat} usable category")));
        }

        let asymptotes = if ncat > 2 && !family.keeps_asymptotes_when_polytomous() {
            None
        } else {
            Some([logit(self.guess), logit(self.upper)])
        };

        let mut par = a.clone();
        let aux = match family {
            ItemFamily::Dichotomous => {
                if d.len() != 1 {
                    return Err(self.invalid("dichotomous items take exactly one intercept"));
                }
                par.push(d[0]);
                par.extend(asymptotes.unwrap_or([f64::NEG_INFINITY, f64::INFINITY]));
                ItemAux::None
            }
            ItemFamily::Graded if ncat == 2 => {
                par.push(d[0]);
                par.extend([-LOGIT_SENTINEL, LOGIT_SENTINEL]);
                return Ok(ItemObject {
                    family: ItemFamily::Dichotomous,
                    par,
                    nfact,
                    ncat,
                    aux: ItemAux::None,
                });
            }
            ItemFamily::Graded => {
                par.extend(&d);
                ItemAux::None
            }
            ItemFamily::Gpcm => {
                let scoring = match &self.gpcm_mat {
                    Some(mat) => {
                        if mat.dim() != (ncat, nfact) {
                            return Err(self.invalid(format!(
                                "gpcm scoring matrix is {:?}, expected ({ncat}, {nfact})",
                                mat.dim()
                            )));
                        }
                        let entries: Vec<f64> = mat.iter().copied().collect();
                        self.finite("gpcm scoring matrix", &entries)?;
                        par.extend(mat.iter());
                        mat.clone()
                    }
                    None => {
                        par.extend((0..ncat).map(|k| k as f64));
                        Array2::from_shape_fn((ncat, nfact), |(k, _)| k as f64)
                    }
                };
                par.extend(&d);
                ItemAux::Gpcm { scoring }
            }
            ItemFamily::Nominal | ItemFamily::NestedLogit => {
                let nom = present(
                    self.nominal
                        .as_deref()
                        .ok_or_else(|| self.missing(family, "nominal"))?,
                );
                self.finite("nominal row", &nom)?;
                if nom.len() != d.len() {
                    return Err(SimError::NominalCountMismatch {
                        item,
                        nominal: nom.len(),
                        intercepts: d.len(),
                    });
                }
                if family == ItemFamily::Nominal {
                    par.extend(&nom);
                    par.extend(&d);
                    if let Some(asym) = asymptotes {
                        par.extend(asym);
                    }
                    ItemAux::None
                } else {
                    par.push(d[0]);
                    par.extend(asymptotes.unwrap_or([f64::NEG_INFINITY, f64::INFINITY]));
                    par.extend(&nom[1..]);
                    par.extend(&d[1..]);
                    ItemAux::NestedLogit { correct_cat: 1 }
                }
            }
            ItemFamily::PartComp => {
                let loaded: Vec<usize> = (0..nfact).filter(|&f| a[f] != 0.0).collect();
                if loaded.is_empty() || d.len() != loaded.len() {
                    return Err(self.invalid(format!(
                        "partially compensatory items need one intercept per loaded dimension \
                         ({} loaded, {} intercepts)",
                        loaded.len(),
                        d.len()
                    )));
                }
                let mut full = vec![0.0; nfact];
                for (&f, &v) in loaded.iter().zip(&d) {
                    full[f] = v;
                }
                par.extend(full);
                par.extend(asymptotes.unwrap_or([f64::NEG_INFINITY, f64::INFINITY]));
                ItemAux::PartComp {
                    cpow: a.iter().map(|&x| if x != 0.0 { 1.0 } else { 0.0 }).collect(),
                }
            }
            ItemFamily::Ideal => {
                if d.len() != 1 {
                    return Err(self.invalid("ideal point models are for dichotomous items only"));
                }
                if d[0] >= 0.0 {
                    return Err(SimError::IdealInterceptNotNegative { item, value: d[0] });
                }
                par.push(d[0]);
                ItemAux::None
            }
            ItemFamily::Lca => {
                let item_q = match &self.lca_q {
                    Some(q) => {
                        if q.dim() != (ncat, nfact) {
                            return Err(self.invalid(format!(
                                "lca indicator matrix is {:?}, expected ({ncat}, {nfact})",
                                q.dim()
                            )));
                        }
                        let entries: Vec<f64> = q.iter().copied().collect();
                        self.finite("lca indicator matrix", &entries)?;
                        if q.row(0).iter().any(|&v| v != 0.0) {
                            return Err(self.invalid("lca indicator row 0 must be zero"));
                        }
                        q.clone()
                    }
                    None => lca_indicator(ncat, nfact),
                };
                ItemAux::Lca { item_q }
            }
            ItemFamily::Ggum => {
                let taus = t.unwrap_or_default();
                self.finite("t row", &taus)?;
                let nonmissing: Vec<usize> =
                    (0..nfact).filter(|&f| !self.slopes[f].is_nan()).collect();
                if nonmissing.len() != d.len() {
                    return Err(SimError::GgumCountMismatch {
                        item,
                        slopes: nonmissing.len(),
                        locations: d.len(),
                    });
                }
                let mut locations = vec![0.0; nfact];
                for (&f, &v) in nonmissing.iter().zip(&d) {
                    locations[f] = v;
                }
                par.extend(locations);
                par.extend(taus);
                ItemAux::None
            }
            ItemFamily::Unfolding(_) => {
                let rhos = rho.unwrap_or_default();
                self.finite("rho row", &rhos)?;
                if rhos.iter().any(|&r| r <= 0.0) {
                    return Err(self.invalid("rho values must be positive"));
                }
                if d.len() != 1 {
                    return Err(self.invalid("unfolding items take a single location intercept"));
                }
                par.push(d[0]);
                par.extend(rhos.iter().map(|r| r.ln()));
                ItemAux::None
            }
        };

        Ok(ItemObject {
            family,
            par,
            nfact,
            ncat,
            aux,
        })
    }
}

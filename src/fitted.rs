//! Read-only view of a previously fitted model.
//!
//! Fitted-model simulation only needs the items, the population estimates and
//! the shape of the original data, so estimation code plugs in by implementing
//! [`FittedModel`]. [`StoredModel`] keeps everything in memory.

use ndarray::{Array1, Array2};

use crate::error::{SimError, SimResult};
use crate::item::ItemObject;

pub trait FittedModel: Sync {
    fn nitems(&self) -> usize;

    fn nfact(&self) -> usize;

    fn item_names(&self) -> Vec<String>;

    /// Number of categories of each item in the fitted data.
    fn ncat(&self) -> Vec<usize>;

    /// Lowest observed category of each item.
    fn mins(&self) -> Vec<i32>;

    /// Response data the model was fitted to.
    fn data(&self) -> &Array2<i32>;

    fn extract_item(&self, index: usize) -> SimResult<ItemObject>;

    fn factor_means(&self) -> Array1<f64>;

    fn factor_cov(&self) -> Array2<f64>;
}

/// Fitted model held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredModel {
    items: Vec<ItemObject>,
    item_names: Vec<String>,
    mins: Vec<i32>,
    data: Array2<i32>,
    means: Array1<f64>,
    cov: Array2<f64>,
}

impl StoredModel {
    /// Items and data share their item order. The population defaults to a
    /// standard normal and the minimum categories to the data's column
    /// minima.
    pub fn new(items: Vec<ItemObject>, data: Array2<i32>) -> SimResult<Self> {
        if items.is_empty() {
            return Err(SimError::RowCount {
                what: "items",
                expected: 1,
                actual: 0,
            });
        }
        if data.ncols() != items.len() {
            return Err(SimError::RowCount {
                what: "data columns",
                expected: items.len(),
                actual: data.ncols(),
            });
        }
        let nfact = items[0].nfact();
        if let Some(item) = items.iter().find(|it| it.nfact() != nfact) {
            return Err(SimError::ThetaDimension {
                expected: nfact,
                actual: item.nfact(),
            });
        }

        let mins = data
            .columns()
            .into_iter()
            .map(|col| col.iter().copied().min().unwrap_or(0))
            .collect();
        let item_names = (1..=items.len()).map(|i| format!("Item_{i}")).collect();

        Ok(Self {
            items,
            item_names,
            mins,
            data,
            means: Array1::zeros(nfact),
            cov: Array2::eye(nfact),
        })
    }

    pub fn with_item_names(mut self, names: Vec<String>) -> SimResult<Self> {
        if names.len() != self.items.len() {
            return Err(SimError::RowCount {
                what: "item names",
                expected: self.items.len(),
                actual: names.len(),
            });
        }
        self.item_names = names;
        Ok(self)
    }

    pub fn with_mins(mut self, mins: Vec<i32>) -> SimResult<Self> {
        if mins.len() != self.items.len() {
            return Err(SimError::MinsLength {
                expected: self.items.len(),
                actual: mins.len(),
            });
        }
        self.mins = mins;
        Ok(self)
    }

    pub fn with_population(mut self, means: Array1<f64>, cov: Array2<f64>) -> SimResult<Self> {
        let nfact = self.nfact();
        if means.len() != nfact || cov.dim() != (nfact, nfact) {
            return Err(SimError::MeanCovMismatch {
                mean: means.len(),
                cov: cov.nrows(),
            });
        }
        self.means = means;
        self.cov = cov;
        Ok(self)
    }
}

impl FittedModel for StoredModel {
    fn nitems(&self) -> usize {
        self.items.len()
    }

    fn nfact(&self) -> usize {
        self.items[0].nfact()
    }

    fn item_names(&self) -> Vec<String> {
        self.item_names.clone()
    }

    fn ncat(&self) -> Vec<usize> {
        self.items.iter().map(ItemObject::ncat).collect()
    }

    fn mins(&self) -> Vec<i32> {
        self.mins.clone()
    }

    fn data(&self) -> &Array2<i32> {
        &self.data
    }

    fn extract_item(&self, index: usize) -> SimResult<ItemObject> {
        self.items.get(index).cloned().ok_or(SimError::ItemIndex {
            index,
            nitems: self.items.len(),
        })
    }

    fn factor_means(&self) -> Array1<f64> {
        self.means.clone()
    }

    fn factor_cov(&self) -> Array2<f64> {
        self.cov.clone()
    }
}

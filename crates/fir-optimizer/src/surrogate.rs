//! Random-forest surrogate over the trial history
//!
//! Predicts severity mean and uncertainty at unseen points. The
//! uncertainty comes from the spread of per-tree predictions; bootstrap
//! row sampling keeps the trees divergent so sigma does not collapse.

use fir_common::{Error, Result};
use randomforest::criterion::Mse;
use randomforest::table::{ColumnType, TableBuilder};
use randomforest::{RandomForestRegressor, RandomForestRegressorOptions};
use std::num::NonZeroUsize;
use tracing::debug;

/// Mean/uncertainty regressor backed by a decision-tree ensemble
pub struct SurrogateModel {
    columns: Vec<ColumnType>,
    trees: NonZeroUsize,
    seed: u64,
    forest: Option<RandomForestRegressor>,
}

impl SurrogateModel {
    /// `categorical_mask` marks which feature columns carry categorical
    /// codes; the ensemble splits those without ordering assumptions.
    pub fn new(categorical_mask: &[bool], trees: u32, seed: u64) -> Self {
        let columns = categorical_mask
            .iter()
            .map(|&categorical| {
                if categorical {
                    ColumnType::Categorical
                } else {
                    ColumnType::Numerical
                }
            })
            .collect();
        Self {
            columns,
            trees: NonZeroUsize::new(trees as usize).unwrap_or(NonZeroUsize::MIN),
            seed,
            forest: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.forest.is_some()
    }

    /// Refit the ensemble. A no-op below two samples; the model stays in
    /// its previous state.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.len() < 2 || x.len() != y.len() {
            debug!(samples = x.len(), "skipping surrogate fit, not enough history");
            return Ok(());
        }

        let mut table = TableBuilder::new();
        table
            .set_feature_column_types(&self.columns)
            .map_err(|e| Error::Optimizer(format!("surrogate table schema: {e}")))?;
        for (row, target) in x.iter().zip(y) {
            table
                .add_row(row, *target)
                .map_err(|e| Error::Optimizer(format!("surrogate table row: {e}")))?;
        }
        let table = table
            .build()
            .map_err(|e| Error::Optimizer(format!("surrogate table: {e}")))?;

        // Bootstrap each tree from |history| rows drawn with replacement so
        // per-tree predictions diverge and sigma stays informative.
        let max_samples = NonZeroUsize::new(x.len()).unwrap_or(NonZeroUsize::MIN);
        let forest = RandomForestRegressorOptions::new()
            .trees(self.trees)
            .max_samples(max_samples)
            .seed(self.seed)
            .fit(Mse, table);

        self.forest = Some(forest);
        Ok(())
    }

    /// Predicted (mean, sigma) for one feature row. Unfitted models report
    /// mean 0 and sigma 1 everywhere.
    pub fn predict_one(&self, row: &[f64]) -> (f64, f64) {
        match &self.forest {
            None => (0.0, 1.0),
            Some(forest) => {
                let predictions: Vec<f64> = forest.predict_individuals(row).collect();
                if predictions.is_empty() {
                    return (0.0, 1.0);
                }
                let n = predictions.len() as f64;
                let mean = predictions.iter().sum::<f64>() / n;
                let variance = predictions
                    .iter()
                    .map(|p| (p - mean).powi(2))
                    .sum::<f64>()
                    / n;
                (mean, variance.sqrt())
            }
        }
    }

    /// Predicted (mean, sigma) for a batch of feature rows
    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<(f64, f64)> {
        rows.iter().map(|row| self.predict_one(row)).collect()
    }
}

//! Axis binning and under/overflow handling.

use pm_core::{Error, EvalError, Result};
use serde::{Deserialize, Serialize};

/// Under/overflow policy, applied when a histogram is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPolicy {
    /// Keep under/overflow out of the visible bins (still reported).
    #[default]
    Drop,
    /// Fold overflow into the last bin.
    FoldOverflow,
    /// Fold underflow into the first bin and overflow into the last bin.
    Fold,
}

impl FlowPolicy {
    /// Visible bin that accumulator cell `cell` lands in, for an axis of
    /// `n_bins` bins (cell 0 is underflow, cell `n_bins + 1` overflow).
    pub fn target(self, cell: usize, n_bins: usize) -> Option<usize> {
        if cell == 0 {
            (self == FlowPolicy::Fold).then_some(0)
        } else if cell > n_bins {
            (self != FlowPolicy::Drop).then_some(n_bins - 1)
        } else {
            Some(cell - 1)
        }
    }
}

/// Sorted bin edges of one axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binning {
    edges: Vec<f64>,
}

impl Binning {
    /// `n` equal-width bins over `[lo, hi)`.
    pub fn uniform(n: usize, lo: f64, hi: f64) -> Result<Self> {
        if n == 0 {
            return Err(Error::Configuration("binning needs at least one bin".to_string()));
        }
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(Error::Configuration(format!("invalid binning range [{lo}, {hi})")));
        }
        let width = (hi - lo) / n as f64;
        let mut edges: Vec<f64> = (0..n).map(|i| lo + i as f64 * width).collect();
        edges.push(hi);
        Ok(Self { edges })
    }

    /// Variable-width bins from explicit, strictly increasing edges.
    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::Configuration(format!(
                "binning needs at least two edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(Error::Configuration("bin edges must be finite".to_string()));
        }
        if let Some(w) = edges.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::Configuration(format!(
                "bin edges must be strictly increasing ({} >= {})",
                w[0], w[1]
            )));
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Number of accumulator cells, including underflow and overflow.
    pub fn n_cells(&self) -> usize {
        self.edges.len() + 1
    }

    /// Accumulator cell for `x`: 0 = underflow, `1..=n_bins`, `n_bins + 1` =
    /// overflow. Bins are `[lo, hi)`. NaN has no cell.
    pub fn cell(&self, x: f64) -> std::result::Result<usize, EvalError> {
        if x.is_nan() {
            return Err(EvalError::Arithmetic("cannot bin NaN".to_string()));
        }
        let n = self.n_bins();
        if x < self.edges[0] {
            return Ok(0);
        }
        if x >= self.edges[n] {
            return Ok(n + 1);
        }
        Ok(self.edges.partition_point(|e| *e <= x))
    }
}

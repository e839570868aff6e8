//! The accumulator contract shared by tables and histograms.

use pm_core::{EvalError, Record, Result, Value};
use serde::{Deserialize, Serialize};

use crate::accumulator::{Accumulator, Cell};
use crate::artifact::{Artifact, ArtifactMeta};
use crate::category::CategoryMeta;
use crate::style::Role;

/// One weighted event forwarded to a consumer, already past every cut.
pub struct Entry<'a> {
    /// Global weight times the category's extra weight.
    pub weight: f64,
    /// Evaluated value expressions, in request order.
    pub values: &'a [Value],
    /// The event itself, for consumers with their own cuts (table rows).
    pub record: &'a dyn Record,
}

/// Everything a consumer needs besides its sums to produce an artifact.
#[derive(Debug, Clone)]
pub struct FinalizeContext {
    pub request: String,
    pub categories: Vec<CategoryMeta>,
    pub values: Vec<String>,
    pub cut: String,
    pub weight: String,
    pub scale: f64,
    pub style: serde_json::Value,
}

impl FinalizeContext {
    /// Scale applied to category `slot`: data is never scaled.
    pub fn scale_for(&self, slot: usize) -> f64 {
        match self.categories.get(slot) {
            Some(c) if c.role == Role::Data => 1.0,
            _ => self.scale,
        }
    }

    /// First slot whose category is called `name`.
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == name)
    }

    pub fn meta(&self) -> ArtifactMeta {
        ArtifactMeta::new(self)
    }
}

/// Accumulates one artifact kind.
///
/// A consumer is configuration only. Its running sums live in the owning
/// request's [`Accumulator`]: one slot per bound category, [`n_cells`]
/// cells per slot. `fill` must either fill completely or return an error
/// without touching `cells`.
///
/// [`n_cells`]: OutputConsumer::n_cells
pub trait OutputConsumer: Send + Sync {
    /// Artifact kind (`"hist1d"`, `"table"`, ...).
    fn kind(&self) -> &'static str;

    /// Name to use when the request does not set one.
    fn name_hint(&self) -> Option<&str> {
        None
    }

    /// Number of value expressions the consumer expects.
    fn value_arity(&self) -> usize;

    /// Cells per category slot.
    fn n_cells(&self) -> usize;

    /// Check the consumer against the categories it will be bound to.
    fn validate(&self, _categories: &[CategoryMeta]) -> Result<()> {
        Ok(())
    }

    /// Add one entry to the cells of its category slot.
    fn fill(&self, cells: &mut [Cell], entry: &Entry<'_>) -> std::result::Result<(), EvalError>;

    /// Produce the immutable artifact from the final sums.
    fn finalize(&self, acc: &Accumulator, ctx: &FinalizeContext) -> Result<Artifact>;
}

/// Normalization of a histogram, computed from the same accumulated bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleVariant {
    /// Sums of weights times the request scale (data unscaled).
    #[default]
    Absolute,
    /// Every category normalized to unit area.
    Unit,
    /// Backgrounds scaled so their total matches the observed data.
    ToData,
}

/// Per-slot multiplicative factors for `variant`.
///
/// `integrals` are the unscaled visible integrals per slot.
pub(crate) fn variant_factors(variant: StyleVariant, ctx: &FinalizeContext, integrals: &[f64]) -> Vec<f64> {
    let n = integrals.len();
    match variant {
        StyleVariant::Absolute => (0..n).map(|s| ctx.scale_for(s)).collect(),
        StyleVariant::Unit => integrals.iter().map(|&i| if i != 0.0 { 1.0 / i } else { 1.0 }).collect(),
        StyleVariant::ToData => {
            let role = |s: usize| ctx.categories.get(s).map(|c| c.role);
            let data: f64 = (0..n).filter(|&s| role(s) == Some(Role::Data)).map(|s| integrals[s]).sum();
            let has_data = (0..n).any(|s| role(s) == Some(Role::Data));
            let bkg: f64 = (0..n)
                .filter(|&s| role(s) == Some(Role::Background))
                .map(|s| integrals[s] * ctx.scale_for(s))
                .sum();
            let k = if has_data && bkg != 0.0 { data / bkg } else { 1.0 };
            (0..n)
                .map(|s| match role(s) {
                    Some(Role::Background) => ctx.scale_for(s) * k,
                    _ => ctx.scale_for(s),
                })
                .collect()
        }
    }
}

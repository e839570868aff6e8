//! Plot requests: one consumer bound to categories, cuts and values.

use std::fmt;
use std::sync::Arc;

use pm_core::{Error, Result};
use pm_expr::Expression;
use pm_expr::expression::file_stem;

use crate::accumulator::Accumulator;
use crate::artifact::Artifact;
use crate::category::{Category, CategoryMeta};
use crate::consumer::{FinalizeContext, OutputConsumer};

/// A category bound to a request, with an optional extra weight.
#[derive(Clone)]
pub struct BoundCategory {
    pub category: Arc<Category>,
    pub weight: Option<Expression>,
}

/// One output consumer plus everything that decides what it is fed.
///
/// Slot `i` of the accumulator belongs to `categories()[i]`.
pub struct PlotRequest {
    name: String,
    consumer: Box<dyn OutputConsumer>,
    cut: Expression,
    weight: Expression,
    categories: Vec<BoundCategory>,
    values: Vec<Expression>,
    style: serde_json::Value,
    scale: f64,
    accumulator: Accumulator,
}

impl PlotRequest {
    pub fn builder(consumer: impl OutputConsumer + 'static) -> PlotRequestBuilder {
        PlotRequestBuilder {
            name: None,
            consumer: Box::new(consumer),
            cut: Expression::always(),
            weight: Expression::unit(),
            categories: Vec::new(),
            values: Vec::new(),
            style: serde_json::Value::Null,
            scale: 1.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn consumer(&self) -> &dyn OutputConsumer {
        self.consumer.as_ref()
    }

    /// Baseline cut, applied on top of every category selection.
    pub fn cut(&self) -> &Expression {
        &self.cut
    }

    pub fn weight(&self) -> &Expression {
        &self.weight
    }

    pub fn categories(&self) -> &[BoundCategory] {
        &self.categories
    }

    pub fn values(&self) -> &[Expression] {
        &self.values
    }

    /// Opaque renderer style, forwarded unchanged.
    pub fn style(&self) -> &serde_json::Value {
        &self.style
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Sums accumulated by the last run.
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    pub(crate) fn accumulator_mut(&mut self) -> &mut Accumulator {
        &mut self.accumulator
    }

    /// A zeroed accumulator shaped like this request's.
    pub fn new_shard(&self) -> Accumulator {
        Accumulator::new(self.categories.len(), self.consumer.n_cells())
    }

    pub(crate) fn reset(&mut self) {
        self.accumulator.reset();
    }

    pub fn finalize_context(&self) -> FinalizeContext {
        FinalizeContext {
            request: self.name.clone(),
            categories: self.categories.iter().map(|b| b.category.meta()).collect(),
            values: self.values.iter().map(|v| v.name().to_string()).collect(),
            cut: self.cut.name().to_string(),
            weight: self.weight.name().to_string(),
            scale: self.scale,
            style: self.style.clone(),
        }
    }

    /// Artifact for the current sums.
    pub fn finalize(&self) -> Result<Artifact> {
        self.consumer.finalize(&self.accumulator, &self.finalize_context())
    }
}

impl fmt::Debug for PlotRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlotRequest")
            .field("name", &self.name)
            .field("kind", &self.consumer.kind())
            .field("cut", &self.cut.name())
            .field("weight", &self.weight.name())
            .field("categories", &self.categories.iter().map(|b| b.category.name()).collect::<Vec<_>>())
            .field("values", &self.values.iter().map(|v| v.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`PlotRequest`].
pub struct PlotRequestBuilder {
    name: Option<String>,
    consumer: Box<dyn OutputConsumer>,
    cut: Expression,
    weight: Expression,
    categories: Vec<BoundCategory>,
    values: Vec<Expression>,
    style: serde_json::Value,
    scale: f64,
}

impl PlotRequestBuilder {
    /// Explicit name; derived from the consumer and values otherwise.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cut(mut self, cut: Expression) -> Self {
        self.cut = cut;
        self
    }

    pub fn weight(mut self, weight: Expression) -> Self {
        self.weight = weight;
        self
    }

    pub fn category(mut self, category: Arc<Category>) -> Self {
        self.categories.push(BoundCategory { category, weight: None });
        self
    }

    /// Bind a category whose entries get an extra weight factor.
    pub fn weighted_category(mut self, category: Arc<Category>, weight: Expression) -> Self {
        let weight = (!weight.is_unit()).then_some(weight);
        self.categories.push(BoundCategory { category, weight });
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = Arc<Category>>) -> Self {
        self.categories.extend(categories.into_iter().map(|category| BoundCategory { category, weight: None }));
        self
    }

    pub fn value(mut self, value: Expression) -> Self {
        self.values.push(value);
        self
    }

    pub fn style(mut self, style: serde_json::Value) -> Self {
        self.style = style;
        self
    }

    /// Constant factor applied to non-data categories at finalize
    /// (typically the integrated luminosity).
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn build(self) -> Result<PlotRequest> {
        let arity = self.consumer.value_arity();
        if self.values.len() != arity {
            return Err(Error::Configuration(format!(
                "{} expects {arity} value expression(s), got {}",
                self.consumer.kind(),
                self.values.len()
            )));
        }
        if !self.scale.is_finite() {
            return Err(Error::Configuration(format!("scale must be finite, got {}", self.scale)));
        }
        let metas: Vec<CategoryMeta> = self.categories.iter().map(|b| b.category.meta()).collect();
        for (i, m) in metas.iter().enumerate() {
            if metas[..i].iter().any(|o| o.name == m.name) {
                return Err(Error::Configuration(format!("category '{}' bound twice", m.name)));
            }
        }
        self.consumer.validate(&metas)?;

        let name = match self.name {
            Some(n) if !n.trim().is_empty() => n,
            _ => derive_name(self.consumer.as_ref(), &self.values, &self.cut),
        };
        let accumulator = Accumulator::new(self.categories.len(), self.consumer.n_cells());
        Ok(PlotRequest {
            name,
            consumer: self.consumer,
            cut: self.cut,
            weight: self.weight,
            categories: self.categories,
            values: self.values,
            style: self.style,
            scale: self.scale,
            accumulator,
        })
    }
}

fn derive_name(consumer: &dyn OutputConsumer, values: &[Expression], cut: &Expression) -> String {
    let base = match (consumer.name_hint(), values) {
        (Some(hint), _) => file_stem(hint),
        (None, [x]) => x.file_stem(),
        (None, [x, y]) => format!("{}_vs_{}", y.file_stem(), x.file_stem()),
        (None, _) => consumer.kind().to_string(),
    };
    if cut.is_always_true() { base } else { format!("{base}__{}", cut.file_stem()) }
}

//! One-dimensional histograms.

use pm_core::{EvalError, Result};

use crate::accumulator::{Accumulator, Cell};
use crate::artifact::{Artifact, Hist1dArtifact, Hist1dSeries, Hist1dVariant};
use crate::binning::{Binning, FlowPolicy};
use crate::consumer::{Entry, FinalizeContext, OutputConsumer, StyleVariant, variant_factors};
use crate::style::Role;

/// Histogram of one value expression.
///
/// Vector values fill one entry per element, each with the full event
/// weight.
#[derive(Debug, Clone)]
pub struct Hist1d {
    binning: Binning,
    flow: FlowPolicy,
    variants: Vec<StyleVariant>,
}

impl Hist1d {
    pub fn new(binning: Binning) -> Self {
        Self { binning, flow: FlowPolicy::default(), variants: vec![StyleVariant::Absolute] }
    }

    pub fn with_flow(mut self, flow: FlowPolicy) -> Self {
        self.flow = flow;
        self
    }

    /// Normalizations to produce; duplicates are ignored.
    pub fn with_variants(mut self, variants: impl IntoIterator<Item = StyleVariant>) -> Self {
        self.variants = dedup_variants(variants);
        self
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Visible bin contents and `sum w^2` of one slot after the flow policy.
    fn visible(&self, cells: &[Cell]) -> (Vec<f64>, Vec<f64>) {
        let n = self.binning.n_bins();
        let mut y = vec![0.0; n];
        let mut w2 = vec![0.0; n];
        for (i, c) in cells.iter().enumerate() {
            if let Some(b) = self.flow.target(i, n) {
                y[b] += c.sumw;
                w2[b] += c.sumw2;
            }
        }
        (y, w2)
    }
}

pub(crate) fn dedup_variants(variants: impl IntoIterator<Item = StyleVariant>) -> Vec<StyleVariant> {
    let mut out: Vec<StyleVariant> = Vec::new();
    for v in variants {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    if out.is_empty() {
        out.push(StyleVariant::Absolute);
    }
    out
}

impl OutputConsumer for Hist1d {
    fn kind(&self) -> &'static str {
        "hist1d"
    }

    fn value_arity(&self) -> usize {
        1
    }

    fn n_cells(&self) -> usize {
        self.binning.n_cells()
    }

    fn fill(&self, cells: &mut [Cell], entry: &Entry<'_>) -> std::result::Result<(), EvalError> {
        let value = entry.values.first().ok_or_else(|| EvalError::Native("missing value".to_string()))?;
        let xs = value.fill_values()?;
        let targets = xs.iter().map(|&x| self.binning.cell(x)).collect::<std::result::Result<Vec<_>, _>>()?;
        for t in targets {
            cells[t].add(entry.weight);
        }
        Ok(())
    }

    fn finalize(&self, acc: &Accumulator, ctx: &FinalizeContext) -> Result<Artifact> {
        let n = self.binning.n_bins();
        let n_slots = acc.n_slots();
        let raw: Vec<(Vec<f64>, Vec<f64>)> = (0..n_slots).map(|s| self.visible(acc.slot(s))).collect();
        let integrals: Vec<f64> = raw.iter().map(|(y, _)| y.iter().sum()).collect();
        let role = |s: usize| ctx.categories.get(s).map(|c| c.role);
        let has_data = (0..n_slots).any(|s| role(s) == Some(Role::Data));

        let mut variants = Vec::with_capacity(self.variants.len());
        for &variant in &self.variants {
            let factors = variant_factors(variant, ctx, &integrals);
            let mut series = Vec::with_capacity(n_slots);
            let mut bkg = vec![0.0; n];
            let mut bkg_w2 = vec![0.0; n];
            let mut data = vec![0.0; n];

            for (s, (y, w2)) in raw.iter().enumerate() {
                let f = factors[s];
                let cells = acc.slot(s);
                let ys: Vec<f64> = y.iter().map(|v| v * f).collect();
                let errs: Vec<f64> = w2.iter().map(|v| v.sqrt() * f.abs()).collect();
                match role(s) {
                    Some(Role::Background) => {
                        for b in 0..n {
                            bkg[b] += ys[b];
                            bkg_w2[b] += w2[b] * f * f;
                        }
                    }
                    Some(Role::Data) => {
                        for b in 0..n {
                            data[b] += ys[b];
                        }
                    }
                    _ => {}
                }
                series.push(Hist1dSeries {
                    category: ctx.categories[s].clone(),
                    normalization: f,
                    integral: ys.iter().sum(),
                    y: ys,
                    yerr: errs,
                    underflow: cells[0].sumw * f,
                    overflow: cells[n + 1].sumw * f,
                    entries: cells.iter().map(|c| c.entries).sum(),
                });
            }

            let ratio = has_data.then(|| {
                data.iter().zip(&bkg).map(|(d, b)| (*b != 0.0).then(|| d / b)).collect::<Vec<_>>()
            });
            variants.push(Hist1dVariant {
                variant,
                series,
                background_total: bkg,
                background_total_err: bkg_w2.iter().map(|v| v.sqrt()).collect(),
                data_total: has_data.then_some(data),
                ratio,
            });
        }

        Ok(Artifact::Hist1d(Hist1dArtifact {
            meta: ctx.meta(),
            x_label: ctx.values.first().cloned().unwrap_or_default(),
            bin_edges: self.binning.edges().to_vec(),
            flow: self.flow,
            variants,
        }))
    }
}

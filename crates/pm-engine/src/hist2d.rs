//! Two-dimensional histograms.

use pm_core::{EvalError, Result};

use crate::accumulator::{Accumulator, Cell};
use crate::artifact::{Artifact, Hist2dArtifact, Hist2dSeries, Hist2dVariant};
use crate::binning::{Binning, FlowPolicy};
use crate::consumer::{Entry, FinalizeContext, OutputConsumer, StyleVariant, variant_factors};
use crate::hist1d::dedup_variants;

/// Histogram of a pair of value expressions.
///
/// Two vectors are paired element-wise and must have the same length; a
/// scalar paired with a vector is repeated for each element.
#[derive(Debug, Clone)]
pub struct Hist2d {
    x: Binning,
    y: Binning,
    flow: FlowPolicy,
    variants: Vec<StyleVariant>,
}

impl Hist2d {
    pub fn new(x: Binning, y: Binning) -> Self {
        Self { x, y, flow: FlowPolicy::default(), variants: vec![StyleVariant::Absolute] }
    }

    pub fn with_flow(mut self, flow: FlowPolicy) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_variants(mut self, variants: impl IntoIterator<Item = StyleVariant>) -> Self {
        self.variants = dedup_variants(variants);
        self
    }

    fn stride(&self) -> usize {
        self.x.n_cells()
    }

    fn visible(&self, cells: &[Cell]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let (nx, ny) = (self.x.n_bins(), self.y.n_bins());
        let mut z = vec![vec![0.0; nx]; ny];
        let mut w2 = vec![vec![0.0; nx]; ny];
        for (i, c) in cells.iter().enumerate() {
            let (cx, cy) = (i % self.stride(), i / self.stride());
            if let (Some(bx), Some(by)) = (self.flow.target(cx, nx), self.flow.target(cy, ny)) {
                z[by][bx] += c.sumw;
                w2[by][bx] += c.sumw2;
            }
        }
        (z, w2)
    }
}

fn pair(xs: Vec<f64>, ys: Vec<f64>, x_vec: bool, y_vec: bool) -> std::result::Result<Vec<(f64, f64)>, EvalError> {
    match (x_vec, y_vec) {
        (true, true) if xs.len() != ys.len() => Err(EvalError::TypeMismatch {
            expected: format!("vector of length {}", xs.len()),
            found: format!("vector of length {}", ys.len()),
        }),
        (false, true) => Ok(ys.into_iter().map(|y| (xs[0], y)).collect()),
        (true, false) => Ok(xs.into_iter().map(|x| (x, ys[0])).collect()),
        _ => Ok(xs.into_iter().zip(ys).collect()),
    }
}

impl OutputConsumer for Hist2d {
    fn kind(&self) -> &'static str {
        "hist2d"
    }

    fn value_arity(&self) -> usize {
        2
    }

    fn n_cells(&self) -> usize {
        self.x.n_cells() * self.y.n_cells()
    }

    fn fill(&self, cells: &mut [Cell], entry: &Entry<'_>) -> std::result::Result<(), EvalError> {
        let [vx, vy] = entry.values else {
            return Err(EvalError::Native("expected two values".to_string()));
        };
        let points = pair(vx.fill_values()?, vy.fill_values()?, vx.is_vector(), vy.is_vector())?;
        let targets = points
            .iter()
            .map(|&(x, y)| Ok(self.y.cell(y)? * self.stride() + self.x.cell(x)?))
            .collect::<std::result::Result<Vec<_>, EvalError>>()?;
        for t in targets {
            cells[t].add(entry.weight);
        }
        Ok(())
    }

    fn finalize(&self, acc: &Accumulator, ctx: &FinalizeContext) -> Result<Artifact> {
        let raw: Vec<_> = (0..acc.n_slots()).map(|s| self.visible(acc.slot(s))).collect();
        let integrals: Vec<f64> = raw.iter().map(|(z, _)| z.iter().flatten().sum()).collect();

        let variants = self
            .variants
            .iter()
            .map(|&variant| {
                let factors = variant_factors(variant, ctx, &integrals);
                let series = raw
                    .iter()
                    .enumerate()
                    .map(|(s, (z, w2))| {
                        let f = factors[s];
                        let z: Vec<Vec<f64>> = z.iter().map(|row| row.iter().map(|v| v * f).collect()).collect();
                        Hist2dSeries {
                            category: ctx.categories[s].clone(),
                            normalization: f,
                            integral: z.iter().flatten().sum(),
                            z,
                            zerr: w2.iter().map(|row| row.iter().map(|v| v.sqrt() * f.abs()).collect()).collect(),
                            entries: acc.slot(s).iter().map(|c| c.entries).sum(),
                        }
                    })
                    .collect();
                Hist2dVariant { variant, series }
            })
            .collect();

        Ok(Artifact::Hist2d(Hist2dArtifact {
            meta: ctx.meta(),
            x_label: ctx.values.first().cloned().unwrap_or_default(),
            y_label: ctx.values.get(1).cloned().unwrap_or_default(),
            x_edges: self.x.edges().to_vec(),
            y_edges: self.y.edges().to_vec(),
            flow: self.flow,
            variants,
        }))
    }
}

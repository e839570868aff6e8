//! Cutflow tables.
//!
//! Rows are cumulative: an event counts in row `k` when it passes the cuts
//! of rows `0..=k`.

use pm_core::{Error, EvalError, Result};
use pm_expr::Expression;

use crate::accumulator::{Accumulator, Cell};
use crate::artifact::{Artifact, TableArtifact, TableCell, TableRatioSpec, TableRowArtifact};
use crate::category::CategoryMeta;
use crate::consumer::{Entry, FinalizeContext, OutputConsumer};
use crate::style::Role;

/// One cutflow row.
#[derive(Debug, Clone)]
pub struct TableRow {
    pub label: String,
    pub cut: Expression,
}

impl TableRow {
    pub fn new(label: impl Into<String>, cut: Expression) -> Self {
        Self { label: label.into(), cut }
    }
}

/// Cutflow table over the bound categories.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    rows: Vec<TableRow>,
    ratio: Option<(String, String)>,
}

impl Table {
    pub fn new(name: impl Into<String>, rows: Vec<TableRow>) -> Self {
        Self { name: name.into(), rows, ratio: None }
    }

    /// Add a `numerator / denominator` column between two categories.
    pub fn with_ratio(mut self, numerator: impl Into<String>, denominator: impl Into<String>) -> Self {
        self.ratio = Some((numerator.into(), denominator.into()));
        self
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// Ratio column value at `row` for the sums accumulated so far.
    ///
    /// `None` without a ratio column or when the denominator is zero.
    pub fn ratio_at(&self, acc: &Accumulator, ctx: &FinalizeContext, row: usize) -> Option<f64> {
        let (num, den) = self.ratio.as_ref()?;
        let (n, d) = (ctx.slot_of(num)?, ctx.slot_of(den)?);
        let top = acc.slot(n).get(row)?.sumw * ctx.scale_for(n);
        let bottom = acc.slot(d).get(row)?.sumw * ctx.scale_for(d);
        (bottom != 0.0).then(|| top / bottom)
    }

    fn scaled(cell: &Cell, f: f64) -> TableCell {
        TableCell { value: cell.sumw * f, error: cell.error() * f.abs(), entries: cell.entries }
    }
}

impl OutputConsumer for Table {
    fn kind(&self) -> &'static str {
        "table"
    }

    fn name_hint(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn value_arity(&self) -> usize {
        0
    }

    fn n_cells(&self) -> usize {
        self.rows.len()
    }

    fn validate(&self, categories: &[CategoryMeta]) -> Result<()> {
        if self.rows.is_empty() {
            return Err(Error::Configuration(format!("table '{}' has no rows", self.name)));
        }
        if let Some((num, den)) = &self.ratio {
            for name in [num, den] {
                if !categories.iter().any(|c| &c.name == name) {
                    return Err(Error::Configuration(format!(
                        "table '{}': ratio category '{name}' is not bound to the table",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn fill(&self, cells: &mut [Cell], entry: &Entry<'_>) -> std::result::Result<(), EvalError> {
        let mut depth = 0;
        for row in &self.rows {
            if !row.cut.passes(entry.record)? {
                break;
            }
            depth += 1;
        }
        for cell in &mut cells[..depth] {
            cell.add(entry.weight);
        }
        Ok(())
    }

    fn finalize(&self, acc: &Accumulator, ctx: &FinalizeContext) -> Result<Artifact> {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                let cells: Vec<TableCell> =
                    (0..acc.n_slots()).map(|s| Self::scaled(&acc.slot(s)[r], ctx.scale_for(s))).collect();
                let mut total = Cell::default();
                for s in (0..acc.n_slots()).filter(|&s| ctx.categories[s].role == Role::Background) {
                    let f = ctx.scale_for(s);
                    let c = &acc.slot(s)[r];
                    total.sumw += c.sumw * f;
                    total.sumw2 += c.sumw2 * f * f;
                    total.entries += c.entries;
                }
                TableRowArtifact {
                    label: row.label.clone(),
                    cut: row.cut.name().to_string(),
                    cells,
                    background_total: Self::scaled(&total, 1.0),
                    ratio: self.ratio_at(acc, ctx, r),
                }
            })
            .collect();

        Ok(Artifact::Table(TableArtifact {
            meta: ctx.meta(),
            columns: ctx.categories.clone(),
            rows,
            ratio: self
                .ratio
                .as_ref()
                .map(|(n, d)| TableRatioSpec { numerator: n.clone(), denominator: d.clone() }),
        }))
    }
}

//! Plot book v0 (YAML) parsing and construction of categories and requests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use pm_data::{CsvLoader, ParquetLoader, Signature, SourceLoader, SourceRegistry, resolve_patterns};
use pm_engine::{
    Binning, Category, Color, EngineConfig, EvalErrorPolicy, FlowPolicy, Hist1d, Hist2d, PlotRequest, Role,
    StyleVariant, Table, TableRow,
};
use pm_expr::Expression;
use rayon::prelude::*;
use serde::Deserialize;

pub const BOOK_V0: &str = "plotmaker_book_v0";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Book {
    pub schema_version: String,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_luminosity")]
    pub luminosity: f64,
    #[serde(default)]
    pub threads: usize,
    #[serde(default)]
    pub max_events: Option<u64>,
    #[serde(default)]
    pub on_eval_error: EvalErrorPolicy,
    pub sources: BTreeMap<String, SourceDef>,
    pub categories: Vec<CategoryDef>,
    #[serde(default)]
    pub plots: Vec<PlotDef>,
}

fn default_luminosity() -> f64 {
    1.0
}

fn default_table_name() -> String {
    "cutflow".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Parquet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDef {
    pub format: SourceFormat,
    pub files: Vec<String>,
    /// CSV only.
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Parquet only.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryDef {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub color: Option<Color>,
    pub source: String,
    #[serde(default)]
    pub cut: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Name(String),
    Weighted { name: String, weight: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinsDef {
    Uniform { n: usize, lo: f64, hi: f64 },
    Edges { edges: Vec<f64> },
}

impl BinsDef {
    fn to_binning(&self) -> pm_core::Result<Binning> {
        match self {
            BinsDef::Uniform { n, lo, hi } => Binning::uniform(*n, *lo, *hi),
            BinsDef::Edges { edges } => Binning::from_edges(edges.clone()),
        }
    }
}

/// Fields every plot kind accepts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonDef {
    #[serde(default)]
    pub cut: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub style: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AxisDef {
    pub value: String,
    pub bins: BinsDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RowDef {
    pub label: String,
    pub cut: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatioDef {
    pub numerator: String,
    pub denominator: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotDef {
    Hist1d {
        #[serde(default)]
        name: Option<String>,
        value: String,
        bins: BinsDef,
        #[serde(default)]
        flow: FlowPolicy,
        #[serde(default)]
        variants: Vec<StyleVariant>,
        #[serde(flatten)]
        common: CommonDef,
    },
    Hist2d {
        #[serde(default)]
        name: Option<String>,
        x: AxisDef,
        y: AxisDef,
        #[serde(default)]
        flow: FlowPolicy,
        #[serde(default)]
        variants: Vec<StyleVariant>,
        #[serde(flatten)]
        common: CommonDef,
    },
    Table {
        #[serde(default = "default_table_name")]
        name: String,
        rows: Vec<RowDef>,
        #[serde(default)]
        ratio: Option<RatioDef>,
        #[serde(flatten)]
        common: CommonDef,
    },
}

/// Read a plot book (YAML or JSON).
pub fn read_book(path: &Path) -> Result<Book> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let probe: serde_yaml_ng::Value = serde_yaml_ng::from_slice(&bytes)?;
    let schema_version = probe.get("schema_version").and_then(|v| v.as_str()).map(|s| s.to_string());
    if schema_version.as_deref() != Some(BOOK_V0) {
        bail!(
            "{}: expected schema_version: {BOOK_V0}, found {}",
            path.display(),
            schema_version.as_deref().unwrap_or("none")
        );
    }
    let book: Book =
        serde_yaml_ng::from_slice(&bytes).with_context(|| format!("invalid plot book {}", path.display()))?;
    book.validate()?;
    Ok(book)
}

impl Book {
    fn validate(&self) -> Result<()> {
        if !self.luminosity.is_finite() || self.luminosity < 0.0 {
            bail!("luminosity must be a non-negative number, got {}", self.luminosity);
        }
        let mut seen = HashMap::new();
        for (i, c) in self.categories.iter().enumerate() {
            if let Some(j) = seen.insert(c.name.as_str(), i) {
                bail!("category '{}' is declared twice (entries {j} and {i})", c.name);
            }
            if !self.sources.contains_key(&c.source) {
                bail!("category '{}' refers to unknown source '{}'", c.name, c.source);
            }
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default().with_threads(self.threads).with_eval_error_policy(self.on_eval_error);
        config.max_events = self.max_events;
        config
    }
}

/// A source resolved to its files and loader.
pub struct ResolvedSource {
    pub name: String,
    pub signature: Signature,
    pub loader: Arc<dyn SourceLoader>,
}

/// Everything built from a book, ready to hand to the engine.
pub struct BuiltBook {
    pub sources: Vec<ResolvedSource>,
    pub categories: Vec<Arc<Category>>,
    pub requests: Vec<PlotRequest>,
}

fn resolve_sources(book: &Book, base_dir: &Path) -> Result<Vec<ResolvedSource>> {
    book.sources
        .iter()
        .map(|(name, def)| {
            let files = resolve_patterns(&def.files, Some(base_dir)).with_context(|| format!("source '{name}'"))?;
            let (schema, loader): (&str, Arc<dyn SourceLoader>) = match def.format {
                SourceFormat::Csv => {
                    let delimiter = def.delimiter.unwrap_or(',');
                    if !delimiter.is_ascii() {
                        bail!("source '{name}': delimiter must be a single ASCII character");
                    }
                    ("csv", Arc::new(CsvLoader::new().with_delimiter(delimiter as u8)))
                }
                SourceFormat::Parquet => {
                    let mut loader = ParquetLoader::new();
                    if let Some(n) = def.batch_size {
                        loader = loader.with_batch_size(n);
                    }
                    ("parquet", Arc::new(loader))
                }
            };
            let signature = Signature::new(schema, files)?;
            tracing::info!(source = %name, signature = %signature, "source resolved");
            Ok(ResolvedSource { name: name.clone(), signature, loader })
        })
        .collect()
}

fn formula(text: &str, what: &str) -> Result<Expression> {
    Expression::formula(text).with_context(|| format!("{what}: '{text}'"))
}

/// Resolve sources, open them through `registry` and build every category
/// and request of `book`.
pub fn build(book: &Book, base_dir: &Path, registry: &SourceRegistry) -> Result<BuiltBook> {
    let sources = resolve_sources(book, base_dir)?;
    let by_name: HashMap<&str, &ResolvedSource> = sources.iter().map(|s| (s.name.as_str(), s)).collect();

    let categories: Vec<Arc<Category>> = book
        .categories
        .par_iter()
        .enumerate()
        .map(|(i, def)| {
            let src = by_name
                .get(def.source.as_str())
                .ok_or_else(|| anyhow!("category '{}' refers to unknown source '{}'", def.name, def.source))?;
            let mut builder = Category::builder(def.name.clone(), def.role)
                .color(def.color.unwrap_or_else(|| Color::palette(i)))
                .source(src.signature.clone(), Arc::clone(&src.loader));
            if let Some(cut) = &def.cut {
                builder = builder.selection(formula(cut, &format!("category '{}' cut", def.name))?);
            }
            builder.build(registry).with_context(|| format!("category '{}'", def.name))
        })
        .collect::<Result<_>>()?;
    let cats: HashMap<&str, &Arc<Category>> = categories.iter().map(|c| (c.name(), c)).collect();

    let mut requests: Vec<PlotRequest> = Vec::with_capacity(book.plots.len());
    for (i, plot) in book.plots.iter().enumerate() {
        let request = build_request(plot, &cats, book.luminosity).with_context(|| format!("plot #{i}"))?;
        if let Some(j) = requests.iter().position(|r| r.name() == request.name()) {
            bail!("plots #{j} and #{i} are both named '{}'; set an explicit name", request.name());
        }
        requests.push(request);
    }
    Ok(BuiltBook { sources, categories, requests })
}

fn build_request(plot: &PlotDef, cats: &HashMap<&str, &Arc<Category>>, luminosity: f64) -> Result<PlotRequest> {
    let (mut builder, common, name) = match plot {
        PlotDef::Hist1d { name, value, bins, flow, variants, common } => {
            let hist = Hist1d::new(bins.to_binning()?).with_flow(*flow).with_variants(variants.iter().copied());
            (PlotRequest::builder(hist).value(formula(value, "value")?), common, name.clone())
        }
        PlotDef::Hist2d { name, x, y, flow, variants, common } => {
            let hist = Hist2d::new(x.bins.to_binning()?, y.bins.to_binning()?)
                .with_flow(*flow)
                .with_variants(variants.iter().copied());
            let builder =
                PlotRequest::builder(hist).value(formula(&x.value, "x value")?).value(formula(&y.value, "y value")?);
            (builder, common, name.clone())
        }
        PlotDef::Table { name, rows, ratio, common } => {
            let rows = rows
                .iter()
                .map(|r| Ok(TableRow::new(r.label.clone(), formula(&r.cut, "table row cut")?)))
                .collect::<Result<Vec<_>>>()?;
            let mut table = Table::new(name.clone(), rows);
            if let Some(r) = ratio {
                table = table.with_ratio(r.numerator.clone(), r.denominator.clone());
            }
            (PlotRequest::builder(table), common, Some(name.clone()))
        }
    };

    if let Some(name) = name {
        builder = builder.name(name);
    }
    if let Some(cut) = &common.cut {
        builder = builder.cut(formula(cut, "cut")?);
    }
    if let Some(weight) = &common.weight {
        builder = builder.weight(formula(weight, "weight")?);
    }
    for r in &common.categories {
        let (name, weight) = match r {
            CategoryRef::Name(name) => (name, None),
            CategoryRef::Weighted { name, weight } => (name, Some(weight)),
        };
        let cat = cats.get(name.as_str()).ok_or_else(|| anyhow!("unknown category '{name}'"))?;
        builder = match weight {
            Some(w) => builder.weighted_category(Arc::clone(cat), formula(w, "category weight")?),
            None => builder.category(Arc::clone(cat)),
        };
    }
    Ok(builder.style(common.style.clone()).scale(luminosity).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r##"
schema_version: plotmaker_book_v0
luminosity: 2.5
sources:
  mc: { format: csv, files: ["mc_*.csv"] }
categories:
  - { name: tt, role: background, color: "#1f77b4", source: mc, cut: "nlep == 1" }
  - { name: data, role: data, source: mc }
plots:
  - kind: hist1d
    value: met
    bins: { n: 4, lo: 0, hi: 200 }
    flow: fold
    variants: [absolute, unit]
    categories: [tt, { name: data, weight: "1" }]
    style: { log_y: true }
  - kind: hist2d
    x: { value: met, bins: { edges: [0, 50, 200] } }
    y: { value: nlep, bins: { n: 3, lo: 0, hi: 3 } }
    categories: [tt]
  - kind: table
    name: cutflow
    rows:
      - { label: all, cut: "1" }
      - { label: "met > 50", cut: "met > 50" }
    ratio: { numerator: data, denominator: tt }
    categories: [tt, data]
"##;

    #[test]
    fn parses_every_plot_kind() {
        let book: Book = serde_yaml_ng::from_str(BOOK).unwrap();
        book.validate().unwrap();
        assert_eq!(book.luminosity, 2.5);
        assert_eq!(book.categories[0].color, Some(Color::hex("#1f77b4").unwrap()));
        assert!(matches!(book.plots[0], PlotDef::Hist1d { flow: FlowPolicy::Fold, .. }));
        assert!(matches!(book.plots[1], PlotDef::Hist2d { .. }));
        match &book.plots[2] {
            PlotDef::Table { rows, ratio, .. } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(ratio.as_ref().unwrap().numerator, "data");
            }
            other => panic!("expected table, got {other:?}"),
        }
        match &book.plots[0] {
            PlotDef::Hist1d { common, .. } => {
                assert!(matches!(&common.categories[1], CategoryRef::Weighted { name, .. } if name == "data"));
                assert_eq!(common.style["log_y"], serde_json::Value::Bool(true));
            }
            other => panic!("expected hist1d, got {other:?}"),
        }
    }

    #[test]
    fn unknown_source_is_rejected() {
        let text = BOOK.replace("source: mc, cut", "source: nope, cut");
        let book: Book = serde_yaml_ng::from_str(&text).unwrap();
        let err = book.validate().unwrap_err();
        assert!(err.to_string().contains("unknown source 'nope'"));
    }

    #[test]
    fn bins_variants() {
        let u: BinsDef = serde_yaml_ng::from_str("{ n: 2, lo: 0, hi: 1 }").unwrap();
        assert_eq!(u.to_binning().unwrap().edges(), &[0.0, 0.5, 1.0]);
        let e: BinsDef = serde_yaml_ng::from_str("{ edges: [0, 1, 10] }").unwrap();
        assert_eq!(e.to_binning().unwrap().n_bins(), 2);
    }
}

//! Finalized, numbers-first artifacts handed to renderers.

use serde::Serialize;

use crate::binning::FlowPolicy;
use crate::category::CategoryMeta;
use crate::consumer::{FinalizeContext, StyleVariant};

/// Schema tag written into every artifact.
pub const ARTIFACT_SCHEMA_VERSION: &str = "plotmaker_artifact_v0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMeta {
    pub schema_version: String,
    pub tool: String,
    pub tool_version: String,
    pub name: String,
    pub cut: String,
    pub weight: String,
    pub scale: f64,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub style: serde_json::Value,
}

impl ArtifactMeta {
    pub fn new(ctx: &FinalizeContext) -> Self {
        Self {
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            tool: "plotmaker".to_string(),
            tool_version: pm_core::VERSION.to_string(),
            name: ctx.request.clone(),
            cut: ctx.cut.clone(),
            weight: ctx.weight.clone(),
            scale: ctx.scale,
            style: ctx.style.clone(),
        }
    }
}

/// A finalized aggregate plus its style.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Hist1d(Hist1dArtifact),
    Hist2d(Hist2dArtifact),
    Table(TableArtifact),
}

impl Artifact {
    pub fn meta(&self) -> &ArtifactMeta {
        match self {
            Artifact::Hist1d(a) => &a.meta,
            Artifact::Hist2d(a) => &a.meta,
            Artifact::Table(a) => &a.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Hist1d(_) => "hist1d",
            Artifact::Hist2d(_) => "hist2d",
            Artifact::Table(_) => "table",
        }
    }

    pub fn as_hist1d(&self) -> Option<&Hist1dArtifact> {
        match self {
            Artifact::Hist1d(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_hist2d(&self) -> Option<&Hist2dArtifact> {
        match self {
            Artifact::Hist2d(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableArtifact> {
        match self {
            Artifact::Table(a) => Some(a),
            _ => None,
        }
    }
}

// --- 1-D ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist1dArtifact {
    pub meta: ArtifactMeta,
    pub x_label: String,
    pub bin_edges: Vec<f64>,
    pub flow: FlowPolicy,
    pub variants: Vec<Hist1dVariant>,
}

impl Hist1dArtifact {
    pub fn variant(&self, variant: StyleVariant) -> Option<&Hist1dVariant> {
        self.variants.iter().find(|v| v.variant == variant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist1dVariant {
    pub variant: StyleVariant,
    pub series: Vec<Hist1dSeries>,
    /// Stacked total of background categories.
    pub background_total: Vec<f64>,
    pub background_total_err: Vec<f64>,
    /// Sum of data categories; absent without data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_total: Option<Vec<f64>>,
    /// Data over background per bin; `null` where the background is zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist1dSeries {
    pub category: CategoryMeta,
    pub normalization: f64,
    pub y: Vec<f64>,
    pub yerr: Vec<f64>,
    pub underflow: f64,
    pub overflow: f64,
    pub integral: f64,
    pub entries: u64,
}

impl Hist1dSeries {
    pub fn name(&self) -> &str {
        &self.category.name
    }
}

// --- 2-D ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist2dArtifact {
    pub meta: ArtifactMeta,
    pub x_label: String,
    pub y_label: String,
    pub x_edges: Vec<f64>,
    pub y_edges: Vec<f64>,
    pub flow: FlowPolicy,
    pub variants: Vec<Hist2dVariant>,
}

impl Hist2dArtifact {
    pub fn variant(&self, variant: StyleVariant) -> Option<&Hist2dVariant> {
        self.variants.iter().find(|v| v.variant == variant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist2dVariant {
    pub variant: StyleVariant,
    pub series: Vec<Hist2dSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist2dSeries {
    pub category: CategoryMeta,
    pub normalization: f64,
    /// `z[iy][ix]`.
    pub z: Vec<Vec<f64>>,
    pub zerr: Vec<Vec<f64>>,
    pub integral: f64,
    pub entries: u64,
}

// --- Table ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableArtifact {
    pub meta: ArtifactMeta,
    pub columns: Vec<CategoryMeta>,
    pub rows: Vec<TableRowArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<TableRatioSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRatioSpec {
    pub numerator: String,
    pub denominator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRowArtifact {
    pub label: String,
    pub cut: String,
    /// One cell per column.
    pub cells: Vec<TableCell>,
    pub background_total: TableCell,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableCell {
    pub value: f64,
    pub error: f64,
    pub entries: u64,
}

//! # pm-engine
//!
//! Categories, output consumers and the single-pass execution engine.
//!
//! A [`PlotRequest`] binds one [`OutputConsumer`] ([`Table`], [`Hist1d`],
//! [`Hist2d`]) to a baseline cut, a weight, value expressions and a list of
//! [`Category`]s. [`PlotMaker`] groups requests by data source and scans
//! each source exactly once, feeding every request bound to it.
//!
//! ```
//! use std::sync::Arc;
//! use pm_core::Value;
//! use pm_data::{MemoryLoader, Signature, SourceRegistry};
//! use pm_engine::{Binning, Category, EngineConfig, Hist1d, PlotMaker, PlotRequest, Role};
//! use pm_expr::Expression;
//!
//! let loader = Arc::new(MemoryLoader::new().with_table("t", [("x", vec![Value::Int(1), Value::Int(5), Value::Int(9)])]));
//! let registry = SourceRegistry::new();
//! let all = Category::builder("all", Role::Background)
//!     .source(Signature::new("memory", ["t"]).unwrap(), loader)
//!     .build(&registry)
//!     .unwrap();
//!
//! let mut pm = PlotMaker::new(EngineConfig::default());
//! pm.push(
//!     PlotRequest::builder(Hist1d::new(Binning::uniform(2, 0.0, 10.0).unwrap()))
//!         .value(Expression::formula("x").unwrap())
//!         .category(all)
//!         .build()
//!         .unwrap(),
//! );
//! let report = pm.run().unwrap();
//! let h = report.artifacts[0].as_hist1d().unwrap();
//! assert_eq!(h.variants[0].series[0].y, vec![1.0, 2.0]);
//! ```

#![warn(clippy::all)]

pub mod accumulator;
pub mod artifact;
pub mod binning;
pub mod category;
pub mod consumer;
pub mod engine;
pub mod hist1d;
pub mod hist2d;
pub mod render;
pub mod request;
pub mod style;
pub mod table;

pub use accumulator::{Accumulator, Cell};
pub use artifact::{
    ARTIFACT_SCHEMA_VERSION, Artifact, ArtifactMeta, Hist1dArtifact, Hist1dSeries, Hist1dVariant,
    Hist2dArtifact, Hist2dSeries, Hist2dVariant, TableArtifact, TableCell, TableRowArtifact,
};
pub use binning::{Binning, FlowPolicy};
pub use category::{Category, CategoryBuilder, CategoryMeta};
pub use consumer::{Entry, FinalizeContext, OutputConsumer, StyleVariant};
pub use engine::{
    EngineConfig, EvalErrorPolicy, EvalFailure, PlotMaker, RequestSummary, RunReport, ScanFailure,
    SourceSummary,
};
pub use hist1d::Hist1d;
pub use hist2d::Hist2d;
pub use render::Renderer;
pub use request::{BoundCategory, PlotRequest, PlotRequestBuilder};
pub use style::{CategoryStyle, Color, Role};
pub use table::{Table, TableRow};

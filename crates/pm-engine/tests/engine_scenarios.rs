//! End-to-end behaviour of the single-pass engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pm_core::{Error, EvalError, Record, Result, Value};
use pm_data::{MemoryDecoder, MemoryLoader, RecordDecoder, Signature, SourceLoader, SourceRegistry};
use pm_engine::{
    Artifact, Binning, Category, EngineConfig, EvalErrorPolicy, Hist1d, PlotMaker, PlotRequest, Role,
    StyleVariant, Table, TableRow,
};
use pm_expr::Expression;

fn xs() -> Vec<Value> {
    vec![Value::Int(1), Value::Int(5), Value::Int(9)]
}

fn memory(files: &[&str]) -> Signature {
    Signature::new("memory", files.iter().copied()).unwrap()
}

fn loader() -> Arc<dyn SourceLoader> {
    Arc::new(
        MemoryLoader::new()
            .with_table("t", [("x", xs()), ("w", vec![Value::Float(0.5), Value::Float(1.0), Value::Float(2.0)])])
            .with_table("u", [("x", xs()), ("w", vec![Value::Float(1.0); 3])]),
    )
}

fn category(registry: &SourceRegistry, name: &str, role: Role, cut: &str, file: &str) -> Arc<Category> {
    Category::builder(name, role)
        .selection(Expression::formula(cut).unwrap())
        .source(memory(&[file]), loader())
        .build(registry)
        .unwrap()
}

fn hist(cats: &[Arc<Category>]) -> PlotRequest {
    PlotRequest::builder(Hist1d::new(Binning::uniform(2, 0.0, 10.0).unwrap()))
        .value(Expression::formula("x").unwrap())
        .categories(cats.iter().cloned())
        .build()
        .unwrap()
}

fn ys(artifact: &Artifact, series: usize) -> Vec<f64> {
    artifact.as_hist1d().unwrap().variants[0].series[series].y.clone()
}

/// Memory decoder that counts decode calls.
struct Counting {
    inner: MemoryDecoder,
    calls: Arc<AtomicUsize>,
}

impl RecordDecoder for Counting {
    fn field_names(&self) -> Vec<String> {
        self.inner.field_names()
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()
    }

    fn next_record(&mut self) -> Result<bool> {
        let more = self.inner.next_record()?;
        if more {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(more)
    }

    fn field(&mut self, name: &str) -> std::result::Result<Value, EvalError> {
        self.inner.field(name)
    }
}

/// Fails on the second record.
struct Broken {
    inner: MemoryDecoder,
    seen: usize,
}

impl RecordDecoder for Broken {
    fn field_names(&self) -> Vec<String> {
        self.inner.field_names()
    }

    fn rewind(&mut self) -> Result<()> {
        self.seen = 0;
        self.inner.rewind()
    }

    fn next_record(&mut self) -> Result<bool> {
        self.seen += 1;
        if self.seen == 2 {
            return Err(Error::Scan("corrupt block".into()));
        }
        self.inner.next_record()
    }

    fn field(&mut self, name: &str) -> std::result::Result<Value, EvalError> {
        self.inner.field(name)
    }
}

#[test]
fn three_record_histogram() {
    let registry = SourceRegistry::new();
    let all = category(&registry, "all", Role::Background, "true", "t");
    let high = category(&registry, "high", Role::Background, "x > 4", "t");

    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(hist(&[all, high]));
    let report = pm.run().unwrap();

    assert!(report.is_complete());
    assert_eq!(ys(&report.artifacts[0], 0), vec![1.0, 2.0]);
    assert_eq!(ys(&report.artifacts[0], 1), vec![0.0, 2.0]);
}

#[test]
fn each_record_decoded_once_per_scan() {
    let registry = SourceRegistry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let source = registry
        .get_or_create_with(&memory(&["counted"]), move |_| {
            let inner = MemoryDecoder::new([("x", xs())])?;
            Ok(Box::new(Counting { inner, calls: counter }) as Box<dyn RecordDecoder>)
        })
        .unwrap();

    let low = Category::builder("low", Role::Background)
        .selection(Expression::formula("x < 6").unwrap())
        .data_source(Arc::clone(&source))
        .build(&registry)
        .unwrap();
    let high = Category::builder("high", Role::Signal)
        .selection(Expression::formula("x > 4").unwrap())
        .data_source(Arc::clone(&source))
        .build(&registry)
        .unwrap();

    let table = Table::new(
        "cutflow",
        vec![TableRow::new("all", Expression::always()), TableRow::new("x>2", Expression::formula("x > 2").unwrap())],
    );
    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(PlotRequest::builder(table).categories([low.clone(), high.clone()]).build().unwrap());
    pm.push(hist(&[low, high]));

    let report = pm.run().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(source.records_decoded(), 3);
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].records, 3);

    let table = report.artifact("cutflow").unwrap().as_table().unwrap();
    let counts: Vec<Vec<u64>> =
        table.rows.iter().map(|r| r.cells.iter().map(|c| c.entries).collect()).collect();
    assert_eq!(counts, vec![vec![2, 2], vec![1, 2]]);
}

#[test]
fn missing_field_in_selection_and_value() {
    let registry = SourceRegistry::new();
    let ghost = category(&registry, "ghost", Role::Background, "nope > 0", "t");
    let all = category(&registry, "all", Role::Background, "1", "t");

    let mut scan = ghost.source().scan().unwrap();
    let mut passed = Vec::new();
    while scan.advance().unwrap() {
        passed.push(ghost.passes(&scan.current()));
    }
    drop(scan);
    assert_eq!(passed, vec![false; 3]);

    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(hist(&[ghost]));
    pm.push(
        PlotRequest::builder(Hist1d::new(Binning::uniform(2, 0.0, 10.0).unwrap()))
            .name("broken_value")
            .value(Expression::formula("nope").unwrap())
            .category(all)
            .build()
            .unwrap(),
    );
    let report = pm.run().unwrap();

    assert_eq!(ys(&report.artifacts[0], 0), vec![0.0, 0.0]);
    assert_eq!(report.sources[0].cut_failures, 3);

    assert_eq!(report.eval_failures.len(), 3);
    for f in &report.eval_failures {
        assert_eq!(f.request, "broken_value");
        assert_eq!(f.category, "all");
        assert_eq!(f.error, EvalError::UnknownField("nope".into()));
    }
    let broken = report.artifact("broken_value").unwrap();
    assert_eq!(broken.as_hist1d().unwrap().variants[0].series[0].entries, 0);
    assert_eq!(report.requests[1].eval_failures, 3);
}

#[test]
fn repeated_runs_are_bit_identical() {
    let registry = SourceRegistry::new();
    let a = category(&registry, "a", Role::Background, "x != 5", "t");
    let b = category(&registry, "b", Role::Signal, "true", "u");

    let mut pm = PlotMaker::new(EngineConfig::default().with_threads(4));
    pm.push(
        PlotRequest::builder(Hist1d::new(Binning::uniform(3, 0.0, 9.0).unwrap()).with_variants([
            StyleVariant::Absolute,
            StyleVariant::Unit,
        ]))
        .value(Expression::formula("x * 0.7").unwrap())
        .weight(Expression::formula("w / 3").unwrap())
        .categories([a, b])
        .scale(1.3)
        .build()
        .unwrap(),
    );

    let first = pm.run().unwrap();
    let acc1 = pm.requests()[0].accumulator().clone();
    let second = pm.run().unwrap();
    let acc2 = pm.requests()[0].accumulator().clone();

    assert_eq!(first.artifacts, second.artifacts);
    for s in 0..acc1.n_slots() {
        for (c1, c2) in acc1.slot(s).iter().zip(acc2.slot(s)) {
            assert_eq!(c1.sumw.to_bits(), c2.sumw.to_bits());
            assert_eq!(c1.sumw2.to_bits(), c2.sumw2.to_bits());
            assert_eq!(c1.entries, c2.entries);
        }
    }
}

#[test]
fn weights_combine_and_data_is_not_scaled() {
    let registry = SourceRegistry::new();
    let data = category(&registry, "data", Role::Data, "true", "u");
    let mc = category(&registry, "mc", Role::Background, "true", "t");

    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(
        PlotRequest::builder(Hist1d::new(Binning::uniform(2, 0.0, 10.0).unwrap()))
            .value(Expression::formula("x").unwrap())
            .weight(Expression::formula("w").unwrap())
            .category(data)
            .weighted_category(mc, Expression::constant(2.0))
            .scale(10.0)
            .build()
            .unwrap(),
    );
    let report = pm.run().unwrap();
    let v = &report.artifacts[0].as_hist1d().unwrap().variants[0];
    assert_eq!(v.series[0].y, vec![1.0, 2.0]);
    // mc: w * 2 * 10 -> [0.5*20, (1+2)*20]
    assert_eq!(v.series[1].y, vec![10.0, 60.0]);
    assert_eq!(v.ratio.as_ref().unwrap()[0], Some(0.1));
}

#[test]
fn declarative_and_native_requests_agree() {
    let registry = SourceRegistry::new();
    let formula_cat = category(&registry, "f", Role::Background, "x > 2 && w < 1.5", "t");
    let native_cat = Category::builder("n", Role::Background)
        .selection(Expression::native("x>2&&w<1.5", |r: &dyn Record| {
            Ok(Value::Bool(r.field("x")?.as_f64()? > 2.0 && r.field("w")?.as_f64()? < 1.5))
        }))
        .source(memory(&["t"]), loader())
        .build(&registry)
        .unwrap();

    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(hist(&[formula_cat, native_cat]));
    let report = pm.run().unwrap();
    assert_eq!(ys(&report.artifacts[0], 0), ys(&report.artifacts[0], 1));
    assert_eq!(ys(&report.artifacts[0], 0), vec![0.0, 1.0]);
}

#[test]
fn scan_failure_is_confined_to_its_source() {
    let registry = SourceRegistry::new();
    let bad = registry
        .get_or_create_with(&memory(&["bad"]), |_| {
            Ok(Box::new(Broken { inner: MemoryDecoder::new([("x", xs())])?, seen: 0 }) as Box<dyn RecordDecoder>)
        })
        .unwrap();
    let bad = Category::builder("bad", Role::Background).data_source(bad).build(&registry).unwrap();
    let good = category(&registry, "good", Role::Background, "true", "t");

    let mut pm = PlotMaker::new(EngineConfig::default().with_threads(2));
    pm.push(hist(&[good.clone(), bad]));
    pm.push(PlotRequest::builder(Hist1d::new(Binning::uniform(2, 0.0, 10.0).unwrap()))
        .name("good_only")
        .value(Expression::formula("x").unwrap())
        .category(good)
        .build()
        .unwrap());
    let report = pm.run().unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.scan_failures.len(), 1);
    assert!(report.scan_failures[0].error.contains("corrupt block"));
    assert!(!report.requests[0].complete);
    assert!(report.requests[1].complete);
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].name(), "good_only");
}

#[test]
fn abort_policy_fails_the_source() {
    let registry = SourceRegistry::new();
    let all = category(&registry, "all", Role::Background, "true", "t");
    let mut pm = PlotMaker::new(EngineConfig::default().with_eval_error_policy(EvalErrorPolicy::Abort));
    pm.push(
        PlotRequest::builder(Hist1d::new(Binning::uniform(2, 0.0, 10.0).unwrap()))
            .value(Expression::formula("1 / (x - 5)").unwrap())
            .category(all)
            .build()
            .unwrap(),
    );
    let report = pm.run().unwrap();
    assert_eq!(report.scan_failures.len(), 1);
    assert!(report.scan_failures[0].error.contains("division by zero"));
    assert!(report.artifacts.is_empty());
}

#[test]
fn max_events_limits_each_source() {
    let registry = SourceRegistry::new();
    let all = category(&registry, "all", Role::Background, "true", "t");
    let mut pm = PlotMaker::new(EngineConfig::default().with_max_events(2));
    pm.push(hist(&[all]));
    let report = pm.run().unwrap();
    assert_eq!(report.sources[0].records, 2);
    assert_eq!(ys(&report.artifacts[0], 0), vec![1.0, 1.0]);
}

#[test]
fn zero_category_request_is_zero_filled() {
    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(hist(&[]));
    let report = pm.run().unwrap();
    assert!(report.sources.is_empty());
    let v = &report.artifacts[0].as_hist1d().unwrap().variants[0];
    assert!(v.series.is_empty());
    assert_eq!(v.background_total, vec![0.0, 0.0]);
}

#[test]
fn artifacts_reach_the_renderer_in_request_order() {
    let registry = SourceRegistry::new();
    let all = category(&registry, "all", Role::Background, "true", "t");
    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(PlotRequest::builder(Table::new("first", vec![TableRow::new("all", Expression::always())]))
        .category(all.clone())
        .build()
        .unwrap());
    pm.push(hist(&[all]));
    let mut rendered: Vec<Artifact> = Vec::new();
    pm.run_and_render(&mut rendered).unwrap();
    let names: Vec<&str> = rendered.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["first", "x"]);

    let json = serde_json::to_value(&rendered[1]).unwrap();
    assert_eq!(json["kind"], "hist1d");
    assert_eq!(json["meta"]["schema_version"], pm_engine::ARTIFACT_SCHEMA_VERSION);
}

#[test]
fn unknown_file_is_a_setup_error() {
    let err = Category::builder("x", Role::Data)
        .source(memory(&["nowhere"]), loader())
        .build(&SourceRegistry::new())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn sources_from_separate_registries_are_scanned_separately() {
    let single = |file: &str, x: Vec<Value>| -> Arc<dyn SourceLoader> {
        Arc::new(MemoryLoader::new().with_table(file, [("x", x)]))
    };
    let (r1, r2) = (SourceRegistry::new(), SourceRegistry::new());
    let a = Category::builder("a", Role::Background)
        .source(memory(&["a"]), single("a", vec![Value::Int(1); 2]))
        .build(&r1)
        .unwrap();
    let b = Category::builder("b", Role::Background)
        .source(memory(&["b"]), single("b", vec![Value::Int(9); 3]))
        .build(&r2)
        .unwrap();
    assert_ne!(a.source().id(), b.source().id());

    let mut pm = PlotMaker::new(EngineConfig::default());
    pm.push(hist(&[a, b]));
    let report = pm.run().unwrap();

    assert_eq!(report.sources.len(), 2);
    assert_eq!(ys(&report.artifacts[0], 0), vec![2.0, 0.0]);
    assert_eq!(ys(&report.artifacts[0], 1), vec![0.0, 3.0]);
}

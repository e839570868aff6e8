//! Single-pass execution over every data source.
//!
//! Requests are grouped by the data source of their categories. Each source
//! is scanned once, by one task, and every record feeds every request bound
//! to it. Tasks fill private accumulator shards that are merged into the
//! requests afterwards, in the order the requests first reference each
//! source, so results do not depend on thread scheduling.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use pm_core::{Error, EvalError, Record, Result, Value};
use pm_data::DataSource;
use pm_expr::Expression;
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};

use crate::accumulator::{Accumulator, Cell};
use crate::artifact::Artifact;
use crate::category::Category;
use crate::consumer::Entry;
use crate::render::Renderer;
use crate::request::PlotRequest;

/// Eval failures logged at `warn` per request and source before going quiet.
const WARN_LIMIT: u64 = 5;

/// What to do when a weight, value or table-row expression fails on an
/// event that passed its cuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalErrorPolicy {
    /// Skip the entry and report it in the [`RunReport`].
    #[default]
    Record,
    /// Fail the scan of the source.
    Abort,
}

/// Engine knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker threads for source scans (0 = one per core).
    pub threads: usize,
    /// Stop each source after this many records.
    pub max_events: Option<u64>,
    pub on_eval_error: EvalErrorPolicy,
    /// Eval failures kept per request in the report (all are counted).
    pub max_recorded_failures: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { threads: 0, max_events: None, on_eval_error: EvalErrorPolicy::Record, max_recorded_failures: 100 }
    }
}

impl EngineConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }

    pub fn with_eval_error_policy(mut self, policy: EvalErrorPolicy) -> Self {
        self.on_eval_error = policy;
        self
    }
}

fn display<T: fmt::Display, S: Serializer>(v: &T, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(v)
}

/// An entry that passed its cuts but could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalFailure {
    pub request: String,
    pub category: String,
    pub source: String,
    pub event: u64,
    #[serde(serialize_with = "display")]
    pub error: EvalError,
}

/// A source whose scan failed; its partial sums were discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub id: usize,
    pub source: String,
    pub records: u64,
    pub categories: usize,
    pub requests: usize,
    /// Selection or baseline-cut evaluations that failed (event not passed).
    pub cut_failures: u64,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub name: String,
    pub kind: String,
    /// False when a source it reads failed; no artifact is produced then.
    pub complete: bool,
    pub entries: u64,
    pub eval_failures: u64,
}

/// Outcome of one [`PlotMaker::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(skip)]
    pub artifacts: Vec<Artifact>,
    pub sources: Vec<SourceSummary>,
    pub requests: Vec<RequestSummary>,
    pub eval_failures: Vec<EvalFailure>,
    pub scan_failures: Vec<ScanFailure>,
    pub wall_time_s: f64,
}

impl RunReport {
    /// Every request produced an artifact.
    pub fn is_complete(&self) -> bool {
        self.scan_failures.is_empty()
    }

    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name() == name)
    }

    /// Total eval failures, including those not kept in `eval_failures`.
    pub fn n_eval_failures(&self) -> u64 {
        self.requests.iter().map(|r| r.eval_failures).sum()
    }
}

struct Binding {
    request: usize,
    slot: usize,
    category: usize,
    shard: usize,
    extra: Option<Expression>,
}

/// Everything one scan task needs for one source.
struct SourcePlan {
    source: Arc<DataSource>,
    categories: Vec<Arc<Category>>,
    requests: Vec<usize>,
    bindings: Vec<Binding>,
}

struct TaskOutput {
    shards: Vec<Accumulator>,
    summary: SourceSummary,
    failures: Vec<(usize, EvalFailure)>,
    failure_counts: Vec<u64>,
}

/// Per request values of the current event, evaluated at most once.
#[derive(Default)]
struct EventCache {
    baseline: Option<bool>,
    weight: Option<std::result::Result<f64, EvalError>>,
    values: Option<std::result::Result<Vec<Value>, EvalError>>,
}

/// Owns the plot requests and drives the scans.
pub struct PlotMaker {
    config: EngineConfig,
    requests: Vec<PlotRequest>,
}

impl PlotMaker {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, requests: Vec::new() }
    }

    /// Register a request; returns its index.
    pub fn push(&mut self, request: PlotRequest) -> usize {
        self.requests.push(request);
        self.requests.len() - 1
    }

    pub fn requests(&self) -> &[PlotRequest] {
        &self.requests
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn plan(&self) -> Vec<SourcePlan> {
        // Keyed by instance, in order of first use: sources from different
        // registries never share a plan.
        let mut plans: Vec<SourcePlan> = Vec::new();
        for (r, req) in self.requests.iter().enumerate() {
            for (slot, bound) in req.categories().iter().enumerate() {
                let source = bound.category.source();
                let p = match plans.iter().position(|p| Arc::ptr_eq(&p.source, source)) {
                    Some(p) => p,
                    None => {
                        plans.push(SourcePlan {
                            source: Arc::clone(source),
                            categories: Vec::new(),
                            requests: Vec::new(),
                            bindings: Vec::new(),
                        });
                        plans.len() - 1
                    }
                };
                let plan = &mut plans[p];
                let category = match plan.categories.iter().position(|c| Arc::ptr_eq(c, &bound.category)) {
                    Some(i) => i,
                    None => {
                        plan.categories.push(Arc::clone(&bound.category));
                        plan.categories.len() - 1
                    }
                };
                let shard = match plan.requests.iter().position(|&x| x == r) {
                    Some(i) => i,
                    None => {
                        plan.requests.push(r);
                        plan.requests.len() - 1
                    }
                };
                plan.bindings.push(Binding { request: r, slot, category, shard, extra: bound.weight.clone() });
            }
        }
        plans
    }

    /// Scan every source once and finalize every request.
    ///
    /// Accumulators are zeroed first, so repeated runs over unchanged
    /// sources give identical results.
    pub fn run(&mut self) -> Result<RunReport> {
        let start = Instant::now();
        for req in &mut self.requests {
            req.reset();
        }
        let plans = self.plan();
        for plan in &plans {
            tracing::debug!(
                source = %plan.source.signature(),
                n_categories = plan.categories.len(),
                n_requests = plan.requests.len(),
                n_bindings = plan.bindings.len(),
                "scan planned"
            );
        }
        tracing::info!(n_requests = self.requests.len(), n_sources = plans.len(), threads = self.config.threads, "run started");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| Error::Computation(format!("failed to build thread pool: {e}")))?;
        let requests = &self.requests;
        let config = &self.config;
        let outputs: Vec<Result<TaskOutput>> =
            pool.install(|| plans.par_iter().map(|plan| scan_source(plan, requests, config)).collect());

        let n = self.requests.len();
        let mut incomplete = vec![false; n];
        let mut failure_counts = vec![0u64; n];
        let mut kept = vec![0usize; n];
        let mut eval_failures = Vec::new();
        let mut scan_failures = Vec::new();
        let mut sources = Vec::with_capacity(plans.len());

        for (plan, output) in plans.iter().zip(outputs) {
            match output {
                Ok(out) => {
                    for (shard, acc) in out.shards.iter().enumerate() {
                        self.requests[plan.requests[shard]].accumulator_mut().merge(acc);
                    }
                    for (shard, count) in out.failure_counts.iter().enumerate() {
                        failure_counts[plan.requests[shard]] += count;
                    }
                    for (r, failure) in out.failures {
                        if kept[r] < self.config.max_recorded_failures {
                            kept[r] += 1;
                            eval_failures.push(failure);
                        }
                    }
                    sources.push(out.summary);
                }
                Err(e) => {
                    tracing::error!(source = %plan.source.signature(), error = %e, "scan failed, results discarded");
                    for &r in &plan.requests {
                        incomplete[r] = true;
                    }
                    scan_failures.push(ScanFailure { source: plan.source.signature().to_string(), error: e.to_string() });
                    sources.push(SourceSummary {
                        id: plan.source.id().0,
                        source: plan.source.signature().to_string(),
                        records: 0,
                        categories: plan.categories.len(),
                        requests: plan.requests.len(),
                        cut_failures: 0,
                        complete: false,
                    });
                }
            }
        }

        let mut artifacts = Vec::with_capacity(n);
        let mut summaries = Vec::with_capacity(n);
        for (r, req) in self.requests.iter().enumerate() {
            let complete = !incomplete[r];
            if complete {
                artifacts.push(req.finalize()?);
            }
            if failure_counts[r] > WARN_LIMIT {
                tracing::warn!(request = %req.name(), n_failures = failure_counts[r], "evaluation failures (only the first few were logged)");
            }
            summaries.push(RequestSummary {
                name: req.name().to_string(),
                kind: req.consumer().kind().to_string(),
                complete,
                entries: req.accumulator().total_entries(),
                eval_failures: failure_counts[r],
            });
        }

        let report = RunReport {
            artifacts,
            sources,
            requests: summaries,
            eval_failures,
            scan_failures,
            wall_time_s: start.elapsed().as_secs_f64(),
        };
        tracing::info!(
            n_artifacts = report.artifacts.len(),
            n_eval_failures = report.n_eval_failures(),
            n_scan_failures = report.scan_failures.len(),
            wall_s = report.wall_time_s,
            "run finished"
        );
        Ok(report)
    }

    /// [`run`](Self::run), then hand every artifact to `renderer`.
    pub fn run_and_render(&mut self, renderer: &mut dyn Renderer) -> Result<RunReport> {
        let report = self.run()?;
        for artifact in &report.artifacts {
            renderer.render(artifact)?;
        }
        renderer.finish()?;
        Ok(report)
    }
}

fn scan_source(plan: &SourcePlan, requests: &[PlotRequest], config: &EngineConfig) -> Result<TaskOutput> {
    let source = &plan.source;
    let label = source.signature().to_string();
    let mut shards: Vec<Accumulator> = plan.requests.iter().map(|&r| requests[r].new_shard()).collect();
    let mut caches: Vec<EventCache> = plan.requests.iter().map(|_| EventCache::default()).collect();
    let mut passes = vec![false; plan.categories.len()];
    let mut failures = Vec::new();
    let mut failure_counts = vec![0u64; plan.requests.len()];
    let mut cut_failures = 0u64;
    let mut records = 0u64;

    let mut scan = source.scan()?;
    loop {
        if config.max_events.is_some_and(|max| records >= max) {
            break;
        }
        if !scan.advance()? {
            break;
        }
        records += 1;
        let record = scan.current();
        let event = record.index();

        for (pass, category) in passes.iter_mut().zip(&plan.categories) {
            *pass = match category.try_passes(&record) {
                Ok(p) => p,
                Err(e) => {
                    cut_failures += 1;
                    tracing::trace!(category = %category.name(), event, error = %e, "selection failed");
                    false
                }
            };
        }
        for cache in &mut caches {
            *cache = EventCache::default();
        }

        for b in &plan.bindings {
            if !passes[b.category] {
                continue;
            }
            let req = &requests[b.request];
            let cache = &mut caches[b.shard];
            let baseline = match cache.baseline {
                Some(p) => p,
                None => {
                    let p = req.cut().passes(&record).unwrap_or_else(|e| {
                        cut_failures += 1;
                        tracing::trace!(request = %req.name(), event, error = %e, "baseline cut failed");
                        false
                    });
                    cache.baseline = Some(p);
                    p
                }
            };
            if !baseline {
                continue;
            }

            let cells = shards[b.shard].slot_mut(b.slot);
            if let Err(error) = fill_entry(req, b.extra.as_ref(), &record, cache, cells) {
                let category = plan.categories[b.category].name();
                if config.on_eval_error == EvalErrorPolicy::Abort {
                    return Err(Error::Scan(format!(
                        "request '{}', category '{category}', event {event}: {error}",
                        req.name()
                    )));
                }
                failure_counts[b.shard] += 1;
                if failure_counts[b.shard] <= WARN_LIMIT {
                    tracing::warn!(request = %req.name(), category, event, error = %error, "entry skipped");
                } else {
                    tracing::debug!(request = %req.name(), category, event, error = %error, "entry skipped");
                }
                if failures.len() < config.max_recorded_failures.saturating_mul(plan.requests.len()) {
                    failures.push((
                        b.request,
                        EvalFailure {
                            request: req.name().to_string(),
                            category: category.to_string(),
                            source: label.clone(),
                            event,
                            error,
                        },
                    ));
                }
            }
        }
    }
    drop(scan);

    tracing::info!(source = %label, records, cut_failures, "scan finished");
    Ok(TaskOutput {
        shards,
        summary: SourceSummary {
            id: source.id().0,
            source: label,
            records,
            categories: plan.categories.len(),
            requests: plan.requests.len(),
            cut_failures,
            complete: true,
        },
        failures,
        failure_counts,
    })
}

fn fill_entry(
    req: &PlotRequest,
    extra: Option<&Expression>,
    record: &dyn Record,
    cache: &mut EventCache,
    cells: &mut [Cell],
) -> std::result::Result<(), EvalError> {
    let weight = cache.weight.get_or_insert_with(|| req.weight().evaluate_f64(record)).clone()?;
    let weight = match extra {
        Some(e) => weight * e.evaluate_f64(record)?,
        None => weight,
    };
    let values = cache
        .values
        .get_or_insert_with(|| req.values().iter().map(|v| v.evaluate(record)).collect())
        .as_ref()
        .map_err(Clone::clone)?;
    req.consumer().fill(cells, &Entry { weight, values, record })
}

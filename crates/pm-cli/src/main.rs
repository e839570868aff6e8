//! PlotMaker CLI

mod book;
mod render;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pm_data::SourceRegistry;
use pm_engine::PlotMaker;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::book::{Book, BuiltBook};
use crate::render::FileRenderer;

#[derive(Parser)]
#[command(name = "plotmaker")]
#[command(about = "PlotMaker - single-pass histograms and cut-flow tables")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Only report per-event evaluation failures in the run summary.
    #[arg(long, global = true)]
    quiet_eval: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every source once and write all plots and tables
    Run {
        /// Plot book (YAML or JSON)
        #[arg(short, long)]
        book: PathBuf,

        /// Output directory. Defaults to the book's `output_dir`, then `plots`.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Scan threads (0 = auto). Overrides the book.
        #[arg(long)]
        threads: Option<usize>,

        /// Directory file patterns are relative to. Defaults to the book's directory.
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Stop each source after this many records.
        #[arg(long)]
        max_events: Option<u64>,
    },

    /// Parse the book, resolve sources and compile expressions without scanning
    Check {
        /// Plot book (YAML or JSON)
        #[arg(short, long)]
        book: PathBuf,

        /// Directory file patterns are relative to. Defaults to the book's directory.
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(cli.log_level).into())
        .parse_lossy("");
    if cli.quiet_eval {
        filter = filter.add_directive("pm_engine::engine=error".parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    match cli.command {
        Commands::Run { book, out_dir, threads, base_dir, max_events } => {
            cmd_run(&book, out_dir, threads, base_dir, max_events)
        }
        Commands::Check { book, base_dir } => cmd_check(&book, base_dir),
        Commands::Version => {
            println!("plotmaker {}", pm_core::VERSION);
            Ok(())
        }
    }
}

fn base_dir_for(book_path: &Path, base_dir: Option<PathBuf>) -> PathBuf {
    base_dir.unwrap_or_else(|| match book_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    })
}

fn load(book_path: &Path, base_dir: &Path, registry: &SourceRegistry) -> Result<(Book, BuiltBook)> {
    let book = book::read_book(book_path)?;
    let built = book::build(&book, base_dir, registry)?;
    Ok((book, built))
}

fn cmd_run(
    book_path: &Path,
    out_dir: Option<PathBuf>,
    threads: Option<usize>,
    base_dir: Option<PathBuf>,
    max_events: Option<u64>,
) -> Result<()> {
    let base_dir = base_dir_for(book_path, base_dir);
    let registry = SourceRegistry::new();
    let (book, built) = load(book_path, &base_dir, &registry)?;

    let mut config = book.engine_config();
    if let Some(t) = threads {
        config = config.with_threads(t);
    }
    if let Some(n) = max_events {
        config = config.with_max_events(n);
    }
    let out_dir = out_dir
        .or_else(|| book.output_dir.as_ref().map(|d| base_dir.join(d)))
        .unwrap_or_else(|| PathBuf::from("plots"));

    let mut maker = PlotMaker::new(config);
    for request in built.requests {
        maker.push(request);
    }
    let mut renderer = FileRenderer::new(&out_dir);
    let report = maker.run_and_render(&mut renderer).context("plot run failed")?;
    let report_path = render::write_report(&out_dir, &report)?;

    write_json(
        None,
        serde_json::json!({
            "out_dir": out_dir,
            "files": renderer.written(),
            "report": report_path,
            "sources": report.sources.len(),
            "requests": report.requests.len(),
            "eval_failures": report.n_eval_failures(),
            "scan_failures": report.scan_failures,
            "wall_time_s": report.wall_time_s,
        }),
    )?;

    if !report.is_complete() {
        bail!("{} source scan(s) failed; see {}", report.scan_failures.len(), report_path.display());
    }
    Ok(())
}

fn cmd_check(book_path: &Path, base_dir: Option<PathBuf>) -> Result<()> {
    let base_dir = base_dir_for(book_path, base_dir);
    let registry = SourceRegistry::new();
    let (_, built) = load(book_path, &base_dir, &registry)?;

    let sources: Vec<serde_json::Value> = built
        .sources
        .iter()
        .map(|s| {
            let fields = registry.get(&s.signature).map(|d| d.fields().to_vec()).unwrap_or_default();
            serde_json::json!({
                "name": s.name,
                "schema": s.signature.schema(),
                "files": s.signature.files(),
                "fields": fields,
            })
        })
        .collect();

    // (request, category, field); an empty request marks a category selection.
    let mut unknown: BTreeSet<(String, String, String)> = BTreeSet::new();
    for cat in &built.categories {
        let known = cat.source().fields();
        for field in cat.selection().fields() {
            if !known.contains(&field) {
                unknown.insert((String::new(), cat.name().to_string(), field));
            }
        }
    }
    for request in &built.requests {
        let exprs = std::iter::once(request.cut())
            .chain(std::iter::once(request.weight()))
            .chain(request.values())
            .chain(request.categories().iter().filter_map(|b| b.weight.as_ref()));
        for expr in exprs {
            for field in expr.fields() {
                for bound in request.categories() {
                    if !bound.category.source().fields().contains(&field) {
                        unknown.insert((
                            request.name().to_string(),
                            bound.category.name().to_string(),
                            field.clone(),
                        ));
                    }
                }
            }
        }
    }

    for (request, category, field) in &unknown {
        tracing::warn!(request = %request, category = %category, field = %field, "expression references a field the source does not provide");
    }
    let unknown: Vec<serde_json::Value> = unknown
        .into_iter()
        .map(|(request, category, field)| {
            serde_json::json!({ "request": request, "category": category, "field": field })
        })
        .collect();

    let plots: Vec<serde_json::Value> = built
        .requests
        .iter()
        .map(|r| serde_json::json!({ "name": r.name(), "kind": r.consumer().kind() }))
        .collect();

    write_json(
        None,
        serde_json::json!({
            "sources": sources,
            "categories": built.categories.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "plots": plots,
            "unknown_fields": unknown,
        }),
    )
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

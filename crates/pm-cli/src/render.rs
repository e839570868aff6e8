//! Renderer writing artifacts to an output directory.
//!
//! Every artifact becomes `<name>.json`. Tables additionally get a plain-text
//! layout (`.txt`) and a LaTeX tabular (`.tex`).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use pm_core::{Error, Result};
use pm_engine::{Artifact, Renderer, TableArtifact, TableCell};
use pm_expr::expression::file_stem;

pub struct FileRenderer {
    out_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl FileRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into(), written: Vec::new() }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&mut self, stem: &str, ext: &str, contents: &str) -> Result<()> {
        let path = self.out_dir.join(format!("{stem}.{ext}"));
        std::fs::write(&path, contents)?;
        tracing::debug!(path = %path.display(), "wrote output");
        self.written.push(path);
        Ok(())
    }
}

impl Renderer for FileRenderer {
    fn render(&mut self, artifact: &Artifact) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)?;
        let stem = file_stem(artifact.name());
        if stem.is_empty() {
            return Err(Error::Configuration(format!("artifact name '{}' yields an empty file name", artifact.name())));
        }
        let json = serde_json::to_string_pretty(artifact)?;
        self.write(&stem, "json", &json)?;
        if let Some(table) = artifact.as_table() {
            self.write(&stem, "txt", &table_text(table))?;
            self.write(&stem, "tex", &table_latex(table))?;
        }
        Ok(())
    }
}

fn cell_text(c: &TableCell) -> String {
    format!("{:.2} ± {:.2}", c.value, c.error)
}

fn ratio_text(r: Option<f64>) -> String {
    r.map_or_else(|| "-".to_string(), |r| format!("{r:.3}"))
}

/// Aligned plain-text layout of a cut-flow table.
pub fn table_text(table: &TableArtifact) -> String {
    let mut header = vec!["cut".to_string()];
    header.extend(table.columns.iter().map(|c| c.name.clone()));
    header.push("bkg total".to_string());
    if let Some(r) = &table.ratio {
        header.push(format!("{}/{}", r.numerator, r.denominator));
    }

    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            let mut line = vec![row.label.clone()];
            line.extend(row.cells.iter().map(cell_text));
            line.push(cell_text(&row.background_total));
            if table.ratio.is_some() {
                line.push(ratio_text(row.ratio));
            }
            line
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for line in &rows {
        for (w, cell) in widths.iter_mut().zip(line) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let fmt_line = |line: &[String]| -> String {
        let cells: Vec<String> = line
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, &w))| {
                let pad = w.saturating_sub(cell.chars().count());
                if i == 0 { format!("{cell}{}", " ".repeat(pad)) } else { format!("{}{cell}", " ".repeat(pad)) }
            })
            .collect();
        cells.join(" | ").trim_end().to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}  (scale {})", table.meta.name, table.meta.scale);
    let head = fmt_line(&header);
    let _ = writeln!(out, "{head}");
    let _ = writeln!(out, "{}", "-".repeat(head.chars().count()));
    for line in &rows {
        let _ = writeln!(out, "{}", fmt_line(line));
    }
    out
}

fn latex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '_' | '&' | '%' | '#' | '$' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            '<' | '>' => {
                out.push('$');
                out.push(ch);
                out.push('$');
            }
            '\\' => out.push_str("\\textbackslash{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(ch),
        }
    }
    out
}

/// LaTeX `tabular` rendering of a cut-flow table.
pub fn table_latex(table: &TableArtifact) -> String {
    let ratio_col = if table.ratio.is_some() { "|r" } else { "" };
    let mut out = String::new();
    let _ = writeln!(out, "\\begin{{tabular}}{{l|{}|r{ratio_col}}}", "r".repeat(table.columns.len()));
    out.push_str("\\hline\n");

    let mut head = vec![String::new()];
    head.extend(table.columns.iter().map(|c| latex_escape(&c.name)));
    head.push("Bkg. total".to_string());
    if let Some(r) = &table.ratio {
        head.push(format!("{} / {}", latex_escape(&r.numerator), latex_escape(&r.denominator)));
    }
    let _ = writeln!(out, "{} \\\\", head.join(" & "));
    out.push_str("\\hline\n");

    let cell = |c: &TableCell| format!("${:.2} \\pm {:.2}$", c.value, c.error);
    for row in &table.rows {
        let mut line = vec![latex_escape(&row.label)];
        line.extend(row.cells.iter().map(cell));
        line.push(cell(&row.background_total));
        if table.ratio.is_some() {
            line.push(ratio_text(row.ratio));
        }
        let _ = writeln!(out, "{} \\\\", line.join(" & "));
    }
    out.push_str("\\hline\n\\end{tabular}\n");
    out
}

/// Write the run report next to the artifacts.
pub fn write_report(out_dir: &Path, report: &pm_engine::RunReport) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join("run_report.json");
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    Ok(path)
}

//! File-pattern expansion.
//!
//! Wildcards (`*`, `?`) may appear in any path component, including
//! directories (`runs/2024_*/mc_?.csv`). They never match across a `/`;
//! there is no recursive `**`.

use std::path::{Path, PathBuf};

use pm_core::{Error, Result};

/// Expand `patterns` into a sorted, de-duplicated list of canonical paths.
///
/// Relative patterns are taken against `base_dir` when given. A pattern
/// that matches nothing is an error naming the pattern.
pub fn resolve_patterns<S: AsRef<str>>(patterns: &[S], base_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let path = match base_dir {
            Some(base) if Path::new(pattern).is_relative() => base.join(pattern),
            _ => PathBuf::from(pattern),
        };
        let matched = expand(&path)?;
        if matched.is_empty() {
            return Err(Error::Configuration(format!("pattern '{pattern}' matched no files")));
        }
        tracing::debug!(pattern, n_files = matched.len(), "pattern resolved");
        out.extend(matched);
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

fn expand(path: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = vec![PathBuf::new()];
    let mut components = path.components().peekable();
    while let Some(component) = components.next() {
        let last = components.peek().is_none();
        let name = component.as_os_str().to_string_lossy();
        if !has_wildcard(&name) {
            for c in &mut candidates {
                c.push(component);
            }
            continue;
        }
        let mut next = Vec::new();
        for dir in &candidates {
            let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir.as_path() };
            if !dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let entry_name = entry.file_name();
                let entry_path = entry.path();
                let kind_ok = if last { entry_path.is_file() } else { entry_path.is_dir() };
                if kind_ok && wildcard_match(&name, &entry_name.to_string_lossy()) {
                    next.push(entry_path);
                }
            }
        }
        candidates = next;
    }

    candidates.into_iter().filter(|p| p.is_file()).map(|p| Ok(p.canonicalize()?)).collect()
}

/// Shell-style match of `*` (any run) and `?` (any one char).
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(wildcard_match("*.csv", "a.csv"));
        assert!(wildcard_match("run_?.csv", "run_1.csv"));
        assert!(!wildcard_match("run_?.csv", "run_10.csv"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXbYY"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn resolves_sorted_and_deduplicated() {
        let dir = std::env::temp_dir().join(format!("pm_data_resolve_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for f in ["b.csv", "a.csv", "c.txt"] {
            std::fs::write(dir.join(f), "x\n1\n").unwrap();
        }
        let files = resolve_patterns(&["*.csv", "a.csv"], Some(&dir)).unwrap();
        let names: Vec<_> =
            files.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);

        let err = resolve_patterns(&["*.parquet"], Some(&dir)).unwrap_err();
        assert!(err.to_string().contains("matched no files"));
    }

    #[test]
    fn wildcards_in_directories() {
        let dir = std::env::temp_dir().join(format!("pm_data_resolve_dirs_{}", std::process::id()));
        for sub in ["run_1", "run_2", "other"] {
            std::fs::create_dir_all(dir.join(sub)).unwrap();
            std::fs::write(dir.join(sub).join("mc.csv"), "x\n1\n").unwrap();
        }
        std::fs::write(dir.join("run_3"), "not a directory").unwrap();

        let files = resolve_patterns(&["run_*/mc.csv"], Some(&dir)).unwrap();
        let parents: Vec<_> = files
            .iter()
            .map(|p| p.parent().unwrap().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(parents, vec!["run_1", "run_2"]);

        let err = resolve_patterns(&["run_*/*.parquet"], Some(&dir)).unwrap_err();
        assert!(err.to_string().contains("matched no files"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}

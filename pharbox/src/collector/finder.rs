use std::path::{Path, PathBuf};

use glob::Pattern;
use regex::Regex;

use crate::config::{normalize, FinderRule};
use crate::error::CollectError;

/// Directory names holding version control metadata.
pub const VCS_DIRS: &[&str] = &[
    ".git",
    ".svn",
    "_svn",
    ".hg",
    "CVS",
    ".bzr",
    "_darcs",
    ".arch-params",
    ".monotone",
];

pub fn is_vcs_dir(name: &str) -> bool {
    VCS_DIRS.contains(&name)
}

/// A name or path filter: `/regex/`, a glob, or (for paths) a plain
/// substring.
#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Glob(Pattern),
    Contains(String),
}

impl Matcher {
    fn parse(pattern: &str, substring: bool) -> Result<Matcher, CollectError> {
        if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
            let inner = &pattern[1..pattern.len() - 1];
            return Regex::new(inner)
                .map(Matcher::Regex)
                .map_err(|source| CollectError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                });
        }

        if substring && !pattern.contains(['*', '?', '[']) {
            return Ok(Matcher::Contains(pattern.to_string()));
        }

        Pattern::new(pattern)
            .map(Matcher::Glob)
            .map_err(|source| CollectError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Regex(regex) => regex.is_match(text),
            Matcher::Glob(glob) => glob.matches(text),
            Matcher::Contains(needle) => text.contains(needle.as_str()),
        }
    }
}

fn parse_all(patterns: &[String], substring: bool) -> Result<Vec<Matcher>, CollectError> {
    patterns.iter().map(|p| Matcher::parse(p, substring)).collect()
}

/// A compiled finder rule.
#[derive(Debug, Clone)]
pub struct Finder {
    roots: Vec<PathBuf>,
    names: Vec<Matcher>,
    not_names: Vec<Matcher>,
    paths: Vec<Matcher>,
    not_paths: Vec<Matcher>,
    exclude: Vec<String>,
    append: Vec<PathBuf>,
    ignore_dot_files: bool,
    ignore_vcs: bool,
}

impl Finder {
    pub fn new(rule: &FinderRule, base: &Path) -> Result<Finder, CollectError> {
        let absolute = |list: &crate::config::OneOrMany| {
            list.clone()
                .into_vec()
                .iter()
                .map(|p| normalize(&base.join(p)))
                .collect::<Vec<_>>()
        };

        Ok(Finder {
            roots: absolute(&rule.in_dirs),
            names: parse_all(&rule.name.clone().into_vec(), false)?,
            not_names: parse_all(&rule.not_name.clone().into_vec(), false)?,
            paths: parse_all(&rule.path.clone().into_vec(), true)?,
            not_paths: parse_all(&rule.not_path.clone().into_vec(), true)?,
            exclude: rule
                .exclude
                .clone()
                .into_vec()
                .into_iter()
                .map(|e| e.replace('\\', "/").trim_matches('/').to_string())
                .collect(),
            append: absolute(&rule.append),
            ignore_dot_files: rule.ignore_dot_files,
            ignore_vcs: rule.ignore_vcs,
        })
    }

    /// Directories to walk.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Files added as they are, regardless of the filters.
    pub fn append(&self) -> &[PathBuf] {
        &self.append
    }

    /// Whether to descend into the directory at `rel` (relative to the root
    /// being walked, `/`-separated).
    pub fn accepts_dir(&self, rel: &str, name: &str) -> bool {
        if self.ignore_vcs && is_vcs_dir(name) {
            return false;
        }
        if self.ignore_dot_files && name.starts_with('.') {
            return false;
        }
        !self.exclude.iter().any(|ex| ex == rel)
    }

    pub fn accepts_file(&self, rel: &str, name: &str) -> bool {
        if self.ignore_dot_files && name.starts_with('.') {
            return false;
        }
        if !self.names.is_empty() && !self.names.iter().any(|m| m.matches(name)) {
            return false;
        }
        if self.not_names.iter().any(|m| m.matches(name)) {
            return false;
        }
        if !self.paths.is_empty() && !self.paths.iter().any(|m| m.matches(rel)) {
            return false;
        }
        !self.not_paths.iter().any(|m| m.matches(rel))
    }
}

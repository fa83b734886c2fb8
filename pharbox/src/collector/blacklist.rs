use glob::Pattern;

use crate::error::CollectError;

/// Paths excluded from every origin except the explicit file lists. Entries
/// are base-relative: an exact path, a directory (excluding everything under
/// it), or a glob.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    exact: Vec<String>,
    globs: Vec<Pattern>,
}

fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

fn clean(entry: &str) -> String {
    let entry = entry.replace('\\', "/");
    let entry = entry.trim_start_matches("./").trim_matches('/');
    entry.to_string()
}

impl Blacklist {
    pub fn new<I, S>(entries: I) -> Result<Blacklist, CollectError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blacklist = Blacklist::default();

        for entry in entries {
            let entry = clean(entry.as_ref());
            if entry.is_empty() {
                continue;
            }

            if is_glob(&entry) {
                let pattern = Pattern::new(&entry).map_err(|source| CollectError::InvalidPattern {
                    pattern: entry.clone(),
                    source,
                })?;
                blacklist.globs.push(pattern);
            } else {
                blacklist.exact.push(entry);
            }
        }

        Ok(blacklist)
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.globs.is_empty()
    }

    /// Whether the base-relative `local` path is excluded.
    pub fn contains(&self, local: &str) -> bool {
        let in_dir = |entry: &String| {
            local == entry
                || local
                    .strip_prefix(entry.as_str())
                    .map_or(false, |rest| rest.starts_with('/'))
        };

        self.exact.iter().any(in_dir) || self.globs.iter().any(|glob| glob.matches(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_directory_entries() {
        let blacklist = Blacklist::new(["file1", "./docs/", "src\\Legacy"]).unwrap();
        assert!(blacklist.contains("file1"));
        assert!(!blacklist.contains("file10"));
        assert!(blacklist.contains("docs/index.md"));
        assert!(!blacklist.contains("docsite/index.md"));
        assert!(blacklist.contains("src/Legacy/Old.php"));
        assert!(!blacklist.contains("src/Modern.php"));
    }

    #[test]
    fn glob_entries() {
        let blacklist = Blacklist::new(["*.md", "tests/**/fixtures"]).unwrap();
        assert!(blacklist.contains("README.md"));
        assert!(blacklist.contains("vendor/pkg/CHANGES.md"));
        assert!(blacklist.contains("tests/unit/fixtures"));
        assert!(!blacklist.contains("src/A.php"));
    }

    #[test]
    fn invalid_glob() {
        assert!(matches!(
            Blacklist::new(["src/[a"]),
            Err(CollectError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn empty_entries_ignored() {
        assert!(Blacklist::new(["", "/"]).unwrap().is_empty());
    }
}

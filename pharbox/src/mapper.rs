use crate::error::ConfigError;

/// Rewrites local paths with ordered prefix rules. The first matching prefix
/// wins; an empty prefix matches everything and must come last.
#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    rules: Vec<(String, String)>,
}

impl PathMapper {
    pub fn new<I>(rules: I) -> Result<PathMapper, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let rules = rules
            .into_iter()
            .map(|(prefix, replacement)| (prefix.replace('\\', "/"), replacement))
            .collect::<Vec<_>>();

        if let Some(pos) = rules.iter().position(|(prefix, _)| prefix.is_empty()) {
            if pos != rules.len() - 1 {
                return Err(ConfigError::CatchAllNotLast);
            }
        }

        Ok(PathMapper { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn map(&self, path: &str) -> String {
        let path = path.replace('\\', "/");

        for (prefix, replacement) in &self.rules {
            if prefix.is_empty() {
                return normalize(&format!("{replacement}/{path}"));
            }
            if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                return normalize(&format!("{replacement}{rest}"));
            }
        }

        path
    }
}

/// Forward slashes only, no repeated or leading separators.
fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && (out.is_empty() || out.ends_with('/')) {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(rules: &[(&str, &str)]) -> PathMapper {
        PathMapper::new(
            rules
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn first_match_wins() {
        let m = mapper(&[("src/", "lib/"), ("src/Foo", "foo/"), ("", "app")]);
        assert_eq!(m.map("src/Foo/Bar.php"), "lib/Foo/Bar.php");
        assert_eq!(m.map("bin/run"), "app/bin/run");
    }

    #[test]
    fn separators_are_normalised() {
        let m = mapper(&[("lib", "vendor\\\\pkg//")]);
        assert_eq!(m.map("lib//a.php"), "vendor/pkg/a.php");
        assert_eq!(m.map("lib\\b.php"), "vendor/pkg/b.php");
    }

    #[test]
    fn remainder_is_appended_as_is() {
        let m = mapper(&[("src", "lib")]);
        assert_eq!(m.map("src2/x.php"), "lib2/x.php");
        assert_eq!(m.map("srcfoo.php"), "libfoo.php");
        assert_eq!(m.map("src/a.php"), "lib/a.php");
    }

    #[test]
    fn no_match_is_unchanged() {
        let m = mapper(&[("src/", "lib/")]);
        assert_eq!(m.map("tests/a.php"), "tests/a.php");
        assert_eq!(PathMapper::default().map("x/y"), "x/y");
    }

    #[test]
    fn empty_replacement_strips_prefix() {
        let m = mapper(&[("public/", "")]);
        assert_eq!(m.map("public/index.php"), "index.php");
    }

    #[test]
    fn catch_all_must_be_last() {
        let rules = vec![("".to_string(), "a".to_string()), ("b".to_string(), "c".to_string())];
        assert!(matches!(
            PathMapper::new(rules),
            Err(ConfigError::CatchAllNotLast)
        ));
    }
}

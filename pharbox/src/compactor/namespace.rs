use std::borrow::Cow;

use phar_format::PharPath;
use regex::bytes::{Captures, Regex};

use super::Compactor;
use crate::error::{CompactFailure, ConfigError};

// The leading group keeps `$x->namespace` and `Foo\namespace` out.
const NAMESPACE: &str = r"(?m)(^|[^A-Za-z0-9_\\$>])(namespace\s+)\\?([A-Za-z_][A-Za-z0-9_\\]*)(\s*[;{])";
const IMPORT: &str =
    r"(?m)(^|[^A-Za-z0-9_\\$>])(use\s+(?:(?:function|const)\s+)?)\\?([A-Za-z_][A-Za-z0-9_]*\\[A-Za-z0-9_\\{]*)";

/// Moves namespace declarations and qualified imports under a common prefix,
/// so bundled code cannot clash with code loaded alongside the archive.
///
/// Unqualified imports (`use Foo;`) are left alone: they refer to the global
/// namespace.
#[derive(Debug, Clone)]
pub struct NamespacePrefix {
    prefix: String,
    namespace: Regex,
    import: Regex,
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.split('\\').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

impl NamespacePrefix {
    pub fn new(prefix: &str) -> Result<NamespacePrefix, ConfigError> {
        let trimmed = prefix.trim_matches('\\');
        if !is_valid_prefix(trimmed) {
            return Err(ConfigError::InvalidNamespacePrefix(prefix.to_string()));
        }

        Ok(NamespacePrefix {
            prefix: trimmed.to_string(),
            namespace: Regex::new(NAMESPACE).map_err(ConfigError::InvalidPattern)?,
            import: Regex::new(IMPORT).map_err(ConfigError::InvalidPattern)?,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn is_prefixed(&self, name: &[u8]) -> bool {
        let prefix = self.prefix.as_bytes();
        name.starts_with(prefix) && matches!(name.get(prefix.len()), None | Some(b'\\'))
    }

    fn rewrite<'a>(&self, regex: &Regex, contents: &'a [u8]) -> Cow<'a, [u8]> {
        regex.replace_all(contents, |caps: &Captures<'_>| {
            let mut out = Vec::new();
            out.extend_from_slice(&caps[1]);
            out.extend_from_slice(&caps[2]);
            if self.is_prefixed(&caps[3]) {
                out.extend_from_slice(&caps[3]);
            } else {
                out.extend_from_slice(self.prefix.as_bytes());
                out.push(b'\\');
                out.extend_from_slice(&caps[3]);
            }
            if let Some(tail) = caps.get(4) {
                out.extend_from_slice(tail.as_bytes());
            }
            out
        })
    }
}

impl Compactor for NamespacePrefix {
    fn name(&self) -> &'static str {
        "namespace-prefix"
    }

    fn supports(&self, path: &PharPath) -> bool {
        path.extension().as_deref() == Some("php")
    }

    fn compact(&self, _path: &PharPath, contents: Vec<u8>) -> Result<Vec<u8>, CompactFailure> {
        let declared = self.rewrite(&self.namespace, &contents).into_owned();
        Ok(self.rewrite(&self.import, &declared).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(src: &str) -> String {
        let compactor = NamespacePrefix::new("Scoped").unwrap();
        let out = compactor
            .compact(&PharPath::new("a.php").unwrap(), src.as_bytes().to_vec())
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn declarations_are_prefixed() {
        assert_eq!(
            scope("<?php\nnamespace App\\Http;\n"),
            "<?php\nnamespace Scoped\\App\\Http;\n"
        );
        assert_eq!(
            scope("<?php namespace App {\n}"),
            "<?php namespace Scoped\\App {\n}"
        );
    }

    #[test]
    fn qualified_imports_are_prefixed() {
        let out = scope("<?php\nuse Lib\\Thing;\nuse function Lib\\helper;\nuse \\Vendor\\Pkg\\X as Y;\n");
        assert_eq!(
            out,
            "<?php\nuse Scoped\\Lib\\Thing;\nuse function Scoped\\Lib\\helper;\nuse Scoped\\Vendor\\Pkg\\X as Y;\n"
        );
    }

    #[test]
    fn global_and_prefixed_names_are_kept() {
        let src = "<?php\nuse Countable;\nnamespace Scoped\\App;\nuse Scoped\\Lib\\A;\n$f = function () use ($x) {};\n";
        assert_eq!(scope(src), src);
    }

    #[test]
    fn property_access_is_not_a_declaration() {
        let src = "<?php $node->namespace = 'x';";
        assert_eq!(scope(src), src);
    }

    #[test]
    fn prefix_must_be_a_namespace() {
        assert!(NamespacePrefix::new("\\Acme\\Scoped\\").is_ok());
        assert_eq!(NamespacePrefix::new("\\Acme\\").unwrap().prefix(), "Acme");
        assert!(matches!(
            NamespacePrefix::new("1abc"),
            Err(ConfigError::InvalidNamespacePrefix(_))
        ));
        assert!(NamespacePrefix::new("").is_err());
    }
}

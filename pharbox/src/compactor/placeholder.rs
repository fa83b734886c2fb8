use std::collections::HashMap;

use phar_format::PharPath;
use regex::bytes::{Captures, Regex};

use super::Compactor;
use crate::error::{CompactFailure, ConfigError};

/// Replaces `@key@` placeholders (with a configurable sigil) in every file.
#[derive(Debug, Clone)]
pub struct Placeholder {
    pattern: Option<Regex>,
    values: HashMap<Vec<u8>, Vec<u8>>,
}

impl Placeholder {
    pub fn new(replacements: &[(String, String)], sigil: &str) -> Result<Placeholder, ConfigError> {
        let values = replacements
            .iter()
            .map(|(key, value)| {
                (
                    format!("{sigil}{key}{sigil}").into_bytes(),
                    value.clone().into_bytes(),
                )
            })
            .collect::<HashMap<_, _>>();

        if values.is_empty() {
            return Ok(Placeholder {
                pattern: None,
                values,
            });
        }

        // Longest first, so `@ab@` is not shadowed by a shorter alternative.
        let mut keys = values
            .keys()
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .collect::<Vec<_>>();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let alternation = keys
            .iter()
            .map(|key| regex::escape(key))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&alternation).map_err(ConfigError::InvalidPattern)?;

        Ok(Placeholder {
            pattern: Some(pattern),
            values,
        })
    }
}

impl Compactor for Placeholder {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn supports(&self, _path: &PharPath) -> bool {
        self.pattern.is_some()
    }

    fn compact(&self, _path: &PharPath, contents: Vec<u8>) -> Result<Vec<u8>, CompactFailure> {
        let pattern = match &self.pattern {
            Some(pattern) => pattern,
            None => return Ok(contents),
        };

        let out = pattern.replace_all(&contents, |caps: &Captures<'_>| {
            self.values.get(&caps[0]).cloned().unwrap_or_else(|| caps[0].to_vec())
        });
        Ok(out.into_owned())
    }
}

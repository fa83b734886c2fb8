//! Content transformers applied to regular files before they are archived.

mod json;
mod namespace;
mod php;
mod placeholder;

use std::fmt::Debug;

use phar_format::PharPath;

pub use self::json::Json;
pub use self::namespace::NamespacePrefix;
pub use self::php::Php;
pub use self::placeholder::Placeholder;

use crate::config::Config;
use crate::error::{CompactFailure, CompactionError, ConfigError};

pub trait Compactor: Send + Sync + Debug {
    /// The tag this compactor is configured with.
    fn name(&self) -> &'static str;

    fn supports(&self, path: &PharPath) -> bool;

    fn compact(&self, path: &PharPath, contents: Vec<u8>) -> Result<Vec<u8>, CompactFailure>;
}

pub type Factory = fn(&Config) -> Result<Box<dyn Compactor>, ConfigError>;

/// Every compactor that can be named in the `compactors` setting.
pub const REGISTRY: &[(&str, Factory)] = &[
    ("php", php),
    ("json", json),
    ("namespace-prefix", namespace_prefix),
];

fn php(_: &Config) -> Result<Box<dyn Compactor>, ConfigError> {
    Ok(Box::new(Php))
}

fn json(_: &Config) -> Result<Box<dyn Compactor>, ConfigError> {
    Ok(Box::new(Json))
}

fn namespace_prefix(config: &Config) -> Result<Box<dyn Compactor>, ConfigError> {
    let prefix = config
        .namespace_prefix
        .as_deref()
        .ok_or(ConfigError::MissingSetting {
            compactor: "namespace-prefix",
            key: "namespace-prefix",
        })?;
    Ok(Box::new(NamespacePrefix::new(prefix)?))
}

pub fn lookup(tag: &str) -> Option<Factory> {
    REGISTRY
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tag))
        .map(|(_, factory)| *factory)
}

/// An ordered chain of compactors. Each one runs at most once per file, in
/// order, and only if it supports the file.
#[derive(Debug, Default)]
pub struct Compactors(Vec<Box<dyn Compactor>>);

impl Compactors {
    pub fn new(compactors: Vec<Box<dyn Compactor>>) -> Compactors {
        Compactors(compactors)
    }

    /// Resolves the configured tags. A placeholder compactor runs first
    /// whenever replacements are configured.
    pub fn from_config(config: &Config) -> Result<Compactors, ConfigError> {
        let mut compactors: Vec<Box<dyn Compactor>> = Vec::with_capacity(config.compactors.len() + 1);

        if !config.replacements.is_empty() {
            compactors.push(Box::new(Placeholder::new(
                &config.replacements,
                &config.replacement_sigil,
            )?));
        }

        for tag in &config.compactors {
            let factory = lookup(tag).ok_or_else(|| ConfigError::UnknownCompactor(tag.clone()))?;
            compactors.push(factory(config)?);
        }

        Ok(Compactors(compactors))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn compact(&self, path: &PharPath, contents: Vec<u8>) -> Result<Vec<u8>, CompactionError> {
        let mut contents = contents;

        for compactor in self.0.iter().filter(|c| c.supports(path)) {
            contents = compactor
                .compact(path, contents)
                .map_err(|source| CompactionError {
                    path: path.clone(),
                    compactor: compactor.name(),
                    source,
                })?;
            tracing::trace!(%path, compactor = compactor.name(), "compacted");
        }

        Ok(contents)
    }
}

//! Loading `pharbox.json` into an immutable, resolved [`Config`].
//!
//! Relative paths are resolved against the base path, which itself defaults to
//! the directory holding the configuration file.

use std::path::{Component, Path, PathBuf};

use phar_format::{Algorithm, Compression};
use serde::Deserialize;

use crate::compactor::Compactors;
use crate::error::ConfigError;
use crate::mapper::PathMapper;

pub const CONFIG_FILE: &str = "pharbox.json";
pub const CONFIG_FILE_DIST: &str = "pharbox.json.dist";

pub const DEFAULT_OUTPUT: &str = "index.phar";
pub const DEFAULT_MAIN: &str = "index.php";
pub const DEFAULT_SHEBANG: &str = "#!/usr/bin/env php";
pub const DEFAULT_SIGIL: &str = "@";

/// A value that can also be switched on or off with a boolean.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Setting<T> {
    Enabled(bool),
    Value(T),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Text {
    Line(String),
    Lines(Vec<String>),
}

impl Text {
    fn join(self) -> String {
        match self {
            Text::Line(line) => line,
            Text::Lines(lines) => lines.join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Mode {
    Octal(String),
    Number(u32),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(vec![])
    }
}

/// One finder rule: walk `in`, keep what the filters accept, add `append`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FinderRule {
    #[serde(default, rename = "in")]
    pub in_dirs: OneOrMany,
    #[serde(default)]
    pub name: OneOrMany,
    #[serde(default)]
    pub not_name: OneOrMany,
    #[serde(default)]
    pub path: OneOrMany,
    #[serde(default)]
    pub not_path: OneOrMany,
    #[serde(default)]
    pub exclude: OneOrMany,
    #[serde(default)]
    pub append: OneOrMany,
    #[serde(default = "yes")]
    pub ignore_dot_files: bool,
    #[serde(default = "yes")]
    pub ignore_vcs: bool,
}

fn yes() -> bool {
    true
}

/// The file as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawConfig {
    pub base_path: Option<PathBuf>,
    pub main: Option<Setting<String>>,
    pub output: Option<PathBuf>,
    pub alias: Option<String>,
    pub banner: Option<Setting<Text>>,
    pub banner_file: Option<PathBuf>,
    pub shebang: Option<Setting<String>>,
    pub stub: Option<Setting<String>>,
    pub intercept: Option<bool>,
    pub check_requirements: Option<bool>,

    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub files_bin: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub directories_bin: Vec<String>,
    #[serde(default)]
    pub finder: Vec<FinderRule>,
    #[serde(default)]
    pub finder_bin: Vec<FinderRule>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub force_autodiscovery: bool,
    pub exclude_composer_files: Option<bool>,
    pub exclude_dev_files: Option<bool>,

    #[serde(default)]
    pub compactors: Vec<String>,
    pub namespace_prefix: Option<String>,
    #[serde(default)]
    pub replacements: serde_json::Map<String, serde_json::Value>,
    pub replacement_sigil: Option<String>,

    pub compression: Option<String>,
    pub algorithm: Option<String>,
    pub key: Option<PathBuf>,
    pub key_pass: Option<String>,
    pub file_mode: Option<Mode>,
    pub chmod: Option<Mode>,
    #[serde(default)]
    pub map: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, deserialize_with = "explicit")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: Option<u32>,
}

/// Keeps an explicit `null` as `Some(Value::Null)` instead of `None`.
fn explicit<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubSource {
    /// Generate a stub from the stub options.
    Generate,
    /// Use the minimal default stub.
    Default,
    /// Read the stub from a file.
    File(PathBuf),
}

/// Fully resolved build configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: Option<PathBuf>,
    pub base_path: PathBuf,
    pub main: Option<PathBuf>,
    pub output: PathBuf,
    pub alias: Option<String>,
    pub banner: Option<String>,
    pub shebang: Option<String>,
    pub stub: StubSource,
    pub intercept: bool,
    pub check_requirements: bool,

    pub files: Vec<PathBuf>,
    pub files_bin: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub directories_bin: Vec<PathBuf>,
    pub finder: Vec<FinderRule>,
    pub finder_bin: Vec<FinderRule>,
    pub blacklist: Vec<String>,
    pub force_autodiscovery: bool,
    pub exclude_composer_files: bool,
    pub exclude_dev_files: bool,

    pub compactors: Vec<String>,
    pub namespace_prefix: Option<String>,
    pub replacements: Vec<(String, String)>,
    pub replacement_sigil: String,

    pub compression: Compression,
    pub algorithm: Algorithm,
    pub key: Option<PathBuf>,
    pub key_pass: Option<String>,
    pub file_mode: Option<u32>,
    pub chmod: Option<u32>,
    pub map: Vec<(String, String)>,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: u32,
}

impl Config {
    /// Finds `pharbox.json`, or `pharbox.json.dist`, in `dir` and loads it.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Config, ConfigError> {
        let dir = dir.as_ref();
        [CONFIG_FILE, CONFIG_FILE_DIST]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ConfigError::NotFound {
                dir: dir.to_path_buf(),
            })
            .and_then(Config::load)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        tracing::debug!(path = %path.display(), "loaded configuration");
        let mut config = Config::resolve(raw, &dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parses configuration text, resolving relative paths against `dir`.
    pub fn from_json_str<P: AsRef<Path>>(text: &str, dir: P) -> Result<Config, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Config::resolve(raw, dir.as_ref())
    }

    pub fn resolve(raw: RawConfig, dir: &Path) -> Result<Config, ConfigError> {
        let base_path = match raw.base_path {
            Some(base) => dir.join(base),
            None => dir.to_path_buf(),
        };
        let base_path = base_path
            .canonicalize()
            .map_err(|source| ConfigError::InvalidBasePath {
                path: base_path.clone(),
                source,
            })?;
        let abs = |p: &str| normalize(&base_path.join(p));

        let main = match raw.main {
            Some(Setting::Enabled(false)) => None,
            Some(Setting::Value(main)) => Some(abs(&main)),
            Some(Setting::Enabled(true)) | None => {
                let main = base_path.join(DEFAULT_MAIN);
                if main.is_file() {
                    Some(main)
                } else {
                    None
                }
            }
        };

        let output = abs(&raw
            .output
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
            .to_string_lossy());

        let banner = match (raw.banner, raw.banner_file) {
            (Some(Setting::Enabled(false)), _) => None,
            (Some(Setting::Value(text)), _) => Some(text.join()),
            (_, Some(file)) => {
                let path = base_path.join(file);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                Some(text.trim_end().to_string())
            }
            (Some(Setting::Enabled(true)), None) | (None, None) => Some(default_banner()),
        };

        let shebang = match raw.shebang {
            Some(Setting::Enabled(false)) => None,
            Some(Setting::Value(shebang)) => {
                if !shebang.starts_with("#!") {
                    return Err(ConfigError::InvalidShebang(shebang));
                }
                Some(shebang)
            }
            Some(Setting::Enabled(true)) | None => Some(DEFAULT_SHEBANG.to_string()),
        };

        let stub = match raw.stub {
            Some(Setting::Enabled(false)) => StubSource::Default,
            Some(Setting::Value(path)) => StubSource::File(abs(&path)),
            Some(Setting::Enabled(true)) | None => StubSource::Generate,
        };

        let compression = match raw.compression {
            Some(name) => Compression::from_name(&name).ok_or(ConfigError::UnknownCompression(name))?,
            None => Compression::None,
        };

        let algorithm = match raw.algorithm {
            Some(name) => Algorithm::from_name(&name).ok_or(ConfigError::UnknownAlgorithm(name))?,
            None => Algorithm::default(),
        };

        if raw.metadata.as_ref().is_some_and(serde_json::Value::is_null) {
            return Err(ConfigError::NullMetadata);
        }

        let key = raw.key.map(|key| base_path.join(key));
        if algorithm == Algorithm::OpenSsl && key.is_none() {
            return Err(ConfigError::MissingKey(algorithm));
        }

        let map = raw
            .map
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut pairs = entry.into_iter();
                match (pairs.next(), pairs.next()) {
                    (Some((prefix, serde_json::Value::String(replacement))), None) => {
                        Ok((prefix, replacement))
                    }
                    _ => Err(ConfigError::InvalidMapEntry { index }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let replacements = raw
            .replacements
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        let config = Config {
            config_path: None,
            main,
            output,
            alias: raw.alias.filter(|alias| !alias.is_empty()),
            banner,
            shebang,
            stub,
            intercept: raw.intercept.unwrap_or(false),
            check_requirements: raw.check_requirements.unwrap_or(false),
            files: raw.files.iter().map(|p| abs(p)).collect(),
            files_bin: raw.files_bin.iter().map(|p| abs(p)).collect(),
            directories: raw.directories.iter().map(|p| abs(p)).collect(),
            directories_bin: raw.directories_bin.iter().map(|p| abs(p)).collect(),
            finder: raw.finder,
            finder_bin: raw.finder_bin,
            blacklist: raw.blacklist,
            force_autodiscovery: raw.force_autodiscovery,
            exclude_composer_files: raw.exclude_composer_files.unwrap_or(true),
            exclude_dev_files: raw.exclude_dev_files.unwrap_or(true),
            compactors: raw.compactors,
            namespace_prefix: raw.namespace_prefix,
            replacements,
            replacement_sigil: raw
                .replacement_sigil
                .unwrap_or_else(|| DEFAULT_SIGIL.to_string()),
            compression,
            algorithm,
            key,
            key_pass: raw.key_pass,
            file_mode: raw.file_mode.map(|m| parse_mode("file-mode", m)).transpose()?,
            chmod: raw.chmod.map(|m| parse_mode("chmod", m)).transpose()?,
            map,
            metadata: raw.metadata,
            timestamp: raw.timestamp.unwrap_or(0),
            base_path,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that only make sense in combination: map ordering
    /// and compactor tags.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PathMapper::new(self.map.clone())?;
        Compactors::from_config(self)?;
        Ok(())
    }

    /// Where the archive is written before being moved into place.
    pub fn tmp_output(&self) -> PathBuf {
        let mut tmp = self.output.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Autodiscovery runs unless files are picked with directories or finders,
    /// or when forced.
    pub fn autodiscovery(&self) -> bool {
        self.force_autodiscovery || (self.directories.is_empty() && self.finder.is_empty())
    }

    /// `path` relative to the base path with `/` separators, if inside it.
    pub fn local_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_path).ok()?;
        let parts = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>();
        Some(parts.join("/"))
    }
}

fn default_banner() -> String {
    format!("Generated by pharbox {}.", env!("CARGO_PKG_VERSION"))
}

fn parse_mode(key: &'static str, mode: Mode) -> Result<u32, ConfigError> {
    match mode {
        Mode::Number(n) if n <= 0o7777 => Ok(n),
        Mode::Number(n) => Err(ConfigError::InvalidMode {
            key,
            value: n.to_string(),
        }),
        Mode::Octal(text) => {
            let digits = text.trim_start_matches("0o");
            u32::from_str_radix(digits, 8)
                .ok()
                .filter(|n| *n <= 0o7777)
                .ok_or(ConfigError::InvalidMode { key, value: text })
        }
    }
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> Result<Config, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        Config::from_json_str(json, dir.path())
    }

    #[test]
    fn defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_json_str("{}", dir.path()).unwrap();
        let base = dir.path().canonicalize().unwrap();

        assert_eq!(config.base_path, base);
        assert_eq!(config.output, base.join("index.phar"));
        assert_eq!(config.tmp_output(), base.join("index.phar.tmp"));
        assert_eq!(config.main, None);
        assert_eq!(config.shebang.as_deref(), Some(DEFAULT_SHEBANG));
        assert_eq!(config.stub, StubSource::Generate);
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.algorithm, Algorithm::Sha512);
        assert!(!config.check_requirements);
        assert!(config.exclude_composer_files);
        assert!(config.exclude_dev_files);
        assert!(config.autodiscovery());
        assert_eq!(config.timestamp, 0);
    }

    #[test]
    fn main_defaults_to_index_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.php"), "<?php").unwrap();
        let config = Config::from_json_str("{}", dir.path()).unwrap();
        assert_eq!(
            config.main,
            Some(dir.path().canonicalize().unwrap().join("index.php"))
        );

        let config = Config::from_json_str(r#"{"main": false}"#, dir.path()).unwrap();
        assert_eq!(config.main, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            config(r#"{"outptu": "x.phar"}"#),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn settings_accept_bool_or_value() {
        let c = config(r#"{"shebang": false, "banner": ["a", "", "b"], "stub": false}"#).unwrap();
        assert_eq!(c.shebang, None);
        assert_eq!(c.banner.as_deref(), Some("a\n\nb"));
        assert_eq!(c.stub, StubSource::Default);

        assert!(matches!(
            config(r#"{"shebang": "/usr/bin/php"}"#),
            Err(ConfigError::InvalidShebang(_))
        ));
    }

    #[test]
    fn openssl_requires_key() {
        assert!(matches!(
            config(r#"{"algorithm": "OPENSSL"}"#),
            Err(ConfigError::MissingKey(Algorithm::OpenSsl))
        ));
        let c = config(r#"{"algorithm": "OPENSSL", "key": "private.pem"}"#).unwrap();
        assert!(c.key.unwrap().ends_with("private.pem"));
    }

    #[test]
    fn modes_are_octal() {
        let c = config(r#"{"file-mode": "0644", "chmod": "0o755"}"#).unwrap();
        assert_eq!(c.file_mode, Some(0o644));
        assert_eq!(c.chmod, Some(0o755));

        assert!(matches!(
            config(r#"{"chmod": "0999"}"#),
            Err(ConfigError::InvalidMode { key: "chmod", .. })
        ));
    }

    #[test]
    fn map_entries_keep_order() {
        let c = config(r#"{"map": [{"lib": "src"}, {"": "app"}]}"#).unwrap();
        assert_eq!(
            c.map,
            vec![("lib".into(), "src".into()), ("".into(), "app".into())]
        );

        assert!(matches!(
            config(r#"{"map": [{"": "app"}, {"lib": "src"}]}"#),
            Err(ConfigError::CatchAllNotLast)
        ));
        assert!(matches!(
            config(r#"{"map": [{"a": "b", "c": "d"}]}"#),
            Err(ConfigError::InvalidMapEntry { index: 0 })
        ));
    }

    #[test]
    fn null_metadata_is_rejected() {
        assert!(matches!(
            config(r#"{"metadata": null}"#),
            Err(ConfigError::NullMetadata)
        ));
        let c = config(r#"{"metadata": [1, "two"]}"#).unwrap();
        assert_eq!(c.metadata, Some(serde_json::json!([1, "two"])));
        assert_eq!(config("{}").unwrap().metadata, None);
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert!(matches!(
            config(r#"{"compression": "LZMA"}"#),
            Err(ConfigError::UnknownCompression(_))
        ));
        assert!(matches!(
            config(r#"{"algorithm": "CRC32"}"#),
            Err(ConfigError::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            config(r#"{"compactors": ["yaml"]}"#),
            Err(ConfigError::UnknownCompactor(_))
        ));
    }

    #[test]
    fn discover_falls_back_to_dist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(ConfigError::NotFound { .. })
        ));

        std::fs::write(dir.path().join(CONFIG_FILE_DIST), r#"{"alias": "dist.phar"}"#).unwrap();
        assert_eq!(
            Config::discover(dir.path()).unwrap().alias.as_deref(),
            Some("dist.phar")
        );

        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"alias": "main.phar"}"#).unwrap();
        assert_eq!(
            Config::discover(dir.path()).unwrap().alias.as_deref(),
            Some("main.phar")
        );
    }

    #[test]
    fn normalize_is_lexical() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}

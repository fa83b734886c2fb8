//! Infers the files an application needs from Composer's manifests.
//!
//! Only files Composer already wrote are read. A missing manifest is not an
//! error, it just contributes nothing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{normalize, Config};
use crate::error::CollectError;

pub const MANIFEST: &str = "composer.json";
pub const LOCK: &str = "composer.lock";
pub const INSTALLED: &str = "installed.json";
pub const DEFAULT_VENDOR_DIR: &str = "vendor";

/// File stems never worth shipping. Matched case-insensitively on the name up
/// to the first dot, ignoring a leading dot.
const DENIED_STEMS: &[&str] = &[
    "appveyor",
    "authors",
    "changelog",
    "changes",
    "code_of_conduct",
    "contributing",
    "coveralls",
    "dockerfile",
    "editorconfig",
    "gitattributes",
    "gitignore",
    "history",
    "infection",
    "licence",
    "license",
    "makefile",
    "php_cs",
    "php-cs-fixer",
    "phpcs",
    "phpstan",
    "phpunit",
    "psalm",
    "readme",
    "scrutinizer",
    "security",
    "styleci",
    "travis",
    "upgrade",
    "upgrading",
];

/// Extensions that are code even when the stem is denied, e.g. `License.php`.
const CODE_EXTENSIONS: &[&str] = &["php", "phtml", "inc"];

/// Whether an autodiscovered file named `name` should be skipped.
pub fn is_denied(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let trimmed = lower.trim_start_matches('.');
    let stem = trimmed.split('.').next().unwrap_or_default();

    if !DENIED_STEMS.contains(&stem) {
        return false;
    }

    match trimmed.rsplit_once('.') {
        Some((_, ext)) => !CODE_EXTENSIONS.contains(&ext),
        None => true,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Manifest {
    #[serde(default)]
    autoload: Autoload,
    #[serde(default)]
    autoload_dev: Autoload,
    #[serde(default)]
    config: ManifestConfig,
}

#[derive(Debug, Default, Deserialize)]
struct Autoload {
    #[serde(default, rename = "psr-4")]
    psr4: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "psr-0")]
    psr0: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    classmap: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ManifestConfig {
    vendor_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Package {
    name: String,
    #[serde(rename = "install-path")]
    install_path: Option<String>,
}

/// `installed.json` is a bare package list up to Composer 1, and an object
/// listing dev packages separately from Composer 2.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Installed {
    Legacy(Vec<Package>),
    Current {
        packages: Vec<Package>,
        #[serde(default, rename = "dev-package-names")]
        dev_package_names: Vec<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Lock {
    #[serde(default, rename = "packages-dev")]
    packages_dev: Vec<Package>,
}

/// What autodiscovery found: files to add as they are, and directories to
/// walk. Paths are absolute and may not exist.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    /// Files to leave out of the directory walks.
    pub excluded: Vec<PathBuf>,
}

impl Discovered {
    fn file(&mut self, path: PathBuf) {
        if !self.files.contains(&path) {
            self.files.push(path);
        }
    }

    fn directory(&mut self, path: PathBuf) {
        if !self.directories.contains(&path) {
            self.directories.push(path);
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CollectError> {
    if !path.is_file() {
        return Ok(None);
    }

    let bytes = std::fs::read(path).map_err(|source| CollectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| CollectError::Manifest {
            path: path.to_path_buf(),
            source,
        })
}

fn strings(value: &serde_json::Value) -> Vec<&str> {
    match value {
        serde_json::Value::String(s) => vec![s.as_str()],
        serde_json::Value::Array(items) => items.iter().filter_map(|v| v.as_str()).collect(),
        _ => vec![],
    }
}

fn add_autoload(found: &mut Discovered, base: &Path, autoload: &Autoload) {
    let roots = autoload.psr4.values().chain(autoload.psr0.values());
    for dir in roots.flat_map(strings) {
        found.directory(normalize(&base.join(dir)));
    }

    for entry in &autoload.classmap {
        let path = normalize(&base.join(entry));
        if path.is_file() {
            found.file(path);
        } else {
            found.directory(path);
        }
    }

    for file in &autoload.files {
        found.file(normalize(&base.join(file)));
    }
}

/// Reads `composer.json`, `composer.lock` and `installed.json` under the
/// base path.
pub fn discover(config: &Config) -> Result<Discovered, CollectError> {
    let base = &config.base_path;
    let mut found = Discovered::default();

    let manifest_path = base.join(MANIFEST);
    let manifest = read_json::<Manifest>(&manifest_path)?.unwrap_or_default();

    add_autoload(&mut found, base, &manifest.autoload);
    if !config.exclude_dev_files {
        add_autoload(&mut found, base, &manifest.autoload_dev);
    }

    let lock_path = base.join(LOCK);
    if !config.exclude_composer_files {
        found.file(manifest_path);
        found.file(lock_path.clone());
    }

    let vendor_dir = manifest
        .config
        .vendor_dir
        .as_deref()
        .unwrap_or(DEFAULT_VENDOR_DIR);
    let vendor = normalize(&base.join(vendor_dir));
    let composer_dir = vendor.join("composer");
    let installed_path = composer_dir.join(INSTALLED);

    if !vendor.is_dir() {
        return Ok(found);
    }

    found.file(vendor.join("autoload.php"));
    found.directory(composer_dir.clone());
    if config.exclude_composer_files {
        found.excluded.push(installed_path.clone());
    }

    let mut dev: HashSet<String> = HashSet::new();
    let packages = match read_json::<Installed>(&installed_path)? {
        Some(Installed::Current {
            packages,
            dev_package_names,
        }) => {
            dev.extend(dev_package_names);
            packages
        }
        Some(Installed::Legacy(packages)) => packages,
        None => vec![],
    };

    if config.exclude_dev_files {
        if let Some(lock) = read_json::<Lock>(&lock_path)? {
            dev.extend(lock.packages_dev.into_iter().map(|p| p.name));
        }
    } else {
        dev.clear();
    }

    for package in packages {
        if dev.contains(&package.name) {
            tracing::debug!(package = %package.name, "skipping dev package");
            continue;
        }

        let dir = match &package.install_path {
            Some(install_path) => normalize(&composer_dir.join(install_path)),
            None => vendor.join(&package.name),
        };
        found.directory(dir);
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, path: &str, contents: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn config(root: &Path, json: &str) -> Config {
        Config::from_json_str(json, root).unwrap()
    }

    #[test]
    fn denylist_keeps_code() {
        assert!(is_denied("README.md"));
        assert!(is_denied("LICENSE"));
        assert!(is_denied(".travis.yml"));
        assert!(is_denied("phpunit.xml.dist"));
        assert!(!is_denied("License.php"));
        assert!(!is_denied("Readme.phtml"));
        assert!(!is_denied("Reader.php"));
        assert!(!is_denied("licensed.txt"));
    }

    #[test]
    fn nothing_without_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let found = discover(&config(dir.path(), "{}")).unwrap();
        assert_eq!(found, Discovered::default());
    }

    #[test]
    fn autoload_and_installed_packages() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "composer.json",
            r#"{
                "autoload": {
                    "psr-4": {"App\\": "src/", "Other\\": ["lib", "more"]},
                    "classmap": ["legacy/"],
                    "files": ["helpers.php"]
                },
                "autoload-dev": {"psr-4": {"Tests\\": "tests/"}}
            }"#,
        );
        write(root, "composer.lock", r#"{"packages-dev": [{"name": "phpunit/phpunit"}]}"#);
        write(root, "vendor/autoload.php", "<?php");
        write(
            root,
            "vendor/composer/installed.json",
            r#"{
                "packages": [
                    {"name": "acme/log", "install-path": "../acme/log"},
                    {"name": "acme/dev-tool", "install-path": "../acme/dev-tool"},
                    {"name": "phpunit/phpunit"}
                ],
                "dev-package-names": ["acme/dev-tool"]
            }"#,
        );

        let config = config(root, "{}");
        let base = &config.base_path;
        let found = discover(&config).unwrap();

        assert_eq!(
            found.files,
            vec![base.join("helpers.php"), base.join("vendor/autoload.php")]
        );
        assert_eq!(
            found.directories,
            vec![
                base.join("src"),
                base.join("lib"),
                base.join("more"),
                base.join("legacy"),
                base.join("vendor/composer"),
                base.join("vendor/acme/log"),
            ]
        );
        assert_eq!(found.excluded, vec![base.join("vendor/composer/installed.json")]);
    }

    #[test]
    fn dev_files_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "composer.json",
            r#"{"autoload-dev": {"psr-4": {"Tests\\": "tests/"}}, "config": {"vendor-dir": "deps"}}"#,
        );
        write(
            root,
            "deps/composer/installed.json",
            r#"[{"name": "acme/log"}, {"name": "acme/dev-tool"}]"#,
        );
        write(root, "composer.lock", r#"{"packages-dev": [{"name": "acme/dev-tool"}]}"#);

        let config = config(
            root,
            r#"{"exclude-dev-files": false, "exclude-composer-files": false}"#,
        );
        let base = &config.base_path;
        let found = discover(&config).unwrap();

        assert!(found.directories.contains(&base.join("tests")));
        assert!(found.directories.contains(&base.join("deps/acme/log")));
        assert!(found.directories.contains(&base.join("deps/acme/dev-tool")));
        assert!(found.files.contains(&base.join("composer.json")));
        assert!(found.files.contains(&base.join("composer.lock")));
        assert!(found.excluded.is_empty());
    }

    #[test]
    fn broken_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "composer.json", "{nope");
        assert!(matches!(
            discover(&config(dir.path(), "{}")),
            Err(CollectError::Manifest { .. })
        ));
    }
}

//! End-to-end builds of small project trees.

use std::fs;
use std::path::{Path, PathBuf};

use phar_format::{
    extract, signature, Algorithm, Compression, PharPath, PharReader, SignatureError, WriteError,
};
use pharbox::error::{BuildError, CollectError, Origin};
use pharbox::{build, BuildOptions, Config};
use tempfile::TempDir;

fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A project with a main script, some sources and a binary asset.
fn project(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, "index.php", "#!/usr/bin/env php\n<?php\n// entry point\nrequire 'src/App.php';\n");
    write(root, "src/App.php", "<?php\n\n/* The app. */\nnamespace App;\n\nclass App {}\n");
    write(root, "src/config.json", "{\n  \"debug\": false\n}\n");
    write(root, "res/logo.png", "\u{1}PNG // not a comment");
    write(root, "pharbox.json", config);
    dir
}

fn config(dir: &TempDir) -> Config {
    Config::discover(dir.path()).unwrap()
}

fn build_ok(config: &Config) -> PathBuf {
    build(config, &BuildOptions::default()).unwrap().output
}

fn read(reader: &PharReader, path: &str) -> Vec<u8> {
    let record = reader
        .record(&PharPath::new(path).unwrap())
        .unwrap_or_else(|| panic!("{path} missing"));
    reader.read(record).unwrap()
}

const BASIC: &str = r#"{
    "alias": "app.phar",
    "directories": ["src"],
    "files-bin": ["res/logo.png"],
    "compactors": ["php", "json"]
}"#;

#[test]
fn builds_are_deterministic() {
    let dir = project(BASIC);
    let config = config(&dir);

    let first = fs::read(build_ok(&config)).unwrap();
    let second = fs::read(build_ok(&config)).unwrap();
    assert_eq!(first, second);

    let serial = build(&config, &BuildOptions { serial: true }).unwrap();
    assert_eq!(fs::read(serial.output).unwrap(), first);
}

#[test]
fn round_trip_extracts_compacted_and_binary_files() {
    let dir = project(
        r#"{
            "alias": "app.phar",
            "directories": ["src"],
            "files-bin": ["res/logo.png"],
            "compactors": ["php", "json"],
            "map": [{"src/": "lib/"}],
            "compression": "GZ"
        }"#,
    );
    let config = config(&dir);
    let output = build_ok(&config);

    let stub_length = extract::find_stub_length(&output, None).unwrap();
    let out = TempDir::new().unwrap();
    extract::extract(&output, stub_length, Some(out.path())).unwrap();

    assert_eq!(
        fs::read_to_string(out.path().join("lib/App.php")).unwrap(),
        "<?php\n\n\nnamespace App;\n\nclass App {}\n"
    );
    assert_eq!(
        fs::read_to_string(out.path().join("lib/config.json")).unwrap(),
        r#"{"debug":false}"#
    );
    assert_eq!(
        fs::read_to_string(out.path().join("res/logo.png")).unwrap(),
        "\u{1}PNG // not a comment"
    );
    assert_eq!(
        fs::read_to_string(out.path().join("index.php")).unwrap(),
        "<?php\n\nrequire 'src/App.php';\n"
    );
    assert!(!out.path().join("src").exists());

    let reader = PharReader::open(&output).unwrap();
    assert!(reader
        .records()
        .iter()
        .all(|r| r.compression() == Compression::Gzip));
}

#[test]
fn generated_stub_runs_the_main_script() {
    let dir = project(r#"{"alias": "app.phar", "intercept": true, "banner": false, "directories": ["src"]}"#);
    let output = build_ok(&config(&dir));

    let reader = PharReader::open(&output).unwrap();
    let stub = String::from_utf8(reader.stub().to_vec()).unwrap();
    assert_eq!(
        stub,
        "#!/usr/bin/env php\n<?php\n\nPhar::mapPhar('app.phar');\nPhar::interceptFileFuncs();\n\nrequire 'phar://app.phar/index.php';\n\n__HALT_COMPILER(); ?>\r\n"
    );
    assert_eq!(reader.header().alias(), Some("app.phar"));
    assert!(!stub.contains("check-requirements"));
}

#[test]
fn custom_stub_file() {
    let dir = project(r#"{"stub": "stub.php", "main": false, "directories": ["src"]}"#);
    write(dir.path(), "stub.php", "<?php echo 'custom'; __HALT_COMPILER(); trailing junk");
    let output = build_ok(&config(&dir));

    let reader = PharReader::open(&output).unwrap();
    assert_eq!(reader.stub(), b"<?php echo 'custom'; __HALT_COMPILER(); ?>\r\n");
    assert!(reader.record(&PharPath::new("index.php").unwrap()).is_none());
}

#[test]
fn explicit_files_survive_the_blacklist() {
    let dir = project(r#"{"files": ["file1"], "blacklist": ["file1"], "main": false}"#);
    write(dir.path(), "file1", "one");
    let output = build_ok(&config(&dir));

    let reader = PharReader::open(&output).unwrap();
    assert_eq!(read(&reader, "file1"), b"one");
}

#[test]
fn compactors_run_in_configured_order() {
    let dir = project(
        r#"{
            "directories": ["src"],
            "compactors": ["php", "namespace-prefix"],
            "namespace-prefix": "Scoped",
            "main": false
        }"#,
    );
    write(dir.path(), "src/Lib.php", "<?php\n// namespace Fake;\nnamespace Lib;\nuse Dep\\Thing; # gone\n");
    let output = build_ok(&config(&dir));

    let reader = PharReader::open(&output).unwrap();
    assert_eq!(
        String::from_utf8(read(&reader, "src/Lib.php")).unwrap(),
        "<?php\n\nnamespace Scoped\\Lib;\nuse Scoped\\Dep\\Thing;\n"
    );
}

#[test]
fn placeholders_are_replaced() {
    let dir = project(r#"{"files": ["VERSION"], "main": false, "replacements": {"version": "1.4.0"}}"#);
    write(dir.path(), "VERSION", "v@version@\n");
    let output = build_ok(&config(&dir));

    let reader = PharReader::open(&output).unwrap();
    assert_eq!(read(&reader, "VERSION"), b"v1.4.0\n");
}

#[test]
fn metadata_mode_and_chmod() {
    let dir = project(
        r#"{
            "files": ["src/App.php"],
            "main": false,
            "metadata": {"built-by": "tests"},
            "file-mode": "0640",
            "chmod": "0750",
            "timestamp": 1700000000
        }"#,
    );
    let output = build_ok(&config(&dir));

    let reader = PharReader::open(&output).unwrap();
    let json = reader.metadata().json().unwrap().unwrap();
    assert_eq!(json["built-by"], "tests");

    let record = reader.record(&PharPath::new("src/App.php").unwrap()).unwrap();
    assert_eq!(record.permissions(), 0o640);
    assert_eq!(record.timestamp, 1_700_000_000);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}

#[test]
fn every_digest_verifies_and_tampering_fails() {
    for algorithm in ["MD5", "SHA1", "SHA256", "SHA512"] {
        let dir = project(&format!(r#"{{"directories": ["src"], "algorithm": "{algorithm}"}}"#));
        let output = build_ok(&config(&dir));

        let signature = signature::verify_file(&output, None).unwrap();
        assert_eq!(signature.algorithm(), Algorithm::from_name(algorithm).unwrap());

        let mut bytes = fs::read(&output).unwrap();
        bytes[10] ^= 0x01;
        fs::write(&output, &bytes).unwrap();
        assert!(matches!(
            signature::verify_file(&output, None),
            Err(SignatureError::Invalid(_))
        ));
    }
}

#[test]
fn openssl_signatures_ship_a_public_key() {
    let dir = project(r#"{"directories": ["src"], "algorithm": "OPENSSL", "key": "private.pem", "key-pass": "secret"}"#);

    let rsa = openssl::rsa::Rsa::generate(2048).unwrap();
    let pkey = openssl::pkey::PKey::from_rsa(rsa).unwrap();
    let pem = pkey
        .private_key_to_pem_pkcs8_passphrase(openssl::symm::Cipher::aes_256_cbc(), b"secret")
        .unwrap();
    fs::write(dir.path().join("private.pem"), pem).unwrap();

    let report = build(&config(&dir), &BuildOptions::default()).unwrap();
    let public_key = report.public_key.unwrap();
    assert_eq!(public_key, signature::public_key_path(&report.output));
    assert!(public_key.exists());

    let signature = signature::verify_file(&report.output, None).unwrap();
    assert_eq!(signature.algorithm(), Algorithm::OpenSsl);
}

#[test]
fn failed_builds_leave_no_output() {
    let dir = project(r#"{"directories": ["src"], "compactors": ["json"]}"#);
    write(dir.path(), "src/broken.json", "{nope");
    let config = config(&dir);

    match build(&config, &BuildOptions::default()) {
        Err(BuildError::Compaction(e)) => {
            assert_eq!(e.path.as_str(), "src/broken.json");
            assert_eq!(e.compactor, "json");
        }
        other => panic!("expected a compaction error, got {other:?}"),
    }
    assert!(!config.output.exists());
    assert!(!config.tmp_output().exists());
}

#[test]
fn requirement_checker_must_be_archived() {
    let config_text = r#"{"alias": "app.phar", "directories": ["src"], "check-requirements": true}"#;
    let dir = project(config_text);
    assert!(matches!(
        build(&config(&dir), &BuildOptions::default()),
        Err(BuildError::MissingRequirementChecker)
    ));

    let dir = project(
        r#"{
            "alias": "app.phar",
            "directories": ["src"],
            "files": [".pharbox/bin/check-requirements.php"],
            "check-requirements": true
        }"#,
    );
    write(dir.path(), ".pharbox/bin/check-requirements.php", "<?php\n");
    let output = build_ok(&config(&dir));

    let reader = PharReader::open(&output).unwrap();
    let stub = String::from_utf8(reader.stub().to_vec()).unwrap();
    assert!(stub.contains("require 'phar://app.phar/.pharbox/bin/check-requirements.php';"));
    assert!(reader
        .record(&PharPath::new(".pharbox/bin/check-requirements.php").unwrap())
        .is_some());
}

#[test]
fn mapping_two_files_onto_one_name_conflicts() {
    let dir = project(
        r#"{"files": ["a/x.txt", "b/x.txt"], "main": false, "map": [{"a/": "c/"}, {"b/": "c/"}]}"#,
    );
    write(dir.path(), "a/x.txt", "a");
    write(dir.path(), "b/x.txt", "b");

    match build(&config(&dir), &BuildOptions::default()) {
        Err(BuildError::Write(WriteError::FileConflict(path))) => assert_eq!(path.as_str(), "c/x.txt"),
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[test]
fn extraction_to_a_temporary_directory_and_purge() {
    let dir = project(BASIC);
    let output = build_ok(&config(&dir));

    let stub_length = extract::find_stub_length(&output, None).unwrap();
    let extracted = extract::extract(&output, stub_length, None).unwrap();
    assert!(extracted.join("src/App.php").is_file());

    extract::purge(&extracted).unwrap();
    assert!(!extracted.exists());
}

#[cfg(unix)]
mod symlinks {
    use super::*;
    use std::os::unix::fs::symlink;

    fn rejected(config: &str, setup: impl FnOnce(&Path)) -> (PathBuf, Origin) {
        let dir = project(config);
        setup(dir.path());

        let config = Config::discover(dir.path()).unwrap();
        match build(&config, &BuildOptions::default()) {
            Err(BuildError::Collect(CollectError::Symlink { path, origin })) => {
                (path.strip_prefix(&config.base_path).unwrap().to_path_buf(), origin)
            }
            other => panic!("expected a symlink error, got {other:?}"),
        }
    }

    #[test]
    fn explicit_file() {
        let (path, origin) = rejected(r#"{"files": ["link.php"]}"#, |root| {
            symlink(root.join("src/App.php"), root.join("link.php")).unwrap();
        });
        assert_eq!(path, Path::new("link.php"));
        assert_eq!(origin, Origin::File);
    }

    #[test]
    fn explicit_directory() {
        let (path, origin) = rejected(r#"{"directories": ["src"]}"#, |root| {
            symlink(root.join("res/logo.png"), root.join("src/logo.png")).unwrap();
        });
        assert_eq!(path, Path::new("src/logo.png"));
        assert_eq!(origin, Origin::Directory);
    }

    #[test]
    fn finder_append() {
        let (path, origin) = rejected(
            r#"{"finder": [{"in": "src", "append": ["bin/tool"]}]}"#,
            |root| {
                fs::create_dir(root.join("bin")).unwrap();
                symlink(root.join("index.php"), root.join("bin/tool")).unwrap();
            },
        );
        assert_eq!(path, Path::new("bin/tool"));
        assert_eq!(origin, Origin::FinderAppend);
    }

    #[test]
    fn explicit_file_below_a_symlinked_directory() {
        let (path, origin) = rejected(r#"{"files": ["link/a.php"]}"#, |root| {
            fs::create_dir(root.join("real")).unwrap();
            fs::write(root.join("real/a.php"), "<?php").unwrap();
            symlink(root.join("real"), root.join("link")).unwrap();
        });
        assert_eq!(path, Path::new("link"));
        assert_eq!(origin, Origin::File);
    }

    #[test]
    fn binary_file_below_a_symlinked_directory() {
        let (path, origin) = rejected(r#"{"files-bin": ["assets/logo.png"]}"#, |root| {
            symlink(root.join("res"), root.join("assets")).unwrap();
        });
        assert_eq!(path, Path::new("assets"));
        assert_eq!(origin, Origin::File);
    }

    #[test]
    fn symlinked_directory_root() {
        let (path, origin) = rejected(r#"{"directories": ["lib"]}"#, |root| {
            symlink(root.join("src"), root.join("lib")).unwrap();
        });
        assert_eq!(path, Path::new("lib"));
        assert_eq!(origin, Origin::Directory);
    }

    #[test]
    fn symlinked_finder_root() {
        let (path, origin) = rejected(r#"{"finder": [{"in": "lib"}]}"#, |root| {
            symlink(root.join("src"), root.join("lib")).unwrap();
        });
        assert_eq!(path, Path::new("lib"));
        assert_eq!(origin, Origin::FinderIn);
    }

    #[test]
    fn finder_append_below_a_symlinked_directory() {
        let (path, origin) = rejected(
            r#"{"finder": [{"in": "src", "append": ["assets/logo.png"]}]}"#,
            |root| {
                symlink(root.join("res"), root.join("assets")).unwrap();
            },
        );
        assert_eq!(path, Path::new("assets"));
        assert_eq!(origin, Origin::FinderAppend);
    }

    #[test]
    fn finder_in() {
        let (path, origin) = rejected(r#"{"finder": [{"in": "src"}]}"#, |root| {
            symlink(root.join("res"), root.join("src/assets")).unwrap();
        });
        assert_eq!(path, Path::new("src/assets"));
        assert_eq!(origin, Origin::FinderIn);
    }
}

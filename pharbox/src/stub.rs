//! Generates the PHP bootstrap placed in front of the archive manifest.

use crate::config::Config;

/// Where the requirement checker lives inside the archive.
pub const REQUIREMENT_CHECKER: &str = ".pharbox/bin/check-requirements.php";

/// Everything the generated stub depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubGenerator {
    pub shebang: Option<String>,
    pub banner: Option<String>,
    pub alias: Option<String>,
    /// Archive path of the script to run.
    pub index: Option<String>,
    pub intercept: bool,
    pub check_requirements: bool,
}

/// Quotes `s` as a single-quoted PHP string literal.
fn php_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

impl StubGenerator {
    pub fn from_config(config: &Config, index: Option<String>) -> StubGenerator {
        StubGenerator {
            shebang: config.shebang.clone(),
            banner: config.banner.clone(),
            alias: config.alias.clone(),
            index,
            intercept: config.intercept,
            check_requirements: config.check_requirements,
        }
    }

    /// A PHP expression for `path` inside the running archive.
    fn phar_path(&self, path: &str) -> String {
        match &self.alias {
            Some(alias) => php_string(&format!("phar://{alias}/{path}")),
            None => format!("'phar://' . __FILE__ . {}", php_string(&format!("/{path}"))),
        }
    }

    pub fn generate(&self) -> String {
        let mut lines: Vec<String> = vec![];

        if let Some(shebang) = &self.shebang {
            lines.push(shebang.clone());
        }
        lines.push("<?php".into());
        lines.push(String::new());

        if let Some(banner) = &self.banner {
            lines.push("/*".into());
            for line in banner.replace("*/", "*\\/").lines() {
                if line.is_empty() {
                    lines.push(" *".into());
                } else {
                    lines.push(format!(" * {line}"));
                }
            }
            lines.push(" */".into());
            lines.push(String::new());
        }

        let mut setup = false;
        if let Some(alias) = &self.alias {
            lines.push(format!("Phar::mapPhar({});", php_string(alias)));
            setup = true;
        }
        if self.intercept {
            lines.push("Phar::interceptFileFuncs();".into());
            setup = true;
        }
        if setup {
            lines.push(String::new());
        }

        if self.check_requirements {
            lines.push("// Check requirements".into());
            lines.push(format!("require {};", self.phar_path(REQUIREMENT_CHECKER)));
            lines.push(String::new());
        }

        if let Some(index) = &self.index {
            lines.push(format!("require {};", self.phar_path(index)));
            lines.push(String::new());
        }

        lines.push("__HALT_COMPILER(); ?>".into());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_is_byte_exact() {
        let stub = StubGenerator {
            alias: Some("test.phar".into()),
            index: Some("index.php".into()),
            intercept: true,
            check_requirements: true,
            ..StubGenerator::default()
        };

        assert_eq!(
            stub.generate(),
            "<?php\n\
             \n\
             Phar::mapPhar('test.phar');\n\
             Phar::interceptFileFuncs();\n\
             \n\
             // Check requirements\n\
             require 'phar://test.phar/.pharbox/bin/check-requirements.php';\n\
             \n\
             require 'phar://test.phar/index.php';\n\
             \n\
             __HALT_COMPILER(); ?>"
        );
    }

    #[test]
    fn shebang_and_banner() {
        let stub = StubGenerator {
            shebang: Some("#!/usr/bin/env php".into()),
            banner: Some("Acme CLI\n\n(c) Acme */".into()),
            ..StubGenerator::default()
        };

        assert_eq!(
            stub.generate(),
            "#!/usr/bin/env php\n<?php\n\n/*\n * Acme CLI\n *\n * (c) Acme *\\/\n */\n\n__HALT_COMPILER(); ?>"
        );
    }

    #[test]
    fn no_requirement_checker_reference_when_disabled() {
        let stub = StubGenerator {
            alias: Some("app.phar".into()),
            index: Some("bin/app.php".into()),
            ..StubGenerator::default()
        };
        let out = stub.generate();
        assert!(!out.contains("check-requirements"));
        assert!(!out.contains("interceptFileFuncs"));
        assert!(out.contains("require 'phar://app.phar/bin/app.php';"));
    }

    #[test]
    fn without_alias_paths_use_the_file() {
        let stub = StubGenerator {
            index: Some("index.php".into()),
            ..StubGenerator::default()
        };
        assert!(stub
            .generate()
            .contains("require 'phar://' . __FILE__ . '/index.php';"));
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(php_string(r"it's a\b"), r"'it\'s a\\b'");
    }

    #[test]
    fn from_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_json_str(r#"{"alias": "x.phar", "banner": false}"#, dir.path()).unwrap();
        let stub = StubGenerator::from_config(&config, Some("index.php".into()));

        assert_eq!(stub.shebang.as_deref(), Some("#!/usr/bin/env php"));
        assert_eq!(stub.banner, None);
        assert!(!stub.check_requirements);
        assert!(stub.generate().starts_with("#!/usr/bin/env php\n<?php\n\nPhar::mapPhar('x.phar');"));
    }
}

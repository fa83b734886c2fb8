use phar_format::PharPath;

use super::Compactor;
use crate::error::CompactFailure;

/// Re-encodes JSON documents without insignificant whitespace. Key order is
/// preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Compactor for Json {
    fn name(&self) -> &'static str {
        "json"
    }

    fn supports(&self, path: &PharPath) -> bool {
        matches!(path.extension().as_deref(), Some("json") | Some("lock"))
    }

    fn compact(&self, _path: &PharPath, contents: Vec<u8>) -> Result<Vec<u8>, CompactFailure> {
        let value: serde_json::Value = serde_json::from_slice(&contents).map_err(CompactFailure::Json)?;
        serde_json::to_vec(&value).map_err(CompactFailure::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PharPath {
        PharPath::new(s).unwrap()
    }

    #[test]
    fn minifies_keeping_key_order() {
        let src = b"{\n    \"name\": \"acme/app\",\n    \"autoload\": {\"psr-4\": {}},\n    \"a\": [1, 2]\n}\n";
        let out = Json.compact(&path("composer.json"), src.to_vec()).unwrap();
        assert_eq!(out, br#"{"name":"acme/app","autoload":{"psr-4":{}},"a":[1,2]}"#);
    }

    #[test]
    fn lock_files_are_json() {
        assert!(Json.supports(&path("composer.lock")));
        assert!(Json.supports(&path("config/App.JSON")));
        assert!(!Json.supports(&path("app.php")));
    }

    #[test]
    fn invalid_json_fails() {
        assert!(matches!(
            Json.compact(&path("a.json"), b"{\"a\": }".to_vec()),
            Err(CompactFailure::Json(_))
        ));
    }
}

use std::fmt;

#[derive(Debug, Clone)]
pub enum IntoPharPathError {
    UnrepresentableStr,
    Absolute,
    ParentTraversal,
    OutsideBase,
    EmptyPath,
}

impl std::error::Error for IntoPharPathError {}

impl fmt::Display for IntoPharPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl IntoPharPathError {
    pub fn as_str(&self) -> &str {
        match self {
            IntoPharPathError::UnrepresentableStr => "unrepresentable string found in path",
            IntoPharPathError::Absolute => "absolute path received as input",
            IntoPharPathError::ParentTraversal => "path contains a `..` chunk",
            IntoPharPathError::OutsideBase => "path is outside of the base path",
            IntoPharPathError::EmptyPath => "no path provided",
        }
    }

    pub fn as_io_error(&self) -> std::io::Error {
        use std::io::{Error, ErrorKind};
        Error::new(ErrorKind::InvalidInput, self.as_str())
    }
}

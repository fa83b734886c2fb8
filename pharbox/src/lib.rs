//! Builds signed PHAR application archives from a PHP source tree.
//!
//! [`collector`] picks the files, [`compactor`] shrinks them, [`archive`]
//! stages them and [`build`] runs the whole pipeline down to a signed file
//! on disk.

pub mod archive;
pub mod build;
pub mod collector;
pub mod compactor;
pub mod config;
pub mod error;
pub mod mapper;
pub mod stub;

pub use archive::Archive;
pub use build::{build, BuildOptions, BuildReport};
pub use config::Config;
pub use error::{BuildError, Result};

pub mod build;
pub mod extract;
pub mod info;
pub mod validate;
pub mod verify;

pub use build::run as build;
pub use extract::run as extract;
pub use info::run as info;
pub use validate::run as validate;
pub use verify::run as verify;

use std::path::Path;

use pharbox::Config;

use crate::diagnostic::{Error, Result};

/// Loads `path`, or discovers the configuration in the working directory.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path),
        None => {
            let cwd = std::env::current_dir().map_err(|source| Error::CurrentDir { source })?;
            Config::discover(cwd)
        }
    };

    config.map_err(|source| Error::Config { source })
}

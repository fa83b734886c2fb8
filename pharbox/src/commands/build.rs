use pharbox::BuildOptions;

use crate::cli::BuildArgs;
use crate::diagnostic::{Error, Result};
use crate::util::format_size;

pub fn run(args: BuildArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;

    let options = BuildOptions {
        serial: args.serial,
    };
    let report = pharbox::build(&config, &options).map_err(|source| Error::Build {
        path: config.output.clone(),
        source,
    })?;

    if !args.quiet {
        println!(
            "Built {} ({} entries, {})",
            report.output.display(),
            report.entries,
            format_size(report.size)
        );
        println!(
            "Signature: {} {}",
            report.signature.algorithm(),
            report.signature.to_hex()
        );
        if let Some(public_key) = &report.public_key {
            println!("Public key: {}", public_key.display());
        }
    }

    Ok(())
}

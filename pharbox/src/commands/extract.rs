use phar_format::extract;

use crate::cli::ExtractArgs;
use crate::diagnostic::{Error, Result};

pub fn run(args: ExtractArgs) -> Result<()> {
    let extract_error = |source| Error::Extract {
        path: args.archive.clone(),
        source,
    };

    let marker = args.halt_marker.as_deref().map(str::as_bytes);
    let stub_length = extract::find_stub_length(&args.archive, marker).map_err(extract_error)?;
    let destination =
        extract::extract(&args.archive, stub_length, args.output.as_deref()).map_err(extract_error)?;

    if !args.quiet {
        println!("Extracted to {}", destination.display());
    }

    Ok(())
}

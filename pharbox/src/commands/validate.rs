use pharbox::compactor::Compactors;

use crate::cli::ValidateArgs;
use crate::diagnostic::{Error, Result};

pub fn run(args: ValidateArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let compactors = Compactors::from_config(&config).map_err(|source| Error::Config { source })?;

    match &config.config_path {
        Some(path) => println!("{} is valid.", path.display()),
        None => println!("The configuration is valid."),
    }

    println!("Base path:   {}", config.base_path.display());
    println!("Output:      {}", config.output.display());
    println!(
        "Main:        {}",
        config
            .main
            .as_ref()
            .map(|main| main.display().to_string())
            .unwrap_or_else(|| "(none)".into())
    );
    println!("Alias:       {}", config.alias.as_deref().unwrap_or("(none)"));
    println!("Compression: {}", config.compression);
    println!("Algorithm:   {}", config.algorithm);
    if compactors.is_empty() {
        println!("Compactors:  (none)");
    } else {
        println!("Compactors:  {}", compactors.names().join(", "));
    }
    println!(
        "Discovery:   {}",
        if config.autodiscovery() { "on" } else { "off" }
    );

    Ok(())
}

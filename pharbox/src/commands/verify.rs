use phar_format::signature;
use phar_format::SignatureError;

use crate::cli::VerifyArgs;
use crate::diagnostic::{Error, Result};

pub fn run(args: VerifyArgs) -> Result<()> {
    let path = args.archive;

    match signature::verify_file(&path, args.public_key.as_deref()) {
        Ok(signature) => {
            println!(
                "{}: {} signature OK ({})",
                path.display(),
                signature.algorithm(),
                signature.to_hex()
            );
            Ok(())
        }
        Err(SignatureError::NotSigned) => Err(Error::NotSigned { path }),
        Err(SignatureError::Invalid(algorithm)) => Err(Error::InvalidSignature { path, algorithm }),
        Err(source) => Err(Error::Verify { path, source }),
    }
}

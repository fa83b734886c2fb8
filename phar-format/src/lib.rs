mod compression;
mod de;
mod file;
pub mod fs;
mod header;
pub mod path;
mod record;
mod ser;
pub mod signature;

#[cfg(feature = "reader")]
pub mod extract;

pub use compression::Compression;
pub use file::{PharMetadata, DEFAULT_STUB, HALT_MARKER, HALT_TOKEN};
pub use header::{ManifestHeader, API_VERSION};
pub use path::PharPath;
pub use record::FileRecord;
pub use signature::{Algorithm, PrivateKey, Signature, SignatureError};

#[cfg(feature = "reader")]
pub use file::reader::{OpenError, PharReader};
#[cfg(feature = "writer")]
pub use file::writer::{Entry, PharWriter, WriteError};

//! The signature trailer: computing, appending, splitting and verifying it.
//!
//! Layout, from the end of the archive backwards:
//!
//! ```text
//! digest:   [digest][u32 le algorithm id]["GBMB"]
//! OpenSSL:  [signature][u32 le signature length][u32 le algorithm id]["GBMB"]
//! ```
//!
//! The signature always covers every byte preceding the trailer.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::Digest;

/// Magic bytes terminating a signature trailer.
pub const TRAILER_MAGIC: &[u8; 4] = b"GBMB";

pub mod constants {
    pub const SIGNATURE_MD5: u32 = 0x0001;
    pub const SIGNATURE_SHA1: u32 = 0x0002;
    pub const SIGNATURE_SHA256: u32 = 0x0003;
    pub const SIGNATURE_SHA512: u32 = 0x0004;
    pub const SIGNATURE_OPENSSL: u32 = 0x0010;
}

use self::constants::*;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("The archive is not signed (no signature trailer found).")]
    NotSigned,

    #[error("The signature does not match the archive contents ({0}).")]
    Invalid(Algorithm),

    #[error("Unrecognized signature algorithm id {0:#06x}.")]
    UnrecognizedAlgorithm(u32),

    #[error("The signature trailer is truncated.")]
    Truncated,

    #[error("The {0} signature algorithm requires a private key.")]
    MissingPrivateKey(Algorithm),

    #[error("The {0} signature algorithm requires a public key.")]
    MissingPublicKey(Algorithm),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Computing the {0} signature failed: {1}")]
    CryptoFailed(Algorithm, String),

    #[error("Compiled without support for {0} signatures.")]
    Unsupported(Algorithm),

    #[error("Failed to read file. Path: '{}'", .1.display())]
    ReadFailed(#[source] std::io::Error, PathBuf),
}

#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    OpenSsl,
}

impl Algorithm {
    pub const fn available_variants() -> &'static [&'static str] {
        &["MD5", "SHA1", "SHA256", "SHA512", "OPENSSL"]
    }

    pub const fn id(self) -> u32 {
        use Algorithm::*;

        match self {
            Md5 => SIGNATURE_MD5,
            Sha1 => SIGNATURE_SHA1,
            Sha256 => SIGNATURE_SHA256,
            Sha512 => SIGNATURE_SHA512,
            OpenSsl => SIGNATURE_OPENSSL,
        }
    }

    pub fn from_id(id: u32) -> Result<Algorithm, SignatureError> {
        use Algorithm::*;

        match id {
            SIGNATURE_MD5 => Ok(Md5),
            SIGNATURE_SHA1 => Ok(Sha1),
            SIGNATURE_SHA256 => Ok(Sha256),
            SIGNATURE_SHA512 => Ok(Sha512),
            SIGNATURE_OPENSSL => Ok(OpenSsl),
            other => Err(SignatureError::UnrecognizedAlgorithm(other)),
        }
    }

    /// Parses the configuration spelling of an algorithm, e.g. `SHA512`.
    pub fn from_name(name: &str) -> Option<Algorithm> {
        use Algorithm::*;

        match name.to_ascii_uppercase().replace('-', "").as_str() {
            "MD5" => Some(Md5),
            "SHA1" => Some(Sha1),
            "SHA256" => Some(Sha256),
            "SHA512" => Some(Sha512),
            "OPENSSL" => Some(OpenSsl),
            _ => None,
        }
    }

    /// Length of the digest in bytes; `None` for variable-length signatures.
    pub const fn digest_len(self) -> Option<usize> {
        use Algorithm::*;

        match self {
            Md5 => Some(16),
            Sha1 => Some(20),
            Sha256 => Some(32),
            Sha512 => Some(64),
            OpenSsl => None,
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Sha512
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Algorithm::*;

        let s = match self {
            Md5 => "MD5",
            Sha1 => "SHA-1",
            Sha256 => "SHA-256",
            Sha512 => "SHA-512",
            OpenSsl => "OpenSSL",
        };

        write!(f, "{}", s)
    }
}

impl fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    algorithm: Algorithm,
    bytes: Vec<u8>,
}

impl Signature {
    pub fn new(algorithm: Algorithm, bytes: Vec<u8>) -> Signature {
        Signature { algorithm, bytes }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }

    /// Number of bytes this signature occupies at the end of an archive.
    pub fn trailer_len(&self) -> usize {
        let length_field = match self.algorithm.digest_len() {
            Some(_) => 0,
            None => 4,
        };
        self.bytes.len() + length_field + 4 + TRAILER_MAGIC.len()
    }
}

/// PEM encoded private key material, optionally passphrase protected.
#[derive(Clone)]
pub struct PrivateKey {
    pem: Vec<u8>,
    passphrase: Option<String>,
}

impl PrivateKey {
    pub fn from_pem(pem: Vec<u8>, passphrase: Option<String>) -> PrivateKey {
        PrivateKey { pem, passphrase }
    }

    pub fn load<P: AsRef<Path>>(
        path: P,
        passphrase: Option<String>,
    ) -> Result<PrivateKey, SignatureError> {
        let pem = std::fs::read(path.as_ref())
            .map_err(|e| SignatureError::ReadFailed(e, path.as_ref().to_path_buf()))?;
        Ok(PrivateKey::from_pem(pem, passphrase))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("pem", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn digest(algorithm: Algorithm, data: &[u8]) -> Option<Vec<u8>> {
    use Algorithm::*;

    match algorithm {
        Md5 => Some(md5::Md5::digest(data).to_vec()),
        Sha1 => Some(sha1::Sha1::digest(data).to_vec()),
        Sha256 => Some(sha2::Sha256::digest(data).to_vec()),
        Sha512 => Some(sha2::Sha512::digest(data).to_vec()),
        OpenSsl => None,
    }
}

/// Signs `data`, which must be the whole archive minus any trailer.
pub fn sign(
    data: &[u8],
    algorithm: Algorithm,
    key: Option<&PrivateKey>,
) -> Result<Signature, SignatureError> {
    let bytes = match digest(algorithm, data) {
        Some(bytes) => bytes,
        None => {
            let key = key.ok_or(SignatureError::MissingPrivateKey(algorithm))?;
            openssl_sign(data, key)?
        }
    };

    tracing::debug!(%algorithm, bytes = data.len(), "signed archive");
    Ok(Signature { algorithm, bytes })
}

/// Appends the trailer for `signature` to `archive`.
pub fn append_trailer(mut archive: Vec<u8>, signature: &Signature) -> Vec<u8> {
    archive.reserve(signature.trailer_len());
    archive.extend_from_slice(&signature.bytes);
    if signature.algorithm.digest_len().is_none() {
        archive.extend_from_slice(&(signature.bytes.len() as u32).to_le_bytes());
    }
    archive.extend_from_slice(&signature.algorithm.id().to_le_bytes());
    archive.extend_from_slice(TRAILER_MAGIC);
    archive
}

fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

/// Splits an archive into the signed bytes and its signature.
pub fn split_trailer(bytes: &[u8]) -> Result<(&[u8], Signature), SignatureError> {
    let len = bytes.len();
    if len < 8 || &bytes[len - 4..] != TRAILER_MAGIC {
        return Err(SignatureError::NotSigned);
    }

    let algorithm = Algorithm::from_id(read_u32_le(bytes, len - 8))?;
    let (sig_start, sig_end) = match algorithm.digest_len() {
        Some(digest_len) => {
            let end = len - 8;
            (end.checked_sub(digest_len).ok_or(SignatureError::Truncated)?, end)
        }
        None => {
            let end = len.checked_sub(12).ok_or(SignatureError::Truncated)?;
            let sig_len = read_u32_le(bytes, end) as usize;
            (end.checked_sub(sig_len).ok_or(SignatureError::Truncated)?, end)
        }
    };

    Ok((
        &bytes[..sig_start],
        Signature {
            algorithm,
            bytes: bytes[sig_start..sig_end].to_vec(),
        },
    ))
}

/// Recomputes the signature over the signed bytes and compares it with the
/// trailer. `public_key` is only consulted for OpenSSL signatures.
pub fn verify(bytes: &[u8], public_key: Option<&[u8]>) -> Result<bool, SignatureError> {
    let (data, signature) = split_trailer(bytes)?;
    let algorithm = signature.algorithm;

    let valid = match digest(algorithm, data) {
        Some(expected) => expected == signature.bytes,
        None => {
            let public_key = public_key.ok_or(SignatureError::MissingPublicKey(algorithm))?;
            openssl_verify(data, &signature.bytes, public_key)?
        }
    };

    tracing::debug!(%algorithm, valid, "verified archive signature");
    Ok(valid)
}

/// Where the public key of an OpenSSL-signed archive is kept.
pub fn public_key_path<P: AsRef<Path>>(archive: P) -> PathBuf {
    let mut path = archive.as_ref().as_os_str().to_owned();
    path.push(".pubkey");
    PathBuf::from(path)
}

/// Reads the signature of the archive at `path`.
pub fn read_signature<P: AsRef<Path>>(path: P) -> Result<Signature, SignatureError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| SignatureError::ReadFailed(e, path.to_path_buf()))?;
    split_trailer(&bytes).map(|(_, signature)| signature)
}

/// Verifies the archive at `path`. For OpenSSL signatures the public key is
/// read from `public_key`, or from the co-located `.pubkey` file.
pub fn verify_file<P: AsRef<Path>>(
    path: P,
    public_key: Option<&Path>,
) -> Result<Signature, SignatureError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| SignatureError::ReadFailed(e, path.to_path_buf()))?;
    let (_, signature) = split_trailer(&bytes)?;

    let key = match signature.algorithm.digest_len() {
        Some(_) => None,
        None => {
            let key_path = public_key
                .map(Path::to_path_buf)
                .unwrap_or_else(|| public_key_path(path));
            match std::fs::read(&key_path) {
                Ok(key) => Some(key),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SignatureError::MissingPublicKey(signature.algorithm))
                }
                Err(e) => return Err(SignatureError::ReadFailed(e, key_path)),
            }
        }
    };

    if verify(&bytes, key.as_deref())? {
        Ok(signature)
    } else {
        Err(SignatureError::Invalid(signature.algorithm))
    }
}

/// The PEM encoded public half of `key`.
#[cfg(feature = "openssl")]
pub fn public_key_pem(key: &PrivateKey) -> Result<Vec<u8>, SignatureError> {
    load_private_key(key)?
        .public_key_to_pem()
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

#[cfg(not(feature = "openssl"))]
pub fn public_key_pem(_key: &PrivateKey) -> Result<Vec<u8>, SignatureError> {
    Err(SignatureError::Unsupported(Algorithm::OpenSsl))
}

#[cfg(feature = "openssl")]
fn load_private_key(
    key: &PrivateKey,
) -> Result<openssl::pkey::PKey<openssl::pkey::Private>, SignatureError> {
    use openssl::pkey::PKey;

    match &key.passphrase {
        Some(passphrase) => PKey::private_key_from_pem_passphrase(&key.pem, passphrase.as_bytes()),
        None => PKey::private_key_from_pem(&key.pem),
    }
    .map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

#[cfg(feature = "openssl")]
fn openssl_sign(data: &[u8], key: &PrivateKey) -> Result<Vec<u8>, SignatureError> {
    use openssl::{hash::MessageDigest, sign::Signer};

    let failed = |e: openssl::error::ErrorStack| {
        SignatureError::CryptoFailed(Algorithm::OpenSsl, e.to_string())
    };

    let pkey = load_private_key(key)?;
    let mut signer = Signer::new(MessageDigest::sha1(), &pkey).map_err(failed)?;
    signer.update(data).map_err(failed)?;
    signer.sign_to_vec().map_err(failed)
}

#[cfg(feature = "openssl")]
fn openssl_verify(data: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, SignatureError> {
    use openssl::{hash::MessageDigest, pkey::PKey, sign::Verifier};

    let failed = |e: openssl::error::ErrorStack| {
        SignatureError::CryptoFailed(Algorithm::OpenSsl, e.to_string())
    };

    let pkey = PKey::public_key_from_pem(public_key)
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    let mut verifier = Verifier::new(MessageDigest::sha1(), &pkey).map_err(failed)?;
    verifier.update(data).map_err(failed)?;
    // A malformed signature is a mismatch, not a crypto failure.
    Ok(verifier.verify(signature).unwrap_or(false))
}

#[cfg(not(feature = "openssl"))]
fn openssl_sign(_data: &[u8], _key: &PrivateKey) -> Result<Vec<u8>, SignatureError> {
    Err(SignatureError::Unsupported(Algorithm::OpenSsl))
}

#[cfg(not(feature = "openssl"))]
fn openssl_verify(
    _data: &[u8],
    _signature: &[u8],
    _public_key: &[u8],
) -> Result<bool, SignatureError> {
    Err(SignatureError::Unsupported(Algorithm::OpenSsl))
}

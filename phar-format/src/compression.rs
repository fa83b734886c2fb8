use std::fmt;
use std::io::{Read, Result, Write};

pub mod constants {
    pub const COMPRESSION_NONE: u32 = 0x0000_0000;
    pub const COMPRESSION_GZ: u32 = 0x0000_1000;
    pub const COMPRESSION_BZ2: u32 = 0x0000_2000;
    pub const COMPRESSION_MASK: u32 = 0x0000_F000;
}

use self::constants::*;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
    Unknown(u32),
}

impl Compression {
    pub const fn available_variants() -> &'static [&'static str] {
        &["NONE", "GZ", "BZ2"]
    }

    /// Parses the configuration spelling of an algorithm (`NONE`, `GZ`, `BZ2`).
    pub fn from_name(name: &str) -> Option<Compression> {
        match name.to_ascii_uppercase().as_str() {
            "NONE" => Some(Compression::None),
            "GZ" | "GZIP" => Some(Compression::Gzip),
            "BZ2" | "BZIP2" => Some(Compression::Bzip2),
            _ => None,
        }
    }

    /// Decodes the compression bits of an entry's flags.
    pub const fn from_flags(flags: u32) -> Compression {
        match flags & COMPRESSION_MASK {
            COMPRESSION_NONE => Compression::None,
            COMPRESSION_GZ => Compression::Gzip,
            COMPRESSION_BZ2 => Compression::Bzip2,
            other => Compression::Unknown(other),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Compression::*;

        let s = match self {
            None => "None",
            Gzip => "GZ",
            Bzip2 => "BZ2",
            Unknown(id) => return write!(f, "Unknown(id: {:#x})", id),
        };

        write!(f, "{}", s)
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Compression {
    pub const fn id(self) -> u32 {
        use Compression::*;

        match self {
            None => COMPRESSION_NONE,
            Gzip => COMPRESSION_GZ,
            Bzip2 => COMPRESSION_BZ2,
            Unknown(id) => id,
        }
    }

    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        use Compression::*;

        match self {
            None => Ok(data.to_vec()),
            #[cfg(feature = "gzip")]
            Gzip => {
                let mut encoder = flate2::write::DeflateEncoder::new(
                    Vec::with_capacity(data.len() / 2),
                    flate2::Compression::default(),
                );
                encoder.write_all(data)?;
                encoder.finish()
            }
            #[cfg(feature = "bzip2")]
            Bzip2 => {
                let mut encoder = bzip2::write::BzEncoder::new(
                    Vec::with_capacity(data.len() / 2),
                    bzip2::Compression::best(),
                );
                encoder.write_all(data)?;
                encoder.finish()
            }
            Unknown(id) => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Cannot handle compression with id {:#x}", id),
            )),
            #[allow(unreachable_patterns)]
            missing => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Compiled without support for {:?}", missing),
            )),
        }
    }

    pub fn decompress_write<R: Read, W: Write>(self, mut reader: R, mut writer: W) -> Result<u64> {
        use Compression::*;

        match self {
            None => std::io::copy(&mut reader, &mut writer),
            #[cfg(feature = "gzip")]
            Gzip => std::io::copy(&mut flate2::read::DeflateDecoder::new(reader), &mut writer),
            #[cfg(feature = "bzip2")]
            Bzip2 => std::io::copy(&mut bzip2::read::BzDecoder::new(reader), &mut writer),
            Unknown(id) => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Cannot handle decompression with id {:#x}", id),
            )),
            #[allow(unreachable_patterns)]
            missing => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Compiled without support for {:?}", missing),
            )),
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len());
        self.decompress_write(data, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] =
        b"This, this, this, this, this is a compressable string string string string string.\n";

    #[test]
    fn none_is_identity() {
        let out = Compression::None.compress(SAMPLE).unwrap();
        assert_eq!(out, SAMPLE);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_shrinks_and_restores() {
        let out = Compression::Gzip.compress(SAMPLE).unwrap();
        assert!(out.len() < SAMPLE.len());
        assert_eq!(Compression::Gzip.decompress(&out).unwrap(), SAMPLE);
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn bzip2_restores() {
        let out = Compression::Bzip2.compress(SAMPLE).unwrap();
        assert!(out.starts_with(b"BZh"));
        assert_eq!(Compression::Bzip2.decompress(&out).unwrap(), SAMPLE);
    }

    #[test]
    fn unknown_is_an_error() {
        assert!(Compression::Unknown(0x4000).compress(SAMPLE).is_err());
        assert!(Compression::Unknown(0x4000).decompress(SAMPLE).is_err());
    }

    #[test]
    fn flags_round_trip_through_ids() {
        assert_eq!(Compression::from_flags(0x1000 | 0o644), Compression::Gzip);
        assert_eq!(Compression::from_flags(0x2000 | 0o755), Compression::Bzip2);
        assert_eq!(Compression::from_flags(0o644), Compression::None);
        assert_eq!(
            Compression::from_flags(0x3000),
            Compression::Unknown(0x3000)
        );
        assert_eq!(Compression::from_name("gz"), Some(Compression::Gzip));
        assert_eq!(Compression::from_name("zip"), None);
    }
}

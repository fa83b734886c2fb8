use std::io::Write;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::{header::ManifestHeader, path::PharPath, record::FileRecord};

pub(crate) fn len_u32(len: usize) -> std::io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("length {} does not fit in 32 bits", len),
        )
    })
}

pub(crate) trait Serialize {
    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;
}

impl Serialize for [u8] {
    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(len_u32(self.len())?)?;
        writer.write_all(self)
    }
}

impl Serialize for Vec<u8> {
    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.as_slice().write(writer)
    }
}

impl Serialize for String {
    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.as_bytes().write(writer)
    }
}

impl Serialize for PharPath {
    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.write(writer)
    }
}

impl Serialize for FileRecord {
    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.path.write(writer)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u32::<LittleEndian>(self.timestamp)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        self.metadata.write(writer)
    }
}

/// The manifest as a whole: header fields followed by every record. The
/// leading length field is computed here, so `header.manifest_length` is
/// ignored.
pub(crate) struct Manifest<'a> {
    pub(crate) header: &'a ManifestHeader,
    pub(crate) records: &'a [FileRecord],
}

impl Serialize for Manifest<'_> {
    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(len_u32(self.records.len())?)?;
        body.write_u16::<BigEndian>(self.header.api_version)?;
        body.write_u32::<LittleEndian>(self.header.flags)?;
        self.header.alias.write(&mut body)?;
        self.header.metadata.write(&mut body)?;

        for record in self.records {
            record.write(&mut body)?;
        }

        writer.write_u32::<LittleEndian>(len_u32(body.len())?)?;
        writer.write_all(&body)
    }
}

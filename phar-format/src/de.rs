use std::io::{Cursor, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::{header::ManifestHeader, path::PharPath, record::FileRecord};

/// Refuse to allocate more than the remaining input for a length prefix.
fn read_len<R: Read>(reader: &mut R, remaining: u64) -> std::io::Result<usize> {
    let len = reader.read_u32::<LittleEndian>()? as u64;
    if len > remaining {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("length prefix {} exceeds remaining {} bytes", len, remaining),
        ));
    }
    Ok(len as usize)
}

pub(crate) trait DeserializeOwned {
    fn deserialize_owned(reader: &mut Cursor<&[u8]>) -> std::io::Result<Self>
    where
        Self: Sized;
}

fn remaining(reader: &Cursor<&[u8]>) -> u64 {
    (reader.get_ref().len() as u64).saturating_sub(reader.position())
}

impl DeserializeOwned for Vec<u8> {
    fn deserialize_owned(reader: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let available = remaining(reader).saturating_sub(4);
        let len = read_len(reader, available)?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl DeserializeOwned for String {
    fn deserialize_owned(reader: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let bytes = <Vec<u8>>::deserialize_owned(reader)?;
        String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl DeserializeOwned for PharPath {
    fn deserialize_owned(reader: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let raw = String::deserialize_owned(reader)?;
        PharPath::new(&raw).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid entry name `{}`: {}", raw, e),
            )
        })
    }
}

impl DeserializeOwned for FileRecord {
    fn deserialize_owned(reader: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let start = reader.position();
        let path = PharPath::deserialize_owned(reader)?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let timestamp = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let flags = reader.read_u32::<LittleEndian>()?;
        let metadata = <Vec<u8>>::deserialize_owned(reader)?;
        let end = reader.position();
        tracing::debug!(start = format_args!("{:#x}", start), end = format_args!("{:#x}", end), bytes = end - start, %path, "deserialized FileRecord");

        Ok(FileRecord {
            path,
            uncompressed_size,
            timestamp,
            compressed_size,
            crc32,
            flags,
            metadata,
            offset: 0,
        })
    }
}

/// Reads the manifest beginning at the start of `data`. Returns the header and
/// the records in manifest order; record offsets are relative to the end of
/// the manifest.
pub(crate) fn read_manifest(data: &[u8]) -> std::io::Result<(ManifestHeader, Vec<FileRecord>)> {
    let mut outer = Cursor::new(data);
    let manifest_length = outer.read_u32::<LittleEndian>()?;
    let end = 4usize
        .checked_add(manifest_length as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "manifest length {} exceeds archive size {}",
                    manifest_length,
                    data.len()
                ),
            )
        })?;

    let mut reader = Cursor::new(&data[4..end]);
    let entry_count = reader.read_u32::<LittleEndian>()?;
    let api_version = reader.read_u16::<BigEndian>()?;
    let flags = reader.read_u32::<LittleEndian>()?;
    let alias = String::deserialize_owned(&mut reader)?;
    let metadata = <Vec<u8>>::deserialize_owned(&mut reader)?;

    let mut records = Vec::with_capacity((entry_count as usize).min(data.len() / 24));
    let mut offset = 0u64;
    for _ in 0..entry_count {
        let mut record = FileRecord::deserialize_owned(&mut reader)?;
        record.offset = offset;
        offset += record.compressed_size as u64;
        records.push(record);
    }

    tracing::debug!(
        bytes = manifest_length,
        count = entry_count,
        api = format_args!("{:#06x}", api_version),
        "deserialized manifest"
    );

    Ok((
        ManifestHeader {
            manifest_length,
            entry_count,
            api_version,
            flags,
            alias,
            metadata,
        },
        records,
    ))
}

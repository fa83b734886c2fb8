use phar_format::{Compression, PharReader, SignatureError};

use crate::cli::InfoArgs;
use crate::diagnostic::{Error, Result};
use crate::util::{format_size, format_timestamp};

pub fn run(args: InfoArgs) -> Result<()> {
    let reader = PharReader::open(&args.archive).map_err(|source| Error::OpenArchive {
        path: args.archive.clone(),
        source,
    })?;

    let meta = reader.metadata();
    let header = reader.header();

    println!("Stub:        {} bytes", reader.stub_length());
    println!("API version: {}", header.api_version());
    println!("Alias:       {}", header.alias().unwrap_or("(none)"));
    println!("Entries:     {}", meta.len());

    let count = |compression: Compression| {
        meta.records()
            .iter()
            .filter(|r| r.compression() == compression)
            .count()
    };
    println!(
        "Compression: {} gzip, {} bzip2, {} none",
        count(Compression::Gzip),
        count(Compression::Bzip2),
        count(Compression::None)
    );

    let uncompressed = meta.uncompressed_size();
    let compressed = meta.compressed_size();
    let ratio = if uncompressed == 0 {
        0.0
    } else {
        100.0 - (compressed as f64 / uncompressed as f64 * 100.0)
    };
    println!(
        "Size:        {} (stored: {}, {:.1}% saved)",
        format_size(uncompressed),
        format_size(compressed),
        ratio
    );

    match reader.signature() {
        Ok(signature) => println!("Signature:   {} {}", signature.algorithm(), signature.to_hex()),
        Err(SignatureError::NotSigned) => println!("Signature:   (not signed)"),
        Err(e) => println!("Signature:   unreadable ({e})"),
    }

    if let Some(json) = meta.json() {
        let value = json.map_err(|source| Error::Metadata {
            path: args.archive.clone(),
            source,
        })?;
        println!("Metadata:    {value}");
    }

    if args.list {
        println!();
        println!("{:>5}  {:>12}  {:>12}  {:<6}  {:<20}  Path", "Mode", "Size", "Stored", "Method", "Modified");
        for record in meta.records() {
            println!(
                "{:>5o}  {:>12}  {:>12}  {:<6}  {:<20}  {}",
                record.permissions(),
                format_size(u64::from(record.uncompressed_size)),
                format_size(u64::from(record.compressed_size)),
                record.compression().to_string(),
                format_timestamp(record.timestamp),
                record.path()
            );
        }
    }

    Ok(())
}

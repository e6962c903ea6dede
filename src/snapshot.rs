//! Snapshot Module
//!
//! Point-in-time image of a whole catalog on disk.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header                                 │
//! │ ┌──────────┬──────────┬──────────────┐ │
//! │ │Magic (4) │Version(2)│ Payload Len  │ │
//! │ │          │          │     (8)      │ │
//! │ └──────────┴──────────┴──────────────┘ │
//! ├────────────────────────────────────────┤
//! │ Payload (bincode CatalogImage)         │
//! ├────────────────────────────────────────┤
//! │ Footer                                 │
//! │ ┌──────────────────────────────────┐   │
//! │ │ CRC32 of payload (4)             │   │
//! │ └──────────────────────────────────┘   │
//! └────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The file is written to a sibling temp
//! file and renamed into place, so a crash mid-write leaves the previous
//! snapshot intact.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};
use crate::table::TableImage;

/// Magic bytes at the start of every snapshot
pub const MAGIC: &[u8; 4] = b"TKVS";

/// Current format version
pub const VERSION: u16 = 1;

/// Magic (4) + version (2) + payload length (8)
pub const HEADER_SIZE: usize = 14;

/// CRC32 (4)
pub const FOOTER_SIZE: usize = 4;

/// Everything a catalog needs to be rebuilt
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CatalogImage {
    /// Next ETag version of the catalog's clock
    pub(crate) next_version: u64,
    pub(crate) tables: Vec<TableImage>,
}

/// Encode and atomically write a snapshot
pub(crate) fn write(path: &Path, image: &CatalogImage) -> Result<()> {
    let payload = bincode::serialize(image)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;

        let file = writer
            .into_inner()
            .map_err(|e| TableError::Io(e.into_error()))?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and verify a snapshot
pub(crate) fn read(path: &Path) -> Result<CatalogImage> {
    let bytes = fs::read(path)?;

    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(TableError::SnapshotCorruption(format!(
            "file too small: {} bytes",
            bytes.len()
        )));
    }

    if &bytes[0..4] != MAGIC {
        return Err(TableError::SnapshotCorruption("bad magic bytes".to_string()));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(TableError::SnapshotCorruption(format!(
            "unsupported version {} (expected {})",
            version, VERSION
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[6..HEADER_SIZE]);
    let payload_len = u64::from_le_bytes(len_bytes) as usize;

    let expected_len = HEADER_SIZE
        .checked_add(payload_len)
        .and_then(|n| n.checked_add(FOOTER_SIZE));
    if expected_len != Some(bytes.len()) {
        return Err(TableError::SnapshotCorruption(format!(
            "payload length {} does not match file size {}",
            payload_len,
            bytes.len()
        )));
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let footer = &bytes[HEADER_SIZE + payload_len..];
    let stored_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let actual_crc = crc32fast::hash(payload);
    if stored_crc != actual_crc {
        return Err(TableError::SnapshotCorruption(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            stored_crc, actual_crc
        )));
    }

    Ok(bincode::deserialize(payload)?)
}

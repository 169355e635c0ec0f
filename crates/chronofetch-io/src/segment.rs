//! Cache segment format.
//!
//! ```text
//! +--------+---------+------------------+---------------------------+
//! | "CFSG" | version | blake3(payload)  | zstd(serde_json(Table))   |
//! | 4 B    | 1 B     | 32 B             | ...                       |
//! +--------+---------+------------------+---------------------------+
//! ```
//!
//! Segments are written to a `.tmp` sibling and renamed into place, so the
//! existence of a segment path always means a complete file.

use std::fs;
use std::path::{Path, PathBuf};

use chronofetch_core::table::Table;

use crate::error::{Error, Result};

pub const MAGIC: &[u8; 4] = b"CFSG";
pub const FORMAT_VERSION: u8 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 1 + DIGEST_LEN;
const ZSTD_LEVEL: i32 = 3;

pub fn encode(table: &Table) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(table)?;
    let payload = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;
    let digest = blake3::hash(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(digest.as_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode segment bytes; `path` is only used in error messages.
pub fn decode(bytes: &[u8], path: &Path) -> Result<Table> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::Segment(format!(
            "{} is not a cache segment",
            path.display()
        )));
    }
    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(Error::Segment(format!(
            "{} has unsupported segment version {version}",
            path.display()
        )));
    }
    let digest = &bytes[MAGIC.len() + 1..HEADER_LEN];
    let payload = &bytes[HEADER_LEN..];
    if blake3::hash(payload).as_bytes().as_slice() != digest {
        return Err(Error::Checksum {
            path: path.to_path_buf(),
        });
    }
    let json = zstd::decode_all(payload)?;
    Ok(serde_json::from_slice(&json)?)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `table` to `path`, creating parent directories. Returns bytes written.
pub fn write_segment(path: &Path, table: &Table) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = encode(table)?;
    let tmp = temp_path(path);
    fs::write(&tmp, &bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(bytes.len() as u64)
}

pub fn read_segment(path: &Path) -> Result<Table> {
    let bytes = fs::read(path)?;
    decode(&bytes, path)
}

/// A cache hit: the segment file is present.
pub fn segment_exists(path: &Path) -> bool {
    path.is_file()
}

//! Binary snapshot framing shared by the index variants.
//!
//! # File Format
//!
//! - Header (24 bytes): magic `VSIX`, version (u32), variant tag (u32),
//!   dimension (u32), vector count (u64)
//! - Vectors: `count * dimension` f32 values in position order
//! - Variant payload: opaque bytes written by the variant
//! - Trailer: SHA-256 of every preceding byte
//!
//! All integers and floats are little endian. Any deviation found on read
//! is reported as `SnapshotCorrupt`.

use super::IndexKind;
use crate::error::{IndexError, IndexResult};
use crate::vector::{Position, VectorDimension};
use memmap2::MmapOptions;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Magic bytes to identify snapshot files.
const MAGIC_BYTES: &[u8; 4] = b"VSIX";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

const HEADER_SIZE: usize = 24;

const CHECKSUM_SIZE: usize = 32;

/// Decoded snapshot; the payload is interpreted by the variant.
#[derive(Debug)]
pub(crate) struct Snapshot {
    pub kind: IndexKind,
    pub dimension: VectorDimension,
    pub vectors: Vec<Vec<f32>>,
    pub payload: Vec<u8>,
}

/// Writes a snapshot through a temp file in the target directory.
pub(crate) fn write_snapshot(
    path: &Path,
    kind: IndexKind,
    dimension: VectorDimension,
    vectors: &[Vec<f32>],
    payload: &[u8],
) -> IndexResult<()> {
    let persistence = |source: std::io::Error| IndexError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(persistence)?;

    let dim = u32::try_from(dimension.get()).map_err(|_| IndexError::General(format!(
        "Dimension {} does not fit the snapshot format",
        dimension.get()
    )))?;

    let temp = NamedTempFile::new_in(dir).map_err(persistence)?;
    {
        let mut writer = HashingWriter::new(BufWriter::new(temp.as_file()));
        writer.write_all(MAGIC_BYTES).map_err(persistence)?;
        writer
            .write_all(&SNAPSHOT_VERSION.to_le_bytes())
            .map_err(persistence)?;
        writer
            .write_all(&kind.to_tag().to_le_bytes())
            .map_err(persistence)?;
        writer.write_all(&dim.to_le_bytes()).map_err(persistence)?;
        writer
            .write_all(&(vectors.len() as u64).to_le_bytes())
            .map_err(persistence)?;

        for vector in vectors {
            for &value in vector {
                writer.write_all(&value.to_le_bytes()).map_err(persistence)?;
            }
        }
        writer.write_all(payload).map_err(persistence)?;

        let digest = writer.hasher.finalize();
        writer.inner.write_all(&digest).map_err(persistence)?;
        writer.inner.flush().map_err(persistence)?;
    }
    temp.as_file().sync_all().map_err(persistence)?;
    temp.persist(path).map_err(|e| persistence(e.error))?;

    tracing::debug!(
        "Wrote {kind} snapshot with {} vectors to {}",
        vectors.len(),
        path.display()
    );
    Ok(())
}

/// Reads the SHA-256 trailer of a snapshot as lowercase hex.
///
/// Only the trailer is read; `read_snapshot` verifies it against the body.
pub(crate) fn read_checksum(path: &Path) -> IndexResult<String> {
    let corrupt = |reason: String| IndexError::SnapshotCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let mut file = File::open(path).map_err(|e| corrupt(format!("cannot open: {e}")))?;
    let len = file
        .metadata()
        .map_err(|e| corrupt(format!("cannot stat: {e}")))?
        .len();
    if len < (HEADER_SIZE + CHECKSUM_SIZE) as u64 {
        return Err(corrupt("file too small to contain header".to_string()));
    }

    let mut trailer = [0u8; CHECKSUM_SIZE];
    file.seek(SeekFrom::End(-(CHECKSUM_SIZE as i64)))
        .and_then(|_| file.read_exact(&mut trailer))
        .map_err(|e| corrupt(format!("cannot read checksum: {e}")))?;
    Ok(hex_digest(&trailer))
}

/// Lowercase hex rendering of a digest.
pub(crate) fn hex_digest(digest: &[u8]) -> String {
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Reads and verifies a snapshot.
pub(crate) fn read_snapshot(path: &Path) -> IndexResult<Snapshot> {
    let corrupt = |reason: String| IndexError::SnapshotCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| corrupt(format!("cannot open: {e}")))?;
    // Snapshots are replaced by rename, never written in place.
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .map_err(|e| corrupt(format!("cannot map: {e}")))?;

    if mmap.len() < HEADER_SIZE + CHECKSUM_SIZE {
        return Err(corrupt("file too small to contain header".to_string()));
    }

    let body_len = mmap.len() - CHECKSUM_SIZE;
    let digest = Sha256::digest(&mmap[..body_len]);
    if digest.as_slice() != &mmap[body_len..] {
        return Err(corrupt("checksum mismatch".to_string()));
    }

    let mut reader = ByteReader::new(&mmap[..body_len]);
    if reader.take(4).map_err(&corrupt)? != MAGIC_BYTES {
        return Err(corrupt("invalid magic bytes".to_string()));
    }

    let version = reader.read_u32().map_err(&corrupt)?;
    if version != SNAPSHOT_VERSION {
        return Err(corrupt(format!(
            "unsupported version {version} (expected {SNAPSHOT_VERSION})"
        )));
    }

    let tag = reader.read_u32().map_err(&corrupt)?;
    let kind = IndexKind::from_tag(tag).ok_or_else(|| corrupt(format!("unknown variant {tag}")))?;

    let dimension = VectorDimension::new(reader.read_u32().map_err(&corrupt)? as usize)
        .map_err(|e| corrupt(e.to_string()))?;
    let count = usize::try_from(reader.read_u64().map_err(&corrupt)?)
        .map_err(|_| corrupt("vector count overflows".to_string()))?;
    if count > 0 && Position::from_index(count - 1).is_none() {
        return Err(corrupt(format!("{count} vectors exceed 32-bit positions")));
    }

    let mut vectors = Vec::with_capacity(count.min(reader.remaining() / 4 + 1));
    for _ in 0..count {
        vectors.push(reader.read_f32s(dimension.get()).map_err(&corrupt)?);
    }

    let payload = reader.rest().to_vec();

    Ok(Snapshot {
        kind,
        dimension,
        vectors,
        payload,
    })
}

/// Writer that feeds every byte into a SHA-256 hasher.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Little-endian cursor; errors are plain reasons the caller wraps.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        if self.remaining() < len {
            return Err(format!(
                "truncated at byte {}: needed {len} more bytes, found {}",
                self.offset,
                self.remaining()
            ));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, String> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub(crate) fn read_f32s(&mut self, len: usize) -> Result<Vec<f32>, String> {
        let bytes = self.take(len * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.offset..];
        self.offset = self.bytes.len();
        slice
    }

    /// Fails if unread bytes remain.
    pub(crate) fn finish(&self) -> Result<(), String> {
        if self.remaining() != 0 {
            return Err(format!("{} trailing bytes", self.remaining()));
        }
        Ok(())
    }
}

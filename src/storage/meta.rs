//! Metadata frame: the single commit point of the tree.
//!
//! `<base>.metadata` holds the current storage file number, the root node's
//! position and the degree, written after every successful flush. The first
//! 1000 bytes are reserved; the remainder of the frame is zero-padded.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TreeError};
use crate::types::Position;

pub(crate) const METADATA_LEN: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Metadata {
    pub(crate) storage_file_number: u64,
    pub(crate) root: Position,
    pub(crate) degree: u32,
}

pub(crate) fn metadata_path(base: &Path) -> PathBuf {
    let mut os_str = base.as_os_str().to_owned();
    os_str.push(".metadata");
    PathBuf::from(os_str)
}

pub(crate) fn read(path: &Path) -> Result<Metadata> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; METADATA_LEN];
    file.read_exact(&mut buf[..28])?;
    let storage_file_number = i64::from_be_bytes(buf[0..8].try_into().map_err(corrupt)?);
    let root_file_number = i64::from_be_bytes(buf[8..16].try_into().map_err(corrupt)?);
    let root_offset = i64::from_be_bytes(buf[16..24].try_into().map_err(corrupt)?);
    let degree = i32::from_be_bytes(buf[24..28].try_into().map_err(corrupt)?);
    if storage_file_number < 0 || root_file_number < 0 || root_offset < 0 {
        return Err(TreeError::Corruption(
            "metadata frame has negative position".into(),
        ));
    }
    if degree < 2 {
        return Err(TreeError::Corruption(format!(
            "metadata frame has degree {degree}, expected >= 2"
        )));
    }
    Ok(Metadata {
        storage_file_number: storage_file_number as u64,
        root: Position::new(root_file_number as u64, root_offset as u64),
        degree: degree as u32,
    })
}

pub(crate) fn write(path: &Path, metadata: &Metadata) -> Result<()> {
    let mut buf = [0u8; METADATA_LEN];
    buf[0..8].copy_from_slice(&(metadata.storage_file_number as i64).to_be_bytes());
    buf[8..16].copy_from_slice(&(metadata.root.file_number as i64).to_be_bytes());
    buf[16..24].copy_from_slice(&(metadata.root.offset as i64).to_be_bytes());
    buf[24..28].copy_from_slice(&(metadata.degree as i32).to_be_bytes());
    let mut file = File::create(path)?;
    file.write_all(&buf)?;
    Ok(())
}

fn corrupt<E>(_: E) -> TreeError {
    TreeError::Corruption("metadata frame truncated".into())
}

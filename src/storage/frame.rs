//! Serialization frame for one node slot.
//!
//! Layout (big-endian):
//!
//! ```text
//! is_root:    u8
//! can_delete: u8     reserved for compaction, always written 0
//! count:      i32
//! per key:    value_len: u32, value bytes,
//!             left_file: i64, left_offset: i64,
//!             right_file: i64, right_offset: i64,
//!             deleted: u8
//! ```
//!
//! A child link with `offset == -1` is absent. The frame is padded with
//! zeros to the fixed slot size by the writer.

use crate::datum::Datum;
use crate::error::{Result, TreeError};
use crate::tree::key::Key;
use crate::tree::node::Node;
use crate::tree::node_ref::NodeRef;
use crate::types::{Position, CHILD_ABSENT};

/// Serialize one node. Child positions are looked up through
/// `link_position` so the flush can serialize against freshly-allocated
/// positions without publishing them to readers before the write lands.
pub(crate) fn encode_node<T: Datum>(
    node: &Node<T>,
    link_position: &dyn Fn(&NodeRef<T>) -> Option<Position>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.push(node.is_root() as u8);
    out.push(0u8);
    let count = i32::try_from(node.keys().len())
        .map_err(|_| TreeError::Corruption("node key count exceeds i32".into()))?;
    out.extend_from_slice(&count.to_be_bytes());
    for key in node.keys() {
        let mut value_bytes = Vec::new();
        key.value().encode(&mut value_bytes);
        let len = u32::try_from(value_bytes.len())
            .map_err(|_| TreeError::Corruption("encoded value exceeds u32 length".into()))?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&value_bytes);
        write_link(&mut out, key.left(), link_position)?;
        write_link(&mut out, key.right(), link_position)?;
        out.push(key.is_deleted() as u8);
    }
    Ok(out)
}

pub(crate) fn decode_node<T: Datum>(
    buf: &[u8],
    degree: u32,
    resolve: &dyn Fn(Position) -> NodeRef<T>,
) -> Result<Node<T>> {
    let mut reader = FrameReader::new(buf);
    let is_root = reader.read_u8()? != 0;
    let _can_delete = reader.read_u8()?;
    let count = reader.read_i32()?;
    if count < 0 || count as u32 > degree {
        return Err(TreeError::Corruption(format!(
            "node key count {count} outside 0..={degree}"
        )));
    }
    let mut keys = Vec::with_capacity(count as usize);
    let mut prev_right: Option<NodeRef<T>> = None;
    for _ in 0..count {
        let len = reader.read_u32()? as usize;
        let value = T::decode(reader.read_bytes(len)?)?;
        let left = reader.read_link()?;
        let right = reader.read_link()?;
        let deleted = reader.read_u8()? != 0;
        let mut key = Key::new(value);
        if let Some(position) = left {
            // adjacent keys share their middle subtree
            let shared = prev_right
                .take()
                .filter(|handle| handle.position() == Some(position));
            key.set_left(Some(shared.unwrap_or_else(|| resolve(position))));
        }
        match right {
            Some(position) => {
                let handle = resolve(position);
                prev_right = Some(handle.clone());
                key.set_right(Some(handle));
            }
            None => prev_right = None,
        }
        key.set_deleted(deleted);
        keys.push(key);
    }
    Ok(Node::from_keys(keys, degree, is_root))
}

fn write_link<T: Datum>(
    out: &mut Vec<u8>,
    child: Option<&NodeRef<T>>,
    link_position: &dyn Fn(&NodeRef<T>) -> Option<Position>,
) -> Result<()> {
    match child {
        Some(handle) => {
            let position = link_position(handle).ok_or_else(|| {
                TreeError::Corruption("child link has no assigned position".into())
            })?;
            out.extend_from_slice(&(position.file_number as i64).to_be_bytes());
            out.extend_from_slice(&(position.offset as i64).to_be_bytes());
        }
        None => {
            out.extend_from_slice(&CHILD_ABSENT.to_be_bytes());
            out.extend_from_slice(&CHILD_ABSENT.to_be_bytes());
        }
    }
    Ok(())
}

struct FrameReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .at
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| TreeError::Corruption("node frame truncated".into()))?;
        let slice = &self.buf[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes: [u8; 4] = self
            .read_bytes(4)?
            .try_into()
            .map_err(|_| TreeError::Corruption("node frame truncated".into()))?;
        Ok(i32::from_be_bytes(bytes))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes: [u8; 4] = self
            .read_bytes(4)?
            .try_into()
            .map_err(|_| TreeError::Corruption("node frame truncated".into()))?;
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let bytes: [u8; 8] = self
            .read_bytes(8)?
            .try_into()
            .map_err(|_| TreeError::Corruption("node frame truncated".into()))?;
        Ok(i64::from_be_bytes(bytes))
    }

    fn read_link(&mut self) -> Result<Option<Position>> {
        let file_number = self.read_i64()?;
        let offset = self.read_i64()?;
        if offset == CHILD_ABSENT {
            return Ok(None);
        }
        if file_number < 0 || offset < 0 {
            return Err(TreeError::Corruption(format!(
                "negative child link {file_number}:{offset}"
            )));
        }
        Ok(Some(Position::new(file_number as u64, offset as u64)))
    }
}

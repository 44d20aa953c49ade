//! Byte-level persistence: fixed-size node slots, position allocation with
//! file rolling, and the batched flush write path.
//!
//! Every node occupies a slot of `degree * key_size_bytes` bytes. Fixed
//! slots let the writer pre-assign positions before serializing; the cost is
//! internal fragmentation and the `key_size_bytes` tuning knob. Storage is
//! append-only: mutated nodes are rewritten at fresh positions and the old
//! slots are abandoned for a future compaction pass.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::datum::Datum;
use crate::error::{Result, TreeError};
use crate::tree::node::Node;
use crate::tree::node_ref::NodeRef;
use crate::types::Position;

pub(crate) mod frame;
pub(crate) mod meta;

pub(crate) struct Storage {
    base: PathBuf,
    slot_bytes: u64,
    segment_bytes: u64,
    alloc: Mutex<AllocState>,
}

struct AllocState {
    file_number: u64,
    offset: u64,
}

impl Storage {
    /// Open storage over `base`, resuming allocation at the end of the
    /// current file.
    pub(crate) fn open(
        base: PathBuf,
        slot_bytes: u64,
        segment_bytes: u64,
        file_number: u64,
    ) -> Result<Self> {
        let storage = Self {
            base,
            slot_bytes,
            segment_bytes,
            alloc: Mutex::new(AllocState {
                file_number,
                offset: 0,
            }),
        };
        let offset = match std::fs::metadata(storage.file_path(file_number)) {
            Ok(info) => info.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        };
        storage.alloc.lock().offset = offset;
        Ok(storage)
    }

    pub(crate) fn current_file_number(&self) -> u64 {
        self.alloc.lock().file_number
    }

    pub(crate) fn metadata_path(&self) -> PathBuf {
        meta::metadata_path(&self.base)
    }

    /// Storage file for `file_number`: the base path for file 0, then
    /// `<base>.<n>` once the segment threshold rolls allocation forward.
    fn file_path(&self, file_number: u64) -> PathBuf {
        if file_number == 0 {
            return self.base.clone();
        }
        let mut os_str = self.base.as_os_str().to_owned();
        os_str.push(format!(".{file_number}"));
        PathBuf::from(os_str)
    }

    fn allocate(&self, state: &mut AllocState) -> Position {
        if state.offset > 0 && state.offset + self.slot_bytes > self.segment_bytes {
            state.file_number += 1;
            state.offset = 0;
            tracing::debug!(
                target: "madrona::storage",
                file_number = state.file_number,
                "rolled to a new storage file"
            );
        }
        let position = Position::new(state.file_number, state.offset);
        state.offset += self.slot_bytes;
        position
    }

    /// Flush the save queue: assign positions in pop order (children before
    /// parents, so parents serialize with their children's fresh
    /// positions), pad each frame to the slot size and write one contiguous
    /// batch per storage file. The fresh positions are published to the
    /// handles only after every write lands, so concurrent readers keep
    /// loading the previous incarnations until the batch is durable.
    /// Returns the saved handles so the caller can mark them cached.
    pub(crate) fn save<T: Datum>(
        &self,
        queue: &mut VecDeque<NodeRef<T>>,
    ) -> Result<Vec<NodeRef<T>>> {
        let mut alloc = self.alloc.lock();
        let mut pending: HashMap<usize, Position> = HashMap::new();
        let mut batches: Vec<WriteBatch> = Vec::new();
        let mut saved: Vec<(NodeRef<T>, Position)> = Vec::new();
        while let Some(handle) = queue.pop_front() {
            let position = self.allocate(&mut alloc);
            pending.insert(handle.id(), position);
            let mut bytes = handle.with_resident(|node| {
                frame::encode_node(node, &|child| {
                    pending.get(&child.id()).copied().or_else(|| child.position())
                })
            })?;
            if bytes.len() as u64 > self.slot_bytes {
                return Err(TreeError::Capacity(format!(
                    "serialized node is {} bytes but the slot holds {} \
                     (degree x key_size_bytes)",
                    bytes.len(),
                    self.slot_bytes
                )));
            }
            bytes.resize(self.slot_bytes as usize, 0);
            match batches.last_mut() {
                Some(batch) if batch.file_number == position.file_number => {
                    batch.bytes.extend_from_slice(&bytes);
                }
                _ => batches.push(WriteBatch {
                    file_number: position.file_number,
                    start: position.offset,
                    bytes,
                }),
            }
            saved.push((handle, position));
        }
        for batch in &batches {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(self.file_path(batch.file_number))?;
            file.seek(SeekFrom::Start(batch.start))?;
            file.write_all(&batch.bytes)?;
        }
        let saved = saved
            .into_iter()
            .map(|(handle, position)| {
                handle.set_position(position);
                handle
            })
            .collect::<Vec<_>>();
        tracing::trace!(
            target: "madrona::storage",
            nodes = saved.len(),
            batches = batches.len(),
            "flushed save queue"
        );
        Ok(saved)
    }

    /// Read and decode one node slot. Child links materialize through
    /// `resolve` so handles stay unique per position.
    pub(crate) fn load<T: Datum>(
        &self,
        position: Position,
        degree: u32,
        resolve: &dyn Fn(Position) -> NodeRef<T>,
    ) -> Result<Node<T>> {
        let mut file = File::open(self.file_path(position.file_number))?;
        file.seek(SeekFrom::Start(position.offset))?;
        let mut buf = vec![0u8; self.slot_bytes as usize];
        file.read_exact(&mut buf)?;
        frame::decode_node(&buf, degree, resolve)
    }

    pub(crate) fn write_metadata(&self, metadata: &meta::Metadata) -> Result<()> {
        meta::write(&self.metadata_path(), metadata)
    }
}

struct WriteBatch {
    file_number: u64,
    start: u64,
    bytes: Vec<u8>,
}

pub(crate) use meta::{metadata_path, read as read_metadata, Metadata};

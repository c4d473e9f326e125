//! The index block: a sorted block whose keys are separators between data blocks and whose
//! values point back at those blocks (spec.md §4.3).
//!
//! The index is itself stored as an ordinary [crate::block::Block] — no DBit sidecar, since an
//! index block's entry count is small relative to the data it describes and a full scan or plain
//! binary search over it is already cheap.  Each index entry's value is a serialized
//! [IndexValue]: the data block's [crate::BlockHandle] plus the first internal key stored in that
//! block, which the pilot and level-iterator machinery need to resolve cross-level comparisons
//! without re-opening the block.

use std::sync::Arc;

use buffertk::{stack_pack, v64, Unpacker};

use crate::block::{Block, BlockBuilder, BlockCursor};
use crate::{BlockHandle, Cursor, DBitOptions, Error};

/////////////////////////////////////////////// IndexValue /////////////////////////////////////////

/// One index entry's value: where the data block lives, and the first key stored in it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexValue {
    pub handle: BlockHandle,
    pub first_internal_key: Vec<u8>,
}

impl IndexValue {
    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.handle.pack_wire(&mut buf);
        let restarts: v64 = self.handle.restarts.into();
        let key_len: v64 = (self.first_internal_key.len() as u64).into();
        buf.extend_from_slice(&stack_pack(restarts).pack(key_len).to_vec());
        buf.extend_from_slice(&self.first_internal_key);
        buf
    }

    pub(crate) fn unpack(buf: &[u8]) -> Result<Self, Error> {
        let (mut handle, rest) = BlockHandle::unpack_wire(buf)?;
        let mut up = Unpacker::new(rest);
        let restarts: v64 = up.unpack()?;
        let key_len: v64 = up.unpack()?;
        handle.restarts = restarts.into();
        let key_len: usize = u64::from(key_len) as usize;
        let rest = up.remain();
        if rest.len() < key_len {
            return Err(Error::Corruption {
                core: Default::default(),
                context: "index value truncated before first_internal_key".to_string(),
            });
        }
        Ok(IndexValue {
            handle,
            first_internal_key: rest[..key_len].to_vec(),
        })
    }
}

/////////////////////////////////////////////// IndexBuilder ///////////////////////////////////////

/// Accumulates the index block as the table builder flushes data blocks.
#[derive(Debug)]
pub struct IndexBuilder {
    block: BlockBuilder,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self {
            block: BlockBuilder::new(&DBitOptions {
                enabled: false,
                max_discriminators: 0,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    pub fn num_entries(&self) -> usize {
        self.block.num_entries()
    }

    /// Record one data block.  `separator` must be >= every key stored in the block and < every
    /// key stored in the next one (spec.md §4.3 uses the block's last key, which satisfies this).
    pub fn add_block(&mut self, separator: &[u8], value: IndexValue) -> Result<(), Error> {
        self.block.add(separator, &value.pack())
    }

    pub fn finish(self) -> Vec<u8> {
        self.block.finish()
    }
}

/////////////////////////////////////////////// IndexReader /////////////////////////////////////////

/// A read-only view of a parsed index block.
#[derive(Clone, Debug)]
pub struct IndexReader {
    block: Block,
}

impl IndexReader {
    pub fn new(bytes: Arc<Vec<u8>>, content_start: usize, content_end: usize) -> Result<Self, Error> {
        Ok(Self {
            block: Block::new(bytes, content_start, content_end)?,
        })
    }

    pub fn num_entries(&self) -> usize {
        self.block.num_restarts()
    }

    pub fn cursor(&self) -> IndexCursor {
        IndexCursor {
            cursor: self.block.cursor(),
        }
    }
}

/// A cursor over the index block whose `value()` decodes to an [IndexValue] on demand.
#[derive(Clone, Debug)]
pub struct IndexCursor {
    cursor: BlockCursor,
}

impl IndexCursor {
    pub fn index_value(&self) -> Result<Option<IndexValue>, Error> {
        match self.cursor.value() {
            Some(bytes) => Ok(Some(IndexValue::unpack(bytes)?)),
            None => Ok(None),
        }
    }

    /// The restart index this cursor sits at; see [crate::block::BlockCursor::position].
    pub(crate) fn position(&self) -> isize {
        self.cursor.position()
    }

    /// Total number of data blocks described by this index.
    pub(crate) fn num_entries(&self) -> usize {
        self.cursor.num_restarts()
    }

    /// Jump directly to index entry `i`; see [crate::block::BlockCursor::seek_to_restart].
    pub(crate) fn seek_to_restart(&mut self, i: usize) -> Result<(), Error> {
        self.cursor.seek_to_restart(i)
    }

    /// Peek at index entry `i` without moving this cursor.  Used by the binary searches behind
    /// `TableCursor::position_to_count`/`advance_n` (spec.md §4.4.3's `Next(k)`) and by the pilot
    /// builders/readers that checkpoint restart positions.
    pub(crate) fn index_value_at(&self, i: usize) -> Result<IndexValue, Error> {
        IndexValue::unpack(self.cursor.value_at(i)?)
    }
}

impl Cursor for IndexCursor {
    fn seek_to_first(&mut self) -> Result<(), Error> {
        self.cursor.seek_to_first()
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        self.cursor.seek_to_last()
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), Error> {
        self.cursor.seek(key)
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<(), Error> {
        self.cursor.seek_for_prev(key)
    }

    fn prev(&mut self) -> Result<(), Error> {
        self.cursor.prev()
    }

    fn next(&mut self) -> Result<(), Error> {
        self.cursor.next()
    }

    fn key(&self) -> Option<&[u8]> {
        self.cursor.key()
    }

    fn value(&self) -> Option<&[u8]> {
        self.cursor.value()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_index_values() {
        let mut builder = IndexBuilder::new();
        builder
            .add_block(
                b"aaz",
                IndexValue {
                    handle: BlockHandle::new(0, 100, 4),
                    first_internal_key: b"aaa".to_vec(),
                },
            )
            .unwrap();
        builder
            .add_block(
                b"bbz",
                IndexValue {
                    handle: BlockHandle::new(105, 80, 3),
                    first_internal_key: b"baa".to_vec(),
                },
            )
            .unwrap();
        let content = builder.finish();
        let len = content.len();
        let reader = IndexReader::new(Arc::new(content), 0, len).unwrap();
        assert_eq!(2, reader.num_entries());
        let mut cursor = reader.cursor();
        cursor.seek_to_first().unwrap();
        cursor.next().unwrap();
        assert_eq!(Some(&b"aaz"[..]), cursor.key());
        let value = cursor.index_value().unwrap().unwrap();
        assert_eq!(0, value.handle.offset);
        assert_eq!(100, value.handle.size);
        assert_eq!(4, value.handle.restarts);
        assert_eq!(b"aaa".to_vec(), value.first_internal_key);
        cursor.next().unwrap();
        assert_eq!(Some(&b"bbz"[..]), cursor.key());
    }
}

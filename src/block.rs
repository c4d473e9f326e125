//! Data blocks: the base storage unit of a table.
//!
//! A block is a sorted, immutable sequence of `(key, value)` pairs.  Unlike the log-structured
//! blocks this module is descended from, every key is stored verbatim (no shared-prefix
//! compression) and every entry is a restart point — spec.md's data model has no timestamp or
//! tombstone dimension, so there's nothing prefix compression would need to reconstruct against.
//!
//! On-disk content layout (the bytes [crate::BlockHandle::load] hands back, trailer already
//! stripped):
//!
//! ```text
//! [ entry ]*                       varint(key_len) varint(value_len) key value, repeated
//! [ fixed32 ]*N                    restart offsets, relative to the start of content
//! [ u8 ]*(N-1)                     DBit ranks, present only if dbit_tag == 1
//! [ u8 ]*mask_len                  DBit partial-key mask, present only if dbit_tag == 1
//! [ fixed16 mask_len ]             present only if dbit_tag == 1
//! [ fixed32 N ]                    restart count
//! [ u8 dbit_tag ]                  0 = plain block, 1 = DBit sidecar present
//! ```
//!
//! The trailing `[fixed32 N][u8 tag]` is always exactly 5 bytes and always at a fixed offset from
//! the end, which is what lets a reader tell a DBit block from a plain one (and recover `N`) with
//! a single backward-relative read, instead of needing to scan forward from the unknown-length
//! entry region.  The DBit sidecar's own internal ordering (mask_len last, mask before it, ranks
//! before that) follows spec.md §3 exactly; only the wrapping trailer is this crate's choice.

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;

use buffertk::{stack_pack, v64, Unpacker};

use crate::dbit::{DBitBuilder, DBitIndex};
use crate::{check_key_len, check_value_len, compare_bytes, Cursor, DBitOptions, Error};

const DBIT_ABSENT: u8 = 0;
const DBIT_PRESENT: u8 = 1;
const TRAILER_LEN: usize = 5; // fixed32 N + u8 tag

fn varint_len(mut v: u64) -> usize {
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

fn corruption(context: impl Into<String>) -> Error {
    Error::Corruption {
        core: Default::default(),
        context: context.into(),
    }
}

/////////////////////////////////////////////// entries ////////////////////////////////////////////

/// Parse one `varint(key_len) varint(value_len) key value` record starting at `bytes[0]`.
/// Returns the key slice, the value slice, and the number of bytes the whole record occupies.
fn parse_entry(bytes: &[u8]) -> Result<(&[u8], &[u8], usize), Error> {
    let mut up = Unpacker::new(bytes);
    let key_len: v64 = up.unpack()?;
    let value_len: v64 = up.unpack()?;
    let key_len: u64 = key_len.into();
    let value_len: u64 = value_len.into();
    let header_len = bytes.len() - up.remain().len();
    let key_start = header_len;
    let key_end = key_start
        .checked_add(key_len as usize)
        .ok_or_else(|| corruption("key_len overflows block"))?;
    let value_end = key_end
        .checked_add(value_len as usize)
        .ok_or_else(|| corruption("value_len overflows block"))?;
    if bytes.len() < value_end {
        return Err(corruption("entry runs past the end of the block"));
    }
    Ok((&bytes[key_start..key_end], &bytes[key_end..value_end], value_end))
}

/////////////////////////////////////////////// Block //////////////////////////////////////////////

#[derive(Clone, Copy, Debug)]
struct DBitLayout {
    mask_off: usize,
    mask_len: usize,
    ranks_off: usize,
}

/// A parsed, immutable view of one data block's content bytes.  Cheap to clone: the content is
/// shared via `Arc`.
#[derive(Clone, Debug)]
pub struct Block {
    bytes: Arc<Vec<u8>>,
    content_start: usize,
    entries_end: usize,
    restarts_off: usize,
    num_restarts: usize,
    dbit: Option<DBitLayout>,
}

impl Block {
    /// Parse a block's content out of `bytes[content_start..content_end]`.
    pub fn new(bytes: Arc<Vec<u8>>, content_start: usize, content_end: usize) -> Result<Self, Error> {
        if content_end < content_start || content_end - content_start < TRAILER_LEN {
            return Err(Error::BlockTooSmall {
                core: Default::default(),
                length: content_end.saturating_sub(content_start),
                required: TRAILER_LEN,
            });
        }
        let content = &bytes[content_start..content_end];
        let len = content.len();
        let tag = content[len - 1];
        let mut count_bytes = [0u8; 4];
        count_bytes.copy_from_slice(&content[len - 5..len - 1]);
        let num_restarts = u32::from_le_bytes(count_bytes) as usize;
        let (dbit, restarts_local_off) = match tag {
            DBIT_ABSENT => (None, len - 5),
            DBIT_PRESENT => {
                if num_restarts == 0 {
                    return Err(corruption("dbit block claims zero restarts"));
                }
                if len < TRAILER_LEN + 2 {
                    return Err(Error::BlockTooSmall {
                        core: Default::default(),
                        length: len,
                        required: TRAILER_LEN + 2,
                    });
                }
                let mask_len_off = len - 5 - 2;
                let mut mask_len_bytes = [0u8; 2];
                mask_len_bytes.copy_from_slice(&content[mask_len_off..mask_len_off + 2]);
                let mask_len = u16::from_le_bytes(mask_len_bytes) as usize;
                let mask_off = mask_len_off
                    .checked_sub(mask_len)
                    .ok_or_else(|| corruption("dbit mask_len runs past the start of the block"))?;
                let ranks_len = num_restarts - 1;
                let ranks_off = mask_off
                    .checked_sub(ranks_len)
                    .ok_or_else(|| corruption("dbit ranks run past the start of the block"))?;
                (
                    Some(DBitLayout {
                        mask_off: content_start + mask_off,
                        mask_len,
                        ranks_off: content_start + ranks_off,
                    }),
                    ranks_off,
                )
            }
            _ => return Err(corruption("unknown dbit tag byte")),
        };
        let restarts_off_local = restarts_local_off
            .checked_sub(num_restarts * 4)
            .ok_or_else(|| corruption("restart array runs past the start of the block"))?;
        Ok(Self {
            bytes,
            content_start,
            entries_end: content_start + restarts_off_local,
            restarts_off: content_start + restarts_off_local,
            num_restarts,
            dbit,
        })
    }

    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    pub fn is_empty(&self) -> bool {
        self.num_restarts == 0
    }

    fn restart_offset(&self, i: usize) -> usize {
        let off = self.restarts_off + i * 4;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[off..off + 4]);
        self.content_start + u32::from_le_bytes(buf) as usize
    }

    fn entry_at(&self, i: usize) -> Result<(Range<usize>, Range<usize>), Error> {
        if i >= self.num_restarts {
            return Err(corruption("restart index out of range"));
        }
        let start = self.restart_offset(i);
        if start >= self.entries_end {
            return Err(corruption("restart offset runs past the entry region"));
        }
        let (key, value, _consumed) = parse_entry(&self.bytes[start..self.entries_end])?;
        let key_off = key.as_ptr() as usize - self.bytes.as_ptr() as usize;
        let value_off = value.as_ptr() as usize - self.bytes.as_ptr() as usize;
        Ok((key_off..key_off + key.len(), value_off..value_off + value.len()))
    }

    fn key_at(&self, i: usize) -> Result<&[u8], Error> {
        let (key_range, _) = self.entry_at(i)?;
        Ok(&self.bytes[key_range])
    }

    /// The value stored at restart `i`, without disturbing any cursor's position. Used by
    /// [crate::index::IndexCursor] and [crate::table::TableCursor] to peek at arbitrary index
    /// entries during the binary searches that back `Next(k)` (spec.md §4.4.3).
    pub(crate) fn value_at(&self, i: usize) -> Result<&[u8], Error> {
        let (_, value_range) = self.entry_at(i)?;
        Ok(&self.bytes[value_range])
    }

    pub fn dbit_index(&self) -> Option<DBitIndex<'_>> {
        self.dbit.map(|layout| {
            DBitIndex::new(
                &self.bytes[layout.mask_off..layout.mask_off + layout.mask_len],
                &self.bytes[self.restarts_off - (self.num_restarts - 1)..self.restarts_off],
            )
        })
    }

    /// Smallest restart index `p` such that `key_at(p) >= key` (or `num_restarts` if none).
    fn lower_bound(&self, key: &[u8]) -> Result<usize, Error> {
        if self.num_restarts == 0 {
            return Ok(0);
        }
        if let Some(dbit) = self.dbit_index() {
            let pkey = dbit.extract(key);
            let candidate = dbit.lookup(pkey).min(self.num_restarts - 1);
            let probe_key = self.key_at(candidate)?.to_vec();
            return dbit.finish_seek(candidate, &probe_key, key, self.num_restarts, |i| {
                self.key_at(i).map(|k| k.to_vec())
            });
        }
        let mut lo = 0usize;
        let mut hi = self.num_restarts;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let k = self.key_at(mid)?;
            if compare_bytes(k, key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Largest restart index with `key_at(idx) <= key`, or `-1` if none.
    fn upper_bound_le(&self, key: &[u8]) -> Result<isize, Error> {
        let p = self.lower_bound(key)?;
        if p < self.num_restarts && compare_bytes(self.key_at(p)?, key) == Ordering::Equal {
            Ok(p as isize)
        } else if p == 0 {
            Ok(-1)
        } else {
            Ok(p as isize - 1)
        }
    }

    pub fn cursor(&self) -> BlockCursor {
        BlockCursor {
            block: self.clone(),
            index: -1,
            current: None,
        }
    }
}

///////////////////////////////////////////// BlockCursor //////////////////////////////////////////

/// A cursor over one [Block].  `index == -1` is "before the first entry"; `index == num_restarts`
/// is "after the last entry"; both are valid resting states with `key()`/`value()` returning
/// `None`.
#[derive(Clone, Debug)]
pub struct BlockCursor {
    block: Block,
    index: isize,
    current: Option<(Range<usize>, Range<usize>)>,
}

impl BlockCursor {
    fn load(&mut self, i: usize) -> Result<(), Error> {
        self.current = Some(self.block.entry_at(i)?);
        Ok(())
    }

    fn clear(&mut self) {
        self.current = None;
    }

    /// The restart index this cursor currently sits at: `-1` before the first entry,
    /// `num_restarts()` after the last.  Used by [crate::table::TableCursor] and the pilot
    /// readers to snapshot and restore a cursor's position in O(1) rather than walking it.
    pub(crate) fn position(&self) -> isize {
        self.index
    }

    /// The total number of restarts (== entries, since this format restarts on every key) in
    /// the underlying block.
    pub(crate) fn num_restarts(&self) -> usize {
        self.block.num_restarts()
    }

    /// Jump directly to restart `i`, bypassing key comparisons entirely.  `i == num_restarts()`
    /// lands "after the last entry", matching the convention `seek_to_last` + `next` would reach.
    pub(crate) fn seek_to_restart(&mut self, i: usize) -> Result<(), Error> {
        self.index = i as isize;
        if i < self.block.num_restarts() {
            self.load(i)?;
        } else {
            self.clear();
        }
        Ok(())
    }

    /// The value stored at restart `i`, without moving this cursor.
    pub(crate) fn value_at(&self, i: usize) -> Result<&[u8], Error> {
        self.block.value_at(i)
    }
}

impl Cursor for BlockCursor {
    fn seek_to_first(&mut self) -> Result<(), Error> {
        self.index = -1;
        self.clear();
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        self.index = self.block.num_restarts as isize;
        self.clear();
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), Error> {
        check_key_len(key)?;
        let p = self.block.lower_bound(key)?;
        self.index = p as isize;
        if p < self.block.num_restarts {
            self.load(p)?;
        } else {
            self.clear();
        }
        Ok(())
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<(), Error> {
        check_key_len(key)?;
        let q = self.block.upper_bound_le(key)?;
        self.index = q;
        if q >= 0 {
            self.load(q as usize)?;
        } else {
            self.clear();
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<(), Error> {
        self.index -= 1;
        if self.index < 0 {
            self.index = -1;
            self.clear();
        } else {
            self.load(self.index as usize)?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<(), Error> {
        self.index += 1;
        if self.index as usize >= self.block.num_restarts {
            self.index = self.block.num_restarts as isize;
            self.clear();
        } else {
            self.load(self.index as usize)?;
        }
        Ok(())
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| &self.block.bytes[k.clone()])
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| &self.block.bytes[v.clone()])
    }
}

///////////////////////////////////////////// BlockBuilder /////////////////////////////////////////

/// Accumulates entries for one data block.
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    last_key: Vec<u8>,
    dbit: Option<DBitBuilder>,
}

impl BlockBuilder {
    pub fn new(dbit: &DBitOptions) -> Self {
        Self {
            buffer: Vec::new(),
            restarts: Vec::new(),
            last_key: Vec::new(),
            dbit: dbit.enabled.then(|| DBitBuilder::new(dbit.max_discriminators)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.restarts.is_empty()
    }

    pub fn num_entries(&self) -> usize {
        self.restarts.len()
    }

    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Estimate the block's serialized size if `(key, value)` were added next.  Ignores the DBit
    /// sidecar's size, which is at most one byte per entry plus a handful of mask bytes — noise
    /// against `block_size`, which is measured in kilobytes.
    pub fn estimate_size_after_kv(&self, key: &[u8], value: &[u8]) -> usize {
        let header = varint_len(key.len() as u64) + varint_len(value.len() as u64);
        self.buffer.len()
            + header
            + key.len()
            + value.len()
            + (self.restarts.len() + 1) * 4
            + TRAILER_LEN
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        check_key_len(key)?;
        check_value_len(value)?;
        if !self.restarts.is_empty() && compare_bytes(key, &self.last_key) != Ordering::Greater {
            return Err(Error::KeysMustBeInOrder {
                core: Default::default(),
                last_key: self.last_key.clone(),
                new_key: key.to_vec(),
            });
        }
        if let Some(dbit) = &mut self.dbit {
            dbit.add_key(key);
        }
        self.restarts.push(self.buffer.len() as u32);
        let key_len: v64 = (key.len() as u64).into();
        let value_len: v64 = (value.len() as u64).into();
        self.buffer
            .extend_from_slice(&stack_pack(key_len).pack(value_len).to_vec());
        self.buffer.extend_from_slice(key);
        self.buffer.extend_from_slice(value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        Ok(())
    }

    /// Finish the block, returning its content bytes (trailer not yet appended — the caller,
    /// [crate::table::TableBuilder], appends the CRC trailer once it knows the block's final
    /// offset).
    pub fn finish(self) -> Vec<u8> {
        let num_restarts = self.restarts.len();
        let mut content = self.buffer;
        for r in &self.restarts {
            content.extend_from_slice(&r.to_le_bytes());
        }
        let mut tag = DBIT_ABSENT;
        if let Some(dbit) = self.dbit {
            if num_restarts >= 2 {
                if let Some(sidecar) = dbit.finish(num_restarts) {
                    content.extend_from_slice(&sidecar.ranks);
                    content.extend_from_slice(&sidecar.mask);
                    content.extend_from_slice(&(sidecar.mask.len() as u16).to_le_bytes());
                    tag = DBIT_PRESENT;
                } else {
                    crate::DBIT_FALLBACK.click();
                }
            }
        }
        content.extend_from_slice(&(num_restarts as u32).to_le_bytes());
        content.push(tag);
        content
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

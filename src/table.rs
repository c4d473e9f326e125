//! Tables: data blocks, an index block, an optional pilot block, a metaindex block, and a fixed
//! footer, assembled into one file (spec.md §4.4).
//!
//! [TableBuilder] is a single-pass, forward-only writer: `add` keys in order, `finish` to get the
//! bytes.  [TableReader] opens a table for reading; rather than memory-map it, it reads the whole
//! file into one `Arc<Vec<u8>>` up front (per the design note in SPEC_FULL.md §5) so every block
//! access afterwards is a slice, not a syscall.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::block::{Block, BlockBuilder};
use crate::index::{IndexBuilder, IndexCursor, IndexReader, IndexValue};
use crate::{
    append_block_trailer, check_key_len, check_table_size, check_value_len, compare_bytes,
    padding_for_alignment, BlockHandle, Cursor, DBitOptions, Error, Footer, RandomRead,
    TableBuilderOptions, TableMetadata, FOOTER_SIZE, METAINDEX_MARS_PILOT_KEY,
    METAINDEX_PILOT_KEY,
};

/// A pilot block built separately (by [crate::pilot_perkey] or [crate::pilot_mars]) and handed to
/// [TableBuilder::finish] to be embedded in the table.
pub enum PilotBlock {
    PerKey(Vec<u8>),
    Mars(Vec<u8>),
}

/////////////////////////////////////////////// TableBuilder ///////////////////////////////////////

/// Builds one table file in memory.  `Add` keys in strictly increasing order, then `Finish`.
/// `Abandon` discards the builder without producing output — useful when a caller decides
/// partway through that the table isn't needed (e.g. a compaction that turned out to be a no-op).
pub struct TableBuilder {
    options: TableBuilderOptions,
    dbit: DBitOptions,
    data: Vec<u8>,
    current_block: BlockBuilder,
    first_key_in_block: Option<Vec<u8>>,
    index: IndexBuilder,
    last_key: Vec<u8>,
    num_entries: u64,
    num_data_blocks: u64,
    approximate_size: usize,
    closed: bool,
}

impl TableBuilder {
    pub fn new(options: TableBuilderOptions, dbit: DBitOptions) -> Self {
        Self {
            current_block: BlockBuilder::new(&dbit),
            options,
            dbit,
            data: Vec::new(),
            first_key_in_block: None,
            index: IndexBuilder::new(),
            last_key: Vec::new(),
            num_entries: 0,
            num_data_blocks: 0,
            approximate_size: 0,
            closed: false,
        }
    }

    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    fn logic_error(context: &str) -> Error {
        Error::LogicError {
            core: Default::default(),
            context: context.to_string(),
        }
    }

    /// Add one key-value pair.  Keys must be strictly increasing across the whole table.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Self::logic_error("add called after finish/abandon"));
        }
        check_key_len(key)?;
        check_value_len(value)?;
        if !self.last_key.is_empty() && compare_bytes(key, &self.last_key) != std::cmp::Ordering::Greater
        {
            return Err(Error::KeysMustBeInOrder {
                core: Default::default(),
                last_key: self.last_key.clone(),
                new_key: key.to_vec(),
            });
        }
        self.approximate_size += key.len() + value.len();
        check_table_size(self.approximate_size)?;
        if self.current_block.is_empty() {
            self.first_key_in_block = Some(key.to_vec());
        } else if self.current_block.estimate_size_after_kv(key, value) > self.options.block_size {
            self.flush_current_block()?;
            self.first_key_in_block = Some(key.to_vec());
        }
        self.current_block.add(key, value)?;
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        Ok(())
    }

    /// Force the current data block to flush even if it hasn't reached `block_size`.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.flush_current_block()
    }

    fn flush_current_block(&mut self) -> Result<(), Error> {
        if self.current_block.is_empty() {
            return Ok(());
        }
        // `self.num_entries` is incremented once per `add()`, so by the time a block is flushed
        // (either mid-`add` or from `finish`) it already equals the cumulative count of entries
        // through this block — exactly the value spec.md §3/§4.3 requires `handle.restarts` to
        // carry (P5), not this block's own entry count.
        let num_restarts = self.num_entries;
        let separator = self.current_block.last_key().to_vec();
        let first_internal_key = self
            .first_key_in_block
            .take()
            .unwrap_or_else(|| separator.clone());
        let block = std::mem::replace(&mut self.current_block, BlockBuilder::new(&self.dbit));
        let content = block.finish();
        self.append_block(&content, num_restarts, &separator, first_internal_key)?;
        self.num_data_blocks += 1;
        Ok(())
    }

    fn append_block(
        &mut self,
        content: &[u8],
        num_restarts: u64,
        separator: &[u8],
        first_internal_key: Vec<u8>,
    ) -> Result<(), Error> {
        let padding = padding_for_alignment(self.data.len() as u64, self.options.page_alignment);
        self.data.resize(self.data.len() + padding as usize, 0);
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(content);
        append_block_trailer(&mut self.data, content, 0);
        let handle = BlockHandle::new(offset, content.len() as u64, num_restarts);
        self.index.add_block(
            separator,
            IndexValue {
                handle,
                first_internal_key,
            },
        )
    }

    /// Abandon the builder.  No bytes are produced.
    pub fn abandon(self) {}

    /// Finish the table, optionally embedding a pilot block built by a higher-level caller that
    /// had access to both this table's keys and the next lower level's table.
    pub fn finish(mut self, pilot: Option<PilotBlock>) -> Result<Vec<u8>, Error> {
        self.flush_current_block()?;
        self.closed = true;

        let index_bytes = self.index.finish();
        let index_padding = padding_for_alignment(self.data.len() as u64, self.options.page_alignment);
        self.data.resize(self.data.len() + index_padding as usize, 0);
        let index_offset = self.data.len() as u64;
        self.data.extend_from_slice(&index_bytes);
        append_block_trailer(&mut self.data, &index_bytes, 0);
        let index_handle = BlockHandle::new(index_offset, index_bytes.len() as u64, 0);

        let mut meta = BlockBuilder::new(&DBitOptions {
            enabled: false,
            max_discriminators: 0,
        });
        if let Some(pilot) = pilot {
            let (key, bytes) = match pilot {
                PilotBlock::PerKey(bytes) => (METAINDEX_PILOT_KEY, bytes),
                PilotBlock::Mars(bytes) => (METAINDEX_MARS_PILOT_KEY, bytes),
            };
            let padding = padding_for_alignment(self.data.len() as u64, self.options.page_alignment);
            self.data.resize(self.data.len() + padding as usize, 0);
            let offset = self.data.len() as u64;
            self.data.extend_from_slice(&bytes);
            append_block_trailer(&mut self.data, &bytes, 0);
            let handle = BlockHandle::new(offset, bytes.len() as u64, 0);
            let mut wire = Vec::new();
            handle.pack_wire(&mut wire);
            meta.add(key, &wire)?;
        }
        let meta_bytes = meta.finish();
        let meta_padding = padding_for_alignment(self.data.len() as u64, self.options.page_alignment);
        self.data.resize(self.data.len() + meta_padding as usize, 0);
        let meta_offset = self.data.len() as u64;
        self.data.extend_from_slice(&meta_bytes);
        append_block_trailer(&mut self.data, &meta_bytes, 0);
        let metaindex_handle = BlockHandle::new(meta_offset, meta_bytes.len() as u64, 0);

        let footer = Footer {
            checksum_type: 0,
            metaindex_handle,
            index_handle,
        };
        self.data.extend_from_slice(&footer.encode());
        Ok(self.data)
    }
}

/////////////////////////////////////////////// TableReader /////////////////////////////////////////

fn load_block(whole: &Arc<Vec<u8>>, handle: &BlockHandle) -> Result<Block, Error> {
    handle.load(whole)?;
    let start = handle.offset as usize;
    let end = start + handle.size as usize;
    Block::new(Arc::clone(whole), start, end)
}

fn metaindex_lookup(meta: &Block, key: &[u8]) -> Result<Option<BlockHandle>, Error> {
    let mut cursor = meta.cursor();
    cursor.seek(key)?;
    if cursor.key() == Some(key) {
        let bytes = cursor.value().expect("key() returned Some so value() must too");
        let (handle, _rest) = BlockHandle::unpack_wire(bytes)?;
        Ok(Some(handle))
    } else {
        Ok(None)
    }
}

/// An opened, fully-loaded table.  Generic over the I/O capability `H` used to read the file; the
/// table itself is read entirely into memory at open time, so `H` is only needed during `open`.
pub struct TableReader<H> {
    whole: Arc<Vec<u8>>,
    index: IndexReader,
    pilot: Option<(BlockHandle, bool)>, // (handle, is_mars)
    metadata: TableMetadata,
    _marker: PhantomData<H>,
}

impl<H: RandomRead> TableReader<H> {
    pub fn open(handle: &H) -> Result<Self, Error> {
        let size = handle.size()?;
        if size < FOOTER_SIZE as u64 {
            return Err(Error::BlockTooSmall {
                core: Default::default(),
                length: size as usize,
                required: FOOTER_SIZE,
            });
        }
        let mut whole = vec![0u8; size as usize];
        handle.read_exact_at(&mut whole, 0)?;
        let whole = Arc::new(whole);
        let footer_bytes = &whole[size as usize - FOOTER_SIZE..];
        let footer = Footer::decode(footer_bytes)?;

        let meta_block = load_block(&whole, &footer.metaindex_handle)?;
        let pilot = if let Some(handle) = metaindex_lookup(&meta_block, METAINDEX_PILOT_KEY)? {
            Some((handle, false))
        } else {
            metaindex_lookup(&meta_block, METAINDEX_MARS_PILOT_KEY)?.map(|handle| (handle, true))
        };

        let index_start = footer.index_handle.offset as usize;
        let index = IndexReader::new(
            Arc::clone(&whole),
            index_start,
            index_start + footer.index_handle.size as usize,
        )?;

        // `handle.restarts` is the cumulative entry count through that block (P5), so the table's
        // total is whatever the last index entry carries, not a sum across entries.
        let mut num_entries = 0u64;
        let mut num_data_blocks = 0u64;
        let mut cursor = index.cursor();
        cursor.seek_to_first()?;
        loop {
            cursor.next()?;
            match cursor.index_value()? {
                Some(iv) => {
                    num_entries = iv.handle.restarts;
                    num_data_blocks += 1;
                }
                None => break,
            }
        }

        let metadata = TableMetadata {
            file_size: size,
            index_block: footer.index_handle,
            metaindex_block: footer.metaindex_handle,
            pilot_block: pilot.map(|(h, _)| h),
            num_entries,
            num_data_blocks,
        };

        Ok(Self {
            whole,
            index,
            pilot,
            metadata,
            _marker: PhantomData,
        })
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Whether this table carries a pilot block, and if so, which variant.
    pub fn pilot_handle(&self) -> Option<(BlockHandle, bool)> {
        self.pilot
    }

    pub(crate) fn bytes(&self) -> &Arc<Vec<u8>> {
        &self.whole
    }

    /// Point lookup. `None` if the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        check_key_len(key)?;
        let mut index_cursor = self.index.cursor();
        index_cursor.seek(key)?;
        let iv = match index_cursor.index_value()? {
            Some(iv) => iv,
            None => return Ok(None),
        };
        let block = load_block(&self.whole, &iv.handle)?;
        let mut cursor = block.cursor();
        cursor.seek(key)?;
        if cursor.key() == Some(key) {
            Ok(cursor.value().map(|v| v.to_vec()))
        } else {
            Ok(None)
        }
    }

    pub fn cursor(&self) -> TableCursor<H> {
        TableCursor {
            whole: Arc::clone(&self.whole),
            index_cursor: self.index.cursor(),
            data_cursor: None,
            _marker: PhantomData,
        }
    }
}

/////////////////////////////////////////////// TableCursor /////////////////////////////////////////

/// A cursor over a table: an [IndexCursor] paired with a cursor over whichever data block it
/// currently points at.
pub struct TableCursor<H> {
    whole: Arc<Vec<u8>>,
    index_cursor: IndexCursor,
    data_cursor: Option<crate::block::BlockCursor>,
    _marker: PhantomData<H>,
}

// Manually implemented so `H` need not be `Clone`; only the data actually need be.
impl<H> Clone for TableCursor<H> {
    fn clone(&self) -> Self {
        Self {
            whole: Arc::clone(&self.whole),
            index_cursor: self.index_cursor.clone(),
            data_cursor: self.data_cursor.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H> TableCursor<H> {
    fn load_block_at_index(&mut self) -> Result<bool, Error> {
        match self.index_cursor.index_value()? {
            Some(iv) => {
                let block = load_block(&self.whole, &iv.handle)?;
                self.data_cursor = Some(block.cursor());
                Ok(true)
            }
            None => {
                self.data_cursor = None;
                Ok(false)
            }
        }
    }

    /// How many entries this cursor has already yielded via `next()` since `seek_to_first`
    /// (i.e. the 0-based count of keys strictly before the current position, or the total count
    /// of keys visited so far if unpositioned between entries). Used to snapshot a cursor's
    /// progress into a pilot checkpoint (spec.md §4.5/§4.6).
    pub(crate) fn consumed(&self) -> Result<u64, Error> {
        let idx_pos = self.index_cursor.position();
        let cumulative_before: u64 = if idx_pos <= 0 {
            0
        } else {
            self.index_cursor.index_value_at(idx_pos as usize - 1)?.handle.restarts
        };
        let local = match &self.data_cursor {
            Some(dc) => {
                let p = dc.position();
                if p < 0 {
                    0
                } else {
                    (p as u64 + 1).min(dc.num_restarts() as u64)
                }
            }
            None => 0,
        };
        Ok(cumulative_before + local)
    }

    /// Find the data block holding the `count`-th entry (0-based), returning its index position
    /// and the cumulative count of entries in every earlier block.  `None` if `count` is at or
    /// past the table's total entry count.
    fn locate(&self, count: u64) -> Result<Option<(usize, u64)>, Error> {
        let n = self.index_cursor.num_entries();
        if n == 0 {
            return Ok(None);
        }
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let iv = self.index_cursor.index_value_at(mid)?;
            if iv.handle.restarts <= count {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo >= n {
            return Ok(None);
        }
        let cumulative_before = if lo == 0 {
            0
        } else {
            self.index_cursor.index_value_at(lo - 1)?.handle.restarts
        };
        Ok(Some((lo, cumulative_before)))
    }

    /// Reposition this cursor (via an O(log n) binary search over the index, not a linear walk)
    /// so that a subsequent `next()` yields the `count`-th entry (0-based); `count >=` the
    /// table's total entry count leaves the cursor exhausted. This is the primitive behind
    /// spec.md §4.4.3's `Next(k)` and behind restoring a pilot checkpoint's restart position.
    pub(crate) fn position_to_count(&mut self, count: u64) -> Result<(), Error> {
        match self.locate(count)? {
            None => {
                self.index_cursor.seek_to_last()?;
                self.index_cursor.next()?;
                self.data_cursor = None;
                Ok(())
            }
            Some((block_idx, cumulative_before)) => {
                self.index_cursor.seek_to_restart(block_idx)?;
                self.load_block_at_index()?;
                let local = count - cumulative_before;
                let dc = self.data_cursor.as_mut().expect("just loaded");
                if local == 0 {
                    dc.seek_to_first()?;
                } else {
                    dc.seek_to_restart(local as usize - 1)?;
                }
                Ok(())
            }
        }
    }

    /// Advance exactly `k` entries forward (spec.md §4.4.3's `Next(k)`), in O(log n) rather than
    /// `k` individual `next()` calls.
    pub fn advance_n(&mut self, k: u64) -> Result<(), Error> {
        let c = self.consumed()?;
        self.position_to_count(c + k)
    }
}

impl<H> Cursor for TableCursor<H> {
    fn seek_to_first(&mut self) -> Result<(), Error> {
        self.index_cursor.seek_to_first()?;
        self.data_cursor = None;
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        self.index_cursor.seek_to_last()?;
        self.data_cursor = None;
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), Error> {
        self.index_cursor.seek(key)?;
        if self.load_block_at_index()? {
            let dc = self.data_cursor.as_mut().expect("just loaded");
            dc.seek(key)?;
            if dc.key().is_none() {
                return self.next();
            }
        }
        Ok(())
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<(), Error> {
        self.index_cursor.seek(key)?;
        if self.index_cursor.index_value()?.is_none() {
            self.index_cursor.seek_to_last()?;
            self.index_cursor.prev()?;
        }
        if self.load_block_at_index()? {
            let dc = self.data_cursor.as_mut().expect("just loaded");
            dc.seek_for_prev(key)?;
            if dc.key().is_none() {
                return self.prev();
            }
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<(), Error> {
        loop {
            if let Some(dc) = &mut self.data_cursor {
                dc.prev()?;
                if dc.key().is_some() {
                    return Ok(());
                }
            }
            self.index_cursor.prev()?;
            if !self.load_block_at_index()? {
                return Ok(());
            }
            let dc = self.data_cursor.as_mut().expect("just loaded");
            dc.seek_to_last()?;
        }
    }

    fn next(&mut self) -> Result<(), Error> {
        loop {
            if let Some(dc) = &mut self.data_cursor {
                dc.next()?;
                if dc.key().is_some() {
                    return Ok(());
                }
            }
            self.index_cursor.next()?;
            if !self.load_block_at_index()? {
                return Ok(());
            }
            let dc = self.data_cursor.as_mut().expect("just loaded");
            dc.seek_to_first()?;
        }
    }

    fn key(&self) -> Option<&[u8]> {
        self.data_cursor.as_ref().and_then(|dc| dc.key())
    }

    fn value(&self) -> Option<&[u8]> {
        self.data_cursor.as_ref().and_then(|dc| dc.value())
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn build_table(entries: &[(&[u8], &[u8])], block_size: usize) -> Arc<Vec<u8>> {
        let options = TableBuilderOptions {
            block_size,
            page_alignment: 0,
        };
        let mut builder = TableBuilder::new(options, DBitOptions::default());
        for (k, v) in entries {
            builder.add(k, v).unwrap();
        }
        Arc::new(builder.finish(None).unwrap())
    }

    fn sample_entries() -> Vec<(&'static [u8], &'static [u8])> {
        vec![
            (&b"aaa"[..], &b"1"[..]),
            (b"aab", b"2"),
            (b"abb", b"3"),
            (b"bbb", b"4"),
            (b"bcd", b"5"),
            (b"zzz", b"6"),
        ]
    }

    #[test]
    fn open_and_point_lookup() {
        let entries = sample_entries();
        let bytes = build_table(&entries, 24); // force multiple data blocks
        let reader = TableReader::<Arc<Vec<u8>>>::open(&bytes).unwrap();
        assert!(reader.metadata().num_data_blocks >= 2);
        assert_eq!(entries.len() as u64, reader.metadata().num_entries);
        for (k, v) in &entries {
            assert_eq!(Some(v.to_vec()), reader.get(k).unwrap());
        }
        assert_eq!(None, reader.get(b"missing").unwrap());
    }

    #[test]
    fn cursor_forward_and_backward_scan() {
        let entries = sample_entries();
        let bytes = build_table(&entries, 24);
        let reader = TableReader::<Arc<Vec<u8>>>::open(&bytes).unwrap();
        let mut cursor = reader.cursor();
        cursor.seek_to_first().unwrap();
        for (k, v) in &entries {
            cursor.next().unwrap();
            assert_eq!(Some(*k), cursor.key());
            assert_eq!(Some(*v), cursor.value());
        }
        cursor.next().unwrap();
        assert_eq!(None, cursor.key());

        cursor.seek_to_last().unwrap();
        for (k, v) in entries.iter().rev() {
            cursor.prev().unwrap();
            assert_eq!(Some(*k), cursor.key());
            assert_eq!(Some(*v), cursor.value());
        }
        cursor.prev().unwrap();
        assert_eq!(None, cursor.key());
    }

    #[test]
    fn cursor_seek_across_blocks() {
        let entries = sample_entries();
        let bytes = build_table(&entries, 24);
        let reader = TableReader::<Arc<Vec<u8>>>::open(&bytes).unwrap();
        let mut cursor = reader.cursor();
        cursor.seek(b"ac").unwrap();
        assert_eq!(Some(&b"bbb"[..]), cursor.key());
        cursor.seek_for_prev(b"ac").unwrap();
        assert_eq!(Some(&b"abb"[..]), cursor.key());
        cursor.seek(b"zzzz").unwrap();
        assert_eq!(None, cursor.key());
        cursor.seek_for_prev(b"zzzz").unwrap();
        assert_eq!(Some(&b"zzz"[..]), cursor.key());
    }

    #[test]
    fn rejects_out_of_order_add() {
        let options = TableBuilderOptions::default();
        let mut builder = TableBuilder::new(options, DBitOptions::default());
        builder.add(b"b", b"1").unwrap();
        assert!(matches!(
            builder.add(b"a", b"2"),
            Err(Error::KeysMustBeInOrder { .. })
        ));
    }
}

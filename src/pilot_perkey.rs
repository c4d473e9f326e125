//! The per-key pilot (spec.md §4.5): a sidecar, built alongside a table's top-level data, that
//! lets a [crate::level_iterator::LevelIterator] jump directly into the next level down instead
//! of reconstructing a merge from the beginning on every `seek`.
//!
//! The pilot is itself stored as an ordinary [crate::block::Block] (no DBit sidecar — it has at
//! most one entry per top-level key, far fewer than the data it describes), keyed by "the top-level
//! key that ended the previous run" so that `SeekForPrev` on the pilot directly answers "which run
//! covers this target key". Entry `i`'s value is a [PilotEntry]: a snapshot, per lower level, of
//! how many of that level's entries had been consumed when the run started (a [RestartPos]), plus
//! `levels`, the byte sequence recording which lower level contributed each key of the run, in
//! order. Replaying `levels` against cursors restored from the snapshot reproduces the run without
//! comparing keys across levels — the comparisons were already done once, at build time.
//!
//! The very first run (before any top-level key) is keyed by a single `0x00` sentinel byte, which
//! sorts before every real key (an empty table key is never permitted, so this cannot collide).
//! The last entry, keyed by the final top-level key, is the tail: everything left in the lower
//! levels after the top level is exhausted.

use buffertk::{stack_pack, v64, Unpacker};

use crate::block::{Block, BlockBuilder};
use crate::table::TableCursor;
use crate::{compare_bytes, Cursor, DBitOptions, Error, RandomRead, PILOT_PAST_END};

const SENTINEL_KEY: &[u8] = &[0u8];

/// Whether `key` is the sentinel that checkpoints the run before the first top-level key, as
/// opposed to a real top-level key. [crate::level_iterator::LevelIterator] needs to tell the two
/// apart: only a real top-level key is itself reported before its checkpoint's run replays.
pub(crate) fn is_sentinel_checkpoint(key: &[u8]) -> bool {
    key == SENTINEL_KEY
}

/////////////////////////////////////////////// RestartPos //////////////////////////////////////////

/// How many entries of one lower level had been consumed as of a checkpoint, or
/// [RestartPos::PastEnd] if that level was already fully drained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPos {
    Count(u16),
    PastEnd,
}

impl RestartPos {
    fn from_consumed(consumed: u64) -> RestartPos {
        if consumed >= PILOT_PAST_END as u64 {
            RestartPos::PastEnd
        } else {
            RestartPos::Count(consumed as u16)
        }
    }

    fn encode(self) -> u16 {
        match self {
            RestartPos::Count(c) => c,
            RestartPos::PastEnd => PILOT_PAST_END,
        }
    }

    fn decode(bits: u16) -> RestartPos {
        if bits & PILOT_PAST_END != 0 {
            RestartPos::PastEnd
        } else {
            RestartPos::Count(bits)
        }
    }

    /// The count to restore a cursor to via `TableCursor::position_to_count`. `PastEnd` maps to
    /// `u64::MAX`, which `position_to_count` already treats as "past the last entry" without
    /// needing to know the level's exact size.
    pub(crate) fn as_count(self) -> u64 {
        match self {
            RestartPos::Count(c) => c as u64,
            RestartPos::PastEnd => u64::MAX,
        }
    }
}

/////////////////////////////////////////////// PilotEntry //////////////////////////////////////////

/// One checkpoint: where every lower level stood, and the interleaving of the run that follows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PilotEntry {
    pub restarts: Vec<RestartPos>,
    pub levels: Vec<u8>,
}

impl PilotEntry {
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let num_levels: v64 = (self.restarts.len() as u64).into();
        let levels_len: v64 = (self.levels.len() as u64).into();
        buf.extend_from_slice(&stack_pack(num_levels).pack(levels_len).to_vec());
        for r in &self.restarts {
            buf.extend_from_slice(&r.encode().to_be_bytes());
        }
        buf.extend_from_slice(&self.levels);
        buf
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut up = Unpacker::new(buf);
        let num_levels: v64 = up.unpack()?;
        let levels_len: v64 = up.unpack()?;
        let num_levels: usize = u64::from(num_levels) as usize;
        let levels_len: usize = u64::from(levels_len) as usize;
        let rest = up.remain();
        if rest.len() < num_levels * 2 + levels_len {
            return Err(Error::Corruption {
                core: Default::default(),
                context: "pilot entry truncated".to_string(),
            });
        }
        let mut restarts = Vec::with_capacity(num_levels);
        for i in 0..num_levels {
            let bits = u16::from_be_bytes([rest[i * 2], rest[i * 2 + 1]]);
            restarts.push(RestartPos::decode(bits));
        }
        let levels = rest[num_levels * 2..num_levels * 2 + levels_len].to_vec();
        Ok(PilotEntry { restarts, levels })
    }
}

/////////////////////////////////////////////// PilotBuilder /////////////////////////////////////////

/// Builds the per-key pilot block while the caller separately drives a [crate::table::TableBuilder]
/// over the same top-level keys, in the same order. Call [PerKeyPilotBuilder::add_key] once per
/// top-level key (after it's been added to the table builder), then [PerKeyPilotBuilder::finish].
pub struct PerKeyPilotBuilder<H> {
    lower: Vec<TableCursor<H>>,
    block: BlockBuilder,
    prev_key: Vec<u8>,
    run_start: Vec<u64>,
    run_levels: Vec<u8>,
}

impl<H: RandomRead> PerKeyPilotBuilder<H> {
    /// `lower` must already be positioned at `seek_to_first()` (unpositioned, ready for `next`).
    pub fn new(lower: Vec<TableCursor<H>>) -> Result<Self, Error> {
        let run_start = vec![0u64; lower.len()];
        Ok(Self {
            lower,
            block: BlockBuilder::new(&DBitOptions {
                enabled: false,
                max_discriminators: 0,
            }),
            prev_key: SENTINEL_KEY.to_vec(),
            run_start,
            run_levels: Vec::new(),
        })
    }

    /// Drain every lower-level entry that sorts strictly before `top_key`, recording which level
    /// contributed each one, then checkpoint the run just finished.
    pub fn add_key(&mut self, top_key: &[u8]) -> Result<(), Error> {
        self.drain_below(Some(top_key))?;
        self.emit_run()?;
        self.prev_key = top_key.to_vec();
        Ok(())
    }

    fn drain_below(&mut self, bound: Option<&[u8]>) -> Result<(), Error> {
        loop {
            let mut winner: Option<(usize, Vec<u8>)> = None;
            for (i, cursor) in self.lower.iter().enumerate() {
                let Some(k) = cursor.key() else { continue };
                if let Some(bound) = bound {
                    if compare_bytes(k, bound) != std::cmp::Ordering::Less {
                        continue;
                    }
                }
                let take = match &winner {
                    Some((_, wk)) => compare_bytes(k, wk) == std::cmp::Ordering::Less,
                    None => true,
                };
                if take {
                    winner = Some((i, k.to_vec()));
                }
            }
            match winner {
                Some((i, _)) => {
                    self.run_levels.push(i as u8);
                    self.lower[i].next()?;
                }
                None => return Ok(()),
            }
        }
    }

    fn emit_run(&mut self) -> Result<(), Error> {
        let entry = PilotEntry {
            restarts: self
                .run_start
                .iter()
                .map(|c| RestartPos::from_consumed(*c))
                .collect(),
            levels: std::mem::take(&mut self.run_levels),
        };
        self.block.add(&self.prev_key, &entry.encode())?;
        for (i, cursor) in self.lower.iter().enumerate() {
            self.run_start[i] = cursor.consumed()?;
        }
        Ok(())
    }

    /// Drain whatever remains in every lower level into the tail run, and return the finished
    /// pilot block's bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        self.drain_below(None)?;
        self.emit_run()?;
        Ok(self.block.finish())
    }
}

/////////////////////////////////////////////// PilotReader //////////////////////////////////////////

/// A read-only view of a parsed per-key pilot block.
#[derive(Clone, Debug)]
pub struct PilotReader {
    block: Block,
}

impl PilotReader {
    pub fn new(block: Block) -> Self {
        Self { block }
    }

    /// The checkpoint covering the run that contains `target`, i.e. the entry whose key is the
    /// largest one `<= target` (spec.md §4.5's `SeekForPrev`).
    pub fn checkpoint_for(&self, target: &[u8]) -> Result<Option<(Vec<u8>, PilotEntry)>, Error> {
        let mut cursor = self.block.cursor();
        cursor.seek_for_prev(target)?;
        match (cursor.key(), cursor.value()) {
            (Some(k), Some(v)) => Ok(Some((k.to_vec(), PilotEntry::decode(v)?))),
            _ => Ok(None),
        }
    }

    /// The very first checkpoint (covering the run before the first top-level key).
    pub fn first_checkpoint(&self) -> Result<(Vec<u8>, PilotEntry), Error> {
        let mut cursor = self.block.cursor();
        cursor.seek_to_first()?;
        cursor.next()?;
        let k = cursor.key().ok_or_else(|| Error::Corruption {
            core: Default::default(),
            context: "per-key pilot block is empty".to_string(),
        })?;
        let v = cursor.value().expect("key() returned Some so value() must too");
        Ok((k.to_vec(), PilotEntry::decode(v)?))
    }

    /// Whether the entry keyed `key` is the pilot's last (i.e. it describes the tail run, with
    /// no top-level key bounding it above).
    pub fn is_last(&self, key: &[u8]) -> Result<bool, Error> {
        let mut cursor = self.block.cursor();
        cursor.seek_to_last()?;
        cursor.prev()?;
        Ok(cursor.key() == Some(key))
    }

    /// The checkpoint immediately after the one keyed `key`, if any.
    pub fn next_checkpoint(&self, key: &[u8]) -> Result<Option<(Vec<u8>, PilotEntry)>, Error> {
        let mut cursor = self.block.cursor();
        cursor.seek(key)?;
        if cursor.key() != Some(key) {
            return Ok(None);
        }
        cursor.next()?;
        match (cursor.key(), cursor.value()) {
            (Some(k), Some(v)) => Ok(Some((k.to_vec(), PilotEntry::decode(v)?))),
            _ => Ok(None),
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

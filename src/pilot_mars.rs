//! The "Mars" fixed-chunk pilot (spec.md §4.6): the same checkpoint-plus-replay idea as the
//! per-key pilot ([crate::pilot_perkey]), but keyed to the merged stream's position rather than
//! to the upper table's keys.
//!
//! Where the per-key pilot checkpoints once per upper-table key (so a run's length depends on how
//! densely the upper table's keys are interleaved with the lower level's), Mars drains a full
//! `L`-way merge of every level with no distinguished "upper" table, and cuts a checkpoint every
//! `MARS_KSPACE` (256) emitted keys regardless of which levels contributed them. This bounds a
//! chunk's replay cost uniformly and is more compact for deep level stacks, at the cost of
//! granularity: a seek lands somewhere inside a chunk of up to 256 entries rather than exactly at
//! the boundary a per-key checkpoint would give.
//!
//! The on-disk format is identical to the per-key pilot's (a [Block](crate::block::Block) of
//! [PilotEntry](crate::pilot_perkey::PilotEntry) values), keyed here by the first key emitted in
//! each chunk rather than by a top-level key — so [crate::pilot_perkey::PilotReader] is reused
//! unchanged for reading Mars pilots too.

use crate::block::Block;
use crate::block::BlockBuilder;
use crate::pilot_perkey::{PilotEntry, PilotReader, RestartPos};
use crate::table::TableCursor;
use crate::{compare_bytes, Cursor, DBitOptions, Error, RandomRead, MARS_KSPACE};

/////////////////////////////////////////////// MarsPilotBuilder ////////////////////////////////////

/// Builds a Mars pilot by draining an `L`-way merge of `levels` (newest/highest-priority first;
/// ties are broken arbitrarily since spec.md assumes disjoint keyspaces across levels).
pub struct MarsPilotBuilder;

impl MarsPilotBuilder {
    pub fn build<H: RandomRead>(mut levels: Vec<TableCursor<H>>) -> Result<Vec<u8>, Error> {
        let mut block = BlockBuilder::new(&DBitOptions {
            enabled: false,
            max_discriminators: 0,
        });
        let mut chunk_start: Vec<u64> = vec![0u64; levels.len()];
        let mut chunk_key: Option<Vec<u8>> = None;
        let mut chunk_levels: Vec<u8> = Vec::new();

        loop {
            let mut winner: Option<(usize, Vec<u8>)> = None;
            for (i, cursor) in levels.iter().enumerate() {
                let Some(k) = cursor.key() else { continue };
                let take = match &winner {
                    Some((_, wk)) => compare_bytes(k, wk) == std::cmp::Ordering::Less,
                    None => true,
                };
                if take {
                    winner = Some((i, k.to_vec()));
                }
            }
            let (i, key) = match winner {
                Some(w) => w,
                None => break,
            };
            if chunk_levels.is_empty() {
                chunk_key = Some(key);
            }
            chunk_levels.push(i as u8);
            levels[i].next()?;
            if chunk_levels.len() >= MARS_KSPACE {
                Self::flush(&mut block, &mut chunk_start, &mut chunk_key, &mut chunk_levels, &levels)?;
            }
        }
        if !chunk_levels.is_empty() {
            Self::flush(&mut block, &mut chunk_start, &mut chunk_key, &mut chunk_levels, &levels)?;
        }
        Ok(block.finish())
    }

    fn flush<H: RandomRead>(
        block: &mut BlockBuilder,
        chunk_start: &mut [u64],
        chunk_key: &mut Option<Vec<u8>>,
        chunk_levels: &mut Vec<u8>,
        levels: &[TableCursor<H>],
    ) -> Result<(), Error> {
        let entry = PilotEntry {
            restarts: chunk_start.iter().map(|c| RestartPos::from_consumed(*c)).collect(),
            levels: std::mem::take(chunk_levels),
        };
        let key = chunk_key
            .take()
            .expect("chunk key is set whenever chunk_levels is nonempty");
        block.add(&key, &entry.encode())?;
        for (i, cursor) in levels.iter().enumerate() {
            chunk_start[i] = cursor.consumed()?;
        }
        Ok(())
    }
}

/////////////////////////////////////////////// MarsPilotReader //////////////////////////////////////

/// A read-only view of a parsed Mars pilot block. The on-disk format is exactly
/// [PilotReader]'s, so this is a thin wrapper that exists to keep callers from having to care
/// which variant's checkpoints they're holding.
#[derive(Clone, Debug)]
pub struct MarsPilotReader {
    inner: PilotReader,
}

impl MarsPilotReader {
    pub fn new(block: Block) -> Self {
        Self {
            inner: PilotReader::new(block),
        }
    }

    /// The checkpoint covering the chunk that contains `target`.
    pub fn checkpoint_for(&self, target: &[u8]) -> Result<Option<(Vec<u8>, PilotEntry)>, Error> {
        self.inner.checkpoint_for(target)
    }

    /// The very first chunk's checkpoint.
    pub fn first_checkpoint(&self) -> Result<(Vec<u8>, PilotEntry), Error> {
        self.inner.first_checkpoint()
    }

    /// Whether the chunk keyed `key` is the last one.
    pub fn is_last(&self, key: &[u8]) -> Result<bool, Error> {
        self.inner.is_last(key)
    }

    /// The checkpoint for the chunk immediately after the one keyed `key`, if any.
    pub fn next_checkpoint(&self, key: &[u8]) -> Result<Option<(Vec<u8>, PilotEntry)>, Error> {
        self.inner.next_checkpoint(key)
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

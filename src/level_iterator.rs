//! Multi-level iteration (spec.md §4.7): presents a stack of tables, ordered from the newest
//! (level 0) to the oldest, as a single merged [Cursor] in which a key present in more than one
//! level resolves to the newest level's value.
//!
//! Without a pilot, the merge is exactly [crate::merging_cursor::MergingCursor]: every `next()`
//! re-derives the current minimum across all cursors. With a pilot, `seek_to_first`/`seek` instead
//! restore every cursor straight to the position a prior build-time merge already computed, and
//! `next()` replays that merge's recorded interleaving one step at a time — advancing exactly the
//! cursor whose turn it is, with no cross-level key comparison at all. `prev`/`seek_for_prev`/
//! `seek_to_last` fall back to the plain comparison-based merge; the pilot formats (spec.md §4.5,
//! §4.6) are forward-checkpointed only, matching the workload they're built for (seek once, then
//! scan forward).

use std::cmp::Ordering;

use crate::pilot_mars::MarsPilotReader;
use crate::pilot_perkey::{is_sentinel_checkpoint, PilotReader};
use crate::table::TableCursor;
use crate::{compare_bytes, Cursor, Error, LevelIteratorOptions};

/// Which pilot, if any, accompanies a [LevelIterator]'s level stack.
#[derive(Clone, Debug)]
pub enum Pilot {
    PerKey(PilotReader),
    Mars(MarsPilotReader),
}

/////////////////////////////////////////////// Run /////////////////////////////////////////////////

/// Replay state for one pilot checkpoint: which lower-level entry `levels[idx]` names comes next,
/// and (per-key pilot only) whether the checkpoint's own top-level key has been reported yet.
#[derive(Clone, Debug)]
struct Run {
    checkpoint_key: Vec<u8>,
    levels: Vec<u8>,
    idx: usize,
    top_reported: bool,
    is_sentinel: bool,
    /// Per-lower-level absolute entry count this run's pilot checkpoint restored each cursor to
    /// (`entry.restarts[i].as_count()`), i.e. the index of the first entry level `i` contributes
    /// to this run. `binary_seek_perkey` uses this to jump straight to the entry an occurrence
    /// count implies, without replaying `levels[]` one step at a time.
    level_restart_base: Vec<u64>,
}

fn corruption(context: &str) -> Error {
    Error::Corruption {
        core: Default::default(),
        context: context.to_string(),
    }
}

/////////////////////////////////////////////// LevelIterator ///////////////////////////////////////

/// A cursor over the merged view of a stack of levels, newest first.
pub struct LevelIterator<H> {
    merged: crate::merging_cursor::MergingCursor<TableCursor<H>>,
    pilot: Option<Pilot>,
    options: LevelIteratorOptions,
    run: Option<Run>,
    /// Index (into `merged`) of the cursor whose `key()`/`value()` is the current reported
    /// position, when pilot-accelerated. `None` means either nothing has been reported yet or
    /// the iterator is exhausted; in non-pilot mode it's always `None` and `merged`'s own
    /// comparison-based `key()`/`value()` are used instead.
    current: Option<usize>,
}

impl<H> LevelIterator<H> {
    /// `levels[0]` is the newest level; ties on a key resolve to the lowest-index level. `pilot`,
    /// when present, describes the run between `levels[0]` (the "top" level, per-key variant) or
    /// across all of `levels` (Mars variant) and every other level.
    pub fn new(levels: Vec<TableCursor<H>>, pilot: Option<Pilot>, options: LevelIteratorOptions) -> Self {
        Self {
            merged: crate::merging_cursor::MergingCursor::new(levels),
            pilot,
            options,
            run: None,
            current: None,
        }
    }

    pub fn options(&self) -> LevelIteratorOptions {
        self.options
    }

    pub fn pilot(&self) -> Option<&Pilot> {
        self.pilot.as_ref()
    }

    fn reset_pilot_state(&mut self) {
        self.run = None;
        self.current = None;
    }

    /// Restore one lower-level cursor to "primed to yield its `count`-th entry", then land it on
    /// that entry so its `key()`/`value()` are valid immediately (matching every other cursor in
    /// `merged`, which is always either landed or genuinely exhausted).
    fn restore_and_land(&mut self, i: usize, count: u64) -> Result<(), Error> {
        let c = self.merged.cursor_mut(i);
        c.position_to_count(count)?;
        c.next()
    }

    /// Advance whichever cursor is currently reported (if any), then pick the next one per the
    /// active pilot variant. Shared by `next()` and the landing loop inside pilot-accelerated
    /// `seek`.
    fn advance_and_pick(&mut self) -> Result<(), Error> {
        if let Some(c) = self.current.take() {
            self.merged.cursor_mut(c).next()?;
        }
        self.current = match self.pilot.clone() {
            Some(Pilot::PerKey(reader)) => self.pick_current_perkey(&reader)?,
            Some(Pilot::Mars(reader)) => self.pick_current_mars(&reader)?,
            None => unreachable!("advance_and_pick is only called when a pilot primed self.run"),
        };
        Ok(())
    }

    /// Per-key pilot: `levels[idx]` names a lower level (index `levels[idx] + 1` in `merged`,
    /// since index 0 is the top level); between runs, the top level's own key is reported first
    /// (unless this is the sentinel run before the first top key, which has none).
    fn pick_current_perkey(&mut self, reader: &PilotReader) -> Result<Option<usize>, Error> {
        loop {
            let run = self.run.as_ref().expect("primed before pick_current_perkey is called");
            if !run.is_sentinel && !run.top_reported {
                self.run.as_mut().unwrap().top_reported = true;
                if self.merged.cursor(0).key().is_some() {
                    return Ok(Some(0));
                }
                continue;
            }
            let run = self.run.as_ref().unwrap();
            if run.idx < run.levels.len() {
                let lvl = run.levels[run.idx] as usize + 1;
                self.run.as_mut().unwrap().idx += 1;
                return Ok(Some(lvl));
            }
            let checkpoint_key = run.checkpoint_key.clone();
            match reader.next_checkpoint(&checkpoint_key)? {
                Some((key, entry)) => {
                    let level_restart_base =
                        entry.restarts.iter().map(|r| r.as_count()).collect();
                    self.run = Some(Run {
                        checkpoint_key: key,
                        levels: entry.levels,
                        idx: 0,
                        top_reported: false,
                        is_sentinel: false,
                        level_restart_base,
                    });
                }
                None => return Ok(None),
            }
        }
    }

    /// Mars pilot: every level is symmetric, so `levels[idx]` names an absolute cursor index
    /// directly, with no distinguished top level and no separate "report the checkpoint key"
    /// step.
    fn pick_current_mars(&mut self, reader: &MarsPilotReader) -> Result<Option<usize>, Error> {
        loop {
            let run = self.run.as_ref().expect("primed before pick_current_mars is called");
            if run.idx < run.levels.len() {
                let lvl = run.levels[run.idx] as usize;
                self.run.as_mut().unwrap().idx += 1;
                return Ok(Some(lvl));
            }
            let checkpoint_key = run.checkpoint_key.clone();
            match reader.next_checkpoint(&checkpoint_key)? {
                Some((key, entry)) => {
                    let level_restart_base =
                        entry.restarts.iter().map(|r| r.as_count()).collect();
                    self.run = Some(Run {
                        checkpoint_key: key,
                        levels: entry.levels,
                        idx: 0,
                        top_reported: true,
                        is_sentinel: false,
                        level_restart_base,
                    });
                }
                None => return Ok(None),
            }
        }
    }

    fn prime_perkey_from_first(&mut self, reader: &PilotReader) -> Result<(), Error> {
        let (key, entry) = reader.first_checkpoint()?;
        if entry.restarts.len() + 1 != self.merged.len() {
            return Err(corruption("per-key pilot restart count doesn't match level count"));
        }
        let level_restart_base = entry.restarts.iter().map(|r| r.as_count()).collect::<Vec<_>>();
        for (i, restart) in entry.restarts.iter().enumerate() {
            self.restore_and_land(i + 1, restart.as_count())?;
        }
        self.merged.cursor_mut(0).seek_to_first()?;
        self.merged.cursor_mut(0).next()?;
        self.run = Some(Run {
            checkpoint_key: key,
            levels: entry.levels,
            idx: 0,
            top_reported: false,
            is_sentinel: true,
            level_restart_base,
        });
        self.current = None;
        Ok(())
    }

    fn prime_perkey_for_seek(&mut self, reader: &PilotReader, target: &[u8]) -> Result<(), Error> {
        // `target` sorting before even the sentinel (e.g. an empty-string seek) has no covering
        // checkpoint; the answer is the same as seeking to the very first entry.
        let Some((key, entry)) = reader.checkpoint_for(target)? else {
            return self.prime_perkey_from_first(reader);
        };
        if entry.restarts.len() + 1 != self.merged.len() {
            return Err(corruption("per-key pilot restart count doesn't match level count"));
        }
        let level_restart_base = entry.restarts.iter().map(|r| r.as_count()).collect::<Vec<_>>();
        for (i, restart) in entry.restarts.iter().enumerate() {
            self.restore_and_land(i + 1, restart.as_count())?;
        }
        let is_sentinel = is_sentinel_checkpoint(&key);
        if is_sentinel {
            // No top-level key precedes this run; land on the first one directly so it's ready
            // to be reported once this run's entries are replayed.
            self.merged.cursor_mut(0).seek_to_first()?;
            self.merged.cursor_mut(0).next()?;
        } else {
            self.merged.cursor_mut(0).seek_for_prev(&key)?;
        }
        self.run = Some(Run {
            checkpoint_key: key,
            levels: entry.levels,
            idx: 0,
            top_reported: false,
            is_sentinel,
            level_restart_base,
        });
        self.current = None;
        Ok(())
    }

    fn prime_mars_from_first(&mut self, reader: &MarsPilotReader) -> Result<(), Error> {
        let (key, entry) = reader.first_checkpoint()?;
        if entry.restarts.len() != self.merged.len() {
            return Err(corruption("mars pilot restart count doesn't match level count"));
        }
        let level_restart_base = entry.restarts.iter().map(|r| r.as_count()).collect::<Vec<_>>();
        for (i, restart) in entry.restarts.iter().enumerate() {
            self.restore_and_land(i, restart.as_count())?;
        }
        self.run = Some(Run {
            checkpoint_key: key,
            levels: entry.levels,
            idx: 0,
            top_reported: true,
            is_sentinel: false,
            level_restart_base,
        });
        self.current = None;
        Ok(())
    }

    fn prime_mars_for_seek(&mut self, reader: &MarsPilotReader, target: &[u8]) -> Result<(), Error> {
        let Some((key, entry)) = reader.checkpoint_for(target)? else {
            return self.prime_mars_from_first(reader);
        };
        if entry.restarts.len() != self.merged.len() {
            return Err(corruption("mars pilot restart count doesn't match level count"));
        }
        let level_restart_base = entry.restarts.iter().map(|r| r.as_count()).collect::<Vec<_>>();
        for (i, restart) in entry.restarts.iter().enumerate() {
            self.restore_and_land(i, restart.as_count())?;
        }
        self.run = Some(Run {
            checkpoint_key: key,
            levels: entry.levels,
            idx: 0,
            top_reported: true,
            is_sentinel: false,
            level_restart_base,
        });
        self.current = None;
        Ok(())
    }

    /// Walk forward from a freshly primed run until the reported key is `>= target` (or
    /// exhausted), replaying pilot steps rather than re-seeking.
    fn land_on_or_after(&mut self, target: &[u8]) -> Result<(), Error> {
        match self.pilot {
            Some(Pilot::PerKey(_)) => self.land_on_or_after_perkey(target),
            _ => self.land_on_or_after_linear(target),
        }
    }

    /// Single-step replay: advance exactly one pilot-recorded entry at a time. Used whenever a
    /// run's `levels[]` is at or below `options.binary_seek_threshold`, and for every Mars run
    /// (which has no distinguished top-level key to special-case around a binary search).
    fn land_on_or_after_linear(&mut self, target: &[u8]) -> Result<(), Error> {
        loop {
            self.advance_and_pick()?;
            match self.key() {
                None => return Ok(()),
                Some(k) if compare_bytes(k, target) != Ordering::Less => return Ok(()),
                _ => {}
            }
        }
    }

    /// Per-key pilot (spec.md §4.7 step 4): report the top-level key (a single comparison, not
    /// worth a binary search over one entry), then, once a run's `levels[]` exceeds
    /// `options.binary_seek_threshold`, binary-search it via [Self::binary_seek_perkey] instead of
    /// replaying every entry. Falls back to the linear walk below the threshold, and in the rare
    /// case the top-level cursor was already exhausted (so picking it folded straight into the
    /// first lower-level entry within a single step).
    fn land_on_or_after_perkey(&mut self, target: &[u8]) -> Result<(), Error> {
        loop {
            let (is_sentinel, top_reported, idx, levels_len) = {
                let run = self.run.as_ref().expect("primed before land_on_or_after_perkey");
                (run.is_sentinel, run.top_reported, run.idx, run.levels.len())
            };
            if !is_sentinel && !top_reported {
                self.advance_and_pick()?;
            } else if idx == 0 && levels_len > self.options.binary_seek_threshold {
                if !self.binary_seek_perkey(target)? {
                    // The whole run sorted before `target`; every cursor is already synchronized
                    // as if it had replayed to the run's end, so one more pick fetches (and
                    // starts replaying) the following checkpoint.
                    self.advance_and_pick()?;
                }
            } else {
                self.advance_and_pick()?;
            }
            match self.key() {
                None => return Ok(()),
                Some(k) if compare_bytes(k, target) != Ordering::Less => return Ok(()),
                _ => {}
            }
        }
    }

    /// §4.7's "BinarySeek over pilot levels": locate, via binary search rather than one-by-one
    /// replay, the first entry of the current run whose key is `>= target`, then synchronize
    /// every lower-level cursor to the state it would be in had the run been replayed up to that
    /// point. Returns `false` (with every cursor synchronized to the run's end and `self.current`
    /// cleared) if the entire run sorts before `target`.
    ///
    /// Each probe computes the occurrence rank of `levels[mid]` within `levels[0..=mid]` (the
    /// number of times that level has contributed up to and including this position) and jumps
    /// its cursor straight to `level_restart_base[level] + rank - 1` via
    /// [crate::table::TableCursor::position_to_count] — an O(log blocks) seek, in place of
    /// `Next`-ing through every intervening entry.
    fn binary_seek_perkey(&mut self, target: &[u8]) -> Result<bool, Error> {
        let (levels, base) = {
            let run = self.run.as_ref().expect("primed before binary_seek_perkey");
            (run.levels.clone(), run.level_restart_base.clone())
        };
        debug_assert!(!levels.is_empty());

        let mut running = vec![0u64; base.len()];
        let occurrence_rank: Vec<u64> = levels
            .iter()
            .map(|&lvl| {
                let lvl = lvl as usize;
                running[lvl] += 1;
                running[lvl]
            })
            .collect();

        let mut lo = 0usize;
        let mut hi = levels.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let lvl = levels[mid] as usize;
            let cursor_idx = lvl + 1;
            let abs = base[lvl] + occurrence_rank[mid] - 1;
            self.restore_and_land(cursor_idx, abs)?;
            let is_less = match self.merged.cursor(cursor_idx).key() {
                Some(k) => compare_bytes(k, target) == Ordering::Less,
                None => false,
            };
            if is_less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        // Re-synchronize every lower-level cursor as though `levels[0..lo]` had been replayed one
        // step at a time: each one lands on the entry it would next report, including the winner
        // (if any), whose landed key becomes the new `current`.
        let mut replayed = vec![0u64; base.len()];
        for &lvl in &levels[..lo] {
            replayed[lvl as usize] += 1;
        }
        for (lvl, &count) in replayed.iter().enumerate() {
            self.restore_and_land(lvl + 1, base[lvl] + count)?;
        }

        let run = self.run.as_mut().expect("primed before binary_seek_perkey");
        if lo < levels.len() {
            run.idx = lo + 1;
            self.current = Some(levels[lo] as usize + 1);
            Ok(true)
        } else {
            run.idx = levels.len();
            self.current = None;
            Ok(false)
        }
    }
}

impl<H> Cursor for LevelIterator<H> {
    fn seek_to_first(&mut self) -> Result<(), Error> {
        match self.pilot.clone() {
            Some(Pilot::PerKey(reader)) => self.prime_perkey_from_first(&reader),
            Some(Pilot::Mars(reader)) => self.prime_mars_from_first(&reader),
            None => {
                self.reset_pilot_state();
                self.merged.seek_to_first()
            }
        }
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        self.reset_pilot_state();
        self.merged.seek_to_last()
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), Error> {
        match self.pilot.clone() {
            Some(Pilot::PerKey(reader)) => {
                self.prime_perkey_for_seek(&reader, key)?;
                self.land_on_or_after(key)
            }
            Some(Pilot::Mars(reader)) => {
                self.prime_mars_for_seek(&reader, key)?;
                self.land_on_or_after(key)
            }
            None => {
                self.reset_pilot_state();
                self.merged.seek(key)
            }
        }
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<(), Error> {
        self.reset_pilot_state();
        self.merged.seek_for_prev(key)
    }

    fn prev(&mut self) -> Result<(), Error> {
        self.reset_pilot_state();
        self.merged.prev()
    }

    fn next(&mut self) -> Result<(), Error> {
        if self.run.is_some() {
            self.advance_and_pick()
        } else {
            self.merged.next()
        }
    }

    fn key(&self) -> Option<&[u8]> {
        match (self.run.is_some(), self.current) {
            (true, Some(c)) => self.merged.cursor(c).key(),
            (true, None) => None,
            (false, _) => self.merged.key(),
        }
    }

    fn value(&self) -> Option<&[u8]> {
        match (self.run.is_some(), self.current) {
            (true, Some(c)) => self.merged.cursor(c).value(),
            (true, None) => None,
            (false, _) => self.merged.value(),
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::block::Block;
    use crate::pilot_mars::MarsPilotBuilder;
    use crate::pilot_perkey::PerKeyPilotBuilder;
    use crate::table::{TableBuilder, TableReader};
    use crate::{DBitOptions, TableBuilderOptions};

    fn build_table(pairs: &[(&[u8], &[u8])]) -> Arc<Vec<u8>> {
        let options = TableBuilderOptions {
            block_size: 64,
            page_alignment: 0,
        };
        let dbit = DBitOptions {
            enabled: true,
            max_discriminators: 255,
        };
        let mut builder = TableBuilder::new(options, dbit);
        for (k, v) in pairs {
            builder.add(k, v).unwrap();
        }
        Arc::new(builder.finish(None).unwrap())
    }

    fn collect_forward(level: &mut LevelIterator<Arc<Vec<u8>>>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut collected = Vec::new();
        loop {
            level.next().unwrap();
            match level.key() {
                Some(k) => collected.push((k.to_vec(), level.value().unwrap().to_vec())),
                None => break,
            }
        }
        collected
    }

    #[test]
    fn two_levels_merge_with_newest_winning_ties() {
        let newest = build_table(&[(b"b", b"new"), (b"d", b"new")]);
        let oldest = build_table(&[(b"a", b"old"), (b"b", b"old"), (b"c", b"old")]);

        let newest_reader = TableReader::<Arc<Vec<u8>>>::open(&newest).unwrap();
        let oldest_reader = TableReader::<Arc<Vec<u8>>>::open(&oldest).unwrap();

        let mut level = LevelIterator::new(
            vec![newest_reader.cursor(), oldest_reader.cursor()],
            None,
            LevelIteratorOptions::default(),
        );
        level.seek_to_first().unwrap();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"a".to_vec(), b"old".to_vec()),
            (b"b".to_vec(), b"new".to_vec()),
            (b"c".to_vec(), b"old".to_vec()),
            (b"d".to_vec(), b"new".to_vec()),
        ];
        assert_eq!(expected, collect_forward(&mut level));
    }

    fn perkey_pilot(top: &Arc<Vec<u8>>, lower: &Arc<Vec<u8>>) -> PilotReader {
        let top_reader = TableReader::<Arc<Vec<u8>>>::open(top).unwrap();
        let lower_reader = TableReader::<Arc<Vec<u8>>>::open(lower).unwrap();
        let mut lower_cursor = lower_reader.cursor();
        lower_cursor.seek_to_first().unwrap();
        let mut builder = PerKeyPilotBuilder::new(vec![lower_cursor]).unwrap();
        let mut top_cursor = top_reader.cursor();
        top_cursor.seek_to_first().unwrap();
        loop {
            top_cursor.next().unwrap();
            match top_cursor.key() {
                Some(k) => builder.add_key(k).unwrap(),
                None => break,
            }
        }
        let bytes = builder.finish().unwrap();
        let len = bytes.len();
        PilotReader::new(Block::new(Arc::new(bytes), 0, len).unwrap())
    }

    #[test]
    fn per_key_pilot_accelerates_a_full_forward_scan() {
        let top = build_table(&[(b"b", b"new"), (b"d", b"new"), (b"f", b"new")]);
        let lower = build_table(&[
            (b"a", b"old"),
            (b"c", b"old"),
            (b"e", b"old"),
            (b"g", b"old"),
        ]);
        let reader = perkey_pilot(&top, &lower);

        let top_reader = TableReader::<Arc<Vec<u8>>>::open(&top).unwrap();
        let lower_reader = TableReader::<Arc<Vec<u8>>>::open(&lower).unwrap();
        let mut level = LevelIterator::new(
            vec![top_reader.cursor(), lower_reader.cursor()],
            Some(Pilot::PerKey(reader)),
            LevelIteratorOptions::default(),
        );
        level.seek_to_first().unwrap();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"a".to_vec(), b"old".to_vec()),
            (b"b".to_vec(), b"new".to_vec()),
            (b"c".to_vec(), b"old".to_vec()),
            (b"d".to_vec(), b"new".to_vec()),
            (b"e".to_vec(), b"old".to_vec()),
            (b"f".to_vec(), b"new".to_vec()),
            (b"g".to_vec(), b"old".to_vec()),
        ];
        assert_eq!(expected, collect_forward(&mut level));
    }

    #[test]
    fn per_key_pilot_seek_lands_mid_run_and_then_scans_forward() {
        let top = build_table(&[(b"b", b"new"), (b"d", b"new"), (b"f", b"new")]);
        let lower = build_table(&[
            (b"a", b"old"),
            (b"c", b"old"),
            (b"e", b"old"),
            (b"g", b"old"),
        ]);
        let reader = perkey_pilot(&top, &lower);

        let top_reader = TableReader::<Arc<Vec<u8>>>::open(&top).unwrap();
        let lower_reader = TableReader::<Arc<Vec<u8>>>::open(&lower).unwrap();
        let mut level = LevelIterator::new(
            vec![top_reader.cursor(), lower_reader.cursor()],
            Some(Pilot::PerKey(reader)),
            LevelIteratorOptions::default(),
        );

        level.seek(b"cc").unwrap();
        assert_eq!(Some(&b"d"[..]), level.key());
        assert_eq!(Some(&b"new"[..]), level.value());

        let expected: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"e".to_vec(), b"old".to_vec()),
            (b"f".to_vec(), b"new".to_vec()),
            (b"g".to_vec(), b"old".to_vec()),
        ];
        assert_eq!(expected, collect_forward(&mut level));
    }

    #[test]
    fn per_key_pilot_seek_exactly_on_a_top_key() {
        let top = build_table(&[(b"b", b"new"), (b"d", b"new"), (b"f", b"new")]);
        let lower = build_table(&[(b"a", b"old"), (b"c", b"old")]);
        let reader = perkey_pilot(&top, &lower);

        let top_reader = TableReader::<Arc<Vec<u8>>>::open(&top).unwrap();
        let lower_reader = TableReader::<Arc<Vec<u8>>>::open(&lower).unwrap();
        let mut level = LevelIterator::new(
            vec![top_reader.cursor(), lower_reader.cursor()],
            Some(Pilot::PerKey(reader)),
            LevelIteratorOptions::default(),
        );

        level.seek(b"d").unwrap();
        assert_eq!(Some(&b"d"[..]), level.key());
        assert_eq!(Some(&b"new"[..]), level.value());
    }

    fn mars_pilot(levels: &[Arc<Vec<u8>>]) -> MarsPilotReader {
        let readers: Vec<TableReader<Arc<Vec<u8>>>> = levels
            .iter()
            .map(|bytes| TableReader::<Arc<Vec<u8>>>::open(bytes).unwrap())
            .collect();
        let cursors = readers
            .iter()
            .map(|r| {
                let mut c = r.cursor();
                c.seek_to_first().unwrap();
                c.next().unwrap();
                c
            })
            .collect();
        let bytes = MarsPilotBuilder::build(cursors).unwrap();
        let len = bytes.len();
        MarsPilotReader::new(Block::new(Arc::new(bytes), 0, len).unwrap())
    }

    #[test]
    fn mars_pilot_accelerates_a_full_forward_scan() {
        let a = build_table(&[(b"a", b"1"), (b"c", b"1"), (b"e", b"1")]);
        let b = build_table(&[(b"b", b"2"), (b"d", b"2"), (b"f", b"2")]);
        let reader = mars_pilot(&[a.clone(), b.clone()]);

        let ra = TableReader::<Arc<Vec<u8>>>::open(&a).unwrap();
        let rb = TableReader::<Arc<Vec<u8>>>::open(&b).unwrap();
        let mut level = LevelIterator::new(
            vec![ra.cursor(), rb.cursor()],
            Some(Pilot::Mars(reader)),
            LevelIteratorOptions::default(),
        );
        level.seek_to_first().unwrap();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"1".to_vec()),
            (b"d".to_vec(), b"2".to_vec()),
            (b"e".to_vec(), b"1".to_vec()),
            (b"f".to_vec(), b"2".to_vec()),
        ];
        assert_eq!(expected, collect_forward(&mut level));
    }

    #[test]
    fn mars_pilot_seek_lands_on_lower_bound_then_scans_forward() {
        let a = build_table(&[(b"a", b"1"), (b"c", b"1"), (b"e", b"1")]);
        let b = build_table(&[(b"b", b"2"), (b"d", b"2"), (b"f", b"2")]);
        let reader = mars_pilot(&[a.clone(), b.clone()]);

        let ra = TableReader::<Arc<Vec<u8>>>::open(&a).unwrap();
        let rb = TableReader::<Arc<Vec<u8>>>::open(&b).unwrap();
        let mut level = LevelIterator::new(
            vec![ra.cursor(), rb.cursor()],
            Some(Pilot::Mars(reader)),
            LevelIteratorOptions::default(),
        );

        level.seek(b"cc").unwrap();
        assert_eq!(Some(&b"d"[..]), level.key());

        let expected: Vec<(Vec<u8>, Vec<u8>)> =
            vec![(b"e".to_vec(), b"1".to_vec()), (b"f".to_vec(), b"2".to_vec())];
        assert_eq!(expected, collect_forward(&mut level));
    }

    #[test]
    fn falls_back_to_plain_merge_for_backward_iteration() {
        let newest = build_table(&[(b"b", b"new"), (b"d", b"new")]);
        let oldest = build_table(&[(b"a", b"old"), (b"b", b"old"), (b"c", b"old")]);
        let newest_reader = TableReader::<Arc<Vec<u8>>>::open(&newest).unwrap();
        let oldest_reader = TableReader::<Arc<Vec<u8>>>::open(&oldest).unwrap();
        let reader = perkey_pilot(&newest, &oldest);

        let mut level = LevelIterator::new(
            vec![newest_reader.cursor(), oldest_reader.cursor()],
            Some(Pilot::PerKey(reader)),
            LevelIteratorOptions::default(),
        );
        level.seek_to_last().unwrap();
        let mut collected = Vec::new();
        loop {
            level.prev().unwrap();
            match level.key() {
                Some(k) => collected.push(k.to_vec()),
                None => break,
            }
        }
        assert_eq!(
            vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()],
            collected
        );
    }
}

//! A MergingCursor merges several cursors into one logical, sorted cursor.
//!
//! Ties (the same key present in more than one underlying cursor) resolve to the lowest-index
//! cursor — when [crate::level_iterator::LevelIterator] stacks levels with level 0 first, this
//! gives the usual "newer level shadows older" semantics for free, without either level needing to
//! know the other exists.
//!
//! Each `next()`/`prev()` call re-derives the current minimum/maximum across all cursors and
//! advances only the cursor(s) sitting exactly on it, so no cursor is ever skipped past a key it
//! hasn't yielded yet. This costs a linear scan over `cursors` per step; for the handful of levels
//! an SST stack actually has, that's cheaper than the bookkeeping a heap would add.

use std::cmp::Ordering;

use crate::{compare_bytes, Cursor, Error};

/////////////////////////////////////////// MergingCursor //////////////////////////////////////////

/// Merges several same-typed cursors into one logical cursor over their union.
#[derive(Clone, Debug)]
pub struct MergingCursor<C> {
    cursors: Vec<C>,
}

impl<C: Cursor> MergingCursor<C> {
    pub fn new(cursors: Vec<C>) -> Self {
        Self { cursors }
    }

    fn index_of_extreme(&self, prefer: Ordering) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, c) in self.cursors.iter().enumerate() {
            let Some(k) = c.key() else { continue };
            best = match best {
                None => Some(i),
                Some(b) => {
                    let bk = self.cursors[b].key().expect("index came from a positioned cursor");
                    if compare_bytes(k, bk) == prefer {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best
    }

    fn any_positioned(&self) -> bool {
        self.cursors.iter().any(|c| c.key().is_some())
    }

    /// How many cursors are merged. Used by [crate::level_iterator::LevelIterator] to size its
    /// pilot restart bookkeeping.
    pub(crate) fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Direct access to one underlying cursor, bypassing the merge logic. Used by
    /// [crate::level_iterator::LevelIterator] to restore individual cursors from a pilot
    /// checkpoint and to read the one cursor a pilot-guided step has already identified as
    /// holding the current key, without re-deriving the extreme across every level.
    pub(crate) fn cursor(&self, i: usize) -> &C {
        &self.cursors[i]
    }

    pub(crate) fn cursor_mut(&mut self, i: usize) -> &mut C {
        &mut self.cursors[i]
    }
}

impl<C: Cursor> Cursor for MergingCursor<C> {
    fn seek_to_first(&mut self) -> Result<(), Error> {
        for c in &mut self.cursors {
            c.seek_to_first()?;
        }
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        for c in &mut self.cursors {
            c.seek_to_last()?;
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), Error> {
        for c in &mut self.cursors {
            c.seek(key)?;
        }
        Ok(())
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<(), Error> {
        for c in &mut self.cursors {
            c.seek_for_prev(key)?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<(), Error> {
        if !self.any_positioned() {
            for c in &mut self.cursors {
                c.next()?;
            }
            return Ok(());
        }
        if let Some(i) = self.index_of_extreme(Ordering::Less) {
            let min_key = self.cursors[i].key().unwrap().to_vec();
            for c in &mut self.cursors {
                if c.key() == Some(min_key.as_slice()) {
                    c.next()?;
                }
            }
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<(), Error> {
        if !self.any_positioned() {
            for c in &mut self.cursors {
                c.prev()?;
            }
            return Ok(());
        }
        if let Some(i) = self.index_of_extreme(Ordering::Greater) {
            let max_key = self.cursors[i].key().unwrap().to_vec();
            for c in &mut self.cursors {
                if c.key() == Some(max_key.as_slice()) {
                    c.prev()?;
                }
            }
        }
        Ok(())
    }

    fn key(&self) -> Option<&[u8]> {
        self.index_of_extreme(Ordering::Less)
            .and_then(|i| self.cursors[i].key())
    }

    fn value(&self) -> Option<&[u8]> {
        self.index_of_extreme(Ordering::Less)
            .and_then(|i| self.cursors[i].value())
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceBuilder;

    fn table(pairs: &[(&[u8], &[u8])]) -> crate::reference::ReferenceTable {
        let mut builder = ReferenceBuilder::default();
        for (k, v) in pairs {
            builder.put(k, v).unwrap();
        }
        builder.seal().unwrap()
    }

    #[test]
    fn merges_disjoint_levels_in_order() {
        let a = table(&[(b"a", b"1"), (b"c", b"1"), (b"e", b"1")]);
        let b = table(&[(b"b", b"2"), (b"d", b"2"), (b"f", b"2")]);
        let mut merged = MergingCursor::new(vec![a.cursor(), b.cursor()]);
        merged.seek_to_first().unwrap();
        let mut collected = Vec::new();
        loop {
            merged.next().unwrap();
            match merged.key() {
                Some(k) => collected.push((k.to_vec(), merged.value().unwrap().to_vec())),
                None => break,
            }
        }
        let expected: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"1".to_vec()),
            (b"d".to_vec(), b"2".to_vec()),
            (b"e".to_vec(), b"1".to_vec()),
            (b"f".to_vec(), b"2".to_vec()),
        ];
        assert_eq!(expected, collected);
    }

    #[test]
    fn lower_index_shadows_higher_index_on_tie() {
        let upper = table(&[(b"k", b"new")]);
        let lower = table(&[(b"k", b"old"), (b"z", b"old")]);
        let mut merged = MergingCursor::new(vec![upper.cursor(), lower.cursor()]);
        merged.seek_to_first().unwrap();
        merged.next().unwrap();
        assert_eq!(Some(&b"k"[..]), merged.key());
        assert_eq!(Some(&b"new"[..]), merged.value());
        merged.next().unwrap();
        assert_eq!(Some(&b"z"[..]), merged.key());
    }

    #[test]
    fn seek_lands_on_merged_lower_bound() {
        let a = table(&[(b"a", b"1"), (b"m", b"1")]);
        let b = table(&[(b"c", b"2"), (b"n", b"2")]);
        let mut merged = MergingCursor::new(vec![a.cursor(), b.cursor()]);
        merged.seek(b"d").unwrap();
        assert_eq!(Some(&b"m"[..]), merged.key());
    }

    #[test]
    fn reverse_scan_matches_forward_scan_reversed() {
        let a = table(&[(b"a", b"1"), (b"c", b"1")]);
        let b = table(&[(b"b", b"2"), (b"d", b"2")]);
        let mut merged = MergingCursor::new(vec![a.cursor(), b.cursor()]);
        merged.seek_to_last().unwrap();
        let mut collected = Vec::new();
        loop {
            merged.prev().unwrap();
            match merged.key() {
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

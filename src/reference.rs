//! A slow, obviously-correct table implementation used as the property-test oracle: every other
//! cursor in this crate ([crate::block::BlockCursor], [crate::table::TableCursor],
//! [crate::merging_cursor::MergingCursor]) is checked against what a linear scan over this type
//! would produce.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::{check_key_len, check_table_size, check_value_len, compare_bytes, Cursor, Error};

////////////////////////////////////////// ReferenceTable //////////////////////////////////////////

/// An in-memory sorted table, built by simple linear insertion and binary-search seeks.
#[derive(Clone, Debug, Default)]
pub struct ReferenceTable {
    entries: Rc<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl ReferenceTable {
    pub fn cursor(&self) -> ReferenceCursor {
        ReferenceCursor {
            entries: Rc::clone(&self.entries),
            index: -1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

///////////////////////////////////////// ReferenceBuilder /////////////////////////////////////////

/// A builder that returns a [ReferenceTable].
#[derive(Clone, Debug, Default)]
pub struct ReferenceBuilder {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    approximate_size: usize,
}

impl ReferenceBuilder {
    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        check_key_len(key)?;
        check_value_len(value)?;
        self.approximate_size += key.len() + value.len();
        check_table_size(self.approximate_size)?;
        self.entries.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    /// Sort and deduplicate (keeping the last write for a repeated key) into a [ReferenceTable].
    pub fn seal(self) -> Result<ReferenceTable, Error> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| compare_bytes(&a.0, &b.0));
        // Stable sort preserves insertion order among equal keys; keep the last write.
        let mut deduped: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            if deduped.last().is_some_and(|(k, _)| *k == key) {
                deduped.last_mut().unwrap().1 = value;
            } else {
                deduped.push((key, value));
            }
        }
        Ok(ReferenceTable {
            entries: Rc::new(deduped),
        })
    }
}

////////////////////////////////////////// ReferenceCursor /////////////////////////////////////////

/// A cursor over a [ReferenceTable]. Follows the same convention as every other cursor in this
/// crate: `seek_to_first`/`seek_to_last` land one step before/after the data (requiring a
/// subsequent `next`/`prev`), while `seek`/`seek_for_prev` land directly on their result.
#[derive(Clone, Debug)]
pub struct ReferenceCursor {
    entries: Rc<Vec<(Vec<u8>, Vec<u8>)>>,
    index: isize,
}

impl ReferenceCursor {
    fn lower_bound(&self, key: &[u8]) -> usize {
        self.entries
            .binary_search_by(|(k, _)| compare_bytes(k, key))
            .unwrap_or_else(|i| i)
    }

    fn upper_bound_le(&self, key: &[u8]) -> isize {
        let lb = self.lower_bound(key);
        if lb < self.entries.len() && self.entries[lb].0 == key {
            lb as isize
        } else {
            lb as isize - 1
        }
    }
}

impl Cursor for ReferenceCursor {
    fn seek_to_first(&mut self) -> Result<(), Error> {
        self.index = -1;
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        self.index = self.entries.len() as isize;
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), Error> {
        self.index = self.lower_bound(key) as isize;
        Ok(())
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<(), Error> {
        self.index = self.upper_bound_le(key);
        Ok(())
    }

    fn prev(&mut self) -> Result<(), Error> {
        if self.index >= 0 {
            self.index -= 1;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<(), Error> {
        if (self.index as isize) < self.entries.len() as isize {
            self.index += 1;
        }
        Ok(())
    }

    fn key(&self) -> Option<&[u8]> {
        if self.index < 0 || self.index as usize >= self.entries.len() {
            None
        } else {
            Some(&self.entries[self.index as usize].0)
        }
    }

    fn value(&self) -> Option<&[u8]> {
        if self.index < 0 || self.index as usize >= self.entries.len() {
            None
        } else {
            Some(&self.entries[self.index as usize].1)
        }
    }
}

impl From<ReferenceTable> for ReferenceCursor {
    fn from(table: ReferenceTable) -> Self {
        table.cursor()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

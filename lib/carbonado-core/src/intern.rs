//! Metric name interning.

use std::{borrow::Cow, collections::HashMap};

use foldhash::fast::RandomState;

/// Reverses the dot-separated segments of a metric path.
///
/// `host1.cpu.load` becomes `load.cpu.host1`. Applying the function twice yields the original path.
pub fn reverse_path(path: &[u8]) -> Vec<u8> {
    let mut reversed = Vec::with_capacity(path.len());
    for (i, segment) in path.rsplit(|b| *b == b'.').enumerate() {
        if i > 0 {
            reversed.push(b'.');
        }
        reversed.extend_from_slice(segment);
    }
    reversed
}

/// Maps metric names to small integer identifiers.
///
/// Identifiers are assigned in first-seen order, starting at 1, and every distinct name maps to exactly one
/// identifier. Names are held as views over the buffer they were read from whenever possible.
///
/// Names read from a reversed-path column are tracked in a second map keyed by their reversed form, which resolves to
/// the same identifier as the canonical name.
#[derive(Debug, Default)]
pub struct NameTable<'a> {
    ids: HashMap<Cow<'a, [u8]>, u32, RandomState>,
    reversed_ids: HashMap<&'a [u8], u32, RandomState>,
    names: Vec<Cow<'a, [u8]>>,
}

impl<'a> NameTable<'a> {
    /// Creates an empty `NameTable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier for `name`, assigning a new one if the name has not been seen yet.
    pub fn intern(&mut self, name: &'a [u8]) -> u32 {
        match self.ids.get(name) {
            Some(id) => *id,
            None => self.insert(Cow::Borrowed(name)),
        }
    }

    /// Returns the identifier for the canonical form of the reversed path `reversed_name`.
    ///
    /// The canonical name is the path with its segments reversed back. Both forms resolve to the same identifier,
    /// including when the canonical name was interned directly beforehand.
    pub fn intern_reversed(&mut self, reversed_name: &'a [u8]) -> u32 {
        if let Some(id) = self.reversed_ids.get(reversed_name) {
            return *id;
        }

        let name = reverse_path(reversed_name);
        let id = match self.ids.get(name.as_slice()) {
            Some(id) => *id,
            None => self.insert(Cow::Owned(name)),
        };
        self.reversed_ids.insert(reversed_name, id);
        id
    }

    fn insert(&mut self, name: Cow<'a, [u8]>) -> u32 {
        self.names.push(name.clone());
        let id = self.names.len() as u32;
        self.ids.insert(name, id);
        id
    }

    /// Returns the canonical name for `id`, if it was assigned by this table.
    pub fn name(&self, id: u32) -> Option<&[u8]> {
        let index = (id as usize).checked_sub(1)?;
        self.names.get(index).map(|name| name.as_ref())
    }

    /// Returns the number of distinct names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no names have been interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

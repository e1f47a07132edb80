//! Cursor over an ordered, fixed view of records.

/// A positioned cursor over key/value records in byte-lexicographic key order.
///
/// The iterator captures its records when it is created, so writes issued
/// afterwards never change what it observes, and it can never see part of a
/// batch. It starts out invalid; call one of the seek methods first.
///
/// ```ignore
/// let mut it = db.new_iterator()?;
/// it.seek_to_first();
/// while let Some((key, value)) = it.entry() {
///     println!("{:?} = {:?}", key, value);
///     it.next();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RecordIterator {
    records: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
}

impl RecordIterator {
    /// `records` must already be sorted by key with no duplicates.
    pub(crate) fn from_sorted(records: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        debug_assert!(records.windows(2).all(|w| match w {
            [a, b] => a.0 < b.0,
            _ => true,
        }));
        Self { records, pos: None }
    }

    /// An iterator that is never valid.
    pub fn empty() -> Self {
        Self::from_sorted(Vec::new())
    }

    pub fn valid(&self) -> bool {
        self.pos.is_some()
    }

    pub fn seek_to_first(&mut self) {
        self.pos = if self.records.is_empty() { None } else { Some(0) };
    }

    pub fn seek_to_last(&mut self) {
        self.pos = self.records.len().checked_sub(1);
    }

    /// Position at the first key at or past `target`.
    pub fn seek(&mut self, target: impl AsRef<[u8]>) {
        let target = target.as_ref();
        let idx = self
            .records
            .partition_point(|(key, _)| key.as_slice() < target);
        self.pos = (idx < self.records.len()).then_some(idx);
    }

    /// Advance one record. Returns whether the iterator is still valid.
    ///
    /// Does nothing while invalid.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if let Some(pos) = self.pos {
            let next = pos + 1;
            self.pos = (next < self.records.len()).then_some(next);
        }
        self.valid()
    }

    /// Step back one record. Returns whether the iterator is still valid.
    pub fn prev(&mut self) -> bool {
        self.pos = self.pos.and_then(|pos| pos.checked_sub(1));
        self.valid()
    }

    /// Key at the current position, `None` while invalid.
    pub fn key(&self) -> Option<&[u8]> {
        self.entry().map(|(key, _)| key)
    }

    /// Value at the current position, `None` while invalid.
    pub fn value(&self) -> Option<&[u8]> {
        self.entry().map(|(_, value)| value)
    }

    pub fn entry(&self) -> Option<(&[u8], &[u8])> {
        let (key, value) = self.records.get(self.pos?)?;
        Some((key.as_slice(), value.as_slice()))
    }

    /// Number of records visible to this iterator.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iter_over(keys: &[&str]) -> RecordIterator {
        RecordIterator::from_sorted(
            keys.iter()
                .map(|k| (k.as_bytes().to_vec(), format!("v-{}", k).into_bytes()))
                .collect(),
        )
    }

    #[test]
    fn test_starts_invalid() {
        let it = iter_over(&["a", "b"]);
        assert!(!it.valid());
        assert_eq!(it.key(), None);
        assert_eq!(it.value(), None);
    }

    #[test]
    fn test_walk_both_ends() {
        let mut it = iter_over(&["key1", "key2", "key3"]);

        it.seek_to_first();
        assert_eq!(it.key(), Some(b"key1".as_slice()));
        assert!(!it.prev());
        assert!(!it.valid());

        it.seek_to_last();
        assert_eq!(it.entry(), Some((b"key3".as_slice(), b"v-key3".as_slice())));
        assert!(!it.next());
        assert!(!it.valid());

        // Moving while invalid stays invalid.
        assert!(!it.next());
        assert!(!it.prev());
    }

    #[test]
    fn test_seek_lower_bound() {
        let mut it = iter_over(&["b", "d", "f"]);

        it.seek("d");
        assert_eq!(it.key(), Some(b"d".as_slice()));

        it.seek("c");
        assert_eq!(it.key(), Some(b"d".as_slice()));

        it.seek("");
        assert_eq!(it.key(), Some(b"b".as_slice()));

        it.seek("g");
        assert!(!it.valid());
    }

    #[test]
    fn test_empty() {
        let mut it = RecordIterator::empty();
        it.seek_to_first();
        assert!(!it.valid());
        it.seek_to_last();
        assert!(!it.valid());
        assert!(it.is_empty());
    }
}

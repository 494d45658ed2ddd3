// Copyright (c) 2023 The Cocoon Authors

use crate::error::StoreError;
use crate::KEY_SEPARATOR;
use std::collections::BTreeMap;

/// Builds a composite key: parts joined by [`KEY_SEPARATOR`]
/// ```
/// # use cocoon_store_exports::composite_key;
/// assert_eq!(composite_key(&[b"a", b"b"]), b"a\0b".to_vec());
/// ```
pub fn composite_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.extend_from_slice(part);
    }
    key
}

/// A key that must not exist when the batch is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueClaim {
    /// column family
    pub cf: &'static str,
    /// claimed key
    pub key: Vec<u8>,
    /// error returned if the key is taken
    pub on_conflict: StoreError,
}

/// Writes staged for one atomic commit
#[derive(Debug, Default, Clone)]
pub struct StoreBatch {
    /// column family -> key -> value
    pub puts: BTreeMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>,
    /// keys that must be free at commit time
    pub claims: Vec<UniqueClaim>,
}

impl StoreBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a write
    pub fn put(&mut self, cf: &'static str, key: Vec<u8>, value: Vec<u8>) {
        self.puts.entry(cf).or_default().insert(key, value);
    }

    /// Stages a write of a key that must not exist yet.
    /// Claiming a key twice in the same batch fails right away.
    pub fn put_unique(
        &mut self,
        cf: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
        on_conflict: StoreError,
    ) -> Result<(), StoreError> {
        if self.claims.iter().any(|c| c.cf == cf && c.key == key) {
            return Err(on_conflict);
        }
        self.claims.push(UniqueClaim {
            cf,
            key: key.clone(),
            on_conflict,
        });
        self.put(cf, key, value);
        Ok(())
    }

    /// Staged value of a key
    pub fn get(&self, cf: &'static str, key: &[u8]) -> Option<&Vec<u8>> {
        self.puts.get(cf).and_then(|m| m.get(key))
    }

    /// true when nothing is staged
    pub fn is_empty(&self) -> bool {
        self.puts.values().all(BTreeMap::is_empty)
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.puts.values().map(BTreeMap::len).sum()
    }
}

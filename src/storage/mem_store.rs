//! In-memory revision tree store with an append-only version log.
//!
//! Every write appends the encoded tree to the log under a fresh offset and
//! sequence, then points the document at it. Old versions are never removed,
//! which is what lets deferred bodies resolve.
//!
//! Architecture:
//! - docs: DashMap from document ID to its latest version
//! - log: every version ever written, keyed by offset
//! - offsets grow by the blob length, like positions in an append-only file
//!
//! Concurrency: `update` holds the document's map entry for the whole
//! read-modify-write cycle, so writers to one document run one at a time
//! while other documents proceed in parallel.
use crate::core::Config;
use crate::storage::{StoredTree, TreeStorage};
use crate::system::metrics::Metrics;
use crate::time_operation;
use crate::tree::{Body, RevNode, RevTree};
use crate::types::{DocId, Error, Result, Sequence, StorageError};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// First offset handed out; 0 means "no offset" in the tree format
const FIRST_OFFSET: u64 = 1;

/// In-memory implementation of [`TreeStorage`]
pub struct MemStore {
    /// Latest version of each document
    docs: DashMap<DocId, StoredTree>,
    /// Every version ever written, by offset
    log: RwLock<HashMap<u64, StoredTree>>,
    /// Last sequence handed out
    sequence: AtomicU64,
    /// Offset the next version will get
    next_offset: AtomicU64,
    config: Config,
}

impl MemStore {
    /// Create a store with default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a store with the given configuration
    pub fn with_config(config: Config) -> Self {
        Self {
            docs: DashMap::with_capacity(config.storage.initial_capacity),
            log: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            next_offset: AtomicU64::new(FIRST_OFFSET),
            config,
        }
    }

    /// Configuration this store runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Last sequence assigned to a write, 0 before the first one
    pub fn last_sequence(&self) -> Sequence {
        self.sequence.load(Ordering::Acquire)
    }

    /// Decode the current tree of a document
    pub fn tree(&self, doc_id: &str) -> Result<Option<RevTree>> {
        self.read(doc_id)
            .map(|stored| RevTree::decode(stored.bytes, stored.sequence, stored.offset))
            .transpose()
    }

    /// Run a read-modify-write cycle on a document's tree
    ///
    /// A document that was never written starts from an empty tree. After
    /// `f` runs the tree is pruned to `tree.max_depth` when `prune_on_save`
    /// is set, and saved as a new version if anything changed. A corrupt
    /// stored tree fails the update before `f` is called.
    pub fn update<F, R>(&self, doc_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut RevTree) -> R,
    {
        let metrics = Metrics::global();
        time_operation!(metrics.storage.update_duration, self.update_entry(doc_id, f))
    }

    fn update_entry<F, R>(&self, doc_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut RevTree) -> R,
    {
        match self.docs.entry(doc_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().clone();
                let mut tree = RevTree::decode(current.bytes, current.sequence, current.offset)?;
                tree.set_body_offset(current.offset);
                let result = f(&mut tree);
                if let Some(saved) = self.save(doc_id, &mut tree)? {
                    slot.insert(saved);
                }
                Ok(result)
            }
            Entry::Vacant(slot) => {
                let mut tree = RevTree::new();
                let result = f(&mut tree);
                if let Some(saved) = self.save(doc_id, &mut tree)? {
                    slot.insert(saved);
                }
                Ok(result)
            }
        }
    }

    /// Prune and persist a mutated tree; `None` if there was nothing to write
    fn save(&self, doc_id: &str, tree: &mut RevTree) -> Result<Option<StoredTree>> {
        if self.config.storage.prune_on_save {
            tree.prune(self.config.tree.max_depth);
        }
        if !tree.is_changed() {
            Metrics::global().storage.unchanged_updates.inc();
            return Ok(None);
        }

        let saved = self.append(tree.encode()?);
        debug!(
            doc_id,
            sequence = saved.sequence,
            offset = saved.offset,
            revisions = tree.len(),
            "saved revision tree"
        );
        Ok(Some(saved))
    }

    /// Add a version to the log under a fresh sequence and offset
    fn append(&self, bytes: Bytes) -> StoredTree {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let offset = self
            .next_offset
            .fetch_add(bytes.len() as u64, Ordering::AcqRel);
        let stored = StoredTree {
            bytes,
            sequence,
            offset,
        };
        self.log.write().insert(offset, stored.clone());
        Metrics::global().storage.trees_saved.inc();
        stored
    }

    /// Body of one revision of a document
    ///
    /// Inline bodies come straight from the current tree. A deferred body is
    /// looked up in the older version its offset points to. Returns `None`
    /// when the revision has no body at all.
    pub fn resolve_body(&self, doc_id: &str, rev_id: &[u8]) -> Result<Option<Bytes>> {
        let current = self
            .read(doc_id)
            .ok_or_else(|| Error::not_found(format!("document {}", doc_id)))?;
        let mut tree = RevTree::decode(current.bytes, current.sequence, current.offset)?;
        let mut from = current.offset;

        loop {
            let offset = match tree.get(rev_id).map(RevNode::body) {
                None if from == current.offset => {
                    return Err(Error::not_found(format!(
                        "revision {} of {}",
                        String::from_utf8_lossy(rev_id),
                        doc_id
                    )))
                }
                None => {
                    return Err(StorageError::Corruption(format!(
                        "revision {} missing from version at offset {}",
                        String::from_utf8_lossy(rev_id),
                        from
                    ))
                    .into())
                }
                Some(Body::Empty) => return Ok(None),
                Some(Body::Inline(data)) => return Ok(Some(data.clone())),
                Some(&Body::Deferred(offset)) => offset,
            };

            // versions only ever point back to older ones
            if offset >= from {
                return Err(StorageError::Corruption(format!(
                    "body offset {} does not precede {}",
                    offset, from
                ))
                .into());
            }
            let older = self.read_at(offset)?;
            tree = RevTree::decode(older.bytes, older.sequence, older.offset)?;
            from = older.offset;
        }
    }

    /// Ancestors of a revision for a pushed change, capped at `tree.max_history`
    pub fn history(&self, doc_id: &str, rev_id: &[u8], known: &[&[u8]]) -> Result<Vec<Bytes>> {
        let tree = self
            .tree(doc_id)?
            .ok_or_else(|| Error::not_found(format!("document {}", doc_id)))?;
        Ok(tree
            .history(rev_id, self.config.tree.max_history, known)
            .into_iter()
            .map(Bytes::copy_from_slice)
            .collect())
    }

    /// Known revisions that could precede `rev_id`, capped at
    /// `tree.max_possible_ancestors`
    ///
    /// An unknown document has no ancestors to offer.
    pub fn possible_ancestors(&self, doc_id: &str, rev_id: &[u8]) -> Result<Vec<Bytes>> {
        let Some(tree) = self.tree(doc_id)? else {
            return Ok(Vec::new());
        };
        Ok(tree
            .possible_ancestors(rev_id, self.config.tree.max_possible_ancestors)
            .into_iter()
            .map(Bytes::copy_from_slice)
            .collect())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStorage for MemStore {
    fn read(&self, doc_id: &str) -> Option<StoredTree> {
        self.docs.get(doc_id).map(|entry| entry.value().clone())
    }

    fn read_at(&self, offset: u64) -> Result<StoredTree> {
        self.log
            .read()
            .get(&offset)
            .cloned()
            .ok_or_else(|| StorageError::UnknownOffset(offset).into())
    }

    fn write(&self, doc_id: &str, bytes: Bytes) -> Result<StoredTree> {
        let stored = self.append(bytes);
        self.docs.insert(doc_id.to_string(), stored.clone());
        Ok(stored)
    }

    fn document_count(&self) -> usize {
        self.docs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store_without_pruning() -> MemStore {
        let mut config = Config::default();
        config.storage.prune_on_save = false;
        MemStore::with_config(config)
    }

    #[test]
    fn test_update_creates_document() {
        let store = MemStore::new();
        let index = store
            .update("doc", |tree| tree.insert(b"1-aa", b"{}", false, None, false))
            .unwrap()
            .unwrap();
        assert_eq!(index, 0);
        assert_eq!(store.document_count(), 1);

        let stored = store.read("doc").unwrap();
        assert_eq!(stored.sequence, 1);
        assert_eq!(stored.offset, FIRST_OFFSET);

        // the new revision picks up the sequence of the save that wrote it
        let tree = store.tree("doc").unwrap().unwrap();
        assert_eq!(tree.get(b"1-aa").unwrap().sequence(), 1);
        assert!(!tree.get(b"1-aa").unwrap().is_new());
    }

    #[test]
    fn test_unchanged_update_writes_nothing() {
        let store = MemStore::new();
        store
            .update("doc", |tree| tree.insert(b"1-aa", b"", false, None, false))
            .unwrap()
            .unwrap();
        let before = store.read("doc").unwrap();

        let len = store.update("doc", |tree| tree.len()).unwrap();
        assert_eq!(len, 1);
        assert_eq!(store.read("doc").unwrap(), before);
        assert_eq!(store.last_sequence(), 1);

        // a vacant document stays vacant when nothing is inserted
        store.update("other", |_| ()).unwrap();
        assert!(store.read("other").is_none());
    }

    #[test]
    fn test_replaced_body_resolves_from_older_version() {
        let store = store_without_pruning();
        store
            .update("doc", |tree| tree.insert(b"1-aa", b"first", false, None, false))
            .unwrap()
            .unwrap();
        let first_offset = store.read("doc").unwrap().offset;

        store
            .update("doc", |tree| tree.insert(b"2-bb", b"second", false, Some(b"1-aa"), false))
            .unwrap()
            .unwrap();

        let tree = store.tree("doc").unwrap().unwrap();
        assert_eq!(tree.get(b"1-aa").unwrap().body(), &Body::Deferred(first_offset));
        assert_eq!(
            store.resolve_body("doc", b"1-aa").unwrap(),
            Some(Bytes::from_static(b"first"))
        );
        assert_eq!(
            store.resolve_body("doc", b"2-bb").unwrap(),
            Some(Bytes::from_static(b"second"))
        );

        // a third save keeps pointing at the version that still has the body
        store
            .update("doc", |tree| tree.insert(b"3-cc", b"third", false, Some(b"2-bb"), false))
            .unwrap()
            .unwrap();
        assert_eq!(
            store.resolve_body("doc", b"1-aa").unwrap(),
            Some(Bytes::from_static(b"first"))
        );
    }

    #[test]
    fn test_resolve_body_errors() {
        let store = MemStore::new();
        assert!(matches!(
            store.resolve_body("missing", b"1-aa"),
            Err(Error::NotFound(_))
        ));

        store
            .update("doc", |tree| tree.insert(b"1-aa", b"", false, None, false))
            .unwrap()
            .unwrap();
        assert!(matches!(
            store.resolve_body("doc", b"9-zz"),
            Err(Error::NotFound(_))
        ));
        assert_eq!(store.resolve_body("doc", b"1-aa").unwrap(), None);
    }

    #[test]
    fn test_read_at_unknown_offset() {
        let store = MemStore::new();
        let err = store.read_at(42).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::UnknownOffset(42))));
    }

    #[test]
    fn test_corrupt_version_fails_update() {
        let store = MemStore::new();
        store
            .write("doc", Bytes::from_static(&[0, 0, 0, 9, 1]))
            .unwrap();

        let mut called = false;
        let err = store.update("doc", |_| called = true).unwrap_err();
        assert!(err.is_corruption());
        assert!(!called);
    }

    #[test]
    fn test_prune_on_save() {
        let mut config = Config::default();
        config.tree.max_depth = 3;
        let store = MemStore::with_config(config);

        let history: Vec<Vec<u8>> = (1..=6).rev().map(|g| format!("{}-x", g).into_bytes()).collect();
        let chain: Vec<&[u8]> = history.iter().map(Vec::as_slice).collect();
        store
            .update("doc", |tree| tree.insert_history(&chain, b"body", false))
            .unwrap()
            .unwrap();

        let tree = store.tree("doc").unwrap().unwrap();
        assert_eq!(tree.len(), 3);
        assert!(tree.get(b"6-x").is_some());
        assert!(tree.get(b"3-x").is_none());
    }

    #[test]
    fn test_history_and_possible_ancestors() {
        let store = MemStore::new();
        store
            .update("doc", |tree| {
                tree.insert_history(&[&b"3-c"[..], b"2-b", b"1-a"], b"", false)
            })
            .unwrap()
            .unwrap();

        let history = store.history("doc", b"3-c", &[]).unwrap();
        assert_eq!(history, vec![Bytes::from_static(b"2-b"), Bytes::from_static(b"1-a")]);

        let ancestors = store.possible_ancestors("doc", b"4-d").unwrap();
        assert_eq!(ancestors[0], Bytes::from_static(b"3-c"));
        assert_eq!(ancestors.len(), 3);

        assert!(store.possible_ancestors("nope", b"4-d").unwrap().is_empty());
        assert!(store.history("nope", b"4-d", &[]).is_err());
    }

    #[test]
    fn test_concurrent_writers_same_document() {
        let store = Arc::new(store_without_pruning());
        store
            .update("doc", |tree| tree.insert(b"1-root", b"", false, None, false))
            .unwrap()
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let rev_id = format!("2-branch{}", i);
                    store
                        .update("doc", |tree| {
                            tree.insert(rev_id.as_bytes(), b"", false, Some(b"1-root"), true)
                        })
                        .unwrap()
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // no update was lost
        let tree = store.tree("doc").unwrap().unwrap();
        assert_eq!(tree.len(), 9);
        assert_eq!(store.last_sequence(), 9);
        assert!(tree.has_conflict());
    }
}

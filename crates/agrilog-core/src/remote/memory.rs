//! In-memory document store with fault injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{Document, DocumentStore, MAX_BATCH_WRITES};
use crate::models::Collection;
use crate::{Error, Result};

#[derive(Default)]
struct State {
    collections: HashMap<Collection, BTreeMap<String, Document>>,
    failing_fetches: HashSet<Collection>,
    failing_commits: HashSet<Collection>,
    failing_batch: HashMap<Collection, usize>,
    commit_calls: HashMap<Collection, usize>,
}

/// Last-write-wins document store held in memory.
pub struct MemoryDocumentStore {
    state: Mutex<State>,
    max_batch_size: usize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_max_batch_size(MAX_BATCH_WRITES)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_batch_size: max_batch_size.max(1),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every fetch of `collection` fail (or succeed again).
    pub fn fail_fetch(&self, collection: Collection, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_fetches.insert(collection);
        } else {
            state.failing_fetches.remove(&collection);
        }
    }

    /// Make every commit to `collection` fail (or succeed again).
    pub fn fail_commits(&self, collection: Collection, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_commits.insert(collection);
        } else {
            state.failing_commits.remove(&collection);
        }
    }

    /// Fail the `n`-th commit call (1-based, counted from now) to `collection`.
    pub fn fail_batch_number(&self, collection: Collection, n: usize) {
        let mut state = self.state();
        let already = state.commit_calls.get(&collection).copied().unwrap_or(0);
        state.failing_batch.insert(collection, already + n);
    }

    /// Documents of a collection, ordered by id.
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.state()
            .collections
            .get(&collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, collection: Collection, id: &str) -> Option<Document> {
        self.state()
            .collections
            .get(&collection)
            .and_then(|documents| documents.get(id).cloned())
    }

    /// Write a document directly, as another device would.
    pub fn put(&self, collection: Collection, document: Document) {
        self.state()
            .collections
            .entry(collection)
            .or_default()
            .insert(document.id.clone(), document);
    }

    /// Remove a document directly.
    pub fn remove(&self, collection: Collection, id: &str) -> bool {
        self.state()
            .collections
            .get_mut(&collection)
            .is_some_and(|documents| documents.remove(id).is_some())
    }

    /// Commit calls made to `collection`, failed ones included.
    pub fn commit_count(&self, collection: Collection) -> usize {
        self.state()
            .commit_calls
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>> {
        let state = self.state();
        if state.failing_fetches.contains(&collection) {
            return Err(Error::Remote(format!(
                "Fetch of {collection} failed: simulated outage"
            )));
        }
        Ok(state
            .collections
            .get(&collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit_batch(&self, collection: Collection, documents: Vec<Document>) -> Result<()> {
        let mut state = self.state();
        let call = {
            let calls = state.commit_calls.entry(collection).or_insert(0);
            *calls += 1;
            *calls
        };

        if documents.len() > self.max_batch_size {
            return Err(Error::InvalidInput(format!(
                "Batch of {} writes exceeds the {} write limit",
                documents.len(),
                self.max_batch_size
            )));
        }
        if state.failing_commits.contains(&collection)
            || state.failing_batch.get(&collection) == Some(&call)
        {
            return Err(Error::Remote(format!(
                "Commit {call} to {collection} failed: simulated fault"
            )));
        }

        let stored = state.collections.entry(collection).or_default();
        for document in documents {
            stored.insert(document.id.clone(), document);
        }
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

//! Remote document store boundary.
//!
//! One collection per entity type, document id equal to the record id.
//! A batch commit is atomic; nothing spans collections.

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpDocumentStore;
pub use memory::MemoryDocumentStore;

use crate::models::Collection;
use crate::Result;

/// Largest number of writes the remote store accepts in one commit.
pub const MAX_BATCH_WRITES: usize = 499;

/// A remote document: its id and every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Collection store reachable by name and document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of a collection.
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>>;

    /// Set documents by id in one atomic commit.
    async fn commit_batch(&self, collection: Collection, documents: Vec<Document>) -> Result<()>;

    /// Per-commit write ceiling.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_WRITES
    }
}

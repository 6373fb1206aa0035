//! Seam to the remote document store.
//!
//! The store is a collection/document database with server-assigned write
//! timestamps and all-or-nothing write batches. The engine only depends on
//! [`RemoteStore`]; [`memory::MemoryRemote`] is an in-process implementation.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RemoteError;

pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// Fields to write, plus the name of a field the server fills with its write timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub fields: Fields,
    pub server_timestamp: Option<String>,
}

impl Document {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            server_timestamp: None,
        }
    }

    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamp = Some(field.into());
        self
    }
}

/// A document as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Delete(DocRef),
    Set(DocRef, Document),
}

/// Ordered mutations committed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(&mut self, doc: DocRef) -> &mut Self {
        self.ops.push(BatchOp::Delete(doc));
        self
    }

    pub fn set(&mut self, doc: DocRef, document: Document) -> &mut Self {
        self.ops.push(BatchOp::Set(doc, document));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Split into consecutive batches of at most `limit` operations, keeping order.
    /// An empty batch yields no chunks.
    pub fn into_chunks(self, limit: usize) -> Vec<WriteBatch> {
        let limit = limit.max(1);
        let mut out = Vec::with_capacity(self.ops.len().div_ceil(limit));
        let mut ops = self.ops.into_iter().peekable();
        while ops.peek().is_some() {
            out.push(WriteBatch {
                ops: ops.by_ref().take(limit).collect(),
            });
        }
        out
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_document(&self, doc: &DocRef) -> Result<Option<Fields>, RemoteError>;

    /// Overwrite a whole document.
    async fn set_document(&self, doc: &DocRef, document: Document) -> Result<(), RemoteError>;

    /// All documents of a collection, optionally ordered by a field.
    async fn list_documents(
        &self,
        collection: &str,
        order_by: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<StoredDoc>, RemoteError>;

    /// Apply every operation or none.
    async fn commit(&self, batch: WriteBatch) -> Result<(), RemoteError>;

    /// Store-enforced cap on operations per batch, if it advertises one.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn get_document(&self, doc: &DocRef) -> Result<Option<Fields>, RemoteError> {
        (**self).get_document(doc).await
    }

    async fn set_document(&self, doc: &DocRef, document: Document) -> Result<(), RemoteError> {
        (**self).set_document(doc, document).await
    }

    async fn list_documents(
        &self,
        collection: &str,
        order_by: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<StoredDoc>, RemoteError> {
        (**self).list_documents(collection, order_by, direction).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), RemoteError> {
        (**self).commit(batch).await
    }

    fn max_batch_size(&self) -> Option<usize> {
        (**self).max_batch_size()
    }
}

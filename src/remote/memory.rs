//! In-process document store with failure injection.
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{BatchOp, DocRef, Direction, Document, Fields, RemoteStore, StoredDoc, WriteBatch};
use crate::error::RemoteError;

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
    // Monotonic write counter; stands in for the server timestamp.
    write_seq: u64,
    // Some(n): let n more commits through, then fail one.
    fail_commit_after: Option<usize>,
    committed_batches: Vec<usize>,
}

impl Inner {
    fn write(&mut self, doc: &DocRef, document: Document) {
        self.write_seq += 1;
        let mut fields = document.fields;
        if let Some(stamp) = document.server_timestamp {
            fields.insert(stamp, Value::from(self.write_seq));
        }
        self.collections
            .entry(doc.collection.clone())
            .or_default()
            .insert(doc.id.clone(), fields);
    }

    fn delete(&mut self, doc: &DocRef) {
        if let Some(coll) = self.collections.get_mut(&doc.collection) {
            coll.remove(&doc.id);
        }
    }
}

#[derive(Debug)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
    max_batch: Option<usize>,
    available: AtomicBool,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_batch: None,
            available: AtomicBool::new(true),
            hang: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Reject batches larger than `limit`, like a hosted store would.
    pub fn with_max_batch_size(mut self, limit: usize) -> Self {
        self.max_batch = Some(limit);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every following call wait forever.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Let `n` commits succeed, then fail the next one with `WriteFailed`.
    pub fn fail_commit_after(&self, n: usize) {
        self.lock().fail_commit_after = Some(n);
    }

    /// Total number of calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sizes of the batches committed so far.
    pub fn committed_batches(&self) -> Vec<usize> {
        self.lock().committed_batches.clone()
    }

    /// Snapshot of a collection's document ids and fields, ordered by id.
    pub fn collection(&self, name: &str) -> BTreeMap<String, Fields> {
        self.lock().collections.get(name).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("network unreachable".into()));
        }
        Ok(())
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get_document(&self, doc: &DocRef) -> Result<Option<Fields>, RemoteError> {
        self.enter().await?;
        let inner = self.lock();
        Ok(inner
            .collections
            .get(&doc.collection)
            .and_then(|c| c.get(&doc.id))
            .cloned())
    }

    async fn set_document(&self, doc: &DocRef, document: Document) -> Result<(), RemoteError> {
        self.enter().await?;
        self.lock().write(doc, document);
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        order_by: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<StoredDoc>, RemoteError> {
        self.enter().await?;
        let inner = self.lock();
        let mut docs: Vec<StoredDoc> = inner
            .collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, fields)| StoredDoc {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(field) = order_by {
            docs.sort_by(|a, b| {
                compare_field(a.fields.get(field), b.fields.get(field)).then_with(|| a.id.cmp(&b.id))
            });
        }
        if direction == Direction::Descending {
            docs.reverse();
        }
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), RemoteError> {
        self.enter().await?;
        let mut inner = self.lock();

        if let Some(limit) = self.max_batch {
            if batch.len() > limit {
                return Err(RemoteError::BatchTooLarge {
                    size: batch.len(),
                    limit,
                });
            }
        }
        match inner.fail_commit_after {
            Some(0) => {
                inner.fail_commit_after = None;
                return Err(RemoteError::WriteFailed("injected commit failure".into()));
            }
            Some(n) => inner.fail_commit_after = Some(n - 1),
            None => {}
        }

        let size = batch.len();
        for op in batch.into_ops() {
            match op {
                BatchOp::Delete(doc) => inner.delete(&doc),
                BatchOp::Set(doc, document) => inner.write(&doc, document),
            }
        }
        inner.committed_batches.push(size);
        Ok(())
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn server_timestamp_orders_listing() {
        let remote = MemoryRemote::new();
        for id in ["b", "a", "c"] {
            remote
                .set_document(
                    &DocRef::new("h", id),
                    Document::new(fields(json!({ "id": id }))).with_server_timestamp("timestamp"),
                )
                .await
                .unwrap();
        }
        let docs = remote
            .list_documents("h", Some("timestamp"), Direction::Descending)
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn failed_commit_changes_nothing() {
        let remote = MemoryRemote::new();
        let doc = DocRef::new("h", "x");
        remote
            .set_document(&doc, Document::new(fields(json!({ "v": 1 }))))
            .await
            .unwrap();

        remote.fail_commit_after(0);
        let mut batch = WriteBatch::new();
        batch.delete(doc.clone());
        batch.set(DocRef::new("h", "y"), Document::new(Fields::new()));
        let err = remote.commit(batch).await.unwrap_err();
        assert!(matches!(err, RemoteError::WriteFailed(_)));

        let coll = remote.collection("h");
        assert_eq!(coll.len(), 1);
        assert!(coll.contains_key("x"));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let remote = MemoryRemote::new().with_max_batch_size(1);
        let mut batch = WriteBatch::new();
        batch.delete(DocRef::new("h", "a"));
        batch.delete(DocRef::new("h", "b"));
        assert_eq!(
            remote.commit(batch).await.unwrap_err(),
            RemoteError::BatchTooLarge { size: 2, limit: 1 }
        );
    }

    #[tokio::test]
    async fn unavailable_store_rejects_calls() {
        let remote = MemoryRemote::new();
        remote.set_available(false);
        let err = remote.get_document(&DocRef::new("a", "b")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
        assert_eq!(remote.call_count(), 1);
    }
}

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::local_store::{KeyValueStore, LocalStore};
use crate::model::{Dataset, Movement};
use crate::remote::{DocRef, Direction, Document, Fields, RemoteStore, WriteBatch};
use crate::status::{StatusKind, StatusReporter};

pub const FIELD_INVENTORY: &str = "inventario";
pub const FIELD_COUNTERS: &str = "contadores";
pub const FIELD_UPDATED_AT: &str = "ultimaActualizacion";
pub const FIELD_TIMESTAMP: &str = "timestamp";

const MSG_PUSH_OK: &str = "Datos sincronizados exitosamente";
const MSG_PUSH_ERR: &str = "Error al sincronizar datos";
const MSG_PULL_OK: &str = "Datos cargados desde la nube";
const MSG_PULL_ERR: &str = "Error al cargar datos de la nube";

/// Remote document id of the movement at `index` in the in-memory history.
pub fn movement_doc_id(index: usize) -> String {
    format!("movimiento_{index}")
}

/// What a successful push wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushReport {
    pub movements: usize,
    pub deleted: usize,
    /// Number of committed batches for the history replace; 0 when there was nothing to write.
    pub chunks: usize,
}

/// Clears the in-flight flag when a push or pull ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Pushes full snapshots to the remote store and pulls them back.
///
/// At most one push or pull runs at a time; a request that arrives while one
/// is outstanding fails fast with [`SyncError::InFlight`]. Every remote call is
/// bounded by the configured timeout.
pub struct SyncEngine<R, S, P> {
    remote: R,
    local: LocalStore<S>,
    reporter: P,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    in_flight: AtomicBool,
}

impl<R, S, P> SyncEngine<R, S, P>
where
    R: RemoteStore,
    S: KeyValueStore,
    P: StatusReporter,
{
    pub fn new(
        remote: R,
        local: LocalStore<S>,
        reporter: P,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            local,
            reporter,
            clock,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn local(&self) -> &LocalStore<S> {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Result<InFlightGuard<'_>, SyncError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SyncError::InFlight)?;
        Ok(InFlightGuard(&self.in_flight))
    }

    fn snapshot_ref(&self) -> DocRef {
        DocRef::new(&self.config.snapshot_collection, &self.config.snapshot_document)
    }

    /// Mutations allowed per committed batch: the tighter of config and store.
    fn batch_limit(&self) -> Result<usize, SyncError> {
        let limit = match self.remote.max_batch_size() {
            Some(store) => store.min(self.config.max_batch_size),
            None => self.config.max_batch_size,
        };
        if limit == 0 {
            return Err(SyncError::InvalidState("batch limit must be positive"));
        }
        Ok(limit)
    }

    /// Run a remote call under the timeout. The outer error is the timeout only.
    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<Result<T, RemoteError>, SyncError> {
        let limit = self.config.remote_timeout();
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SyncError::Timeout(limit))
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, SyncError> {
        Ok(self.timed(fut).await??)
    }

    /// Write the snapshot document and replace the remote history with `dataset.history`.
    pub async fn push(&self, dataset: &Dataset) -> Result<PushReport, SyncError> {
        let _guard = self.try_begin()?;
        self.reporter.report_progress(true);
        let result = self.push_inner(dataset).await;
        self.reporter.report_progress(false);

        match &result {
            Ok(report) => {
                tracing::info!(
                    movements = report.movements,
                    deleted = report.deleted,
                    chunks = report.chunks,
                    "push complete"
                );
                self.reporter.report_result(MSG_PUSH_OK, StatusKind::Success);
            }
            Err(e) => {
                tracing::error!(error = %e, "push failed");
                self.reporter.report_result(MSG_PUSH_ERR, StatusKind::Error);
            }
        }
        result
    }

    async fn push_inner(&self, dataset: &Dataset) -> Result<PushReport, SyncError> {
        let limit = self.batch_limit()?;

        // Not covered by the history batch: a later failure leaves this write in place.
        let mut snapshot = Fields::new();
        snapshot.insert(FIELD_INVENTORY.into(), serde_json::to_value(&dataset.inventory)?);
        snapshot.insert(FIELD_COUNTERS.into(), serde_json::to_value(dataset.counters)?);
        self.call(self.remote.set_document(
            &self.snapshot_ref(),
            Document::new(snapshot).with_server_timestamp(FIELD_UPDATED_AT),
        ))
        .await?;

        let history = &self.config.history_collection;
        let existing = self
            .call(self.remote.list_documents(history, None, Direction::Ascending))
            .await?;

        let mut plan = WriteBatch::new();
        for doc in &existing {
            plan.delete(DocRef::new(history, &doc.id));
        }
        for (i, movement) in dataset.history.iter().enumerate() {
            plan.set(
                DocRef::new(history, movement_doc_id(i)),
                Document::new(movement_fields(movement)?).with_server_timestamp(FIELD_TIMESTAMP),
            );
        }

        let chunks = self.commit_chunked(plan, limit).await?;
        self.local.record_sync(self.clock.now_millis())?;

        Ok(PushReport {
            movements: dataset.history.len(),
            deleted: existing.len(),
            chunks,
        })
    }

    /// Commit `plan` atomically when it fits in `limit`, otherwise as ordered
    /// sequential chunks. Returns the number of committed batches.
    async fn commit_chunked(&self, plan: WriteBatch, limit: usize) -> Result<usize, SyncError> {
        if plan.is_empty() {
            return Ok(0);
        }
        if plan.len() <= limit {
            self.call(self.remote.commit(plan)).await?;
            return Ok(1);
        }

        let chunks = plan.into_chunks(limit);
        let total = chunks.len();
        tracing::debug!(total, limit, "history replace exceeds one batch; chunking");
        for (committed, chunk) in chunks.into_iter().enumerate() {
            match self.timed(self.remote.commit(chunk)).await? {
                Ok(()) => {}
                // Nothing landed yet, so the remote is as it was.
                Err(e) if committed == 0 => return Err(e.into()),
                Err(source) => {
                    return Err(SyncError::PartialReplace {
                        committed,
                        total,
                        source,
                    });
                }
            }
        }
        Ok(total)
    }

    /// Fetch the remote dataset, newest movement first. Keeps a local copy on success.
    pub async fn pull(&self) -> Result<Dataset, SyncError> {
        let _guard = self.try_begin()?;
        self.reporter.report_progress(true);
        let result = self.pull_inner().await;
        self.reporter.report_progress(false);

        match &result {
            Ok(dataset) => {
                tracing::info!(movements = dataset.history.len(), "pull complete");
                self.reporter.report_result(MSG_PULL_OK, StatusKind::Success);
            }
            Err(e) => {
                tracing::error!(error = %e, "pull failed");
                self.reporter.report_result(MSG_PULL_ERR, StatusKind::Error);
            }
        }
        result
    }

    async fn pull_inner(&self) -> Result<Dataset, SyncError> {
        let mut dataset = Dataset::default();

        if let Some(fields) = self.call(self.remote.get_document(&self.snapshot_ref())).await? {
            if let Some(v) = non_null(fields.get(FIELD_INVENTORY)) {
                dataset.inventory = serde_json::from_value(v.clone())?;
            }
            if let Some(v) = non_null(fields.get(FIELD_COUNTERS)) {
                dataset.counters = serde_json::from_value(v.clone())?;
            }
        }

        let docs = self
            .call(self.remote.list_documents(
                &self.config.history_collection,
                Some(FIELD_TIMESTAMP),
                Direction::Descending,
            ))
            .await?;
        dataset.history = docs
            .into_iter()
            .map(|doc| self.decode_movement(doc.fields))
            .collect::<Result<_, _>>()?;

        if let Err(e) = self.local.save_local(&dataset) {
            tracing::warn!(error = %e, "pulled dataset not backed up locally");
        }
        Ok(dataset)
    }

    fn decode_movement(&self, mut fields: Fields) -> Result<Movement, SyncError> {
        fields.remove(FIELD_TIMESTAMP);
        if non_null(fields.get("id")).is_none() {
            fields.insert("id".into(), Value::from(self.clock.now_millis()));
        }
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

fn non_null(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

fn movement_fields(movement: &Movement) -> Result<Fields, SyncError> {
    match serde_json::to_value(movement)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(SyncError::InvalidState("movement did not serialize to an object")),
    }
}

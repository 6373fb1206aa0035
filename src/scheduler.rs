//! When to sync: explicit saves, reconnects, refocus (debounced) and startup load.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::engine::{PushReport, SyncEngine};
use crate::error::SyncError;
use crate::local_store::KeyValueStore;
use crate::remote::RemoteStore;
use crate::state::SharedDataset;
use crate::status::StatusReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    /// Last push is more recent than the debounce interval.
    Debounced,
    /// Another push or pull was outstanding; this request was dropped.
    InFlight,
}

/// Result of a trigger. Errors stop here; the engine already reported them.
#[derive(Debug)]
pub enum SyncOutcome {
    Pushed(PushReport),
    Pulled,
    Skipped(SkipReason),
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_pushed(&self) -> bool {
        matches!(self, SyncOutcome::Pushed(_))
    }
}

pub struct SyncScheduler<R, S, P> {
    engine: SyncEngine<R, S, P>,
    dataset: SharedDataset,
    monitor: Arc<ConnectivityMonitor>,
}

impl<R, S, P> SyncScheduler<R, S, P>
where
    R: RemoteStore,
    S: KeyValueStore,
    P: StatusReporter,
{
    pub fn new(
        engine: SyncEngine<R, S, P>,
        dataset: SharedDataset,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            engine,
            dataset,
            monitor,
        }
    }

    pub fn engine(&self) -> &SyncEngine<R, S, P> {
        &self.engine
    }

    pub fn dataset(&self) -> &SharedDataset {
        &self.dataset
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Push if there is no recorded sync or the last one is older than the debounce interval.
    pub async fn maybe_auto_sync(&self, now_ms: i64) -> SyncOutcome {
        if let Some(last) = self.engine.local().last_sync() {
            let debounce = i64::try_from(self.engine.config().debounce_ms).unwrap_or(i64::MAX);
            // A corrupted mark may sit anywhere in i64; never overflow on it.
            let elapsed = now_ms.saturating_sub(last);
            if elapsed <= debounce {
                tracing::debug!(elapsed_ms = elapsed, "auto sync debounced");
                return SyncOutcome::Skipped(SkipReason::Debounced);
            }
        }
        self.push_now().await
    }

    /// Push the current dataset unconditionally.
    pub async fn push_now(&self) -> SyncOutcome {
        let snapshot = self.dataset.snapshot().await;
        match self.engine.push(&snapshot).await {
            Ok(report) => SyncOutcome::Pushed(report),
            Err(SyncError::InFlight) => {
                tracing::debug!("push dropped; another sync is in flight");
                SyncOutcome::Skipped(SkipReason::InFlight)
            }
            Err(e) => SyncOutcome::Failed(e),
        }
    }

    /// Reconnects always push; they skip the debounce.
    pub async fn on_regained_connectivity(&self) -> SyncOutcome {
        if !self.monitor.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        self.push_now().await
    }

    pub async fn on_regained_focus(&self) -> SyncOutcome {
        if !self.monitor.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        self.maybe_auto_sync(self.engine.clock().now_millis()).await
    }

    /// Explicit save: local first, then push when online. No debounce.
    pub async fn save_complete(&self) -> SyncOutcome {
        let snapshot = self.dataset.snapshot().await;
        if let Err(e) = self.engine.local().save_local(&snapshot) {
            // Still try the remote; it may be the only copy that lands.
            tracing::error!(error = %e, "local save failed");
        }
        if !self.monitor.is_online() {
            tracing::debug!("offline; remote push skipped");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        match self.engine.push(&snapshot).await {
            Ok(report) => SyncOutcome::Pushed(report),
            Err(SyncError::InFlight) => SyncOutcome::Skipped(SkipReason::InFlight),
            Err(e) => SyncOutcome::Failed(e),
        }
    }

    /// Startup: hydrate from the local store, then replace with the remote copy if reachable.
    pub async fn load_complete(&self) -> SyncOutcome {
        let mut current = self.dataset.snapshot().await;
        self.engine.local().load_local_into(&mut current);
        self.dataset.replace(current).await;

        if !self.monitor.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        match self.engine.pull().await {
            Ok(remote) => {
                self.dataset.replace(remote).await;
                SyncOutcome::Pulled
            }
            Err(SyncError::InFlight) => SyncOutcome::Skipped(SkipReason::InFlight),
            Err(e) => {
                tracing::warn!(error = %e, "keeping local dataset");
                SyncOutcome::Failed(e)
            }
        }
    }

    pub async fn handle(&self, event: ConnectivityEvent) -> SyncOutcome {
        match event {
            ConnectivityEvent::RegainedConnectivity => self.on_regained_connectivity().await,
            ConnectivityEvent::RegainedFocus => self.on_regained_focus().await,
        }
    }

    /// Dispatch monitor events until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ConnectivityEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let outcome = self.handle(event).await;
                    tracing::debug!(?event, ?outcome, "trigger handled");
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "connectivity events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

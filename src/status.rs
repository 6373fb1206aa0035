//! User-visible sync signals: a progress flag and a short-lived result message.
//!
//! Rendering is the UI's job; it subscribes to [`StatusBoard::subscribe`] and
//! redraws whenever the [`StatusSignal`] changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::config::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSignal {
    pub in_progress: bool,
    pub message: Option<StatusMessage>,
}

/// Fire-and-forget sink for sync progress and outcomes.
pub trait StatusReporter: Send + Sync {
    fn report_progress(&self, active: bool);
    fn report_result(&self, message: &str, kind: StatusKind);
}

impl<T: StatusReporter + ?Sized> StatusReporter for Arc<T> {
    fn report_progress(&self, active: bool) {
        (**self).report_progress(active)
    }

    fn report_result(&self, message: &str, kind: StatusKind) {
        (**self).report_result(message, kind)
    }
}

struct BoardInner {
    tx: watch::Sender<StatusSignal>,
    // Bumped per message so a stale dismiss timer leaves newer messages alone.
    generation: AtomicU64,
    ttl: Duration,
}

/// Publishes status on a watch channel and clears result messages after `ttl`.
#[derive(Clone)]
pub struct StatusBoard {
    inner: Arc<BoardInner>,
}

impl StatusBoard {
    pub fn new(ttl: Duration) -> Self {
        let (tx, _rx) = watch::channel(StatusSignal::default());
        Self {
            inner: Arc::new(BoardInner {
                tx,
                generation: AtomicU64::new(0),
                ttl,
            }),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.message_ttl())
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSignal> {
        self.inner.tx.subscribe()
    }

    pub fn current(&self) -> StatusSignal {
        self.inner.tx.borrow().clone()
    }

    fn schedule_dismiss(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime; status message will not auto-dismiss");
            return;
        };
        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(inner.ttl).await;
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.tx.send_modify(|s| s.message = None);
            }
        });
    }
}

impl StatusReporter for StatusBoard {
    fn report_progress(&self, active: bool) {
        self.inner.tx.send_modify(|s| s.in_progress = active);
    }

    fn report_result(&self, message: &str, kind: StatusKind) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.tx.send_modify(|s| {
            s.message = Some(StatusMessage {
                text: message.to_string(),
                kind,
            })
        });
        self.schedule_dismiss(generation);
    }
}

/// Reporter for headless hosts: status only goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report_progress(&self, active: bool) {
        tracing::debug!(active, "sync progress");
    }

    fn report_result(&self, message: &str, kind: StatusKind) {
        match kind {
            StatusKind::Success => tracing::info!("{message}"),
            StatusKind::Error => tracing::warn!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn result_message_dismisses_after_ttl() {
        let board = StatusBoard::new(Duration::from_millis(3000));
        board.report_result("ok", StatusKind::Success);
        assert_eq!(
            board.current().message,
            Some(StatusMessage {
                text: "ok".into(),
                kind: StatusKind::Success
            })
        );

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(board.current().message.is_some());

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(board.current().message, None);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_message_survives_older_timer() {
        let board = StatusBoard::new(Duration::from_millis(3000));
        board.report_result("first", StatusKind::Success);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        board.report_result("second", StatusKind::Error);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        let msg = board.current().message.unwrap();
        assert_eq!(msg.text, "second");
        assert_eq!(msg.kind, StatusKind::Error);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        tokio::task::yield_now().await;
        assert_eq!(board.current().message, None);
    }

    #[test]
    fn progress_flag_is_published() {
        let board = StatusBoard::new(Duration::from_secs(3));
        let rx = board.subscribe();
        board.report_progress(true);
        assert!(rx.borrow().in_progress);
        board.report_progress(false);
        assert!(!board.current().in_progress);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Offline -> online transition.
    RegainedConnectivity,
    /// The application became active again. Says nothing about the network.
    RegainedFocus,
}

/// Relays the host's network and focus signals as edge-triggered events.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            online: AtomicBool::new(initially_online),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Feed the runtime network status. Emits only on offline -> online.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        match (was_online, online) {
            (false, true) => {
                tracing::info!("network online");
                self.emit(ConnectivityEvent::RegainedConnectivity);
            }
            (true, false) => tracing::warn!("network offline"),
            _ => {}
        }
    }

    pub fn focus_gained(&self) {
        self.emit(ConnectivityEvent::RegainedFocus);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ConnectivityEvent) {
        // No subscribers is fine; nobody is listening yet.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn reconnect_fires_once_per_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        monitor.set_online(true);
        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::RegainedConnectivity);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        monitor.set_online(false);
        assert!(!monitor.is_online());
        monitor.set_online(true);
        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::RegainedConnectivity);
    }

    #[test]
    fn focus_fires_even_offline() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();
        monitor.focus_gained();
        monitor.focus_gained();
        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::RegainedFocus);
        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::RegainedFocus);
        assert!(!monitor.is_online());
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let monitor = ConnectivityMonitor::new(true);
        monitor.set_online(false);
        monitor.set_online(true);
        assert!(monitor.is_online());
    }
}

//! Shared online/offline signal

use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide connectivity state
///
/// Producers (a probe monitor, the host application) call `set_online`;
/// consumers either read `is_online` or `subscribe` to transitions.
#[derive(Debug, Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Creates a signal with the given initial state
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns the current state
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Updates the state; returns true if it changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                log::info!("Connectivity restored");
            } else {
                log::warn!("Connectivity lost");
            }
        }

        changed
    }

    /// Subscribes to state transitions
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_online() {
        assert!(Connectivity::default().is_online());
    }

    #[test]
    fn test_set_online_reports_change() {
        let connectivity = Connectivity::new(true);
        assert!(!connectivity.set_online(true));
        assert!(connectivity.set_online(false));
        assert!(!connectivity.is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let connectivity = Connectivity::new(false);
        let other = connectivity.clone();
        other.set_online(true);
        assert!(connectivity.is_online());
    }

    #[tokio::test]
    async fn test_subscriber_sees_transition() {
        let connectivity = Connectivity::new(false);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}

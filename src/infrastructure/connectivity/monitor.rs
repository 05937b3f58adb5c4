use tokio::sync::watch;

/// Single source of truth for "is the remote reachable". The platform
/// adapter feeds OS reachability transitions into `set_online`; any number
/// of subscribers observe the current value immediately and wake on every
/// transition. Event-driven, no polling.
pub struct ConnectivityMonitor {
    sender: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self { sender }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// 遷移した場合のみ購読者へ通知する。
    pub fn set_online(&self, online: bool) {
        self.sender.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_current_state_immediately() {
        let monitor = ConnectivityMonitor::new(false);
        let rx = monitor.subscribe();
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn every_subscriber_is_notified_on_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx1 = monitor.subscribe();
        let mut rx2 = monitor.subscribe();

        monitor.set_online(true);

        rx1.changed().await.unwrap();
        rx2.changed().await.unwrap();
        assert!(*rx1.borrow());
        assert!(*rx2.borrow());
    }

    #[tokio::test]
    async fn repeated_same_state_is_not_a_transition() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }
}

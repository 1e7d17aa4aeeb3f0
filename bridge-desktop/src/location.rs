//! Desktop Location Monitoring

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    location::{LocationEvent, LocationEventStream, LocationMonitor},
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Location monitor for machines that do not move.
///
/// Monitoring can be started and stopped, but no significant change is ever
/// reported, so the wake trigger never fires on desktop. Desktop hosts run
/// the foreground sync on activation instead.
#[derive(Debug, Default)]
pub struct StationaryLocationMonitor {
    monitoring: AtomicBool,
}

impl StationaryLocationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a subscription is currently active.
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationMonitor for StationaryLocationMonitor {
    async fn start_significant_change_updates(&self) -> Result<Box<dyn LocationEventStream>> {
        self.monitoring.store(true, Ordering::SeqCst);
        debug!("Significant location monitoring started (stationary)");
        Ok(Box::new(StationaryEventStream))
    }

    async fn stop_significant_change_updates(&self) -> Result<()> {
        if self.monitoring.swap(false, Ordering::SeqCst) {
            debug!("Significant location monitoring stopped");
        }
        Ok(())
    }
}

struct StationaryEventStream;

#[async_trait]
impl LocationEventStream for StationaryEventStream {
    async fn next(&mut self) -> Option<LocationEvent> {
        std::future::pending::<()>().await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop_toggle_monitoring() {
        let monitor = StationaryLocationMonitor::new();
        assert!(!monitor.is_monitoring());

        let _stream = monitor.start_significant_change_updates().await.unwrap();
        assert!(monitor.is_monitoring());

        monitor.stop_significant_change_updates().await.unwrap();
        assert!(!monitor.is_monitoring());

        // Stopping an idle monitor is a no-op
        monitor.stop_significant_change_updates().await.unwrap();
        assert!(!monitor.is_monitoring());
    }
}

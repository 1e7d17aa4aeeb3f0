//! Desktop App Lifecycle

use async_trait::async_trait;
use bridge_traits::{
    background::{LifecycleChangeStream, LifecycleObserver, LifecycleState},
    error::Result,
};

/// Desktop lifecycle observer.
///
/// Desktop processes are never suspended by the OS, so the state is always
/// [`LifecycleState::Foreground`] and no transitions are reported.
#[derive(Debug, Clone, Default)]
pub struct DesktopLifecycleObserver;

impl DesktopLifecycleObserver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LifecycleObserver for DesktopLifecycleObserver {
    async fn get_state(&self) -> Result<LifecycleState> {
        Ok(LifecycleState::Foreground)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>> {
        Ok(Box::new(DesktopLifecycleChangeStream))
    }
}

/// Never emits.
struct DesktopLifecycleChangeStream;

#[async_trait]
impl LifecycleChangeStream for DesktopLifecycleChangeStream {
    async fn next(&mut self) -> Option<LifecycleState> {
        std::future::pending::<()>().await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_desktop_is_always_foreground() {
        let observer = DesktopLifecycleObserver::new();
        assert_eq!(observer.get_state().await.unwrap(), LifecycleState::Foreground);
    }

    #[tokio::test]
    async fn test_change_stream_never_emits() {
        let observer = DesktopLifecycleObserver::new();
        let mut changes = observer.subscribe_changes().await.unwrap();

        let next = tokio::time::timeout(Duration::from_millis(20), changes.next()).await;
        assert!(next.is_err());
    }
}

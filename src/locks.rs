//! Named locks serialising writes that touch a shared parent resource.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// A process-wide map from resource ID to an async mutex.
///
/// Cloning the registry shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock named `name`, waiting for any current holder.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        debug!(lock = %name, "acquiring lock");
        mutex.lock_owned().await
    }

    /// Number of distinct names that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no lock has been taken yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_is_exclusive() {
        let registry = LockRegistry::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.lock("server1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_different_names_do_not_block() {
        let registry = LockRegistry::new();
        let _first = registry.lock("server1").await;

        let second = tokio::time::timeout(Duration::from_secs(1), registry.lock("server2")).await;
        assert!(second.is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let registry = LockRegistry::new();
        assert!(registry.is_empty());

        drop(registry.lock("server1").await);
        let again = tokio::time::timeout(Duration::from_secs(1), registry.lock("server1")).await;
        assert!(again.is_ok());
    }
}

//! Per-installation device identity.
//!
//! The identifier is looked up in the local store first, then in the secure
//! store, and generated only when neither has one. Concurrent first callers
//! share a single resolution.

mod secure_store;

use std::sync::Arc;

use tokio::sync::OnceCell;

pub use secure_store::{KeyringSecureStore, MemorySecureStore, SecureStore};

use crate::services::LocalStore;
use crate::util::generate_id;
use crate::{Error, Result};

/// `app_config` key holding the device id.
pub const DEVICE_ID_CONFIG_KEY: &str = "device_id";

/// Secure-store key holding the backup copy.
pub const DEVICE_ID_SECURE_KEY: &str = "agri_device_id";

/// Resolves and caches this installation's device id.
pub struct DeviceIdentity {
    store: LocalStore,
    secure: Arc<dyn SecureStore>,
    resolved: OnceCell<String>,
}

impl DeviceIdentity {
    pub fn new(store: LocalStore, secure: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            secure,
            resolved: OnceCell::new(),
        }
    }

    /// The device id, resolving it on first use.
    ///
    /// A failed resolution is not cached; the next call tries again.
    pub async fn device_id(&self) -> Result<String> {
        self.resolved
            .get_or_try_init(|| self.resolve())
            .await
            .cloned()
    }

    async fn resolve(&self) -> Result<String> {
        if let Some(id) = self.store.get_config(DEVICE_ID_CONFIG_KEY).await? {
            let id = id.trim().to_string();
            if !id.is_empty() {
                self.backup(&id).await;
                return Ok(id);
            }
        }

        match self.read_secure().await {
            Ok(Some(id)) => {
                tracing::info!("Restored device id from secure store");
                self.store.set_config(DEVICE_ID_CONFIG_KEY, &id).await?;
                return Ok(id);
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "Failed to read device id from secure store");
            }
        }

        let id = generate_id();
        self.store.set_config(DEVICE_ID_CONFIG_KEY, &id).await?;
        self.backup(&id).await;
        tracing::info!(device_id = %id, "Generated new device id");
        Ok(id)
    }

    async fn backup(&self, id: &str) {
        match self.read_secure().await {
            Ok(Some(existing)) if existing == id => return,
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, "Failed to read device id from secure store");
                return;
            }
        }
        if let Err(error) = self.write_secure(id).await {
            tracing::warn!(%error, "Failed to back up device id to secure store");
        }
    }

    // Keychain backends block on IPC; keep them off the runtime workers.
    async fn read_secure(&self) -> Result<Option<String>> {
        let secure = Arc::clone(&self.secure);
        tokio::task::spawn_blocking(move || secure.read(DEVICE_ID_SECURE_KEY))
            .await
            .map_err(|error| Error::SecureStore(error.to_string()))?
    }

    async fn write_secure(&self, id: &str) -> Result<()> {
        let secure = Arc::clone(&self.secure);
        let id = id.to_string();
        tokio::task::spawn_blocking(move || secure.write(DEVICE_ID_SECURE_KEY, &id))
            .await
            .map_err(|error| Error::SecureStore(error.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::mpsc::{self, Receiver};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    struct BrokenSecureStore;

    impl SecureStore for BrokenSecureStore {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::SecureStore("locked".to_string()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::SecureStore("locked".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Blocks inside `read` until the test releases it.
    struct GatedSecureStore {
        started: Mutex<Option<oneshot::Sender<()>>>,
        release: Mutex<Receiver<()>>,
    }

    impl SecureStore for GatedSecureStore {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            if let Some(started) = self.started.lock().unwrap().take() {
                let _ = started.send(());
            }
            match self.release.lock().unwrap().recv_timeout(Duration::from_secs(2)) {
                Ok(()) => Ok(Some("dev-gated".to_string())),
                Err(_) => Err(Error::SecureStore("timed out".to_string())),
            }
        }

        fn write(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    // One runtime thread: a keychain call made on it would starve the releasing task.
    #[tokio::test]
    async fn secure_store_calls_leave_the_runtime_free() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let secure = Arc::new(GatedSecureStore {
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(release_rx),
        });
        let releaser = tokio::spawn(async move {
            started_rx.await.unwrap();
            release_tx.send(()).unwrap();
        });

        let identity = DeviceIdentity::new(store, secure);

        assert_eq!(identity.device_id().await.unwrap(), "dev-gated");
        releaser.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_first_calls_share_one_identifier() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let secure = Arc::new(MemorySecureStore::new());
        let identity = Arc::new(DeviceIdentity::new(store.clone(), secure.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let identity = Arc::clone(&identity);
                tokio::spawn(async move { identity.device_id().await.unwrap() })
            })
            .collect();
        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 1);
        let id = ids.into_iter().next().unwrap();
        assert_eq!(
            store.get_config(DEVICE_ID_CONFIG_KEY).await.unwrap(),
            Some(id.clone())
        );
        assert_eq!(secure.read(DEVICE_ID_SECURE_KEY).unwrap(), Some(id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn secure_store_restores_id_after_local_reset() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let secure = Arc::new(MemorySecureStore::new());
        secure.write(DEVICE_ID_SECURE_KEY, "dev-survivor").unwrap();

        let identity = DeviceIdentity::new(store.clone(), secure);

        assert_eq!(identity.device_id().await.unwrap(), "dev-survivor");
        assert_eq!(
            store
                .get_config(DEVICE_ID_CONFIG_KEY)
                .await
                .unwrap()
                .as_deref(),
            Some("dev-survivor")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_store_wins_and_is_backed_up() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .set_config(DEVICE_ID_CONFIG_KEY, "dev-local")
            .await
            .unwrap();
        let secure = Arc::new(MemorySecureStore::new());
        secure.write(DEVICE_ID_SECURE_KEY, "dev-stale").unwrap();

        let identity = DeviceIdentity::new(store, secure.clone());

        assert_eq!(identity.device_id().await.unwrap(), "dev-local");
        assert_eq!(
            secure.read(DEVICE_ID_SECURE_KEY).unwrap().as_deref(),
            Some("dev-local")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn secure_store_failures_are_not_fatal() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let identity = DeviceIdentity::new(store, Arc::new(BrokenSecureStore));

        let first = identity.device_id().await.unwrap();
        let second = identity.device_id().await.unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}

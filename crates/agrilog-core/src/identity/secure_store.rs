//! Secondary key-value storage kept outside the local database.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use keyring::{Entry, Error as KeyringError};

use crate::{Error, Result};

const SERVICE_NAME: &str = "agrilog";

/// Small secure key-value store that survives local database resets.
pub trait SecureStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

/// OS keychain backed store.
#[derive(Debug, Clone)]
pub struct KeyringSecureStore {
    service: String,
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringSecureStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).map_err(map_keyring_error)
    }
}

impl SecureStore for KeyringSecureStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(normalize(&value)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(error) => Err(map_keyring_error(error)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::InvalidInput(format!(
                "secure value for '{key}' must not be empty"
            )));
        }
        self.entry(key)?
            .set_password(value)
            .map_err(map_keyring_error)
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
            Err(error) => Err(map_keyring_error(error)),
        }
    }
}

/// Process-local store, used in tests and where no keychain exists.
#[derive(Debug, Default)]
pub struct MemorySecureStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStore for MemorySecureStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).and_then(|value| normalize(value)))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::InvalidInput(format!(
                "secure value for '{key}' must not be empty"
            )));
        }
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

fn normalize(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn map_keyring_error(error: KeyringError) -> Error {
    match error {
        KeyringError::NoStorageAccess(inner) => {
            Error::SecureStore(format!("secure storage is unavailable: {inner}"))
        }
        other => Error::SecureStore(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemorySecureStore::new();
        assert_eq!(store.read("agri_device_id").unwrap(), None);

        store.write("agri_device_id", " dev-1 ").unwrap();
        assert_eq!(
            store.read("agri_device_id").unwrap().as_deref(),
            Some("dev-1")
        );

        store.delete("agri_device_id").unwrap();
        assert_eq!(store.read("agri_device_id").unwrap(), None);
    }

    #[test]
    fn empty_value_is_rejected() {
        let store = MemorySecureStore::new();
        let error = store.write("agri_device_id", "   ").unwrap_err();
        assert!(error.to_string().contains("must not be empty"));
    }

    #[test]
    #[ignore = "needs an unlocked OS keychain"]
    fn keychain_value_is_visible_to_a_fresh_handle() {
        let service = format!("agrilog-test-{}", crate::util::generate_id());
        let key = "agri_device_id";

        KeyringSecureStore::new(&service)
            .write(key, "dev-keychain")
            .unwrap();
        let reopened = KeyringSecureStore::new(&service);
        assert_eq!(reopened.read(key).unwrap().as_deref(), Some("dev-keychain"));

        reopened.delete(key).unwrap();
        assert_eq!(KeyringSecureStore::new(&service).read(key).unwrap(), None);
    }
}

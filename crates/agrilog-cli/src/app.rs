//! Wiring of the core services for one CLI invocation.

use std::io::{BufRead, Write};
use std::sync::Arc;

use agrilog_core::connectivity::{ConnectivityMonitor, HttpNetworkProbe};
use agrilog_core::identity::{DeviceIdentity, KeyringSecureStore, SecureStore};
use agrilog_core::media::JpegDataUriTranscoder;
use agrilog_core::remote::HttpDocumentStore;
use agrilog_core::{AppConfig, FieldLog, LocalStore, SyncEngine};

use crate::error::CliError;

pub struct App {
    pub config: AppConfig,
    pub store: LocalStore,
    pub field_log: FieldLog,
}

impl App {
    /// Open and initialize the local store, backing the device id up to the
    /// OS keychain.
    pub async fn open(config: AppConfig) -> Result<Self, CliError> {
        Self::open_with(config, Arc::new(KeyringSecureStore::default())).await
    }

    pub async fn open_with(
        config: AppConfig,
        secure: Arc<dyn SecureStore>,
    ) -> Result<Self, CliError> {
        let store = LocalStore::open_path(&config.database_path).await?;
        let identity = Arc::new(DeviceIdentity::new(store.clone(), secure));
        let field_log = FieldLog::new(store.clone(), identity);
        Ok(Self {
            config,
            store,
            field_log,
        })
    }

    /// Open the store, asking the user whether to retry after each failure.
    ///
    /// An empty line retries; `q` or end of input aborts.
    pub async fn open_with_retry(
        config: AppConfig,
        secure: Arc<dyn SecureStore>,
        mut input: impl BufRead,
        mut output: impl Write,
    ) -> Result<Self, CliError> {
        loop {
            let error = match Self::open_with(config.clone(), Arc::clone(&secure)).await {
                Ok(app) => return Ok(app),
                Err(error) => error,
            };
            tracing::warn!(%error, "Local store initialization failed");
            writeln!(
                output,
                "Could not open the local store: {error}\nPress Enter to retry or type q to quit."
            )?;
            output.flush()?;

            let mut answer = String::new();
            if input.read_line(&mut answer)? == 0 || answer.trim().eq_ignore_ascii_case("q") {
                return Err(CliError::InitAborted(error.to_string()));
            }
        }
    }

    /// Build the sync engine from the configured remote store.
    pub fn sync_engine(&self) -> Result<Arc<SyncEngine>, CliError> {
        let Some(base_url) = self.config.remote_base_url.as_deref() else {
            return Err(CliError::SyncNotConfigured);
        };
        let remote = HttpDocumentStore::new(base_url, self.config.remote_api_key.clone())?;

        let probe_url = self.config.effective_probe_url().unwrap_or(base_url);
        let probe = HttpNetworkProbe::new(probe_url)?;
        let connectivity = Arc::new(ConnectivityMonitor::new(
            Arc::new(probe),
            self.config.probe_interval(),
        ));

        Ok(Arc::new(SyncEngine::new(
            self.store.clone(),
            Arc::new(remote),
            Arc::new(JpegDataUriTranscoder::new(self.config.image)),
            self.field_log.identity(),
            connectivity,
            self.config.sync_options(),
        )))
    }
}

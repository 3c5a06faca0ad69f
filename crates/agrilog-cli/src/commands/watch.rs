use std::io;
use std::sync::Arc;

use agrilog_core::identity::KeyringSecureStore;
use agrilog_core::AppConfig;

use crate::app::App;
use crate::commands::sync::format_event;
use crate::error::CliError;

pub async fn run_watch(config: AppConfig) -> Result<(), CliError> {
    let app = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let runtime = tokio::runtime::Handle::current();
        runtime.block_on(App::open_with_retry(
            config,
            Arc::new(KeyringSecureStore::default()),
            stdin.lock(),
            io::stderr(),
        ))
    })
    .await
    .map_err(|error| CliError::InitAborted(error.to_string()))??;

    let engine = app.sync_engine()?;
    let _subscription = engine.add_listener(|event| println!("{}", format_event(event)));

    engine.start();
    println!("Watching for connectivity; press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    if let Some(task) = engine.stop() {
        println!("Stopping; waiting for the current cycle to finish...");
        if let Err(error) = task.await {
            tracing::warn!(%error, "Sync trigger task ended abnormally");
        }
    }
    Ok(())
}

//! The sync engine: one cycle at a time, triggered on demand or by
//! connectivity returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::collection;
use super::status::{
    CollectionReport, CycleReport, PullReport, PushReport, SkipReason, SyncEvent, SyncOutcome,
};
use crate::connectivity::ConnectivityMonitor;
use crate::identity::DeviceIdentity;
use crate::listeners::{Listeners, Subscription};
use crate::media::ImageTranscoder;
use crate::models::{
    AlertRecord, Collection, DiagnosisRecord, HarvestRecord, LogEntry, Plant, SyncRecord,
};
use crate::remote::{DocumentStore, MAX_BATCH_WRITES};
use crate::services::LocalStore;
use crate::util::now_timestamp;
use crate::Result;

/// Tunables for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Upper bound on writes per commit; the remote ceiling also applies.
    pub batch_limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_limit: MAX_BATCH_WRITES,
        }
    }
}

/// Releases the re-entrancy flag when a cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Trigger {
    _subscription: Subscription,
    task: JoinHandle<()>,
}

/// Bidirectional sync between the local store and the remote document store.
pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn DocumentStore>,
    transcoder: Arc<dyn ImageTranscoder>,
    identity: Arc<DeviceIdentity>,
    connectivity: Arc<ConnectivityMonitor>,
    options: SyncOptions,
    syncing: AtomicBool,
    status: Mutex<SyncEvent>,
    listeners: Listeners<SyncEvent>,
    trigger: Mutex<Option<Trigger>>,
}

type PullResult = Result<PullReport>;
type PushResult = Result<PushReport>;

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn DocumentStore>,
        transcoder: Arc<dyn ImageTranscoder>,
        identity: Arc<DeviceIdentity>,
        connectivity: Arc<ConnectivityMonitor>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            remote,
            transcoder,
            identity,
            connectivity,
            options,
            syncing: AtomicBool::new(false),
            status: Mutex::new(SyncEvent::idle()),
            listeners: Listeners::new(),
            trigger: Mutex::new(None),
        }
    }

    /// The last emitted status event.
    pub fn current_status(&self) -> SyncEvent {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub const fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Subscribe to status events.
    pub fn add_listener(
        &self,
        callback: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(callback)
    }

    fn emit(&self, event: SyncEvent) {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone_from(&event);
        self.listeners.notify(&event);
    }

    fn chunk_size(&self) -> usize {
        self.options
            .batch_limit
            .min(self.remote.max_batch_size())
            .max(1)
    }

    /// Run one sync cycle now, unless one is running or the device is offline.
    pub async fn sync_all(&self) -> SyncOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.syncing) else {
            tracing::debug!("Sync already running; trigger ignored");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        };
        if !self.connectivity.is_connected() {
            tracing::debug!("Offline; trigger ignored");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }

        self.emit(SyncEvent::syncing());
        match self.run_cycle().await {
            Ok(report) => {
                let event = if report.all_failed() {
                    SyncEvent::error(report.failure_detail())
                } else {
                    SyncEvent::success(report.summary())
                };
                tracing::info!(status = %event.status, "Sync finished: {}", report.summary());
                self.emit(event);
                SyncOutcome::Completed(report)
            }
            Err(error) => {
                let message = error.to_string();
                tracing::warn!(%error, "Sync cycle failed");
                self.emit(SyncEvent::error(message.clone()));
                SyncOutcome::Failed(message)
            }
        }
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let device_id = self.identity.device_id().await?;
        let started_at = now_timestamp();
        tracing::info!(%device_id, "Sync started");

        // Every pull finishes before any push starts.
        let pulls: Vec<BoxFuture<'_, PullResult>> = vec![
            self.pull::<LogEntry>(),
            self.pull::<DiagnosisRecord>(),
            self.pull::<HarvestRecord>(),
            self.pull::<Plant>(),
            self.pull::<AlertRecord>(),
        ];
        let pulled = join_all(pulls).await;

        let pushes: Vec<BoxFuture<'_, PushResult>> = vec![
            self.push::<LogEntry>(&device_id),
            self.push::<DiagnosisRecord>(&device_id),
            self.push::<HarvestRecord>(&device_id),
            self.push::<Plant>(&device_id),
            self.push::<AlertRecord>(&device_id),
        ];
        let pushed = join_all(pushes).await;

        let mut collections = Vec::with_capacity(Collection::ALL.len());
        for ((collection, pull), push) in Collection::ALL.into_iter().zip(pulled).zip(pushed) {
            let mut report = CollectionReport::new(collection);
            match pull {
                Ok(pull) => report.pull = Some(pull),
                Err(error) => {
                    tracing::warn!(%collection, %error, "Pull failed");
                    report.errors.push(format!("pull: {error}"));
                }
            }
            match push {
                Ok(push) => report.push = Some(push),
                Err(error) => {
                    tracing::warn!(%collection, %error, "Push failed");
                    report.errors.push(format!("push: {error}"));
                }
            }
            collections.push(report);
        }

        let finished_at = now_timestamp();
        for report in collections.iter().filter(|report| report.is_clean()) {
            self.store
                .set_last_synced_at(report.collection, &finished_at)
                .await?;
        }

        Ok(CycleReport {
            device_id,
            started_at,
            finished_at,
            collections,
        })
    }

    fn pull<R: SyncRecord>(&self) -> BoxFuture<'_, PullResult> {
        Box::pin(collection::pull::<R>(&self.store, self.remote.as_ref()))
    }

    fn push<'a, R: SyncRecord>(&'a self, device_id: &'a str) -> BoxFuture<'a, PushResult> {
        Box::pin(collection::push::<R>(
            &self.store,
            self.remote.as_ref(),
            self.transcoder.as_ref(),
            device_id,
            self.chunk_size(),
        ))
    }

    /// Start the connectivity monitor and sync on every reconnect.
    ///
    /// The first trigger is an immediate connectivity probe. Calling `start`
    /// while already started does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut trigger = self.trigger.lock().unwrap_or_else(PoisonError::into_inner);
        if trigger.is_some() {
            return;
        }

        self.connectivity.start();
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.connectivity.add_listener(move |connected| {
            if *connected {
                sender.send(()).ok();
            }
        });

        let task = tokio::spawn(trigger_loop(Arc::downgrade(self), receiver));
        *trigger = Some(Trigger {
            _subscription: subscription,
            task,
        });
        tracing::info!("Sync engine started");
    }

    /// Stop reacting to connectivity.
    ///
    /// A cycle in flight runs to completion; the returned handle resolves
    /// once it has.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let trigger = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        self.connectivity.stop();
        tracing::info!("Sync engine stopped");
        // Dropping the subscription closes the channel and ends the loop.
        let Trigger { task, .. } = trigger;
        Some(task)
    }

    pub fn is_started(&self) -> bool {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

async fn trigger_loop(engine: Weak<SyncEngine>, mut receiver: mpsc::UnboundedReceiver<()>) {
    if let Some(engine) = engine.upgrade() {
        if engine.connectivity.check_connection().await {
            engine.sync_all().await;
        }
    }
    drain(&mut receiver);

    while receiver.recv().await.is_some() {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        engine.sync_all().await;
        drain(&mut receiver);
    }
}

/// Drop triggers that arrived while a cycle was running.
fn drain(receiver: &mut mpsc::UnboundedReceiver<()>) {
    let mut dropped = 0_usize;
    while receiver.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped triggers received during a cycle");
    }
}

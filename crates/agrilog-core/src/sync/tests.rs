use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use super::*;
use crate::connectivity::{ConnectivityMonitor, ManualNetworkProbe, NetworkState};
use crate::identity::{DeviceIdentity, MemorySecureStore};
use crate::media::{ImageTranscoder, JpegDataUriTranscoder, JPEG_DATA_URI_PREFIX};
use crate::models::{
    AlertRecord, AlertSeverity, Collection, HarvestRecord, LogEntry, NewHarvest, NewLogEntry,
    NewPlant, Plant, PlantStatus, SyncRecord,
};
use crate::remote::{Document, DocumentStore, MemoryDocumentStore};
use crate::services::LocalStore;
use crate::{Error, Result};

const DEVICE: &str = "dev-field-1";

/// Transcoder that fails for references containing "broken".
#[derive(Default)]
struct ScriptedTranscoder {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageTranscoder for ScriptedTranscoder {
    async fn transcode(&self, reference: &str) -> Result<String> {
        self.calls.lock().unwrap().push(reference.to_string());
        if reference.contains("broken") {
            return Err(Error::Image("cannot decode".to_string()));
        }
        Ok(format!("{JPEG_DATA_URI_PREFIX}c2NyaXB0ZWQ="))
    }
}

/// Remote store that waits before every fetch.
struct SlowDocumentStore {
    inner: MemoryDocumentStore,
    delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowDocumentStore {
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_all(collection).await
    }

    async fn commit_batch(&self, collection: Collection, documents: Vec<Document>) -> Result<()> {
        self.inner.commit_batch(collection, documents).await
    }
}

/// Remote store that edits a local record while its batch is in flight.
struct EditingDocumentStore {
    inner: MemoryDocumentStore,
    store: LocalStore,
    edit_id: String,
}

#[async_trait]
impl DocumentStore for EditingDocumentStore {
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>> {
        self.inner.fetch_all(collection).await
    }

    async fn commit_batch(&self, collection: Collection, documents: Vec<Document>) -> Result<()> {
        if collection == Collection::Plants {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut plant: Plant = self.store.get(&self.edit_id).await?.unwrap();
            plant.notes = "edited mid-push".to_string();
            plant.envelope.touch();
            self.store.save(&plant).await?;
        }
        self.inner.commit_batch(collection, documents).await
    }
}

struct Harness {
    store: LocalStore,
    remote: Arc<MemoryDocumentStore>,
    probe: Arc<ManualNetworkProbe>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
}

async fn local_store() -> LocalStore {
    let store = LocalStore::open_in_memory().await.unwrap();
    store.set_config("device_id", DEVICE).await.unwrap();
    store
}

fn engine_with(
    store: &LocalStore,
    remote: Arc<dyn DocumentStore>,
    transcoder: Arc<dyn ImageTranscoder>,
    monitor: &Arc<ConnectivityMonitor>,
) -> Arc<SyncEngine> {
    let identity = Arc::new(DeviceIdentity::new(
        store.clone(),
        Arc::new(MemorySecureStore::new()),
    ));
    Arc::new(SyncEngine::new(
        store.clone(),
        remote,
        transcoder,
        identity,
        Arc::clone(monitor),
        SyncOptions::default(),
    ))
}

async fn harness_with(transcoder: Arc<dyn ImageTranscoder>, online: bool) -> Harness {
    let store = local_store().await;
    let remote = Arc::new(MemoryDocumentStore::new());
    let probe = Arc::new(ManualNetworkProbe::new(if online {
        NetworkState::ONLINE
    } else {
        NetworkState::OFFLINE
    }));
    let monitor = Arc::new(ConnectivityMonitor::new(
        probe.clone(),
        Duration::from_millis(10),
    ));
    monitor.check_connection().await;
    let engine = engine_with(&store, remote.clone(), transcoder, &monitor);
    Harness {
        store,
        remote,
        probe,
        monitor,
        engine,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(ScriptedTranscoder::default()), true).await
}

fn plant(device: &str, name: &str) -> Plant {
    Plant::new(
        device,
        NewPlant {
            block: "A1".to_string(),
            name: name.to_string(),
            status: PlantStatus::Healthy,
            ..NewPlant::default()
        },
    )
}

fn remote_document<R: SyncRecord>(record: &R) -> Document {
    let mut record = record.clone();
    record.envelope_mut().synced = true;
    record.to_document().unwrap()
}

fn log_entry(photo: Option<String>) -> LogEntry {
    LogEntry::new(
        DEVICE,
        NewLogEntry {
            date: "2024-03-01".to_string(),
            block: "B2".to_string(),
            activity: "Inspeksi daun".to_string(),
            notes: String::new(),
            photo,
        },
    )
}

fn completed(outcome: SyncOutcome) -> CycleReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

fn collection_report(report: &CycleReport, collection: Collection) -> &CollectionReport {
    report
        .collections
        .iter()
        .find(|entry| entry.collection == collection)
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_mirrors_remote_plants_and_soft_deletes_removed_ones() {
    let h = harness().await;
    let plants: Vec<Plant> = ["A", "B", "C"]
        .into_iter()
        .map(|name| {
            let mut plant = plant("dev-other", name);
            plant.envelope.id = name.to_string();
            plant
        })
        .collect();
    for plant in &plants {
        h.remote.put(Collection::Plants, remote_document(plant));
    }

    completed(h.engine.sync_all().await);

    let local: Vec<Plant> = h.store.list_all().await.unwrap();
    let ids: HashSet<&str> = local.iter().map(|plant| plant.envelope.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["A", "B", "C"]));
    assert!(local.iter().all(|plant| plant.envelope.synced));

    h.remote.remove(Collection::Plants, "B");
    let report = completed(h.engine.sync_all().await);

    assert_eq!(
        collection_report(&report, Collection::Plants)
            .pull
            .unwrap()
            .removed,
        1
    );
    let b: Plant = h.store.get("B").await.unwrap().unwrap();
    assert!(b.envelope.deleted);
    for id in ["A", "C"] {
        let kept: Plant = h.store.get(id).await.unwrap().unwrap();
        assert!(!kept.envelope.deleted);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_photo_entry_is_inlined_once_connectivity_returns() {
    let dir = tempfile::tempdir().unwrap();
    let photo_path = dir.path().join("leaf.png");
    let pixels = image::ImageBuffer::<image::Rgb<u8>, Vec<u8>>::from_pixel(
        1200,
        900,
        image::Rgb([40, 160, 60]),
    );
    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut png, image::ImageFormat::Png)
        .unwrap();
    std::fs::write(&photo_path, png.into_inner()).unwrap();

    let h = harness_with(Arc::new(JpegDataUriTranscoder::default()), false).await;
    let entry = log_entry(Some(format!("file://{}", photo_path.display())));
    h.store.insert(&entry).await.unwrap();

    assert_eq!(
        h.engine.sync_all().await,
        SyncOutcome::Skipped(SkipReason::Offline)
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let _subscription = {
        let events = Arc::clone(&events);
        h.engine
            .add_listener(move |event| events.lock().unwrap().push(event.status))
    };
    h.engine.start();
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.probe.set_connected(true);

    for _ in 0..300 {
        if h.engine.current_status().status == SyncStatus::Success {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    if let Some(task) = h.engine.stop() {
        task.await.unwrap();
    }

    assert_eq!(
        *events.lock().unwrap(),
        vec![SyncStatus::Syncing, SyncStatus::Success]
    );
    let stored: LogEntry = h.store.get(&entry.envelope.id).await.unwrap().unwrap();
    assert!(stored.envelope.synced);
    let photo = stored.photo.clone().unwrap();
    assert!(photo.starts_with(JPEG_DATA_URI_PREFIX));

    let document = h
        .remote
        .get(Collection::LogEntries, &entry.envelope.id)
        .unwrap();
    let remote_entry = LogEntry::from_document(&document).unwrap();
    assert_eq!(remote_entry, stored);
    assert!(!h.monitor.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_chunk_leaves_only_its_records_unsynced() {
    let h = harness().await;
    for n in 0..600 {
        h.store
            .insert(&HarvestRecord::new(
                DEVICE,
                NewHarvest {
                    date: "2024-03-01".to_string(),
                    block: format!("C{}", n % 7),
                    quantity: f64::from(n),
                    ..NewHarvest::default()
                },
            ))
            .await
            .unwrap();
    }
    h.remote.fail_batch_number(Collection::HarvestRecords, 2);

    let report = completed(h.engine.sync_all().await);

    let push = collection_report(&report, Collection::HarvestRecords)
        .push
        .unwrap();
    assert_eq!(push.pending, 600);
    assert_eq!(push.chunks, 2);
    assert_eq!(push.pushed, 499);
    assert_eq!(push.failed_chunks, 1);
    assert_eq!(push.failed_records, 101);
    assert_eq!(h.store.count_unsynced::<HarvestRecord>().await.unwrap(), 101);
    assert_eq!(h.remote.documents(Collection::HarvestRecords).len(), 499);
    assert_eq!(report.status(), SyncStatus::Success);
    assert_eq!(
        h.store
            .last_synced_at(Collection::HarvestRecords)
            .await
            .unwrap(),
        None
    );

    let retry = completed(h.engine.sync_all().await);

    let push = collection_report(&retry, Collection::HarvestRecords)
        .push
        .unwrap();
    assert_eq!(push.pushed, 101);
    assert_eq!(h.store.count_unsynced::<HarvestRecord>().await.unwrap(), 0);
    assert_eq!(h.remote.documents(Collection::HarvestRecords).len(), 600);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_push_never_shrinks_the_unsynced_set() {
    let h = harness().await;
    let alert = AlertRecord::new(DEVICE, "Hama tikus", AlertSeverity::Danger, None);
    h.store.insert(&alert).await.unwrap();
    h.remote.fail_commits(Collection::Alerts, true);

    let report = completed(h.engine.sync_all().await);

    assert!(!collection_report(&report, Collection::Alerts).is_clean());
    let stored: AlertRecord = h.store.get(&alert.envelope.id).await.unwrap().unwrap();
    assert!(!stored.envelope.synced);
    assert!(!stored.envelope.deleted);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconciliation_never_deletes_unsynced_records() {
    let h = harness().await;
    let pending = plant(DEVICE, "Baru");
    h.store.insert(&pending).await.unwrap();
    h.remote.fail_commits(Collection::Plants, true);

    for _ in 0..2 {
        completed(h.engine.sync_all().await);
    }

    let stored: Plant = h.store.get(&pending.envelope.id).await.unwrap().unwrap();
    assert!(!stored.envelope.deleted);
    assert!(!stored.envelope.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn pulling_the_same_snapshot_twice_changes_nothing() {
    let h = harness().await;
    let mut kept = plant("dev-other", "Tetap");
    kept.envelope.id = "kept".to_string();
    let mut gone = plant("dev-other", "Hilang");
    gone.envelope.id = "gone".to_string();
    h.remote.put(Collection::Plants, remote_document(&kept));
    h.remote.put(Collection::Plants, remote_document(&gone));
    // Sparse document: envelope defaults must be deterministic.
    h.remote.put(
        Collection::Plants,
        Document {
            id: "sparse".to_string(),
            fields: serde_json::from_value(serde_json::json!({
                "block": "D4",
                "name": "Tanpa stempel",
                "status": "sehat"
            }))
            .unwrap(),
        },
    );
    completed(h.engine.sync_all().await);
    h.remote.remove(Collection::Plants, "gone");
    completed(h.engine.sync_all().await);

    let snapshot = |store: LocalStore| async move {
        let mut rows = Vec::new();
        for id in ["kept", "gone", "sparse"] {
            rows.push(store.get::<Plant>(id).await.unwrap().unwrap());
        }
        rows
    };
    let before = snapshot(h.store.clone()).await;

    let report = completed(h.engine.sync_all().await);

    assert_eq!(snapshot(h.store.clone()).await, before);
    let pull = collection_report(&report, Collection::Plants).pull.unwrap();
    assert_eq!(pull.removed, 0);
    assert_eq!(before[2].envelope.device_id, "unknown");
    assert_eq!(before[2].envelope.created_at, crate::util::EPOCH_TIMESTAMP);
    assert_eq!(before[2].status, PlantStatus::Healthy);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_documents_are_skipped_but_still_count_as_present() {
    let h = harness().await;
    let mut existing = plant("dev-other", "Lama");
    existing.envelope.id = "existing".to_string();
    h.remote.put(Collection::Plants, remote_document(&existing));
    completed(h.engine.sync_all().await);

    h.remote.put(
        Collection::Plants,
        Document {
            id: "existing".to_string(),
            fields: serde_json::from_value(serde_json::json!({
                "block": "A1",
                "name": "Lama",
                "status": "layu"
            }))
            .unwrap(),
        },
    );
    let report = completed(h.engine.sync_all().await);

    let pull = collection_report(&report, Collection::Plants).pull.unwrap();
    assert_eq!(pull.malformed, 1);
    assert_eq!(pull.removed, 0);
    let stored: Plant = h.store.get("existing").await.unwrap().unwrap();
    assert!(!stored.envelope.deleted);
}

#[tokio::test(flavor = "multi_thread")]
async fn transcoding_failure_skips_only_that_record() {
    let transcoder = Arc::new(ScriptedTranscoder::default());
    let h = harness_with(transcoder.clone(), true).await;
    let broken = log_entry(Some("file:///photos/broken.jpg".to_string()));
    let good = log_entry(Some("file:///photos/good.jpg".to_string()));
    let remote_url = log_entry(Some("https://cdn.example.com/a.jpg".to_string()));
    for entry in [&broken, &good, &remote_url] {
        h.store.insert(entry).await.unwrap();
    }

    let report = completed(h.engine.sync_all().await);

    let push = collection_report(&report, Collection::LogEntries)
        .push
        .unwrap();
    assert_eq!(push.skipped, 1);
    assert_eq!(push.pushed, 2);
    assert_eq!(transcoder.calls.lock().unwrap().len(), 2);

    let stored: LogEntry = h.store.get(&broken.envelope.id).await.unwrap().unwrap();
    assert!(!stored.envelope.synced);
    assert_eq!(stored.photo.as_deref(), Some("file:///photos/broken.jpg"));
    assert!(h
        .remote
        .get(Collection::LogEntries, &broken.envelope.id)
        .is_none());

    let stored: LogEntry = h.store.get(&good.envelope.id).await.unwrap().unwrap();
    assert!(stored.envelope.synced);
    assert!(stored.photo.unwrap().starts_with(JPEG_DATA_URI_PREFIX));

    let stored: LogEntry = h.store.get(&remote_url.envelope.id).await.unwrap().unwrap();
    assert_eq!(stored.photo.as_deref(), Some("https://cdn.example.com/a.jpg"));
}

#[tokio::test(flavor = "multi_thread")]
async fn record_edited_during_push_stays_dirty() {
    let store = local_store().await;
    let edited = plant(DEVICE, "Sawit 9");
    store.insert(&edited).await.unwrap();
    let remote = Arc::new(EditingDocumentStore {
        inner: MemoryDocumentStore::new(),
        store: store.clone(),
        edit_id: edited.envelope.id.clone(),
    });
    let monitor = Arc::new(ConnectivityMonitor::new(
        Arc::new(ManualNetworkProbe::new(NetworkState::ONLINE)),
        Duration::from_secs(60),
    ));
    monitor.check_connection().await;
    let engine = engine_with(
        &store,
        remote,
        Arc::new(ScriptedTranscoder::default()),
        &monitor,
    );

    let report = completed(engine.sync_all().await);

    let push = collection_report(&report, Collection::Plants).push.unwrap();
    assert_eq!(push.superseded, 1);
    let stored: Plant = store.get(&edited.envelope.id).await.unwrap().unwrap();
    assert!(!stored.envelope.synced);
    assert_eq!(stored.notes, "edited mid-push");
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_triggers_are_dropped() {
    let store = local_store().await;
    let remote = Arc::new(SlowDocumentStore {
        inner: MemoryDocumentStore::new(),
        delay: Duration::from_millis(100),
    });
    let monitor = Arc::new(ConnectivityMonitor::new(
        Arc::new(ManualNetworkProbe::new(NetworkState::ONLINE)),
        Duration::from_secs(60),
    ));
    monitor.check_connection().await;
    let engine = engine_with(
        &store,
        remote,
        Arc::new(ScriptedTranscoder::default()),
        &monitor,
    );

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync_all().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.is_syncing());

    assert_eq!(
        engine.sync_all().await,
        SyncOutcome::Skipped(SkipReason::AlreadySyncing)
    );
    completed(first.await.unwrap());
    assert!(!engine.is_syncing());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_trigger_emits_nothing() {
    let h = harness_with(Arc::new(ScriptedTranscoder::default()), false).await;
    let events = Arc::new(Mutex::new(Vec::new()));
    let _subscription = {
        let events = Arc::clone(&events);
        h.engine
            .add_listener(move |event: &SyncEvent| events.lock().unwrap().push(event.clone()))
    };

    assert_eq!(
        h.engine.sync_all().await,
        SyncOutcome::Skipped(SkipReason::Offline)
    );
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(h.engine.current_status(), SyncEvent::idle());
}

#[tokio::test(flavor = "multi_thread")]
async fn one_failing_collection_does_not_block_the_others() {
    let h = harness().await;
    h.store.insert(&plant(DEVICE, "Sawit 1")).await.unwrap();
    h.remote.fail_fetch(Collection::Alerts, true);

    let report = completed(h.engine.sync_all().await);

    assert_eq!(report.status(), SyncStatus::Success);
    assert_eq!(h.engine.current_status().status, SyncStatus::Success);
    assert_eq!(h.remote.documents(Collection::Plants).len(), 1);
    assert_eq!(h.store.last_synced_at(Collection::Alerts).await.unwrap(), None);
    assert_eq!(
        h.store.last_synced_at(Collection::Plants).await.unwrap(),
        Some(report.finished_at.clone())
    );
    let alerts = collection_report(&report, Collection::Alerts);
    assert!(alerts.pull.is_none());
    assert_eq!(alerts.push, Some(PushReport::default()));
}

#[tokio::test(flavor = "multi_thread")]
async fn every_collection_failing_reports_error() {
    let h = harness().await;
    for collection in Collection::ALL {
        h.remote.fail_fetch(collection, true);
    }

    let report = completed(h.engine.sync_all().await);

    assert!(report.all_failed());
    let status = h.engine.current_status();
    assert_eq!(status.status, SyncStatus::Error);
    assert!(status.message.unwrap().contains("simulated outage"));
    assert!(h.store.sync_metadata().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn push_only_sends_this_devices_records() {
    let h = harness().await;
    let mine = plant(DEVICE, "Milik saya");
    let theirs = plant("dev-other", "Milik lain");
    h.store.insert(&mine).await.unwrap();
    h.store.insert(&theirs).await.unwrap();

    completed(h.engine.sync_all().await);

    let document = h.remote.get(Collection::Plants, &mine.envelope.id).unwrap();
    assert_eq!(document.fields["device_id"], serde_json::json!(DEVICE));
    assert_eq!(document.fields["synced"], serde_json::json!(1));
    assert!(h.remote.get(Collection::Plants, &theirs.envelope.id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_edits_converge_locally() {
    let h = harness().await;
    let original = plant(DEVICE, "Sawit 5");
    h.store.insert(&original).await.unwrap();
    completed(h.engine.sync_all().await);

    let mut edited = original.clone();
    edited.status = PlantStatus::Sick;
    edited.envelope.device_id = "dev-other".to_string();
    edited.envelope.touch();
    h.remote.put(Collection::Plants, remote_document(&edited));

    completed(h.engine.sync_all().await);

    let stored: Plant = h.store.get(&original.envelope.id).await.unwrap().unwrap();
    let remote = Plant::from_document(
        &h.remote
            .get(Collection::Plants, &original.envelope.id)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(stored, remote);
    assert_eq!(stored.status, PlantStatus::Sick);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_is_idempotent_and_stop_ends_the_loop() {
    let h = harness().await;

    h.engine.start();
    h.engine.start();
    assert!(h.engine.is_started());

    let task = h.engine.stop().unwrap();
    task.await.unwrap();
    assert!(!h.engine.is_started());
    assert!(h.engine.stop().is_none());
}

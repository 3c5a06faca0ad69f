//! Pull and push of a single collection.

use std::collections::HashSet;

use super::status::{PullReport, PushReport};
use crate::media::ImageTranscoder;
use crate::models::SyncRecord;
use crate::remote::{Document, DocumentStore};
use crate::services::LocalStore;
use crate::Result;

/// A dirty record ready to be written remotely.
struct Outgoing {
    id: String,
    /// `updated_at` at read time; marking synced requires it unchanged.
    updated_at: String,
    /// Transcoded payload, persisted only once the chunk is committed.
    payload: Option<String>,
    document: Document,
}

/// Fetch the whole remote collection, overwrite local copies and soft-delete
/// confirmed records that are gone remotely.
pub(super) async fn pull<R: SyncRecord>(
    store: &LocalStore,
    remote: &dyn DocumentStore,
) -> Result<PullReport> {
    let documents = remote.fetch_all(R::COLLECTION).await?;
    let mut report = PullReport {
        fetched: documents.len(),
        ..PullReport::default()
    };

    let mut cloud_ids = HashSet::with_capacity(documents.len());
    for document in &documents {
        // A document that cannot be decoded still exists remotely.
        cloud_ids.insert(document.id.clone());
        match R::from_document(document) {
            Ok(record) => {
                store.upsert_from_cloud(record).await?;
                report.upserted += 1;
            }
            Err(error) => {
                tracing::warn!(
                    collection = %R::COLLECTION,
                    id = %document.id,
                    %error,
                    "Skipping malformed remote document"
                );
                report.malformed += 1;
            }
        }
    }

    report.removed = store.reconcile::<R>(&cloud_ids).await?;
    tracing::debug!(
        collection = %R::COLLECTION,
        fetched = report.fetched,
        upserted = report.upserted,
        removed = report.removed,
        "Pulled collection"
    );
    Ok(report)
}

/// Push this device's dirty records in chunks of at most `chunk_size`.
pub(super) async fn push<R: SyncRecord>(
    store: &LocalStore,
    remote: &dyn DocumentStore,
    transcoder: &dyn ImageTranscoder,
    device_id: &str,
    chunk_size: usize,
) -> Result<PushReport> {
    let pending = store.unsynced_for_device::<R>(device_id).await?;
    let mut report = PushReport {
        pending: pending.len(),
        ..PushReport::default()
    };
    if pending.is_empty() {
        return Ok(report);
    }

    let mut outgoing = Vec::with_capacity(pending.len());
    for record in pending {
        match prepare(record, transcoder).await {
            Ok(item) => outgoing.push(item),
            Err((id, error)) => {
                tracing::warn!(
                    collection = %R::COLLECTION,
                    %id,
                    %error,
                    "Skipping record whose payload could not be prepared"
                );
                report.skipped += 1;
            }
        }
    }

    for chunk in outgoing.chunks(chunk_size.max(1)) {
        report.chunks += 1;
        let documents = chunk.iter().map(|item| item.document.clone()).collect();
        if let Err(error) = remote.commit_batch(R::COLLECTION, documents).await {
            tracing::warn!(
                collection = %R::COLLECTION,
                chunk = report.chunks,
                count = chunk.len(),
                %error,
                "Batch commit failed; records stay unsynced"
            );
            report.failed_chunks += 1;
            report.failed_records += chunk.len();
            continue;
        }

        for item in chunk {
            let marked = match &item.payload {
                Some(payload) => {
                    store
                        .mark_synced_with_payload::<R>(&item.id, &item.updated_at, payload)
                        .await?
                }
                None => store.mark_synced::<R>(&item.id, &item.updated_at).await?,
            };
            if marked {
                report.pushed += 1;
            } else {
                tracing::debug!(
                    collection = %R::COLLECTION,
                    id = %item.id,
                    "Record changed during push; leaving it dirty"
                );
                report.superseded += 1;
            }
        }
    }

    tracing::debug!(
        collection = %R::COLLECTION,
        pushed = report.pushed,
        skipped = report.skipped,
        failed_chunks = report.failed_chunks,
        "Pushed collection"
    );
    Ok(report)
}

async fn prepare<R: SyncRecord>(
    record: R,
    transcoder: &dyn ImageTranscoder,
) -> std::result::Result<Outgoing, (String, crate::Error)> {
    let id = record.id().to_string();
    let updated_at = record.envelope().updated_at.clone();

    let payload = match record.pending_payload() {
        Some(reference) => Some(
            transcoder
                .transcode(reference)
                .await
                .map_err(|error| (id.clone(), error))?,
        ),
        None => None,
    };

    // The local row keeps its original payload until the commit succeeds.
    let mut remote_copy = record;
    if let Some(payload) = &payload {
        remote_copy.set_payload(payload.clone());
    }
    remote_copy.envelope_mut().synced = true;
    let document = remote_copy
        .to_document()
        .map_err(|error| (id.clone(), error))?;

    Ok(Outgoing {
        id,
        updated_at,
        payload,
        document,
    })
}

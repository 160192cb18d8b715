//! File record handlers: streaming upload/download plus metadata CRUD.
//!
//! Upload claims a storage slot (fresh blob + metadata row) off the first
//! stream message, then appends chunks in arrival order. Any failure after
//! the claim (including the peer dropping the stream) removes both halves
//! again, so a metadata row never outlives a readable blob.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

use vaultd_blob::BlobStore;
use vaultd_proto::{
    CreateFileRequest, DeleteFileRequest, File, FileList, GetAllFilesRequest, GetFileRequest,
    GetFileResponse, UpdateFileRequest,
};
use vaultd_storage::{FileData, FileRecord, RecordId, Store, UserId};

use crate::server::{blob_status, store_status, VaultServer};
use crate::validate;

fn to_proto(record: FileRecord) -> File {
    File {
        id: record.id.0.to_string(),
        name: record.name,
        meta: record.meta,
        updated_at: record.updated_at.timestamp(),
    }
}

// ───────────────────────────── Upload ─────────────────────────────

pub async fn create_file(
    server: &VaultServer,
    request: Request<Streaming<CreateFileRequest>>,
) -> Result<Response<File>, Status> {
    let user_id = server.authenticate(&request)?;
    run_upload(server, user_id, request.into_inner()).await
}

/// Drive an upload stream to completion. Generic over the stream so tests
/// can feed messages without a transport.
pub(crate) async fn run_upload<S>(
    server: &VaultServer,
    user_id: UserId,
    mut stream: S,
) -> Result<Response<File>, Status>
where
    S: Stream<Item = Result<CreateFileRequest, Status>> + Unpin,
{
    let header = stream
        .next()
        .await
        .ok_or_else(|| Status::invalid_argument("upload stream closed before the header"))??;
    validate::record_name(&header.name)?;

    // Slot claim: blob first, then the metadata row. Whichever half fails
    // rolls back the other.
    let blob_name = uuid::Uuid::new_v4().to_string();
    let mut handle = server.blobs.create(&blob_name).await.map_err(blob_status)?;

    let record = match server
        .store
        .create_file(
            &user_id,
            &FileData {
                name: header.name,
                meta: header.meta,
            },
            &blob_name,
        )
        .await
    {
        Ok(record) => record,
        Err(e) => {
            drop(handle);
            let _ = server.blobs.remove(&blob_name).await;
            return Err(store_status(e));
        }
    };

    // From here on the guard undoes the claim if this future is dropped
    // mid-stream (peer cancellation).
    let guard = UploadGuard::arm(server, &record, &user_id);

    let mut failure: Option<Status> = None;
    while let Some(message) = stream.next().await {
        match message {
            Ok(msg) => {
                if let Err(e) = handle.write(&msg.chunk).await {
                    failure = Some(blob_status(e));
                    break;
                }
            }
            Err(status) => {
                failure = Some(status);
                break;
            }
        }
    }

    if failure.is_none() {
        if let Err(e) = handle.close().await {
            failure = Some(blob_status(e));
        }
    } else {
        drop(handle);
    }

    if let Some(status) = failure {
        guard.abort().await;
        return Err(status);
    }

    guard.disarm();
    info!(file = %record.id.0, "upload complete");
    Ok(Response::new(to_proto(record)))
}

/// Compensation for a claimed upload slot: deletes the metadata row and the
/// partial blob. Runs inline on error paths and from a detached task when
/// the upload future is dropped.
struct UploadGuard {
    store: Arc<dyn Store>,
    blobs: Arc<BlobStore>,
    record_id: RecordId,
    user_id: UserId,
    blob_name: String,
    armed: bool,
}

impl UploadGuard {
    fn arm(server: &VaultServer, record: &FileRecord, user_id: &UserId) -> Self {
        Self {
            store: server.store.clone(),
            blobs: server.blobs.clone(),
            record_id: record.id.clone(),
            user_id: user_id.clone(),
            blob_name: record.path.clone(),
            armed: true,
        }
    }

    async fn abort(mut self) {
        // Stay armed across the await: if this future is dropped mid-way,
        // Drop re-runs the (idempotent) compensation on a detached task.
        undo_slot_claim(
            self.store.clone(),
            self.blobs.clone(),
            self.record_id.clone(),
            self.user_id.clone(),
            self.blob_name.clone(),
        )
        .await;
        self.armed = false;
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let blobs = self.blobs.clone();
        let record_id = self.record_id.clone();
        let user_id = self.user_id.clone();
        let blob_name = self.blob_name.clone();
        tokio::spawn(async move {
            undo_slot_claim(store, blobs, record_id, user_id, blob_name).await;
        });
    }
}

async fn undo_slot_claim(
    store: Arc<dyn Store>,
    blobs: Arc<BlobStore>,
    record_id: RecordId,
    user_id: UserId,
    blob_name: String,
) {
    if let Err(e) = store.delete_file(&record_id, &user_id).await {
        warn!(file = %record_id.0, "failed to delete metadata of aborted upload: {e}");
    }
    if let Err(e) = blobs.remove(&blob_name).await {
        warn!(file = %record_id.0, "failed to remove blob of aborted upload: {e}");
    }
}

// ───────────────────────────── Download ─────────────────────────────

pub async fn get_file(
    server: &VaultServer,
    request: Request<GetFileRequest>,
) -> Result<Response<ReceiverStream<Result<GetFileResponse, Status>>>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .get_file(&id, &user_id)
        .await
        .map_err(store_status)?;
    let mut handle = server.blobs.open(&record.path).await.map_err(blob_status)?;

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        loop {
            match handle.read_chunk().await {
                Ok(Some(chunk)) => {
                    if tx.send(Ok(GetFileResponse { chunk })).await.is_err() {
                        // Client went away; dropping the handle closes the blob.
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx
                        .send(Err(Status::internal(format!("blob read failed: {e}"))))
                        .await;
                    break;
                }
            }
        }
    });

    Ok(Response::new(ReceiverStream::new(rx)))
}

// ───────────────────────────── Metadata CRUD ─────────────────────────────

pub async fn update_file(
    server: &VaultServer,
    request: Request<UpdateFileRequest>,
) -> Result<Response<File>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;
    validate::record_name(&req.name)?;

    // Name and meta only; the blob location is immutable after creation.
    let record = server
        .store
        .update_file(
            &id,
            &user_id,
            &FileData {
                name: req.name,
                meta: req.meta,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn get_all_files(
    server: &VaultServer,
    request: Request<GetAllFilesRequest>,
) -> Result<Response<FileList>, Status> {
    let user_id = server.authenticate(&request)?;

    let mut records = server
        .store
        .get_all_files(&user_id)
        .await
        .map_err(store_status)?;
    records.truncate(server.list_cap);

    Ok(Response::new(FileList {
        files: records.into_iter().map(to_proto).collect(),
    }))
}

pub async fn delete_file(
    server: &VaultServer,
    request: Request<DeleteFileRequest>,
) -> Result<Response<File>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .delete_file(&id, &user_id)
        .await
        .map_err(store_status)?;

    // The row is gone; a blob that cannot be removed is an orphan for the
    // out-of-band sweep, not a failure of the delete.
    if let Err(e) = server.blobs.remove(&record.path).await {
        warn!(file = %record.id.0, "failed to remove blob on delete: {e}");
    }

    Ok(Response::new(to_proto(record)))
}

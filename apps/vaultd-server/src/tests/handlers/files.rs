//! File handler tests: streaming upload/download, slot-claim compensation,
//! and metadata CRUD.

use std::time::Duration;

use futures::StreamExt;
use tonic::{Code, Status};
use uuid::Uuid;

use vaultd_proto::vault_service_server::VaultService;
use vaultd_proto::{
    CreateFileRequest, DeleteFileRequest, File, GetAllFilesRequest, GetFileRequest,
    UpdateFileRequest,
};
use vaultd_storage::{FileData, RecordId, Store, UserId};

use crate::handlers::files::run_upload;
use crate::tests::common::*;

fn header(name: &str, meta: &str) -> CreateFileRequest {
    CreateFileRequest {
        name: name.to_string(),
        meta: meta.to_string(),
        chunk: Vec::new(),
    }
}

fn chunk(bytes: &[u8]) -> CreateFileRequest {
    CreateFileRequest {
        name: String::new(),
        meta: String::new(),
        chunk: bytes.to_vec(),
    }
}

async fn upload(
    ctx: &TestContext,
    user_id: UserId,
    messages: Vec<Result<CreateFileRequest, Status>>,
) -> Result<File, Status> {
    run_upload(&ctx.server, user_id, tokio_stream::iter(messages))
        .await
        .map(|response| response.into_inner())
}

async fn download(ctx: &TestContext, token: &str, id: &str) -> Vec<u8> {
    let mut stream = ctx
        .server
        .get_file(authed(token, GetFileRequest { id: id.to_string() }))
        .await
        .unwrap()
        .into_inner();
    let mut bytes = Vec::new();
    while let Some(message) = stream.next().await {
        bytes.extend(message.unwrap().chunk);
    }
    bytes
}

fn record_id(file: &File) -> RecordId {
    RecordId(Uuid::parse_str(&file.id).unwrap())
}

#[tokio::test]
async fn upload_then_download_is_byte_exact() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let file = upload(
        &ctx,
        user_id,
        vec![
            Ok(header("x.bin", "")),
            Ok(chunk(&[0x00, 0x01])),
            Ok(chunk(&[0x02])),
        ],
    )
    .await
    .unwrap();
    assert_eq!(file.name, "x.bin");
    assert!(file.updated_at > 0);

    let bytes = download(&ctx, &token, &file.id).await;
    assert_eq!(bytes, vec![0x00, 0x01, 0x02]);
}

#[tokio::test]
async fn payload_larger_than_chunk_size_streams_in_pieces() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    // 11 bytes against a 4-byte download chunk size.
    let payload: Vec<u8> = (0u8..11).collect();
    let file = upload(
        &ctx,
        user_id,
        vec![Ok(header("big.bin", "")), Ok(chunk(&payload))],
    )
    .await
    .unwrap();

    let mut stream = ctx
        .server
        .get_file(authed(&token, GetFileRequest {
            id: file.id.clone(),
        }))
        .await
        .unwrap()
        .into_inner();

    let mut bytes = Vec::new();
    let mut messages = 0;
    while let Some(message) = stream.next().await {
        let piece = message.unwrap().chunk;
        assert!(piece.len() <= TEST_CHUNK_SIZE);
        bytes.extend(piece);
        messages += 1;
    }
    assert_eq!(bytes, payload);
    assert!(messages >= 3);
}

#[tokio::test]
async fn empty_upload_yields_zero_length_blob_and_valid_record() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let file = upload(&ctx, user_id, vec![Ok(header("empty.bin", ""))])
        .await
        .unwrap();

    assert_eq!(blob_count(&ctx), 1);
    assert!(download(&ctx, &token, &file.id).await.is_empty());

    let listed = ctx
        .server
        .get_all_files(authed(&token, GetAllFilesRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.files.len(), 1);
}

#[tokio::test]
async fn upload_without_header_is_rejected() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let err = upload(&ctx, user_id.clone(), vec![]).await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);

    let err = upload(&ctx, user_id, vec![Ok(header("", ""))])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(blob_count(&ctx), 0);
}

#[tokio::test]
async fn upload_for_unknown_user_rolls_back_the_blob() {
    let ctx = create_test_server().await;

    let ghost = UserId(Uuid::new_v4());
    let err = upload(&ctx, ghost, vec![Ok(header("x.bin", ""))])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "user not found");
    assert_eq!(blob_count(&ctx), 0);
}

#[tokio::test]
async fn mid_stream_failure_removes_row_and_blob() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let err = upload(
        &ctx,
        user_id,
        vec![
            Ok(header("x.bin", "")),
            Ok(chunk(&[0x00])),
            Err(Status::aborted("connection reset")),
        ],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), Code::Aborted);

    let listed = ctx
        .server
        .get_all_files(authed(&token, GetAllFilesRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert!(listed.files.is_empty());
    assert_eq!(blob_count(&ctx), 0);
}

#[tokio::test]
async fn cancelled_upload_leaves_no_row_and_no_blob() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    tx.send(Ok(header("x.bin", ""))).await.unwrap();
    tx.send(Ok(chunk(&[0x00, 0x01]))).await.unwrap();

    {
        let fut = run_upload(
            &ctx.server,
            user_id.clone(),
            tokio_stream::wrappers::ReceiverStream::new(rx),
        );
        tokio::pin!(fut);

        // Let the upload claim the slot and consume the queued chunks, then
        // drop it mid-stream as a peer cancellation would.
        let _ = tokio::time::timeout(Duration::from_millis(200), fut.as_mut()).await;
        assert_eq!(
            ctx.server
                .store
                .get_all_files(&user_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }
    drop(tx);

    // Compensation runs on a detached task; wait for it.
    let mut cleaned = false;
    for _ in 0..100 {
        let rows = ctx.server.store.get_all_files(&user_id).await.unwrap();
        if rows.is_empty() && blob_count(&ctx) == 0 {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cleaned, "aborted upload left a row or a blob behind");
}

#[tokio::test]
async fn update_replaces_name_and_meta_but_not_the_blob_path() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let file = upload(
        &ctx,
        user_id.clone(),
        vec![Ok(header("x.bin", "v1")), Ok(chunk(&[0xAA]))],
    )
    .await
    .unwrap();
    let before = ctx
        .server
        .store
        .get_file(&record_id(&file), &user_id)
        .await
        .unwrap();

    let updated = ctx
        .server
        .update_file(authed(&token, UpdateFileRequest {
            id: file.id.clone(),
            name: "renamed.bin".into(),
            meta: "v2".into(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(updated.name, "renamed.bin");
    assert_eq!(updated.meta, "v2");

    let after = ctx
        .server
        .store
        .get_file(&record_id(&file), &user_id)
        .await
        .unwrap();
    assert_eq!(after.path, before.path);

    // Contents unchanged.
    assert_eq!(download(&ctx, &token, &file.id).await, vec![0xAA]);
}

#[tokio::test]
async fn delete_removes_row_and_blob() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let file = upload(
        &ctx,
        user_id,
        vec![Ok(header("x.bin", "")), Ok(chunk(&[0x01]))],
    )
    .await
    .unwrap();
    assert_eq!(blob_count(&ctx), 1);

    ctx.server
        .delete_file(authed(&token, DeleteFileRequest {
            id: file.id.clone(),
        }))
        .await
        .unwrap();
    assert_eq!(blob_count(&ctx), 0);

    let err = ctx
        .server
        .delete_file(authed(&token, DeleteFileRequest { id: file.id }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "file not found");
}

#[tokio::test]
async fn delete_succeeds_even_if_the_blob_is_already_gone() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let file = upload(
        &ctx,
        user_id.clone(),
        vec![Ok(header("x.bin", "")), Ok(chunk(&[0x01]))],
    )
    .await
    .unwrap();

    let record = ctx
        .server
        .store
        .get_file(&record_id(&file), &user_id)
        .await
        .unwrap();
    ctx.server.blobs.remove(&record.path).await.unwrap();

    ctx.server
        .delete_file(authed(&token, DeleteFileRequest { id: file.id }))
        .await
        .unwrap();
}

#[tokio::test]
async fn foreign_file_is_not_found() {
    let ctx = create_test_server().await;
    let alice = register_user(&ctx.server, "alice", "pw").await;
    let bob = register_user(&ctx.server, "bob", "pw").await;
    let alice_id = user_of(&ctx.server, &alice);

    let file = upload(
        &ctx,
        alice_id,
        vec![Ok(header("x.bin", "")), Ok(chunk(&[0x01]))],
    )
    .await
    .unwrap();

    let err = ctx
        .server
        .get_file(authed(&bob, GetFileRequest {
            id: file.id.clone(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "file not found");

    let err = ctx
        .server
        .update_file(authed(&bob, UpdateFileRequest {
            id: file.id,
            name: "hijack".into(),
            meta: String::new(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn chunk_size_of_one_roundtrips() {
    let ctx = create_test_server_with_chunk_size(1).await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let file = upload(
        &ctx,
        user_id,
        vec![Ok(header("x.bin", "")), Ok(chunk(&[0xAB, 0xCD]))],
    )
    .await
    .unwrap();

    let mut stream = ctx
        .server
        .get_file(authed(&token, GetFileRequest { id: file.id }))
        .await
        .unwrap()
        .into_inner();

    let mut pieces = Vec::new();
    while let Some(message) = stream.next().await {
        pieces.push(message.unwrap().chunk);
    }
    assert_eq!(pieces, vec![vec![0xAB], vec![0xCD]]);
}

// The store double honors path immutability the same way the SQL backend
// does; make sure the trait-level contract holds from the handler's view.
#[tokio::test]
async fn store_update_ignores_path_changes() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;
    let user_id = user_of(&ctx.server, &token);

    let created = ctx
        .server
        .store
        .create_file(
            &user_id,
            &FileData {
                name: "a".into(),
                meta: String::new(),
            },
            "blob-name",
        )
        .await
        .unwrap();

    let updated = ctx
        .server
        .store
        .update_file(
            &created.id,
            &user_id,
            &FileData {
                name: "b".into(),
                meta: "m".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.path, "blob-name");
    assert_eq!(updated.name, "b");
}

//! Shared helpers for handler tests.

use std::sync::Arc;

use tempfile::TempDir;
use tonic::metadata::MetadataValue;
use tonic::Request;

use vaultd_blob::BlobStore;
use vaultd_proto::vault_service_server::VaultService;
use vaultd_storage::UserId;

use crate::server::VaultServer;
use crate::tests::store::MemoryStore;
use crate::token::TokenManager;

/// Small chunk size so downloads exercise multi-chunk reads.
pub const TEST_CHUNK_SIZE: usize = 4;

pub struct TestContext {
    pub server: VaultServer,
    // Held so the blob root outlives the test.
    pub blob_dir: TempDir,
}

pub async fn create_test_server() -> TestContext {
    create_test_server_with_chunk_size(TEST_CHUNK_SIZE).await
}

pub async fn create_test_server_with_chunk_size(chunk_size: usize) -> TestContext {
    let blob_dir = TempDir::new().unwrap();
    let blobs = Arc::new(BlobStore::new(blob_dir.path(), chunk_size).await.unwrap());
    let store = Arc::new(MemoryStore::default());
    let tokens = TokenManager::new("test-secret", 60);
    TestContext {
        server: VaultServer::new(store, blobs, tokens),
        blob_dir,
    }
}

/// Register a user through the service and return its bearer token.
pub async fn register_user(server: &VaultServer, login: &str, password: &str) -> String {
    server
        .register(Request::new(vaultd_proto::RegisterRequest {
            login: login.to_string(),
            password: password.to_string(),
        }))
        .await
        .unwrap()
        .into_inner()
        .token
}

/// Resolve the user id a token was issued for.
pub fn user_of(server: &VaultServer, token: &str) -> UserId {
    server.tokens.verify(token).unwrap()
}

/// Build a request carrying bearer metadata the way a client would.
pub fn authed<T>(token: &str, message: T) -> Request<T> {
    let mut request = Request::new(message);
    let value: MetadataValue<_> = format!("Bearer {token}").parse().unwrap();
    request.metadata_mut().insert("authorization", value);
    request
}

/// Number of blob files currently on disk.
pub fn blob_count(ctx: &TestContext) -> usize {
    std::fs::read_dir(ctx.blob_dir.path()).unwrap().count()
}

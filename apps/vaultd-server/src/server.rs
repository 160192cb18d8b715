//! Shared server state, authentication, and error mapping.

use std::sync::Arc;

use tonic::{Request, Status};
use tracing::error;

use vaultd_blob::{BlobError, BlobStore};
use vaultd_storage::{Store, StoreError, UserId};

use crate::token::TokenManager;

/// Hard cap on list results. Anything beyond it is silently truncated;
/// pagination is not offered.
pub const LIST_CAP: usize = 75;

#[derive(Clone)]
pub struct VaultServer {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<BlobStore>,
    pub tokens: TokenManager,
    pub list_cap: usize,
}

impl VaultServer {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<BlobStore>, tokens: TokenManager) -> Self {
        Self {
            store,
            blobs,
            tokens,
            list_cap: LIST_CAP,
        }
    }

    /// Resolve the caller's user id from the bearer credential in request
    /// metadata.
    pub fn authenticate<T>(&self, request: &Request<T>) -> Result<UserId, Status> {
        let value = request
            .metadata()
            .get("authorization")
            .ok_or_else(|| Status::unauthenticated("missing credentials"))?;
        let value = value
            .to_str()
            .map_err(|_| Status::unauthenticated("malformed authorization metadata"))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| Status::unauthenticated("malformed authorization metadata"))?;
        self.tokens
            .verify(token)
            .map_err(|_| Status::unauthenticated("invalid token"))
    }
}

/// Map a store failure onto the wire status. The response carries only the
/// error kind; full chains go to the log.
pub fn store_status(err: StoreError) -> Status {
    match err {
        StoreError::UserAlreadyExists => Status::already_exists("user already exists"),
        StoreError::UserNotFound => Status::not_found("user not found"),
        StoreError::NotFound(kind) => Status::not_found(format!("{kind} not found")),
        StoreError::Connection(_) | StoreError::Backend(_) => {
            error!("store operation failed: {err}");
            Status::internal("internal error")
        }
    }
}

pub fn blob_status(err: BlobError) -> Status {
    error!("blob operation failed: {err}");
    Status::internal("internal error")
}

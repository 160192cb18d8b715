//! Authentication handlers: register, login.

use tonic::{Request, Response, Status};
use tracing::info;

use vaultd_proto::{AuthResponse, LoginRequest, RegisterRequest};
use vaultd_storage::{CreateUserParams, StoreError};

use crate::hasher;
use crate::server::{store_status, VaultServer};
use crate::validate;

pub async fn register(
    server: &VaultServer,
    request: Request<RegisterRequest>,
) -> Result<Response<AuthResponse>, Status> {
    let req = request.into_inner();
    validate::credentials(&req.login, &req.password)?;

    // Two representations of the login: the plaintext keys the users table,
    // the self-hashed form keys the salts table.
    let login_hashed = hasher::hash(&req.login, &req.login);
    let salt = hasher::hash(&req.login, &req.login);
    let password_digest = hasher::hash(&req.password, &req.login);

    let user = server
        .store
        .create_user(&CreateUserParams {
            login: req.login,
            login_hashed,
            salt,
            password_digest,
        })
        .await
        .map_err(store_status)?;

    info!(user = %user.id.0, "registered user");

    let token = server
        .tokens
        .issue(&user.id)
        .map_err(|e| Status::internal(e.to_string()))?;
    Ok(Response::new(AuthResponse { token }))
}

pub async fn login(
    server: &VaultServer,
    request: Request<LoginRequest>,
) -> Result<Response<AuthResponse>, Status> {
    let req = request.into_inner();
    validate::credentials(&req.login, &req.password)?;

    let login_hashed = hasher::hash(&req.login, &req.login);
    let password_digest = hasher::hash(&req.password, &req.login);

    // Unknown user and digest mismatch are indistinguishable to the caller.
    let user = match server.store.get_user(&req.login, &login_hashed).await {
        Ok(user) => user,
        Err(StoreError::UserNotFound) => {
            return Err(Status::unauthenticated("invalid credentials"))
        }
        Err(e) => return Err(store_status(e)),
    };
    if user.password_digest != password_digest {
        return Err(Status::unauthenticated("invalid credentials"));
    }

    let token = server
        .tokens
        .issue(&user.id)
        .map_err(|e| Status::internal(e.to_string()))?;
    Ok(Response::new(AuthResponse { token }))
}

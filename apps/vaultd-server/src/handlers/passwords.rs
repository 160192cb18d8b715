//! Password record handlers.

use tonic::{Request, Response, Status};

use vaultd_proto::{
    CreatePasswordRequest, DeletePasswordRequest, GetAllPasswordsRequest, GetPasswordRequest,
    Password, PasswordList, UpdatePasswordRequest,
};
use vaultd_storage::{PasswordData, PasswordRecord};

use crate::server::{store_status, VaultServer};
use crate::validate;

fn to_proto(record: PasswordRecord) -> Password {
    Password {
        id: record.id.0.to_string(),
        name: record.name,
        login: record.login,
        password: record.password,
        meta: record.meta,
        updated_at: record.updated_at.timestamp(),
    }
}

pub async fn create_password(
    server: &VaultServer,
    request: Request<CreatePasswordRequest>,
) -> Result<Response<Password>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    validate::record_name(&req.name)?;

    let record = server
        .store
        .create_password(
            &user_id,
            &PasswordData {
                name: req.name,
                login: req.login,
                password: req.password,
                meta: req.meta,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn update_password(
    server: &VaultServer,
    request: Request<UpdatePasswordRequest>,
) -> Result<Response<Password>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;
    validate::record_name(&req.name)?;

    let record = server
        .store
        .update_password(
            &id,
            &user_id,
            &PasswordData {
                name: req.name,
                login: req.login,
                password: req.password,
                meta: req.meta,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn get_password(
    server: &VaultServer,
    request: Request<GetPasswordRequest>,
) -> Result<Response<Password>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .get_password(&id, &user_id)
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn get_all_passwords(
    server: &VaultServer,
    request: Request<GetAllPasswordsRequest>,
) -> Result<Response<PasswordList>, Status> {
    let user_id = server.authenticate(&request)?;

    let mut records = server
        .store
        .get_all_passwords(&user_id)
        .await
        .map_err(store_status)?;
    records.truncate(server.list_cap);

    Ok(Response::new(PasswordList {
        passwords: records.into_iter().map(to_proto).collect(),
    }))
}

pub async fn delete_password(
    server: &VaultServer,
    request: Request<DeletePasswordRequest>,
) -> Result<Response<Password>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .delete_password(&id, &user_id)
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

//! Free-form text record handlers.

use tonic::{Request, Response, Status};

use vaultd_proto::{
    CreateTextRequest, DeleteTextRequest, GetAllTextsRequest, GetTextRequest, Text, TextList,
    UpdateTextRequest,
};
use vaultd_storage::{TextData, TextRecord};

use crate::server::{store_status, VaultServer};
use crate::validate;

fn to_proto(record: TextRecord) -> Text {
    Text {
        id: record.id.0.to_string(),
        name: record.name,
        text: record.text,
        meta: record.meta,
        updated_at: record.updated_at.timestamp(),
    }
}

pub async fn create_text(
    server: &VaultServer,
    request: Request<CreateTextRequest>,
) -> Result<Response<Text>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    validate::record_name(&req.name)?;

    let record = server
        .store
        .create_text(
            &user_id,
            &TextData {
                name: req.name,
                text: req.text,
                meta: req.meta,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn update_text(
    server: &VaultServer,
    request: Request<UpdateTextRequest>,
) -> Result<Response<Text>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;
    validate::record_name(&req.name)?;

    let record = server
        .store
        .update_text(
            &id,
            &user_id,
            &TextData {
                name: req.name,
                text: req.text,
                meta: req.meta,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn get_text(
    server: &VaultServer,
    request: Request<GetTextRequest>,
) -> Result<Response<Text>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .get_text(&id, &user_id)
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn get_all_texts(
    server: &VaultServer,
    request: Request<GetAllTextsRequest>,
) -> Result<Response<TextList>, Status> {
    let user_id = server.authenticate(&request)?;

    let mut records = server
        .store
        .get_all_texts(&user_id)
        .await
        .map_err(store_status)?;
    records.truncate(server.list_cap);

    Ok(Response::new(TextList {
        texts: records.into_iter().map(to_proto).collect(),
    }))
}

pub async fn delete_text(
    server: &VaultServer,
    request: Request<DeleteTextRequest>,
) -> Result<Response<Text>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .delete_text(&id, &user_id)
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

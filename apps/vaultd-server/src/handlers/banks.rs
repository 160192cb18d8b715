//! Bank card record handlers.

use tonic::{Request, Response, Status};

use vaultd_proto::{
    Bank, BankList, CreateBankRequest, DeleteBankRequest, GetAllBanksRequest, GetBankRequest,
    UpdateBankRequest,
};
use vaultd_storage::{BankData, BankRecord};

use crate::server::{store_status, VaultServer};
use crate::validate;

fn to_proto(record: BankRecord) -> Bank {
    Bank {
        id: record.id.0.to_string(),
        name: record.name,
        card_number: record.card_number,
        cvc: record.cvc,
        owner: record.owner,
        exp: record.exp,
        meta: record.meta,
        updated_at: record.updated_at.timestamp(),
    }
}

pub async fn create_bank(
    server: &VaultServer,
    request: Request<CreateBankRequest>,
) -> Result<Response<Bank>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    validate::record_name(&req.name)?;

    let record = server
        .store
        .create_bank(
            &user_id,
            &BankData {
                name: req.name,
                card_number: req.card_number,
                cvc: req.cvc,
                owner: req.owner,
                exp: req.exp,
                meta: req.meta,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn update_bank(
    server: &VaultServer,
    request: Request<UpdateBankRequest>,
) -> Result<Response<Bank>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;
    validate::record_name(&req.name)?;

    let record = server
        .store
        .update_bank(
            &id,
            &user_id,
            &BankData {
                name: req.name,
                card_number: req.card_number,
                cvc: req.cvc,
                owner: req.owner,
                exp: req.exp,
                meta: req.meta,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn get_bank(
    server: &VaultServer,
    request: Request<GetBankRequest>,
) -> Result<Response<Bank>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .get_bank(&id, &user_id)
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

pub async fn get_all_banks(
    server: &VaultServer,
    request: Request<GetAllBanksRequest>,
) -> Result<Response<BankList>, Status> {
    let user_id = server.authenticate(&request)?;

    let mut records = server
        .store
        .get_all_banks(&user_id)
        .await
        .map_err(store_status)?;
    records.truncate(server.list_cap);

    Ok(Response::new(BankList {
        banks: records.into_iter().map(to_proto).collect(),
    }))
}

pub async fn delete_bank(
    server: &VaultServer,
    request: Request<DeleteBankRequest>,
) -> Result<Response<Bank>, Status> {
    let user_id = server.authenticate(&request)?;
    let req = request.into_inner();
    let id = validate::record_id(&req.id)?;

    let record = server
        .store
        .delete_bank(&id, &user_id)
        .await
        .map_err(store_status)?;
    Ok(Response::new(to_proto(record)))
}

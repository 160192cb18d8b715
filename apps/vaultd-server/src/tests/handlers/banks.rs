//! Bank card handler tests.

use tonic::Code;

use vaultd_proto::vault_service_server::VaultService;
use vaultd_proto::{
    CreateBankRequest, DeleteBankRequest, GetAllBanksRequest, GetBankRequest, UpdateBankRequest,
};

use crate::tests::common::*;

fn create_req(name: &str) -> CreateBankRequest {
    CreateBankRequest {
        name: name.to_string(),
        card_number: "4111111111111111".to_string(),
        cvc: "123".to_string(),
        owner: "A. Person".to_string(),
        exp: "12/30".to_string(),
        meta: String::new(),
    }
}

#[tokio::test]
async fn create_then_get_roundtrip() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;

    let created = ctx
        .server
        .create_bank(authed(&token, create_req("visa")))
        .await
        .unwrap()
        .into_inner();

    let got = ctx
        .server
        .get_bank(authed(&token, GetBankRequest {
            id: created.id.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(got, created);
    assert_eq!(got.card_number, "4111111111111111");
}

#[tokio::test]
async fn update_then_get_returns_new_values() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;

    let created = ctx
        .server
        .create_bank(authed(&token, create_req("visa")))
        .await
        .unwrap()
        .into_inner();

    let updated = ctx
        .server
        .update_bank(authed(&token, UpdateBankRequest {
            id: created.id.clone(),
            name: "visa-new".into(),
            card_number: created.card_number.clone(),
            cvc: "999".into(),
            owner: created.owner.clone(),
            exp: "01/33".into(),
            meta: String::new(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(updated.name, "visa-new");
    assert_eq!(updated.cvc, "999");

    let got = ctx
        .server
        .get_bank(authed(&token, GetBankRequest { id: created.id }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(got, updated);
}

#[tokio::test]
async fn cross_user_access_is_not_found() {
    let ctx = create_test_server().await;
    let alice = register_user(&ctx.server, "alice", "pw").await;
    let bob = register_user(&ctx.server, "bob", "pw").await;

    let created = ctx
        .server
        .create_bank(authed(&alice, create_req("visa")))
        .await
        .unwrap()
        .into_inner();

    let err = ctx
        .server
        .update_bank(authed(&bob, UpdateBankRequest {
            id: created.id,
            name: "hijack".into(),
            card_number: "0".into(),
            cvc: "0".into(),
            owner: "bob".into(),
            exp: "0".into(),
            meta: String::new(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "bank not found");
}

#[tokio::test]
async fn delete_twice_reports_not_found() {
    let ctx = create_test_server().await;
    let token = register_user(&ctx.server, "alice", "pw").await;

    let created = ctx
        .server
        .create_bank(authed(&token, create_req("visa")))
        .await
        .unwrap()
        .into_inner();

    ctx.server
        .delete_bank(authed(&token, DeleteBankRequest {
            id: created.id.clone(),
        }))
        .await
        .unwrap();
    let err = ctx
        .server
        .delete_bank(authed(&token, DeleteBankRequest { id: created.id }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    let listed = ctx
        .server
        .get_all_banks(authed(&token, GetAllBanksRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert!(listed.banks.is_empty());
}

//! Handler modules for the gRPC service, organized by record family:
//! auth (register, login), passwords, banks, texts, and files (including
//! the streaming upload/download pair).

pub mod auth;
pub mod banks;
pub mod files;
pub mod passwords;
pub mod texts;

use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use vaultd_proto::vault_service_server::VaultService;
use vaultd_proto::*;

use crate::server::VaultServer;

#[tonic::async_trait]
impl VaultService for VaultServer {
    // ───────────────────────────── Auth ─────────────────────────────

    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        auth::register(self, request).await
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        auth::login(self, request).await
    }

    // ───────────────────────────── Passwords ─────────────────────────────

    async fn create_password(
        &self,
        request: Request<CreatePasswordRequest>,
    ) -> Result<Response<Password>, Status> {
        passwords::create_password(self, request).await
    }

    async fn update_password(
        &self,
        request: Request<UpdatePasswordRequest>,
    ) -> Result<Response<Password>, Status> {
        passwords::update_password(self, request).await
    }

    async fn get_password(
        &self,
        request: Request<GetPasswordRequest>,
    ) -> Result<Response<Password>, Status> {
        passwords::get_password(self, request).await
    }

    async fn get_all_passwords(
        &self,
        request: Request<GetAllPasswordsRequest>,
    ) -> Result<Response<PasswordList>, Status> {
        passwords::get_all_passwords(self, request).await
    }

    async fn delete_password(
        &self,
        request: Request<DeletePasswordRequest>,
    ) -> Result<Response<Password>, Status> {
        passwords::delete_password(self, request).await
    }

    // ───────────────────────────── Bank cards ─────────────────────────────

    async fn create_bank(
        &self,
        request: Request<CreateBankRequest>,
    ) -> Result<Response<Bank>, Status> {
        banks::create_bank(self, request).await
    }

    async fn update_bank(
        &self,
        request: Request<UpdateBankRequest>,
    ) -> Result<Response<Bank>, Status> {
        banks::update_bank(self, request).await
    }

    async fn get_bank(&self, request: Request<GetBankRequest>) -> Result<Response<Bank>, Status> {
        banks::get_bank(self, request).await
    }

    async fn get_all_banks(
        &self,
        request: Request<GetAllBanksRequest>,
    ) -> Result<Response<BankList>, Status> {
        banks::get_all_banks(self, request).await
    }

    async fn delete_bank(
        &self,
        request: Request<DeleteBankRequest>,
    ) -> Result<Response<Bank>, Status> {
        banks::delete_bank(self, request).await
    }

    // ───────────────────────────── Texts ─────────────────────────────

    async fn create_text(
        &self,
        request: Request<CreateTextRequest>,
    ) -> Result<Response<Text>, Status> {
        texts::create_text(self, request).await
    }

    async fn update_text(
        &self,
        request: Request<UpdateTextRequest>,
    ) -> Result<Response<Text>, Status> {
        texts::update_text(self, request).await
    }

    async fn get_text(&self, request: Request<GetTextRequest>) -> Result<Response<Text>, Status> {
        texts::get_text(self, request).await
    }

    async fn get_all_texts(
        &self,
        request: Request<GetAllTextsRequest>,
    ) -> Result<Response<TextList>, Status> {
        texts::get_all_texts(self, request).await
    }

    async fn delete_text(
        &self,
        request: Request<DeleteTextRequest>,
    ) -> Result<Response<Text>, Status> {
        texts::delete_text(self, request).await
    }

    // ───────────────────────────── Files ─────────────────────────────

    async fn create_file(
        &self,
        request: Request<Streaming<CreateFileRequest>>,
    ) -> Result<Response<File>, Status> {
        files::create_file(self, request).await
    }

    async fn update_file(
        &self,
        request: Request<UpdateFileRequest>,
    ) -> Result<Response<File>, Status> {
        files::update_file(self, request).await
    }

    type GetFileStream = ReceiverStream<Result<GetFileResponse, Status>>;

    async fn get_file(
        &self,
        request: Request<GetFileRequest>,
    ) -> Result<Response<Self::GetFileStream>, Status> {
        files::get_file(self, request).await
    }

    async fn get_all_files(
        &self,
        request: Request<GetAllFilesRequest>,
    ) -> Result<Response<FileList>, Status> {
        files::get_all_files(self, request).await
    }

    async fn delete_file(
        &self,
        request: Request<DeleteFileRequest>,
    ) -> Result<Response<File>, Status> {
        files::delete_file(self, request).await
    }
}

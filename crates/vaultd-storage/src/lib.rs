//! Storage abstraction for vaultd.
//!
//! Backend crates (e.g. vaultd-store-postgres) implement the [`Store`] trait
//! so the server doesn't depend on any specific database engine or schema
//! details. Record contents are opaque to the store: every payload field is
//! ciphertext or a label chosen by the client.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

mod retry;

pub use retry::{with_retry, RetryPolicy};

/// Record families the vault manages besides users.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Password,
    Bank,
    Text,
    File,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Password => write!(f, "password"),
            RecordKind::Bank => write!(f, "bank"),
            RecordKind::Text => write!(f, "text"),
            RecordKind::File => write!(f, "file"),
        }
    }
}

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("user not found")]
    UserNotFound,
    #[error("{0} not found")]
    NotFound(RecordKind),
    /// Link-layer disturbance between the store and the database. The only
    /// variant the retry executor re-runs an operation for.
    #[error("connection error: {0}")]
    Connection(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a retry can safely re-run the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// Strongly-typed identifiers (avoid mixing raw UUIDs arbitrarily).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(pub Uuid);

/// Parameters for creating a user. `login` keys the users table while
/// `login_hashed` keys the salts table; the two representations stay
/// distinct end to end.
#[derive(Clone, Debug)]
pub struct CreateUserParams {
    pub login: String,
    pub login_hashed: String,
    pub salt: String,
    pub password_digest: String,
}

/// User record assembled from the users and salts tables.
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub password_digest: String,
    pub salt: String,
}

/// Payload of a password record. All fields opaque to the server.
#[derive(Clone, Debug)]
pub struct PasswordData {
    pub name: String,
    pub login: String,
    pub password: String,
    pub meta: String,
}

#[derive(Clone, Debug)]
pub struct PasswordRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub name: String,
    pub login: String,
    pub password: String,
    pub meta: String,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a bank-card record.
#[derive(Clone, Debug)]
pub struct BankData {
    pub name: String,
    pub card_number: String,
    pub cvc: String,
    pub owner: String,
    pub exp: String,
    pub meta: String,
}

#[derive(Clone, Debug)]
pub struct BankRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub name: String,
    pub card_number: String,
    pub cvc: String,
    pub owner: String,
    pub exp: String,
    pub meta: String,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a free-form text record.
#[derive(Clone, Debug)]
pub struct TextData {
    pub name: String,
    pub text: String,
    pub meta: String,
}

#[derive(Clone, Debug)]
pub struct TextRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub name: String,
    pub text: String,
    pub meta: String,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a file record. The blob name (`path`) is assigned by the
/// handler at upload time and is immutable afterwards.
#[derive(Clone, Debug)]
pub struct FileData {
    pub name: String,
    pub meta: String,
}

#[derive(Clone, Debug)]
pub struct FileRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub name: String,
    pub path: String,
    pub meta: String,
    pub updated_at: DateTime<Utc>,
}

/// The storage trait the server depends on.
///
/// Get/update/delete operations are keyed on `(record_id, user_id)` so a
/// record owned by another user is indistinguishable from an absent one.
/// `updated_at` is assigned by the store on every insert and update.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────── Users ─────────────────────────────

    /// Insert the user row and its salt row atomically.
    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError>;

    /// Fetch a user by its two login representations.
    async fn get_user(&self, login: &str, login_hashed: &str) -> Result<User, StoreError>;

    // ───────────────────────────── Passwords ─────────────────────────────

    async fn create_password(
        &self,
        user_id: &UserId,
        data: &PasswordData,
    ) -> Result<PasswordRecord, StoreError>;

    async fn update_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &PasswordData,
    ) -> Result<PasswordRecord, StoreError>;

    async fn get_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<PasswordRecord, StoreError>;

    async fn get_all_passwords(&self, user_id: &UserId)
        -> Result<Vec<PasswordRecord>, StoreError>;

    async fn delete_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<PasswordRecord, StoreError>;

    // ───────────────────────────── Bank cards ─────────────────────────────

    async fn create_bank(
        &self,
        user_id: &UserId,
        data: &BankData,
    ) -> Result<BankRecord, StoreError>;

    async fn update_bank(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &BankData,
    ) -> Result<BankRecord, StoreError>;

    async fn get_bank(&self, id: &RecordId, user_id: &UserId) -> Result<BankRecord, StoreError>;

    async fn get_all_banks(&self, user_id: &UserId) -> Result<Vec<BankRecord>, StoreError>;

    async fn delete_bank(&self, id: &RecordId, user_id: &UserId)
        -> Result<BankRecord, StoreError>;

    // ───────────────────────────── Texts ─────────────────────────────

    async fn create_text(
        &self,
        user_id: &UserId,
        data: &TextData,
    ) -> Result<TextRecord, StoreError>;

    async fn update_text(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &TextData,
    ) -> Result<TextRecord, StoreError>;

    async fn get_text(&self, id: &RecordId, user_id: &UserId) -> Result<TextRecord, StoreError>;

    async fn get_all_texts(&self, user_id: &UserId) -> Result<Vec<TextRecord>, StoreError>;

    async fn delete_text(&self, id: &RecordId, user_id: &UserId)
        -> Result<TextRecord, StoreError>;

    // ───────────────────────────── Files ─────────────────────────────

    /// Insert file metadata. `path` is the blob name inside the blob store
    /// root; the caller claims the blob slot before inserting the row.
    async fn create_file(
        &self,
        user_id: &UserId,
        data: &FileData,
        path: &str,
    ) -> Result<FileRecord, StoreError>;

    /// Update name and meta. The stored `path` is preserved regardless of
    /// caller input.
    async fn update_file(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &FileData,
    ) -> Result<FileRecord, StoreError>;

    async fn get_file(&self, id: &RecordId, user_id: &UserId) -> Result<FileRecord, StoreError>;

    async fn get_all_files(&self, user_id: &UserId) -> Result<Vec<FileRecord>, StoreError>;

    async fn delete_file(&self, id: &RecordId, user_id: &UserId)
        -> Result<FileRecord, StoreError>;
}

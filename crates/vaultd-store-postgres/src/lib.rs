//! Postgres backend for the vaultd storage trait.
//!
//! Queries are runtime-bound with positional parameters and explicit row
//! mapping. Every trait operation runs under the retry executor; only
//! connection-class faults (SQLSTATE 08xxx, socket errors) are re-run.

use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vaultd_storage::{
    with_retry, BankData, BankRecord, CreateUserParams, FileData, FileRecord, PasswordData,
    PasswordRecord, RecordId, RecordKind, RetryPolicy, Store, StoreError, TextData, TextRecord,
    User, UserId,
};


static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct PostgresStore {
    pool: PgPool,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl PostgresStore {
    /// Connect, run migrations, and hand back the store. `cancel` aborts
    /// retry backoff sleeps on shutdown.
    pub async fn open(
        url: &str,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(translate)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            pool,
            policy,
            cancel,
        })
    }

    /// Drain the connection pool. Called once during graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn insert_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await.map_err(translate)?;

        let row = sqlx::query("INSERT INTO users (login, password) VALUES ($1, $2) RETURNING id")
            .bind(&params.login)
            .bind(&params.password_digest)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| with_context("insert users failed", e))?;
        let id: Uuid = row.try_get("id").map_err(translate)?;

        let row = sqlx::query("INSERT INTO salts (login, salt) VALUES ($1, $2) RETURNING salt")
            .bind(&params.login_hashed)
            .bind(&params.salt)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| with_context("insert salts failed", e))?;
        let salt: String = row.try_get("salt").map_err(translate)?;

        tx.commit().await.map_err(translate)?;

        Ok(User {
            id: UserId(id),
            login: params.login.clone(),
            password_digest: params.password_digest.clone(),
            salt,
        })
    }

    async fn select_user(&self, login: &str, login_hashed: &str) -> Result<User, StoreError> {
        let row = sqlx::query(
            "SELECT u.id, u.login, u.password, s.salt \
             FROM users u, salts s \
             WHERE u.login = $1 AND s.login = $2",
        )
        .bind(login)
        .bind(login_hashed)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::UserNotFound)?;

        Ok(User {
            id: UserId(row.try_get("id").map_err(translate)?),
            login: row.try_get("login").map_err(translate)?,
            password_digest: row.try_get("password").map_err(translate)?,
            salt: row.try_get("salt").map_err(translate)?,
        })
    }

    // ───────────────────────────── Passwords ─────────────────────────────

    async fn insert_password(
        &self,
        user_id: &UserId,
        data: &PasswordData,
    ) -> Result<PasswordRecord, StoreError> {
        sqlx::query(
            "INSERT INTO passwords (user_id, name, login, password, meta) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, name, login, password, meta, updated_at",
        )
        .bind(user_id.0)
        .bind(&data.name)
        .bind(&data.login)
        .bind(&data.password)
        .bind(&data.meta)
        .fetch_one(&self.pool)
        .await
        .map_err(translate)
        .and_then(|row| password_from_row(&row))
    }

    async fn change_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &PasswordData,
    ) -> Result<PasswordRecord, StoreError> {
        sqlx::query(
            "UPDATE passwords \
             SET name = $3, login = $4, password = $5, meta = $6, updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, login, password, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .bind(&data.name)
        .bind(&data.login)
        .bind(&data.password)
        .bind(&data.meta)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Password))
        .and_then(|row| password_from_row(&row))
    }

    async fn select_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<PasswordRecord, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, login, password, meta, updated_at \
             FROM passwords WHERE id = $1 AND user_id = $2",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Password))
        .and_then(|row| password_from_row(&row))
    }

    async fn select_passwords(&self, user_id: &UserId) -> Result<Vec<PasswordRecord>, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, login, password, meta, updated_at \
             FROM passwords WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(translate)?
        .iter()
        .map(password_from_row)
        .collect()
    }

    async fn remove_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<PasswordRecord, StoreError> {
        sqlx::query(
            "DELETE FROM passwords WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, login, password, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Password))
        .and_then(|row| password_from_row(&row))
    }

    // ───────────────────────────── Bank cards ─────────────────────────────

    async fn insert_bank(
        &self,
        user_id: &UserId,
        data: &BankData,
    ) -> Result<BankRecord, StoreError> {
        sqlx::query(
            "INSERT INTO banks (user_id, name, card_number, cvc, owner, exp, meta) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, user_id, name, card_number, cvc, owner, exp, meta, updated_at",
        )
        .bind(user_id.0)
        .bind(&data.name)
        .bind(&data.card_number)
        .bind(&data.cvc)
        .bind(&data.owner)
        .bind(&data.exp)
        .bind(&data.meta)
        .fetch_one(&self.pool)
        .await
        .map_err(translate)
        .and_then(|row| bank_from_row(&row))
    }

    async fn change_bank(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &BankData,
    ) -> Result<BankRecord, StoreError> {
        sqlx::query(
            "UPDATE banks \
             SET name = $3, card_number = $4, cvc = $5, owner = $6, exp = $7, meta = $8, \
                 updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, card_number, cvc, owner, exp, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .bind(&data.name)
        .bind(&data.card_number)
        .bind(&data.cvc)
        .bind(&data.owner)
        .bind(&data.exp)
        .bind(&data.meta)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Bank))
        .and_then(|row| bank_from_row(&row))
    }

    async fn select_bank(&self, id: &RecordId, user_id: &UserId) -> Result<BankRecord, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, card_number, cvc, owner, exp, meta, updated_at \
             FROM banks WHERE id = $1 AND user_id = $2",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Bank))
        .and_then(|row| bank_from_row(&row))
    }

    async fn select_banks(&self, user_id: &UserId) -> Result<Vec<BankRecord>, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, card_number, cvc, owner, exp, meta, updated_at \
             FROM banks WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(translate)?
        .iter()
        .map(bank_from_row)
        .collect()
    }

    async fn remove_bank(&self, id: &RecordId, user_id: &UserId) -> Result<BankRecord, StoreError> {
        sqlx::query(
            "DELETE FROM banks WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, card_number, cvc, owner, exp, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Bank))
        .and_then(|row| bank_from_row(&row))
    }

    // ───────────────────────────── Texts ─────────────────────────────

    async fn insert_text(
        &self,
        user_id: &UserId,
        data: &TextData,
    ) -> Result<TextRecord, StoreError> {
        sqlx::query(
            "INSERT INTO texts (user_id, name, text, meta) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, name, text, meta, updated_at",
        )
        .bind(user_id.0)
        .bind(&data.name)
        .bind(&data.text)
        .bind(&data.meta)
        .fetch_one(&self.pool)
        .await
        .map_err(translate)
        .and_then(|row| text_from_row(&row))
    }

    async fn change_text(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &TextData,
    ) -> Result<TextRecord, StoreError> {
        sqlx::query(
            "UPDATE texts SET name = $3, text = $4, meta = $5, updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, text, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .bind(&data.name)
        .bind(&data.text)
        .bind(&data.meta)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Text))
        .and_then(|row| text_from_row(&row))
    }

    async fn select_text(&self, id: &RecordId, user_id: &UserId) -> Result<TextRecord, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, text, meta, updated_at \
             FROM texts WHERE id = $1 AND user_id = $2",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Text))
        .and_then(|row| text_from_row(&row))
    }

    async fn select_texts(&self, user_id: &UserId) -> Result<Vec<TextRecord>, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, text, meta, updated_at FROM texts WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(translate)?
        .iter()
        .map(text_from_row)
        .collect()
    }

    async fn remove_text(&self, id: &RecordId, user_id: &UserId) -> Result<TextRecord, StoreError> {
        sqlx::query(
            "DELETE FROM texts WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, text, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::Text))
        .and_then(|row| text_from_row(&row))
    }

    // ───────────────────────────── Files ─────────────────────────────

    async fn insert_file(
        &self,
        user_id: &UserId,
        data: &FileData,
        path: &str,
    ) -> Result<FileRecord, StoreError> {
        sqlx::query(
            "INSERT INTO files (user_id, name, path, meta) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, name, path, meta, updated_at",
        )
        .bind(user_id.0)
        .bind(&data.name)
        .bind(path)
        .bind(&data.meta)
        .fetch_one(&self.pool)
        .await
        .map_err(translate)
        .and_then(|row| file_from_row(&row))
    }

    async fn change_file(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &FileData,
    ) -> Result<FileRecord, StoreError> {
        // `path` is deliberately not part of the SET list: the blob location
        // is immutable for the lifetime of the record.
        sqlx::query(
            "UPDATE files SET name = $3, meta = $4, updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, path, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .bind(&data.name)
        .bind(&data.meta)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::File))
        .and_then(|row| file_from_row(&row))
    }

    async fn select_file(&self, id: &RecordId, user_id: &UserId) -> Result<FileRecord, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, path, meta, updated_at \
             FROM files WHERE id = $1 AND user_id = $2",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::File))
        .and_then(|row| file_from_row(&row))
    }

    async fn select_files(&self, user_id: &UserId) -> Result<Vec<FileRecord>, StoreError> {
        sqlx::query(
            "SELECT id, user_id, name, path, meta, updated_at FROM files WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(translate)?
        .iter()
        .map(file_from_row)
        .collect()
    }

    async fn remove_file(&self, id: &RecordId, user_id: &UserId) -> Result<FileRecord, StoreError> {
        sqlx::query(
            "DELETE FROM files WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, path, meta, updated_at",
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?
        .ok_or(StoreError::NotFound(RecordKind::File))
        .and_then(|row| file_from_row(&row))
    }
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        with_retry(&self.policy, &self.cancel, move || self.insert_user(params)).await
    }

    async fn get_user(&self, login: &str, login_hashed: &str) -> Result<User, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.select_user(login, login_hashed)
        })
        .await
    }

    async fn create_password(
        &self,
        user_id: &UserId,
        data: &PasswordData,
    ) -> Result<PasswordRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.insert_password(user_id, data)
        })
        .await
    }

    async fn update_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &PasswordData,
    ) -> Result<PasswordRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.change_password(id, user_id, data)
        })
        .await
    }

    async fn get_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<PasswordRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.select_password(id, user_id)
        })
        .await
    }

    async fn get_all_passwords(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PasswordRecord>, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.select_passwords(user_id)
        })
        .await
    }

    async fn delete_password(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<PasswordRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.remove_password(id, user_id)
        })
        .await
    }

    async fn create_bank(
        &self,
        user_id: &UserId,
        data: &BankData,
    ) -> Result<BankRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.insert_bank(user_id, data)
        })
        .await
    }

    async fn update_bank(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &BankData,
    ) -> Result<BankRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.change_bank(id, user_id, data)
        })
        .await
    }

    async fn get_bank(&self, id: &RecordId, user_id: &UserId) -> Result<BankRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.select_bank(id, user_id)
        })
        .await
    }

    async fn get_all_banks(&self, user_id: &UserId) -> Result<Vec<BankRecord>, StoreError> {
        with_retry(&self.policy, &self.cancel, move || self.select_banks(user_id)).await
    }

    async fn delete_bank(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<BankRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.remove_bank(id, user_id)
        })
        .await
    }

    async fn create_text(
        &self,
        user_id: &UserId,
        data: &TextData,
    ) -> Result<TextRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.insert_text(user_id, data)
        })
        .await
    }

    async fn update_text(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &TextData,
    ) -> Result<TextRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.change_text(id, user_id, data)
        })
        .await
    }

    async fn get_text(&self, id: &RecordId, user_id: &UserId) -> Result<TextRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.select_text(id, user_id)
        })
        .await
    }

    async fn get_all_texts(&self, user_id: &UserId) -> Result<Vec<TextRecord>, StoreError> {
        with_retry(&self.policy, &self.cancel, move || self.select_texts(user_id)).await
    }

    async fn delete_text(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<TextRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.remove_text(id, user_id)
        })
        .await
    }

    async fn create_file(
        &self,
        user_id: &UserId,
        data: &FileData,
        path: &str,
    ) -> Result<FileRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.insert_file(user_id, data, path)
        })
        .await
    }

    async fn update_file(
        &self,
        id: &RecordId,
        user_id: &UserId,
        data: &FileData,
    ) -> Result<FileRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.change_file(id, user_id, data)
        })
        .await
    }

    async fn get_file(&self, id: &RecordId, user_id: &UserId) -> Result<FileRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.select_file(id, user_id)
        })
        .await
    }

    async fn get_all_files(&self, user_id: &UserId) -> Result<Vec<FileRecord>, StoreError> {
        with_retry(&self.policy, &self.cancel, move || self.select_files(user_id)).await
    }

    async fn delete_file(
        &self,
        id: &RecordId,
        user_id: &UserId,
    ) -> Result<FileRecord, StoreError> {
        with_retry(&self.policy, &self.cancel, move || {
            self.remove_file(id, user_id)
        })
        .await
    }
}

// ───────────────────────────── Error translation ─────────────────────────────

/// Map a driver error onto the uniform store error. Constraint violations
/// become semantic errors; SQLSTATE class 08 (connection exception) and
/// socket-level faults become the transient `Connection` class.
fn translate(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(err) => StoreError::Connection(err.to_string()),
        sqlx::Error::PoolClosed => StoreError::Connection("connection pool closed".into()),
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => StoreError::UserAlreadyExists,
            ErrorKind::ForeignKeyViolation => StoreError::UserNotFound,
            _ => {
                if db.code().is_some_and(|code| code.starts_with("08")) {
                    StoreError::Connection(db.message().to_string())
                } else {
                    StoreError::Backend(db.message().to_string())
                }
            }
        },
        other => StoreError::Backend(other.to_string()),
    }
}

/// Like [`translate`], but prefixes generic backend failures with the
/// operation that produced them. Semantic and transient classes pass
/// through untouched.
fn with_context(ctx: &str, e: sqlx::Error) -> StoreError {
    match translate(e) {
        StoreError::Backend(msg) => StoreError::Backend(format!("{ctx}: {msg}")),
        other => other,
    }
}

// ───────────────────────────── Row mapping ─────────────────────────────

fn password_from_row(row: &PgRow) -> Result<PasswordRecord, StoreError> {
    let map = |e: sqlx::Error| StoreError::Backend(e.to_string());
    Ok(PasswordRecord {
        id: RecordId(row.try_get("id").map_err(map)?),
        user_id: UserId(row.try_get("user_id").map_err(map)?),
        name: row.try_get("name").map_err(map)?,
        login: row.try_get("login").map_err(map)?,
        password: row.try_get("password").map_err(map)?,
        meta: row.try_get("meta").map_err(map)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(map)?,
    })
}

fn bank_from_row(row: &PgRow) -> Result<BankRecord, StoreError> {
    let map = |e: sqlx::Error| StoreError::Backend(e.to_string());
    Ok(BankRecord {
        id: RecordId(row.try_get("id").map_err(map)?),
        user_id: UserId(row.try_get("user_id").map_err(map)?),
        name: row.try_get("name").map_err(map)?,
        card_number: row.try_get("card_number").map_err(map)?,
        cvc: row.try_get("cvc").map_err(map)?,
        owner: row.try_get("owner").map_err(map)?,
        exp: row.try_get("exp").map_err(map)?,
        meta: row.try_get("meta").map_err(map)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(map)?,
    })
}

fn text_from_row(row: &PgRow) -> Result<TextRecord, StoreError> {
    let map = |e: sqlx::Error| StoreError::Backend(e.to_string());
    Ok(TextRecord {
        id: RecordId(row.try_get("id").map_err(map)?),
        user_id: UserId(row.try_get("user_id").map_err(map)?),
        name: row.try_get("name").map_err(map)?,
        text: row.try_get("text").map_err(map)?,
        meta: row.try_get("meta").map_err(map)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(map)?,
    })
}

fn file_from_row(row: &PgRow) -> Result<FileRecord, StoreError> {
    let map = |e: sqlx::Error| StoreError::Backend(e.to_string());
    Ok(FileRecord {
        id: RecordId(row.try_get("id").map_err(map)?),
        user_id: UserId(row.try_get("user_id").map_err(map)?),
        name: row.try_get("name").map_err(map)?,
        path: row.try_get("path").map_err(map)?,
        meta: row.try_get("meta").map_err(map)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(map)?,
    })
}

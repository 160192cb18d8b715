//! Request schema checks shared by the unary handlers.

use tonic::Status;
use uuid::Uuid;

use vaultd_storage::RecordId;

pub fn credentials(login: &str, password: &str) -> Result<(), Status> {
    if login.trim().is_empty() {
        return Err(Status::invalid_argument(
            "validation failed: login must not be empty",
        ));
    }
    if password.is_empty() {
        return Err(Status::invalid_argument(
            "validation failed: password must not be empty",
        ));
    }
    Ok(())
}

pub fn record_name(name: &str) -> Result<(), Status> {
    if name.trim().is_empty() {
        return Err(Status::invalid_argument(
            "validation failed: name must not be empty",
        ));
    }
    Ok(())
}

pub fn record_id(id: &str) -> Result<RecordId, Status> {
    Uuid::parse_str(id)
        .map(RecordId)
        .map_err(|_| Status::invalid_argument("validation failed: id must be a UUID"))
}

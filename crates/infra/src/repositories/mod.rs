mod chat;
mod directory;
mod message;

pub use chat::*;
pub use directory::*;
pub use message::*;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tripmate_domain::DomainResult;
use tripmate_domain::error::DomainError;

fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    let error_message = err.to_string().to_lowercase();
    if error_message.contains("already exists")
        || error_message.contains("already contains")
        || error_message.contains("duplicate")
        || error_message.contains("unique")
    {
        return DomainError::Conflict;
    }
    DomainError::Unavailable(format!("surreal query failed: {error_message}"))
}

fn take_rows(response: &mut surrealdb::Response) -> DomainResult<Vec<Value>> {
    response
        .take(0)
        .map_err(|err| DomainError::Unavailable(format!("invalid query result: {err}")))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> DomainResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value::<T>(row)
                .map_err(|err| DomainError::Unavailable(format!("invalid {what} row: {err}")))
        })
        .collect()
}

/// Reads a `SELECT count() AS total ... GROUP ALL` result; no rows means zero.
fn decode_total(rows: Vec<Value>) -> u64 {
    rows.first()
        .and_then(|row| row.get("total"))
        .and_then(Value::as_u64)
        .unwrap_or_default()
}

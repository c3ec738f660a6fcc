use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

pub fn required_id(field: &str, value: &str) -> crate::DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(crate::error::DomainError::Validation(format!(
            "{field} is required"
        )));
    }
    Ok(value.to_string())
}

use serde::Serialize;
use thiserror::Error;

use super::BoxFuture;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("store misconfigured: {0}")]
    Misconfigured(String),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StoreStatus {
    pub backend: &'static str,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// Liveness probe of whichever backend holds chats and messages.
pub trait StoreProbe: Send + Sync {
    fn backend(&self) -> &'static str;
    fn ping(&self) -> BoxFuture<'_, Result<(), DbError>>;

    fn status(&self) -> BoxFuture<'_, StoreStatus> {
        Box::pin(async move {
            match self.ping().await {
                Ok(()) => StoreStatus {
                    backend: self.backend(),
                    healthy: true,
                    detail: None,
                },
                Err(err) => StoreStatus {
                    backend: self.backend(),
                    healthy: false,
                    detail: Some(err.to_string()),
                },
            }
        })
    }
}

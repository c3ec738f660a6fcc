pub mod auth;
pub mod chat;
pub mod error;
pub mod identity;
pub mod message;
pub mod participant;
pub mod ports;
pub mod presence;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;

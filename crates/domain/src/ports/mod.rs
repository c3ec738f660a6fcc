use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod booking;
pub mod chat;
pub mod db;
pub mod message;
pub mod participants;

use crate::DomainResult;
use crate::message::Message;

pub trait MessageRepository: Send + Sync {
    fn append(&self, message: &Message) -> crate::ports::BoxFuture<'_, DomainResult<Message>>;

    fn get_message(
        &self,
        message_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    fn find_by_client_message_id(
        &self,
        chat_id: &str,
        sender_id: &str,
        client_message_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    /// Oldest first.
    fn list_by_chat(&self, chat_id: &str)
    -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    fn mark_one_seen(&self, message_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    /// Flips `seen` on every message of the chat not sent by
    /// `excluding_sender_id`; returns how many records changed.
    fn mark_all_seen(
        &self,
        chat_id: &str,
        excluding_sender_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>>;

    fn soft_delete(
        &self,
        message_id: &str,
        deleted_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn count_unseen(
        &self,
        chat_id: &str,
        excluding_sender_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>>;
}

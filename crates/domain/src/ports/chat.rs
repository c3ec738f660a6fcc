use crate::DomainResult;
use crate::chat::Chat;
use crate::participant::ParticipantKind;

/// Persistence of [`Chat`] records.
///
/// Implementations must enforce one record per unordered participant pair:
/// `create_chat` fails with `DomainError::Conflict` when a record with the
/// same `pair_key` already exists.
pub trait ChatRepository: Send + Sync {
    fn create_chat(&self, chat: &Chat) -> crate::ports::BoxFuture<'_, DomainResult<Chat>>;

    fn get_chat(&self, chat_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<Option<Chat>>>;

    /// Symmetric lookup: matches `(user=a, vendor=b)`, `(user=b, vendor=a)`
    /// and any record whose pair key is that of `{a, b}`, corrupted or not.
    fn find_by_pair(
        &self,
        id_a: &str,
        id_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Chat>>>;

    /// Every record naming `participant_id` on either side, newest
    /// `last_message_at_ms` first. Corrupted records are included; callers
    /// decide what to do with them.
    fn list_for_participant(
        &self,
        participant_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Chat>>>;

    /// Never moves `last_message_at_ms` backwards; an older timestamp
    /// leaves the preview as it is.
    fn update_last_message(
        &self,
        chat_id: &str,
        text: &str,
        at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn increment_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn reset_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn set_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
        count: u32,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn delete_chat(&self, chat_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;
}

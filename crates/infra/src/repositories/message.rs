use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use tokio::sync::RwLock;
use tripmate_domain::DomainResult;
use tripmate_domain::error::DomainError;
use tripmate_domain::message::{DELETED_MESSAGE_PLACEHOLDER, Message, MessageType, ReplyReference};
use tripmate_domain::participant::ParticipantKind;
use tripmate_domain::ports::BoxFuture;
use tripmate_domain::ports::message::MessageRepository;

use super::{decode_rows, decode_total, map_surreal_error, take_rows};

#[derive(Default)]
struct MessageStore {
    messages: HashMap<String, Message>,
    by_client_id: HashMap<(String, String, String), String>,
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    store: Arc<RwLock<MessageStore>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_key(chat_id: &str, sender_id: &str, client_id: &str) -> (String, String, String) {
        (
            chat_id.to_string(),
            sender_id.to_string(),
            client_id.to_string(),
        )
    }

    fn unseen_from_other_side<'a>(
        store: &'a MessageStore,
        chat_id: &'a str,
        reader_id: &'a str,
    ) -> impl Iterator<Item = &'a Message> + 'a {
        store.messages.values().filter(move |message| {
            message.chat_id == chat_id && message.sender_id != reader_id && !message.seen
        })
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn append(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
        let message = message.clone();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            if store.messages.contains_key(&message.message_id) {
                return Err(DomainError::Conflict);
            }
            if let Some(client_id) = message.client_message_id.as_deref() {
                let key = Self::client_key(&message.chat_id, &message.sender_id, client_id);
                if store.by_client_id.contains_key(&key) {
                    return Err(DomainError::Conflict);
                }
                store.by_client_id.insert(key, message.message_id.clone());
            }
            store
                .messages
                .insert(message.message_id.clone(), message.clone());
            Ok(message)
        })
    }

    fn get_message(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let message_id = message_id.to_string();
        let store = self.store.clone();
        Box::pin(async move { Ok(store.read().await.messages.get(&message_id).cloned()) })
    }

    fn find_by_client_message_id(
        &self,
        chat_id: &str,
        sender_id: &str,
        client_message_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let key = Self::client_key(chat_id, sender_id, client_message_id);
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            Ok(store
                .by_client_id
                .get(&key)
                .and_then(|message_id| store.messages.get(message_id))
                .cloned())
        })
    }

    fn list_by_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let chat_id = chat_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            let mut output: Vec<Message> = store
                .messages
                .values()
                .filter(|message| message.chat_id == chat_id)
                .cloned()
                .collect();
            output.sort_by(|a, b| {
                a.sended_time_ms
                    .cmp(&b.sended_time_ms)
                    .then_with(|| a.message_id.cmp(&b.message_id))
            });
            Ok(output)
        })
    }

    fn mark_one_seen(&self, message_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let message_id = message_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            Ok(match store.messages.get_mut(&message_id) {
                Some(message) => {
                    message.seen = true;
                    true
                }
                None => false,
            })
        })
    }

    fn mark_all_seen(
        &self,
        chat_id: &str,
        reader_id: &str,
    ) -> BoxFuture<'_, DomainResult<u64>> {
        let chat_id = chat_id.to_string();
        let reader_id = reader_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            let ids: Vec<String> = Self::unseen_from_other_side(&store, &chat_id, &reader_id)
                .map(|message| message.message_id.clone())
                .collect();
            for message_id in &ids {
                if let Some(message) = store.messages.get_mut(message_id) {
                    message.seen = true;
                }
            }
            Ok(ids.len() as u64)
        })
    }

    fn soft_delete(&self, message_id: &str, deleted_at_ms: i64) -> BoxFuture<'_, DomainResult<bool>> {
        let message_id = message_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            Ok(match store.messages.get_mut(&message_id) {
                Some(message) => {
                    message.redact(deleted_at_ms);
                    true
                }
                None => false,
            })
        })
    }

    fn count_unseen(&self, chat_id: &str, reader_id: &str) -> BoxFuture<'_, DomainResult<u64>> {
        let chat_id = chat_id.to_string();
        let reader_id = reader_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            Ok(Self::unseen_from_other_side(&store, &chat_id, &reader_id).count() as u64)
        })
    }
}

const MESSAGE_FIELDS: &str = "message_id, chat_id, sender_id, sender_type, receiver_id, \
     message_content, message_type, seen, sended_time_ms, is_deleted, deleted_at_ms, \
     reply_to, client_message_id";

#[derive(Debug, Serialize, Deserialize)]
struct SurrealReplyRow {
    message_id: String,
    message_content: String,
    sender_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SurrealMessageRow {
    message_id: String,
    chat_id: String,
    sender_id: String,
    sender_type: String,
    receiver_id: Option<String>,
    message_content: String,
    message_type: String,
    seen: bool,
    sended_time_ms: i64,
    is_deleted: bool,
    deleted_at_ms: Option<i64>,
    reply_to: Option<SurrealReplyRow>,
    client_message_id: Option<String>,
}

impl From<&Message> for SurrealMessageRow {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.message_id.clone(),
            chat_id: message.chat_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_type: message.sender_type.as_str().to_string(),
            receiver_id: message.receiver_id.clone(),
            message_content: message.message_content.clone(),
            message_type: message.message_type.as_str().to_string(),
            seen: message.seen,
            sended_time_ms: message.sended_time_ms,
            is_deleted: message.is_deleted,
            deleted_at_ms: message.deleted_at_ms,
            reply_to: message.reply_to.as_ref().map(|reply| SurrealReplyRow {
                message_id: reply.message_id.clone(),
                message_content: reply.message_content.clone(),
                sender_name: reply.sender_name.clone(),
            }),
            client_message_id: message.client_message_id.clone(),
        }
    }
}

impl TryFrom<SurrealMessageRow> for Message {
    type Error = DomainError;

    fn try_from(row: SurrealMessageRow) -> DomainResult<Self> {
        let sender_type = ParticipantKind::parse(&row.sender_type).ok_or_else(|| {
            DomainError::Unavailable(format!("invalid sender type '{}'", row.sender_type))
        })?;
        let message_type = MessageType::parse(&row.message_type).ok_or_else(|| {
            DomainError::Unavailable(format!("invalid message type '{}'", row.message_type))
        })?;
        Ok(Message {
            message_id: row.message_id,
            chat_id: row.chat_id,
            sender_id: row.sender_id,
            sender_type,
            receiver_id: row.receiver_id,
            message_content: row.message_content,
            message_type,
            seen: row.seen,
            sended_time_ms: row.sended_time_ms,
            is_deleted: row.is_deleted,
            deleted_at_ms: row.deleted_at_ms,
            reply_to: row.reply_to.map(|reply| ReplyReference {
                message_id: reply.message_id,
                message_content: reply.message_content,
                sender_name: reply.sender_name,
            }),
            client_message_id: row.client_message_id,
        })
    }
}

pub struct SurrealMessageRepository {
    client: Arc<Surreal<Client>>,
}

impl SurrealMessageRepository {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    fn decode_messages(rows: Vec<serde_json::Value>) -> DomainResult<Vec<Message>> {
        decode_rows::<SurrealMessageRow>(rows, "chat message")?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }
}

impl MessageRepository for SurrealMessageRepository {
    fn append(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
        let row = SurrealMessageRow::from(message);
        let message = message.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .query("CREATE chat_message CONTENT $row")
                .bind(("row", row))
                .await
                .map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
            Ok(message)
        })
    }

    fn get_message(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let message_id = message_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {MESSAGE_FIELDS} FROM chat_message WHERE message_id = $message_id LIMIT 1"
                ))
                .bind(("message_id", message_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(Self::decode_messages(take_rows(&mut response)?)?
                .into_iter()
                .next())
        })
    }

    fn find_by_client_message_id(
        &self,
        chat_id: &str,
        sender_id: &str,
        client_message_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let chat_id = chat_id.to_string();
        let sender_id = sender_id.to_string();
        let client_message_id = client_message_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {MESSAGE_FIELDS} FROM chat_message \
                     WHERE chat_id = $chat_id AND sender_id = $sender_id \
                       AND client_message_id = $client_message_id \
                     LIMIT 1"
                ))
                .bind(("chat_id", chat_id))
                .bind(("sender_id", sender_id))
                .bind(("client_message_id", client_message_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(Self::decode_messages(take_rows(&mut response)?)?
                .into_iter()
                .next())
        })
    }

    fn list_by_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let chat_id = chat_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {MESSAGE_FIELDS} FROM chat_message WHERE chat_id = $chat_id \
                     ORDER BY sended_time_ms ASC, message_id ASC"
                ))
                .bind(("chat_id", chat_id))
                .await
                .map_err(map_surreal_error)?;
            Self::decode_messages(take_rows(&mut response)?)
        })
    }

    fn mark_one_seen(&self, message_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let message_id = message_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE chat_message SET seen = true \
                     WHERE message_id = $message_id RETURN message_id",
                )
                .bind(("message_id", message_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(!take_rows(&mut response)?.is_empty())
        })
    }

    fn mark_all_seen(
        &self,
        chat_id: &str,
        reader_id: &str,
    ) -> BoxFuture<'_, DomainResult<u64>> {
        let chat_id = chat_id.to_string();
        let reader_id = reader_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE chat_message SET seen = true \
                     WHERE chat_id = $chat_id AND sender_id != $reader_id AND seen = false \
                     RETURN message_id",
                )
                .bind(("chat_id", chat_id))
                .bind(("reader_id", reader_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(take_rows(&mut response)?.len() as u64)
        })
    }

    fn soft_delete(&self, message_id: &str, deleted_at_ms: i64) -> BoxFuture<'_, DomainResult<bool>> {
        let message_id = message_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE chat_message SET \
                        is_deleted = true, \
                        deleted_at_ms = $deleted_at_ms, \
                        message_content = $placeholder \
                     WHERE message_id = $message_id RETURN message_id",
                )
                .bind(("message_id", message_id))
                .bind(("deleted_at_ms", deleted_at_ms))
                .bind(("placeholder", DELETED_MESSAGE_PLACEHOLDER))
                .await
                .map_err(map_surreal_error)?;
            Ok(!take_rows(&mut response)?.is_empty())
        })
    }

    fn count_unseen(&self, chat_id: &str, reader_id: &str) -> BoxFuture<'_, DomainResult<u64>> {
        let chat_id = chat_id.to_string();
        let reader_id = reader_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT count() AS total FROM chat_message \
                     WHERE chat_id = $chat_id AND sender_id != $reader_id AND seen = false \
                     GROUP ALL",
                )
                .bind(("chat_id", chat_id))
                .bind(("reader_id", reader_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(decode_total(take_rows(&mut response)?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, sender: &str, at: i64) -> Message {
        Message {
            message_id: id.into(),
            chat_id: "c1".into(),
            sender_id: sender.into(),
            sender_type: if sender.starts_with('u') {
                ParticipantKind::User
            } else {
                ParticipantKind::Vendor
            },
            receiver_id: None,
            message_content: format!("from {sender}"),
            message_type: MessageType::Text,
            seen: false,
            sended_time_ms: at,
            is_deleted: false,
            deleted_at_ms: None,
            reply_to: None,
            client_message_id: None,
        }
    }

    #[tokio::test]
    async fn mark_all_seen_only_touches_the_other_side() {
        let repo = InMemoryMessageRepository::new();
        repo.append(&message("m1", "v1", 1)).await.unwrap();
        repo.append(&message("m2", "v1", 2)).await.unwrap();
        repo.append(&message("m3", "u1", 3)).await.unwrap();

        assert_eq!(repo.count_unseen("c1", "u1").await.unwrap(), 2);
        assert_eq!(repo.mark_all_seen("c1", "u1").await.unwrap(), 2);
        assert_eq!(repo.mark_all_seen("c1", "u1").await.unwrap(), 0);
        assert_eq!(repo.count_unseen("c1", "v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn history_is_ascending_by_send_time() {
        let repo = InMemoryMessageRepository::new();
        repo.append(&message("m2", "v1", 20)).await.unwrap();
        repo.append(&message("m1", "u1", 10)).await.unwrap();

        let ids: Vec<_> = repo
            .list_by_chat("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|message| message.message_id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn client_message_id_is_unique_per_sender() {
        let repo = InMemoryMessageRepository::new();
        let mut first = message("m1", "u1", 1);
        first.client_message_id = Some("tmp-1".into());
        repo.append(&first).await.unwrap();

        let mut resend = message("m2", "u1", 2);
        resend.client_message_id = Some("tmp-1".into());
        assert!(matches!(
            repo.append(&resend).await,
            Err(DomainError::Conflict)
        ));

        let found = repo
            .find_by_client_message_id("c1", "u1", "tmp-1")
            .await
            .unwrap()
            .expect("stored");
        assert_eq!(found.message_id, "m1");
    }

    #[tokio::test]
    async fn soft_delete_keeps_the_row() {
        let repo = InMemoryMessageRepository::new();
        repo.append(&message("m1", "u1", 1)).await.unwrap();
        assert!(repo.soft_delete("m1", 99).await.unwrap());

        let stored = repo.get_message("m1").await.unwrap().expect("kept");
        assert!(stored.is_deleted);
        assert_eq!(stored.deleted_at_ms, Some(99));
        assert_eq!(stored.message_content, DELETED_MESSAGE_PLACEHOLDER);
        assert!(!repo.soft_delete("missing", 99).await.unwrap());
    }
}

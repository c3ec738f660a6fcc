use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use tokio::sync::RwLock;
use tripmate_domain::DomainResult;
use tripmate_domain::chat::Chat;
use tripmate_domain::error::DomainError;
use tripmate_domain::participant::{ParticipantKind, pair_key};
use tripmate_domain::ports::BoxFuture;
use tripmate_domain::ports::chat::ChatRepository;

use super::{decode_rows, map_surreal_error, take_rows};

#[derive(Default)]
struct ChatStore {
    chats: HashMap<String, Chat>,
    by_pair: HashMap<String, String>,
}

impl ChatStore {
    fn matches_pair(chat: &Chat, id_a: &str, id_b: &str) -> bool {
        let user = chat.user_id.as_deref();
        let vendor = chat.vendor_id.as_deref();
        (user == Some(id_a) && vendor == Some(id_b)) || (user == Some(id_b) && vendor == Some(id_a))
    }

    fn update<F>(&mut self, chat_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut Chat),
    {
        match self.chats.get_mut(chat_id) {
            Some(chat) => {
                apply(chat);
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
pub struct InMemoryChatRepository {
    store: Arc<RwLock<ChatStore>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a record as-is, bypassing the pair constraint. Used to load
    /// fixtures and legacy rows, including ones with a missing side.
    pub async fn import_record(&self, chat: Chat, pair_key: String) {
        let mut store = self.store.write().await;
        store.by_pair.insert(pair_key, chat.chat_id.clone());
        store.chats.insert(chat.chat_id.clone(), chat);
    }
}

impl ChatRepository for InMemoryChatRepository {
    fn create_chat(&self, chat: &Chat) -> BoxFuture<'_, DomainResult<Chat>> {
        let chat = chat.clone();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            let key = chat.pair_key();
            if store.by_pair.contains_key(&key) || store.chats.contains_key(&chat.chat_id) {
                return Err(DomainError::Conflict);
            }
            store.by_pair.insert(key, chat.chat_id.clone());
            store.chats.insert(chat.chat_id.clone(), chat.clone());
            Ok(chat)
        })
    }

    fn get_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let chat_id = chat_id.to_string();
        let store = self.store.clone();
        Box::pin(async move { Ok(store.read().await.chats.get(&chat_id).cloned()) })
    }

    fn find_by_pair(&self, id_a: &str, id_b: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let id_a = id_a.to_string();
        let id_b = id_b.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            let by_key = store
                .by_pair
                .get(&pair_key(&id_a, &id_b))
                .and_then(|chat_id| store.chats.get(chat_id));
            let found = by_key.or_else(|| {
                store
                    .chats
                    .values()
                    .find(|chat| ChatStore::matches_pair(chat, &id_a, &id_b))
            });
            Ok(found.cloned())
        })
    }

    fn list_for_participant(&self, participant_id: &str) -> BoxFuture<'_, DomainResult<Vec<Chat>>> {
        let participant_id = participant_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            let mut output: Vec<Chat> = store
                .chats
                .values()
                .filter(|chat| {
                    chat.user_id.as_deref() == Some(participant_id.as_str())
                        || chat.vendor_id.as_deref() == Some(participant_id.as_str())
                })
                .cloned()
                .collect();
            output.sort_by(|a, b| b.last_message_at_ms.cmp(&a.last_message_at_ms));
            Ok(output)
        })
    }

    fn update_last_message(
        &self,
        chat_id: &str,
        text: &str,
        at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        let chat_id = chat_id.to_string();
        let text = text.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            Ok(store.write().await.update(&chat_id, |chat| {
                if at_ms >= chat.last_message_at_ms {
                    chat.last_message = text;
                    chat.last_message_at_ms = at_ms;
                }
            }))
        })
    }

    fn increment_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        let chat_id = chat_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            Ok(store.write().await.update(&chat_id, |chat| match side {
                ParticipantKind::User => chat.unread_count_user += 1,
                ParticipantKind::Vendor => chat.unread_count_vendor += 1,
            }))
        })
    }

    fn reset_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        self.set_unread(chat_id, side, 0)
    }

    fn set_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
        count: u32,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        let chat_id = chat_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            Ok(store.write().await.update(&chat_id, |chat| match side {
                ParticipantKind::User => chat.unread_count_user = count,
                ParticipantKind::Vendor => chat.unread_count_vendor = count,
            }))
        })
    }

    fn delete_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let chat_id = chat_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            if store.chats.remove(&chat_id).is_none() {
                return Ok(false);
            }
            store.by_pair.retain(|_, indexed| indexed != &chat_id);
            Ok(true)
        })
    }
}

const CHAT_FIELDS: &str = "chat_id, user_id, vendor_id, last_message, last_message_at_ms, \
     unread_count_user, unread_count_vendor, created_at_ms";

#[derive(Debug, Serialize, Deserialize)]
struct SurrealChatRow {
    chat_id: String,
    user_id: Option<String>,
    vendor_id: Option<String>,
    #[serde(default)]
    last_message: Option<String>,
    last_message_at_ms: i64,
    #[serde(default)]
    unread_count_user: i64,
    #[serde(default)]
    unread_count_vendor: i64,
    created_at_ms: i64,
}

impl From<SurrealChatRow> for Chat {
    fn from(row: SurrealChatRow) -> Self {
        Chat {
            chat_id: row.chat_id,
            user_id: row.user_id,
            vendor_id: row.vendor_id,
            last_message: row.last_message.unwrap_or_default(),
            last_message_at_ms: row.last_message_at_ms,
            unread_count_user: u32::try_from(row.unread_count_user.max(0)).unwrap_or(u32::MAX),
            unread_count_vendor: u32::try_from(row.unread_count_vendor.max(0)).unwrap_or(u32::MAX),
            created_at_ms: row.created_at_ms,
        }
    }
}

pub struct SurrealChatRepository {
    client: Arc<Surreal<Client>>,
}

impl SurrealChatRepository {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    fn unread_column(side: ParticipantKind) -> &'static str {
        match side {
            ParticipantKind::User => "unread_count_user",
            ParticipantKind::Vendor => "unread_count_vendor",
        }
    }

    fn decode_chats(rows: Vec<serde_json::Value>) -> DomainResult<Vec<Chat>> {
        Ok(decode_rows::<SurrealChatRow>(rows, "chat")?
            .into_iter()
            .map(Chat::from)
            .collect())
    }

    /// Runs an `UPDATE ... RETURN chat_id` and reports whether a row matched.
    async fn run_update(
        client: Arc<Surreal<Client>>,
        query: String,
        chat_id: String,
        count: Option<i64>,
    ) -> DomainResult<bool> {
        let mut pending = client.query(query).bind(("chat_id", chat_id));
        if let Some(count) = count {
            pending = pending.bind(("count", count));
        }
        let mut response = pending.await.map_err(map_surreal_error)?;
        Ok(!take_rows(&mut response)?.is_empty())
    }
}

impl ChatRepository for SurrealChatRepository {
    fn create_chat(&self, chat: &Chat) -> BoxFuture<'_, DomainResult<Chat>> {
        let client = self.client.clone();
        let chat = chat.clone();
        Box::pin(async move {
            let response = client
                .query(
                    "CREATE chat CONTENT {\n\
                        chat_id: $chat_id,\n\
                        user_id: $user_id,\n\
                        vendor_id: $vendor_id,\n\
                        pair_key: $pair_key,\n\
                        last_message: $last_message,\n\
                        last_message_at_ms: $last_message_at_ms,\n\
                        unread_count_user: 0,\n\
                        unread_count_vendor: 0,\n\
                        created_at_ms: $created_at_ms\n\
                    };",
                )
                .bind(("chat_id", chat.chat_id.clone()))
                .bind(("user_id", chat.user_id.clone()))
                .bind(("vendor_id", chat.vendor_id.clone()))
                .bind(("pair_key", chat.pair_key()))
                .bind(("last_message", chat.last_message.clone()))
                .bind(("last_message_at_ms", chat.last_message_at_ms))
                .bind(("created_at_ms", chat.created_at_ms))
                .await
                .map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
            Ok(chat)
        })
    }

    fn get_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let chat_id = chat_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {CHAT_FIELDS} FROM chat WHERE chat_id = $chat_id LIMIT 1"
                ))
                .bind(("chat_id", chat_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(Self::decode_chats(take_rows(&mut response)?)?.into_iter().next())
        })
    }

    fn find_by_pair(&self, id_a: &str, id_b: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let key = pair_key(id_a, id_b);
        let id_a = id_a.to_string();
        let id_b = id_b.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {CHAT_FIELDS} FROM chat \
                     WHERE pair_key = $pair_key \
                        OR (user_id = $id_a AND vendor_id = $id_b) \
                        OR (user_id = $id_b AND vendor_id = $id_a) \
                     LIMIT 1"
                ))
                .bind(("pair_key", key))
                .bind(("id_a", id_a))
                .bind(("id_b", id_b))
                .await
                .map_err(map_surreal_error)?;
            Ok(Self::decode_chats(take_rows(&mut response)?)?.into_iter().next())
        })
    }

    fn list_for_participant(&self, participant_id: &str) -> BoxFuture<'_, DomainResult<Vec<Chat>>> {
        let participant_id = participant_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {CHAT_FIELDS} FROM chat \
                     WHERE user_id = $participant_id OR vendor_id = $participant_id \
                     ORDER BY last_message_at_ms DESC"
                ))
                .bind(("participant_id", participant_id))
                .await
                .map_err(map_surreal_error)?;
            Self::decode_chats(take_rows(&mut response)?)
        })
    }

    fn update_last_message(
        &self,
        chat_id: &str,
        text: &str,
        at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        let chat_id = chat_id.to_string();
        let text = text.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE chat SET last_message = $text, last_message_at_ms = $at_ms \
                     WHERE chat_id = $chat_id AND last_message_at_ms <= $at_ms RETURN chat_id",
                )
                .bind(("chat_id", chat_id))
                .bind(("text", text))
                .bind(("at_ms", at_ms))
                .await
                .map_err(map_surreal_error)?;
            Ok(!take_rows(&mut response)?.is_empty())
        })
    }

    fn increment_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        let column = Self::unread_column(side);
        let query =
            format!("UPDATE chat SET {column} += 1 WHERE chat_id = $chat_id RETURN chat_id");
        Box::pin(Self::run_update(
            self.client.clone(),
            query,
            chat_id.to_string(),
            None,
        ))
    }

    fn reset_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        self.set_unread(chat_id, side, 0)
    }

    fn set_unread(
        &self,
        chat_id: &str,
        side: ParticipantKind,
        count: u32,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        let column = Self::unread_column(side);
        let query =
            format!("UPDATE chat SET {column} = $count WHERE chat_id = $chat_id RETURN chat_id");
        Box::pin(Self::run_update(
            self.client.clone(),
            query,
            chat_id.to_string(),
            Some(i64::from(count)),
        ))
    }

    fn delete_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let chat_id = chat_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query("DELETE chat WHERE chat_id = $chat_id RETURN BEFORE")
                .bind(("chat_id", chat_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(!take_rows(&mut response)?.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripmate_domain::participant::ParticipantPair;

    #[tokio::test]
    async fn duplicate_pair_is_a_conflict_in_either_order() {
        let repo = InMemoryChatRepository::new();
        repo.create_chat(&Chat::new(&ParticipantPair::new("u1", "v1"), 1))
            .await
            .expect("first");

        let mut swapped = Chat::new(&ParticipantPair::new("u1", "v1"), 2);
        std::mem::swap(&mut swapped.user_id, &mut swapped.vendor_id);
        let err = repo.create_chat(&swapped).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict));
    }

    #[tokio::test]
    async fn symmetric_lookup_finds_rows_missing_a_side() {
        let repo = InMemoryChatRepository::new();
        let mut chat = Chat::new(&ParticipantPair::new("u1", "v1"), 1);
        chat.vendor_id = None;
        repo.import_record(chat.clone(), pair_key("u1", "v1")).await;

        let found = repo.find_by_pair("v1", "u1").await.unwrap().expect("found");
        assert_eq!(found.chat_id, chat.chat_id);
        assert!(found.is_corrupted());

        assert!(repo.delete_chat(&chat.chat_id).await.unwrap());
        assert!(repo.find_by_pair("u1", "v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn counters_move_per_side() {
        let repo = InMemoryChatRepository::new();
        let chat = repo
            .create_chat(&Chat::new(&ParticipantPair::new("u1", "v1"), 1))
            .await
            .unwrap();

        for _ in 0..3 {
            repo.increment_unread(&chat.chat_id, ParticipantKind::User)
                .await
                .unwrap();
        }
        repo.increment_unread(&chat.chat_id, ParticipantKind::Vendor)
            .await
            .unwrap();
        repo.reset_unread(&chat.chat_id, ParticipantKind::User)
            .await
            .unwrap();

        let stored = repo.get_chat(&chat.chat_id).await.unwrap().unwrap();
        assert_eq!(stored.unread_count_user, 0);
        assert_eq!(stored.unread_count_vendor, 1);
        assert!(!repo
            .increment_unread("missing", ParticipantKind::User)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let repo = InMemoryChatRepository::new();
        let older = repo
            .create_chat(&Chat::new(&ParticipantPair::new("u1", "v1"), 10))
            .await
            .unwrap();
        let newer = repo
            .create_chat(&Chat::new(&ParticipantPair::new("u1", "v2"), 20))
            .await
            .unwrap();
        repo.create_chat(&Chat::new(&ParticipantPair::new("u9", "v9"), 30))
            .await
            .unwrap();

        let ids: Vec<_> = repo
            .list_for_participant("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|chat| chat.chat_id)
            .collect();
        assert_eq!(ids, vec![newer.chat_id, older.chat_id]);
    }
}

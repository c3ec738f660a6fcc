use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::message::{Message, ReplyReference, SendMessageInput, validate_send_input};
use crate::participant::{
    Participant, ParticipantKind, ParticipantPair, ParticipantResolver, pair_key,
};
use crate::ports::booking::BookingLedger;
use crate::ports::chat::ChatRepository;
use crate::ports::message::MessageRepository;
use crate::ports::participants::ParticipantDirectory;
use crate::presence::PresenceRegistry;
use crate::util::{now_ms, required_id, uuid_v7_without_dashes};

const BOOKKEEPING_FAILURES_TOTAL: &str = "tripmate_chat_bookkeeping_failures_total";

fn record_bookkeeping_failure(operation: &'static str) {
    counter!(BOOKKEEPING_FAILURES_TOTAL, "operation" => operation).increment(1);
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id")]
    pub chat_id: String,
    pub user_id: Option<String>,
    pub vendor_id: Option<String>,
    pub last_message: String,
    #[serde(rename = "lastMessageAt")]
    pub last_message_at_ms: i64,
    pub unread_count_user: u32,
    pub unread_count_vendor: u32,
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
}

impl Chat {
    pub fn new(pair: &ParticipantPair, now_ms: i64) -> Self {
        Self {
            chat_id: uuid_v7_without_dashes(),
            user_id: Some(pair.user_id.clone()),
            vendor_id: Some(pair.vendor_id.clone()),
            last_message: String::new(),
            last_message_at_ms: now_ms,
            unread_count_user: 0,
            unread_count_vendor: 0,
            created_at_ms: now_ms,
        }
    }

    pub fn pair(&self) -> Option<ParticipantPair> {
        match (self.user_id.as_deref(), self.vendor_id.as_deref()) {
            (Some(user_id), Some(vendor_id)) if !user_id.is_empty() && !vendor_id.is_empty() => {
                Some(ParticipantPair::new(user_id, vendor_id))
            }
            _ => None,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        self.pair().is_none()
    }

    pub fn pair_key(&self) -> String {
        pair_key(
            self.user_id.as_deref().unwrap_or_default(),
            self.vendor_id.as_deref().unwrap_or_default(),
        )
    }

    pub fn unread_for(&self, side: ParticipantKind) -> u32 {
        match side {
            ParticipantKind::User => self.unread_count_user,
            ParticipantKind::Vendor => self.unread_count_vendor,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub counterpart_id: String,
    pub counterpart_type: ParticipantKind,
    pub name: String,
    #[serde(rename = "profile_image")]
    pub profile_image: Option<String>,
    pub is_online: bool,
    pub unread_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub message: Message,
    pub sender_name: String,
    pub receiver_kind: ParticipantKind,
    pub receiver_id: String,
    pub created: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSnapshot {
    pub chat_id: String,
    pub participant_id: String,
    pub unread_count: u32,
}

#[derive(Clone)]
pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    bookings: Arc<dyn BookingLedger>,
    resolver: ParticipantResolver,
    presence: Arc<PresenceRegistry>,
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        directory: Arc<dyn ParticipantDirectory>,
        bookings: Arc<dyn BookingLedger>,
        presence: Arc<PresenceRegistry>,
    ) -> Self {
        Self {
            chats,
            messages,
            bookings,
            resolver: ParticipantResolver::new(directory),
            presence,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub async fn find_or_create_chat(&self, id_a: &str, id_b: &str) -> DomainResult<ChatSummary> {
        let id_a = required_id("userId", id_a)?;
        let id_b = required_id("ownerId", id_b)?;
        if id_a == id_b {
            return Err(DomainError::Validation(
                "a chat needs two distinct participants".into(),
            ));
        }

        let chat = match self.find_valid_chat(&id_a, &id_b).await? {
            Some(chat) => chat,
            None => self.create_chat(&id_a, &id_b).await?,
        };

        let mut summary = self.summarize(chat, &id_a).await?;
        // The caller is about to open the room; listings carry live presence.
        summary.is_online = true;
        Ok(summary)
    }

    pub async fn get_chat(&self, chat_id: &str) -> DomainResult<Chat> {
        self.chats
            .get_chat(chat_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn list_chats_for_participant(
        &self,
        participant_id: &str,
    ) -> DomainResult<Vec<ChatSummary>> {
        let participant_id = required_id("participantId", participant_id)?;
        let chats = self.chats.list_for_participant(&participant_id).await?;

        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            if chat.is_corrupted() {
                self.purge_corrupted(&chat).await;
                continue;
            }
            summaries.push(self.summarize(chat, &participant_id).await?);
        }
        summaries.sort_by(|a, b| {
            b.chat
                .last_message_at_ms
                .cmp(&a.chat.last_message_at_ms)
                .then_with(|| b.chat.chat_id.cmp(&a.chat.chat_id))
        });
        Ok(summaries)
    }

    pub async fn list_messages_for_reader(
        &self,
        chat_id: &str,
        reader_id: &str,
    ) -> DomainResult<Vec<Message>> {
        let chat_id = required_id("chatId", chat_id)?;
        let reader_id = required_id("readerId", reader_id)?;
        let chat = self.get_chat(&chat_id).await?;

        if let Some(side) = chat.pair().and_then(|pair| pair.side_of(&reader_id)) {
            if let Err(err) = self.messages.mark_all_seen(&chat_id, &reader_id).await {
                tracing::warn!(error = %err, chat_id = %chat_id, "marking messages seen failed");
                record_bookkeeping_failure("mark_seen");
            }
            if let Err(err) = self.chats.reset_unread(&chat_id, side).await {
                tracing::warn!(error = %err, chat_id = %chat_id, side = %side, "unread reset failed");
                record_bookkeeping_failure("reset_unread");
            }
        }

        self.messages.list_by_chat(&chat_id).await
    }

    pub async fn mark_messages_seen(&self, chat_id: &str, reader_id: &str) -> DomainResult<u64> {
        let chat_id = required_id("chatId", chat_id)?;
        let reader_id = required_id("userId", reader_id)?;
        let chat = self.get_chat(&chat_id).await?;
        let side = Self::side_in(&chat, &reader_id)?;

        let modified = self.messages.mark_all_seen(&chat_id, &reader_id).await?;
        self.chats.reset_unread(&chat_id, side).await?;
        Ok(modified)
    }

    pub async fn mark_message_seen(&self, message_id: &str, reader_id: &str) -> DomainResult<()> {
        let message_id = required_id("messageId", message_id)?;
        let reader_id = required_id("userId", reader_id)?;
        let message = self
            .messages
            .get_message(&message_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        let chat = self.get_chat(&message.chat_id).await?;
        Self::side_in(&chat, &reader_id)?;
        if message.sender_id == reader_id {
            return Err(DomainError::Validation(
                "a sender cannot mark its own message seen".into(),
            ));
        }

        if self.messages.mark_one_seen(&message_id).await? {
            Ok(())
        } else {
            Err(DomainError::NotFound)
        }
    }

    pub async fn reconcile_unread(
        &self,
        chat_id: &str,
        participant_id: &str,
    ) -> DomainResult<UnreadSnapshot> {
        let chat_id = required_id("chatId", chat_id)?;
        let participant_id = required_id("participantId", participant_id)?;
        let chat = self.get_chat(&chat_id).await?;
        let side = Self::side_in(&chat, &participant_id)?;

        let unseen = self.messages.count_unseen(&chat_id, &participant_id).await?;
        let unread_count = u32::try_from(unseen).unwrap_or(u32::MAX);
        if unread_count != chat.unread_for(side) {
            tracing::debug!(
                chat_id = %chat_id,
                side = %side,
                stored = chat.unread_for(side),
                actual = unread_count,
                "unread counter drift repaired"
            );
            self.chats.set_unread(&chat_id, side, unread_count).await?;
        }

        Ok(UnreadSnapshot {
            chat_id,
            participant_id,
            unread_count,
        })
    }

    pub async fn send_message(&self, input: SendMessageInput) -> DomainResult<SentMessage> {
        let input = validate_send_input(input)?;
        let chat = self.get_chat(&input.chat_id).await?;
        let pair = chat.pair().ok_or_else(|| {
            DomainError::Validation("chat is missing a participant".into())
        })?;

        let sender_side = pair.side_of(&input.sender_id).ok_or_else(|| {
            DomainError::Validation("sender is not a participant of this chat".into())
        })?;
        if sender_side != input.sender_type {
            return Err(DomainError::Validation(format!(
                "senderType {} does not match the sender's side",
                input.sender_type
            )));
        }
        let receiver_kind = sender_side.other();
        let receiver_id = pair.id_for(receiver_kind).to_string();
        if let Some(declared) = input.receiver_id.as_deref() {
            if declared != receiver_id {
                return Err(DomainError::Validation(
                    "receiverId is not the other participant of this chat".into(),
                ));
            }
        }

        let sender_name = match input.sender_name.clone() {
            Some(name) => name,
            None => self
                .resolver
                .lookup(&input.sender_id, sender_side)
                .await?
                .map(|participant| participant.card().name)
                .unwrap_or_default(),
        };

        if let Some(client_message_id) = input.client_message_id.as_deref() {
            if let Some(existing) = self
                .messages
                .find_by_client_message_id(&input.chat_id, &input.sender_id, client_message_id)
                .await?
            {
                return Ok(SentMessage {
                    message: existing,
                    sender_name,
                    receiver_kind,
                    receiver_id,
                    created: false,
                });
            }
        }

        let reply_to = match input.reply_to {
            Some(draft) => Some(self.snapshot_reply(&input.chat_id, draft).await?),
            None => None,
        };

        let message = Message {
            message_id: uuid_v7_without_dashes(),
            chat_id: input.chat_id,
            sender_id: input.sender_id,
            sender_type: sender_side,
            receiver_id: Some(receiver_id.clone()),
            message_content: input.message_content,
            message_type: input.message_type,
            seen: false,
            sended_time_ms: input.sended_time_ms.unwrap_or_else(now_ms),
            is_deleted: false,
            deleted_at_ms: None,
            reply_to,
            client_message_id: input.client_message_id,
        };
        let message = match self.messages.append(&message).await {
            Ok(message) => message,
            // A concurrent resend stored the same client message id first.
            Err(DomainError::Conflict) if message.client_message_id.is_some() => {
                let existing = self
                    .messages
                    .find_by_client_message_id(
                        &message.chat_id,
                        &message.sender_id,
                        message.client_message_id.as_deref().unwrap_or_default(),
                    )
                    .await?
                    .ok_or(DomainError::Conflict)?;
                return Ok(SentMessage {
                    message: existing,
                    sender_name,
                    receiver_kind,
                    receiver_id,
                    created: false,
                });
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = self
            .chats
            .update_last_message(&message.chat_id, &message.preview(), message.sended_time_ms)
            .await
        {
            tracing::warn!(error = %err, chat_id = %message.chat_id, "last message update failed");
            record_bookkeeping_failure("last_message");
        }
        if let Err(err) = self
            .chats
            .increment_unread(&message.chat_id, receiver_kind)
            .await
        {
            tracing::warn!(error = %err, chat_id = %message.chat_id, "unread increment failed");
            record_bookkeeping_failure("increment_unread");
        }

        Ok(SentMessage {
            message,
            sender_name,
            receiver_kind,
            receiver_id,
            created: true,
        })
    }

    pub async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
        requester_id: Option<&str>,
    ) -> DomainResult<Message> {
        let chat_id = required_id("chatId", chat_id)?;
        let message_id = required_id("messageId", message_id)?;

        let mut message = self
            .messages
            .get_message(&message_id)
            .await?
            .filter(|message| message.chat_id == chat_id)
            .ok_or(DomainError::NotFound)?;
        if let Some(requester_id) = requester_id {
            if requester_id != message.sender_id {
                return Err(DomainError::Validation(
                    "only the sender can delete this message".into(),
                ));
            }
        }
        if message.is_deleted {
            return Ok(message);
        }

        let deleted_at_ms = now_ms();
        if !self.messages.soft_delete(&message_id, deleted_at_ms).await? {
            return Err(DomainError::NotFound);
        }
        message.redact(deleted_at_ms);
        Ok(message)
    }

    async fn find_valid_chat(&self, id_a: &str, id_b: &str) -> DomainResult<Option<Chat>> {
        let Some(chat) = self.chats.find_by_pair(id_a, id_b).await? else {
            return Ok(None);
        };
        if chat.is_corrupted() {
            self.purge_corrupted(&chat).await;
            return Ok(None);
        }
        Ok(Some(chat))
    }

    async fn create_chat(&self, id_a: &str, id_b: &str) -> DomainResult<Chat> {
        if !self.has_booking_either_way(id_a, id_b).await? {
            return Err(DomainError::BookingRequired);
        }

        let resolved = self.resolver.resolve(id_a, id_b).await?;
        let chat = Chat::new(&resolved.pair, now_ms());
        match self.chats.create_chat(&chat).await {
            Ok(chat) => {
                tracing::info!(
                    chat_id = %chat.chat_id,
                    user_id = %resolved.pair.user_id,
                    vendor_id = %resolved.pair.vendor_id,
                    "chat created"
                );
                Ok(chat)
            }
            // Lost a creation race; the winner's record is the chat.
            Err(DomainError::Conflict) => self
                .find_valid_chat(id_a, id_b)
                .await?
                .ok_or(DomainError::Conflict),
            Err(err) => Err(err),
        }
    }

    async fn has_booking_either_way(&self, id_a: &str, id_b: &str) -> DomainResult<bool> {
        if self.bookings.has_confirmed_booking(id_a, id_b).await? {
            return Ok(true);
        }
        self.bookings.has_confirmed_booking(id_b, id_a).await
    }

    async fn purge_corrupted(&self, chat: &Chat) {
        tracing::warn!(chat_id = %chat.chat_id, "purging chat with a missing participant");
        if let Err(err) = self.chats.delete_chat(&chat.chat_id).await {
            tracing::warn!(error = %err, chat_id = %chat.chat_id, "corrupted chat purge failed");
            record_bookkeeping_failure("purge_corrupted");
        }
    }

    async fn summarize(&self, chat: Chat, viewer_id: &str) -> DomainResult<ChatSummary> {
        let pair = chat.pair().ok_or(DomainError::NotFound)?;
        let viewer_side = pair.side_of(viewer_id).ok_or_else(|| {
            DomainError::Validation("participant is not part of this chat".into())
        })?;
        let (counterpart_type, counterpart_id) = (viewer_side.other(), pair.id_for(viewer_side.other()));

        let card = self
            .resolver
            .lookup(counterpart_id, counterpart_type)
            .await?
            .as_ref()
            .map(Participant::card);
        let is_online = self.presence.is_online(counterpart_id).await;

        Ok(ChatSummary {
            counterpart_id: counterpart_id.to_string(),
            counterpart_type,
            name: card.as_ref().map(|card| card.name.clone()).unwrap_or_default(),
            profile_image: card.and_then(|card| card.avatar_url),
            is_online,
            unread_count: chat.unread_for(viewer_side),
            chat,
        })
    }

    async fn snapshot_reply(
        &self,
        chat_id: &str,
        draft: crate::message::ReplyDraft,
    ) -> DomainResult<ReplyReference> {
        let original = self
            .messages
            .get_message(&draft.message_id)
            .await?
            .filter(|message| message.chat_id == chat_id)
            .ok_or_else(|| {
                DomainError::Validation("replyTo must reference a message in this chat".into())
            })?;

        let sender_name = match draft.sender_name {
            Some(name) => Some(name),
            None => self
                .resolver
                .lookup(&original.sender_id, original.sender_type)
                .await?
                .map(|participant| participant.card().name),
        };

        Ok(ReplyReference {
            message_id: original.message_id.clone(),
            message_content: draft
                .message_content
                .filter(|_| !original.is_deleted)
                .unwrap_or(original.message_content),
            sender_name,
        })
    }

    fn side_in(chat: &Chat, participant_id: &str) -> DomainResult<ParticipantKind> {
        chat.pair()
            .and_then(|pair| pair.side_of(participant_id))
            .ok_or_else(|| DomainError::Validation("participant is not part of this chat".into()))
    }
}

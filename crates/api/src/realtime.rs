use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{RwLock, mpsc};
use tripmate_domain::DomainResult;
use tripmate_domain::chat::{ChatService, SentMessage};
use tripmate_domain::error::DomainError;
use tripmate_domain::identity::ActorIdentity;
use tripmate_domain::message::{ReplyDraft, SendMessageInput};
use tripmate_domain::participant::ParticipantKind;
use tripmate_domain::presence::{PresenceChange, PresenceRegistry};

use crate::observability;

pub const EVENT_ACK: &str = "ack";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_ONLINE_USERS: &str = "online-users";
pub const EVENT_RECEIVE_MESSAGE: &str = "receive-message";
pub const EVENT_NEW_MESSAGE_NOTIFICATION: &str = "new-message-notification";
pub const EVENT_MESSAGE_DELETED: &str = "message_deleted";
pub const EVENT_MESSAGES_SEEN: &str = "messages-seen";
pub const EVENT_TYPING: &str = "typing";
pub const EVENT_STOP_TYPING: &str = "stop-typing";

const CLIENT_EVENTS: [&str; 8] = [
    "register_user",
    "register_vendor",
    "join_room",
    "send_message",
    "delete_message",
    "mark_messages_seen",
    EVENT_TYPING,
    EVENT_STOP_TYPING,
];

/// A frame as sent by a client.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "ackId", default)]
    pub ack_id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ServerFrame<'a> {
    event: &'a str,
    #[serde(rename = "ackId", skip_serializing_if = "Option::is_none")]
    ack_id: Option<u64>,
    data: Value,
}

fn encode(event: &str, ack_id: Option<u64>, data: Value) -> String {
    serde_json::to_string(&ServerFrame {
        event,
        ack_id,
        data,
    })
    .unwrap_or_else(|_| format!("{{\"event\":\"{EVENT_ERROR}\",\"data\":{{}}}}"))
}

fn status_event(kind: ParticipantKind) -> &'static str {
    match kind {
        ParticipantKind::User => "user-status-changed",
        ParticipantKind::Vendor => "vendor-status-changed",
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload {
    id: Option<String>,
    user_id: Option<String>,
    vendor_id: Option<String>,
}

impl RegisterPayload {
    /// The key matching the registering role wins over the generic `id`.
    fn participant_id(self, kind: ParticipantKind) -> String {
        let specific = match kind {
            ParticipantKind::User => self.user_id,
            ParticipantKind::Vendor => self.vendor_id,
        };
        [specific, self.id]
            .into_iter()
            .flatten()
            .map(|id| id.trim().to_string())
            .find(|id| !id.is_empty())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomPayload {
    #[serde(default, alias = "chatId")]
    room_id: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    sender_id: String,
    #[serde(default)]
    sender_type: String,
    sender_name: Option<String>,
    receiver_id: Option<String>,
    #[serde(default)]
    message_content: String,
    message_type: Option<String>,
    reply_to: Option<ReplyDraft>,
    client_message_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMessagePayload {
    message_id: Option<String>,
    chat_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkSeenPayload {
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    user_id: String,
}

/// Per-connection facts fixed at upgrade time.
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    pub connection_id: String,
    /// Identity proven by a session token on the upgrade request, if any.
    pub verified: Option<ActorIdentity>,
}

/// Room-based realtime gateway. Owns the outbound queue of every live
/// connection and routes client events to [`ChatService`].
pub struct ChatGateway {
    chat: ChatService,
    presence: Arc<PresenceRegistry>,
    outbound: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
    ack_timeout: Duration,
}

impl ChatGateway {
    pub fn new(chat: ChatService, ack_timeout: Duration) -> Self {
        let presence = chat.presence().clone();
        Self {
            chat,
            presence,
            outbound: RwLock::new(HashMap::new()),
            ack_timeout,
        }
    }

    /// Registers an anonymous connection and returns its outbound queue.
    pub async fn open(&self, connection_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.outbound
            .write()
            .await
            .insert(connection_id.to_string(), sender);
        self.presence.connect(connection_id).await;
        observability::set_gateway_connections(self.presence.connection_count().await);
        receiver
    }

    pub async fn close(&self, connection_id: &str) {
        self.outbound.write().await.remove(connection_id);
        if let Some(change) = self.presence.disconnect(connection_id).await {
            tracing::info!(
                participant_id = %change.binding.participant_id,
                kind = %change.binding.kind,
                "participant went offline"
            );
            self.broadcast_presence(&change).await;
        }
        observability::set_gateway_connections(self.presence.connection_count().await);
    }

    /// Parses and dispatches one text frame. Failures are reported back on
    /// the same connection; nothing here closes the socket.
    pub async fn handle_text(&self, connection: &ConnectionContext, text: &str) {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(err) => {
                observability::register_gateway_event("invalid", "rejected");
                self.send_to(
                    &connection.connection_id,
                    encode(
                        EVENT_ERROR,
                        None,
                        json!({ "message": format!("invalid frame: {err}") }),
                    ),
                )
                .await;
                return;
            }
        };
        self.handle_frame(connection, frame).await;
    }

    pub async fn handle_frame(&self, connection: &ConnectionContext, frame: ClientFrame) {
        let event = frame.event.clone();
        let outcome = match event.as_str() {
            "register_user" => {
                self.register(connection, ParticipantKind::User, frame)
                    .await
            }
            "register_vendor" => {
                self.register(connection, ParticipantKind::Vendor, frame)
                    .await
            }
            "join_room" => self.join_room(connection, frame).await,
            "send_message" => self.send_message(connection, frame).await,
            "delete_message" => self.delete_message(connection, frame).await,
            "mark_messages_seen" => self.mark_messages_seen(connection, frame).await,
            EVENT_TYPING | EVENT_STOP_TYPING => self.typing(connection, &event, frame).await,
            _ => {
                self.reply_failure(connection, None, format!("unknown event '{event}'"))
                    .await;
                Err(())
            }
        };
        let outcome = if outcome.is_ok() { "ok" } else { "rejected" };
        let label = if CLIENT_EVENTS.contains(&event.as_str()) {
            event.as_str()
        } else {
            "unknown"
        };
        observability::register_gateway_event(label, outcome);
    }

    async fn register(
        &self,
        connection: &ConnectionContext,
        kind: ParticipantKind,
        frame: ClientFrame,
    ) -> Result<(), ()> {
        let payload: RegisterPayload = self.payload(connection, &frame).await?;
        let participant_id = payload.participant_id(kind);
        if participant_id.is_empty() {
            self.reply_failure(connection, frame.ack_id, format!("{kind}Id is required"))
                .await;
            return Err(());
        }
        if let Some(verified) = connection.verified.as_ref() {
            let kind_matches = verified
                .role
                .participant_kind()
                .is_none_or(|verified_kind| verified_kind == kind);
            if verified.participant_id != participant_id || !kind_matches {
                self.reply_failure(
                    connection,
                    frame.ack_id,
                    "registration does not match the session".to_string(),
                )
                .await;
                return Err(());
            }
        }

        let went_offline = self
            .presence
            .register(&connection.connection_id, kind, &participant_id)
            .await;
        tracing::info!(
            connection_id = %connection.connection_id,
            participant_id = %participant_id,
            kind = %kind,
            "connection registered"
        );
        if let Some(change) = went_offline.as_ref() {
            self.broadcast_presence(change).await;
        }
        self.broadcast_all(encode(
            status_event(kind),
            None,
            json!({ "id": participant_id, "isOnline": true }),
        ))
        .await;

        let online_ids = self.presence.online_ids().await;
        self.send_to(
            &connection.connection_id,
            encode(EVENT_ONLINE_USERS, None, json!({ "onlineIds": online_ids })),
        )
        .await;
        self.ack(connection, frame.ack_id, json!({ "success": true }))
            .await;
        Ok(())
    }

    async fn join_room(&self, connection: &ConnectionContext, frame: ClientFrame) -> Result<(), ()> {
        let payload: RoomPayload = self.payload(connection, &frame).await?;
        let room_id = payload.room_id.trim();
        if room_id.is_empty() {
            self.reply_failure(connection, frame.ack_id, "roomId is required".to_string())
                .await;
            return Err(());
        }
        if !self
            .presence
            .join_room(&connection.connection_id, room_id)
            .await
        {
            self.reply_failure(connection, frame.ack_id, format!("cannot join room '{room_id}'"))
                .await;
            return Err(());
        }
        tracing::debug!(connection_id = %connection.connection_id, room_id, "joined room");
        self.ack(connection, frame.ack_id, json!({ "success": true }))
            .await;
        Ok(())
    }

    async fn send_message(
        &self,
        connection: &ConnectionContext,
        frame: ClientFrame,
    ) -> Result<(), ()> {
        let payload: SendMessagePayload = self.payload(connection, &frame).await?;
        if let Some(acting) = self.acting_participant(connection).await {
            if acting != payload.sender_id.trim() {
                self.reply_failure(
                    connection,
                    frame.ack_id,
                    "senderId does not match the registered participant".to_string(),
                )
                .await;
                return Err(());
            }
        }

        let client_message_id = payload.client_message_id.clone();
        let input = SendMessageInput {
            chat_id: payload.chat_id,
            sender_id: payload.sender_id,
            sender_type: payload.sender_type,
            sender_name: payload.sender_name,
            receiver_id: payload.receiver_id,
            message_content: payload.message_content,
            message_type: payload.message_type,
            reply_to: payload.reply_to,
            client_message_id: payload.client_message_id,
            sended_time_ms: None,
        };
        let sent = match self.bounded(self.chat.send_message(input)).await {
            Ok(sent) => sent,
            Err(err) => {
                self.reply_failure(connection, frame.ack_id, err.to_string())
                    .await;
                return Err(());
            }
        };

        self.ack(
            connection,
            frame.ack_id,
            json!({
                "success": true,
                "messageId": sent.message.message_id,
                "clientMessageId": client_message_id,
                "message": sent.message,
            }),
        )
        .await;
        if sent.created {
            self.fan_out(&sent).await;
        }
        Ok(())
    }

    async fn fan_out(&self, sent: &SentMessage) {
        let message = &sent.message;
        self.broadcast_room(
            &message.chat_id,
            encode(
                EVENT_RECEIVE_MESSAGE,
                None,
                json!({
                    "message": message,
                    "senderName": sent.sender_name,
                }),
            ),
            None,
        )
        .await;

        let channel = sent.receiver_kind.personal_channel(&sent.receiver_id);
        self.broadcast_room(
            &channel,
            encode(
                EVENT_NEW_MESSAGE_NOTIFICATION,
                None,
                json!({
                    "chatId": message.chat_id,
                    "messageId": message.message_id,
                    "senderId": message.sender_id,
                    "senderName": sent.sender_name,
                    "preview": message.preview(),
                    "sendedTime": message.sended_time_ms,
                }),
            ),
            None,
        )
        .await;
    }

    async fn delete_message(
        &self,
        connection: &ConnectionContext,
        frame: ClientFrame,
    ) -> Result<(), ()> {
        let payload: DeleteMessagePayload = self.payload(connection, &frame).await?;
        let (Some(message_id), Some(chat_id)) = (
            payload.message_id.filter(|id| !id.trim().is_empty()),
            payload.chat_id.filter(|id| !id.trim().is_empty()),
        ) else {
            self.reply_failure(
                connection,
                frame.ack_id,
                "messageId and chatId are required".to_string(),
            )
            .await;
            return Err(());
        };

        let requester = self.acting_participant(connection).await;
        let deleted = match self
            .bounded(
                self.chat
                    .delete_message(&chat_id, &message_id, requester.as_deref()),
            )
            .await
        {
            Ok(message) => message,
            Err(err) => {
                self.reply_failure(connection, frame.ack_id, err.to_string())
                    .await;
                return Err(());
            }
        };

        self.broadcast_room(
            &chat_id,
            encode(
                EVENT_MESSAGE_DELETED,
                None,
                json!({
                    "chatId": chat_id,
                    "messageId": message_id,
                    "deletedAt": deleted.deleted_at_ms,
                    "message": deleted,
                }),
            ),
            None,
        )
        .await;
        self.ack(connection, frame.ack_id, json!({ "success": true }))
            .await;
        Ok(())
    }

    /// Cross-client signal only; seen state is persisted by the REST read.
    async fn mark_messages_seen(
        &self,
        connection: &ConnectionContext,
        frame: ClientFrame,
    ) -> Result<(), ()> {
        let payload: MarkSeenPayload = self.payload(connection, &frame).await?;
        let chat_id = payload.chat_id.trim();
        if chat_id.is_empty() {
            self.reply_failure(connection, frame.ack_id, "chatId is required".to_string())
                .await;
            return Err(());
        }
        self.broadcast_room(
            chat_id,
            encode(
                EVENT_MESSAGES_SEEN,
                None,
                json!({ "chatId": chat_id, "userId": payload.user_id }),
            ),
            None,
        )
        .await;
        Ok(())
    }

    async fn typing(
        &self,
        connection: &ConnectionContext,
        event: &str,
        frame: ClientFrame,
    ) -> Result<(), ()> {
        let payload: RoomPayload = self.payload(connection, &frame).await?;
        let room_id = payload.room_id.trim();
        if room_id.is_empty() {
            self.reply_failure(connection, None, "roomId is required".to_string())
                .await;
            return Err(());
        }
        self.broadcast_room(
            room_id,
            encode(
                event,
                None,
                json!({ "roomId": room_id, "userId": payload.user_id }),
            ),
            Some(&connection.connection_id),
        )
        .await;
        Ok(())
    }

    /// The participant this connection speaks for: its registration, else
    /// the participant named by its session token.
    async fn acting_participant(&self, connection: &ConnectionContext) -> Option<String> {
        if let Some(binding) = self.presence.binding(&connection.connection_id).await {
            return Some(binding.participant_id);
        }
        connection
            .verified
            .as_ref()
            .filter(|actor| actor.role.participant_kind().is_some())
            .map(|actor| actor.participant_id.clone())
    }

    async fn payload<T>(&self, connection: &ConnectionContext, frame: &ClientFrame) -> Result<T, ()>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        if frame.data.is_null() {
            return Ok(T::default());
        }
        match serde_json::from_value::<T>(frame.data.clone()) {
            Ok(payload) => Ok(payload),
            Err(err) => {
                self.reply_failure(
                    connection,
                    frame.ack_id,
                    format!("invalid {} payload: {err}", frame.event),
                )
                .await;
                Err(())
            }
        }
    }

    async fn bounded<T>(&self, operation: impl Future<Output = DomainResult<T>>) -> DomainResult<T> {
        match tokio::time::timeout(self.ack_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = self.ack_timeout.as_millis() as u64, "gateway store call timed out");
                Err(DomainError::Unavailable("store call timed out".into()))
            }
        }
    }

    /// Failure goes into the ack when the client asked for one, otherwise
    /// into an `error` frame.
    async fn reply_failure(&self, connection: &ConnectionContext, ack_id: Option<u64>, message: String) {
        tracing::debug!(connection_id = %connection.connection_id, message, "gateway event rejected");
        match ack_id {
            Some(_) => {
                self.ack(
                    connection,
                    ack_id,
                    json!({ "success": false, "message": message }),
                )
                .await;
            }
            None => {
                self.send_to(
                    &connection.connection_id,
                    encode(EVENT_ERROR, None, json!({ "message": message })),
                )
                .await;
            }
        }
    }

    async fn ack(&self, connection: &ConnectionContext, ack_id: Option<u64>, data: Value) {
        if let Some(ack_id) = ack_id {
            self.send_to(&connection.connection_id, encode(EVENT_ACK, Some(ack_id), data))
                .await;
        }
    }

    async fn broadcast_presence(&self, change: &PresenceChange) {
        self.broadcast_all(encode(
            status_event(change.binding.kind),
            None,
            json!({
                "id": change.binding.participant_id,
                "isOnline": change.is_online,
            }),
        ))
        .await;
    }

    async fn send_to(&self, connection_id: &str, frame: String) {
        let outbound = self.outbound.read().await;
        if let Some(sender) = outbound.get(connection_id) {
            if sender.send(frame).is_err() {
                tracing::debug!(connection_id, "outbound queue closed");
            }
        }
    }

    async fn broadcast_all(&self, frame: String) {
        let outbound = self.outbound.read().await;
        for sender in outbound.values() {
            let _ = sender.send(frame.clone());
        }
    }

    async fn broadcast_room(&self, room_id: &str, frame: String, except: Option<&str>) {
        let members = self.presence.connections_in_room(room_id).await;
        let outbound = self.outbound.read().await;
        for connection_id in members {
            if except == Some(connection_id.as_str()) {
                continue;
            }
            if let Some(sender) = outbound.get(&connection_id) {
                let _ = sender.send(frame.clone());
            }
        }
    }
}

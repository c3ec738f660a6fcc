use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::participant::ParticipantKind;

pub const DELETED_MESSAGE_PLACEHOLDER: &str = "This message was deleted";
pub const MAX_MESSAGE_LENGTH: usize = 2_000;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
}

impl MessageType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "video" => Some(MessageType::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
        }
    }
}

/// Snapshot of the message being answered, frozen at send time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyReference {
    pub message_id: String,
    pub message_content: String,
    pub sender_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_type: ParticipantKind,
    pub receiver_id: Option<String>,
    pub message_content: String,
    pub message_type: MessageType,
    pub seen: bool,
    #[serde(rename = "sendedTime")]
    pub sended_time_ms: i64,
    pub is_deleted: bool,
    #[serde(rename = "deletedAt")]
    pub deleted_at_ms: Option<i64>,
    pub reply_to: Option<ReplyReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

impl Message {
    pub fn preview(&self) -> String {
        match self.message_type {
            MessageType::Text => self.message_content.clone(),
            MessageType::Image => "[image]".to_string(),
            MessageType::Video => "[video]".to_string(),
        }
    }

    pub fn redact(&mut self, deleted_at_ms: i64) {
        self.is_deleted = true;
        self.deleted_at_ms = Some(deleted_at_ms);
        self.message_content = DELETED_MESSAGE_PLACEHOLDER.to_string();
    }
}

/// A reply target as sent by a client; snapshot fields may be missing.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyDraft {
    pub message_id: String,
    #[serde(default)]
    pub message_content: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SendMessageInput {
    pub chat_id: String,
    pub sender_id: String,
    pub sender_type: String,
    pub sender_name: Option<String>,
    pub receiver_id: Option<String>,
    pub message_content: String,
    pub message_type: Option<String>,
    pub reply_to: Option<ReplyDraft>,
    pub client_message_id: Option<String>,
    // Never taken from the wire; defaults to the server clock.
    pub sended_time_ms: Option<i64>,
}

#[derive(Clone, Debug)]
pub(crate) struct ValidatedSend {
    pub chat_id: String,
    pub sender_id: String,
    pub sender_type: ParticipantKind,
    pub sender_name: Option<String>,
    pub receiver_id: Option<String>,
    pub message_content: String,
    pub message_type: MessageType,
    pub reply_to: Option<ReplyDraft>,
    pub client_message_id: Option<String>,
    pub sended_time_ms: Option<i64>,
}

pub(crate) fn validate_send_input(input: SendMessageInput) -> DomainResult<ValidatedSend> {
    let chat_id = crate::util::required_id("chatId", &input.chat_id)?;
    let sender_id = crate::util::required_id("senderId", &input.sender_id)?;
    let sender_type = ParticipantKind::parse(&input.sender_type).ok_or_else(|| {
        DomainError::Validation("senderType must be user or vendor".into())
    })?;

    let message_content = input.message_content.trim().to_string();
    if message_content.is_empty() {
        return Err(DomainError::Validation("messageContent is required".into()));
    }
    if message_content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(DomainError::Validation(format!(
            "messageContent exceeds max length of {MAX_MESSAGE_LENGTH}"
        )));
    }

    let message_type = match input.message_type.as_deref().map(str::trim) {
        None | Some("") => MessageType::Text,
        Some(value) => MessageType::parse(value).ok_or_else(|| {
            DomainError::Validation("messageType must be text, image or video".into())
        })?,
    };

    let reply_to = match input.reply_to {
        Some(draft) if draft.message_id.trim().is_empty() => None,
        other => other,
    };

    Ok(ValidatedSend {
        chat_id,
        sender_id,
        sender_type,
        sender_name: non_blank(input.sender_name),
        receiver_id: non_blank(input.receiver_id),
        message_content,
        message_type,
        reply_to,
        client_message_id: non_blank(input.client_message_id),
        sended_time_ms: input.sended_time_ms,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> SendMessageInput {
        SendMessageInput {
            chat_id: "c1".into(),
            sender_id: "v1".into(),
            sender_type: "Vendor".into(),
            message_content: "  Hello  ".into(),
            ..SendMessageInput::default()
        }
    }

    #[test]
    fn defaults_type_and_normalizes_sender_type() {
        let validated = validate_send_input(input()).expect("valid");
        assert_eq!(validated.message_type, MessageType::Text);
        assert_eq!(validated.sender_type, ParticipantKind::Vendor);
        assert_eq!(validated.message_content, "Hello");
    }

    #[test]
    fn rejects_missing_fields_and_oversized_content() {
        let mut missing_chat = input();
        missing_chat.chat_id = " ".into();
        assert!(matches!(
            validate_send_input(missing_chat),
            Err(DomainError::Validation(msg)) if msg == "chatId is required"
        ));

        let mut too_long = input();
        too_long.message_content = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(validate_send_input(too_long).is_err());

        let mut bad_type = input();
        bad_type.message_type = Some("sticker".into());
        assert!(validate_send_input(bad_type).is_err());

        let mut bad_sender = input();
        bad_sender.sender_type = "admin".into();
        assert!(validate_send_input(bad_sender).is_err());
    }

    #[test]
    fn blank_reply_target_is_dropped() {
        let mut with_blank_reply = input();
        with_blank_reply.reply_to = Some(ReplyDraft::default());
        let validated = validate_send_input(with_blank_reply).expect("valid");
        assert!(validated.reply_to.is_none());
    }

    #[test]
    fn redact_replaces_content_with_placeholder() {
        let mut message = Message {
            message_id: "m1".into(),
            chat_id: "c1".into(),
            sender_id: "v1".into(),
            sender_type: ParticipantKind::Vendor,
            receiver_id: Some("u1".into()),
            message_content: "secret plans".into(),
            message_type: MessageType::Text,
            seen: false,
            sended_time_ms: 10,
            is_deleted: false,
            deleted_at_ms: None,
            reply_to: None,
            client_message_id: None,
        };
        message.redact(20);
        assert!(message.is_deleted);
        assert_eq!(message.deleted_at_ms, Some(20));
        assert_eq!(message.message_content, DELETED_MESSAGE_PLACEHOLDER);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let value = serde_json::to_value(Message {
            message_id: "m1".into(),
            chat_id: "c1".into(),
            sender_id: "u1".into(),
            sender_type: ParticipantKind::User,
            receiver_id: None,
            message_content: "hi".into(),
            message_type: MessageType::Image,
            seen: true,
            sended_time_ms: 5,
            is_deleted: false,
            deleted_at_ms: None,
            reply_to: None,
            client_message_id: None,
        })
        .expect("json");
        assert_eq!(value["_id"], "m1");
        assert_eq!(value["senderType"], "user");
        assert_eq!(value["messageType"], "image");
        assert_eq!(value["sendedTime"], 5);
        assert!(value.get("clientMessageId").is_none());
    }
}

use std::sync::Arc;

use futures_util::future::join_all;
use tripmate_domain::chat::ChatService;
use tripmate_domain::error::DomainError;
use tripmate_domain::message::{DELETED_MESSAGE_PLACEHOLDER, ReplyDraft, SendMessageInput};
use tripmate_domain::participant::{ParticipantKind, UserProfile, VendorProfile, pair_key};
use tripmate_domain::ports::chat::ChatRepository;
use tripmate_domain::presence::PresenceRegistry;
use tripmate_infra::repositories::{
    InMemoryBookingLedger, InMemoryChatRepository, InMemoryMessageRepository,
    InMemoryParticipantDirectory,
};

struct Harness {
    service: ChatService,
    chats: Arc<InMemoryChatRepository>,
    bookings: Arc<InMemoryBookingLedger>,
    presence: Arc<PresenceRegistry>,
}

async fn harness() -> Harness {
    let directory = Arc::new(InMemoryParticipantDirectory::new());
    for id in ["u1", "u2"] {
        directory
            .add_user(UserProfile {
                user_id: id.into(),
                name: format!("Traveler {id}"),
                image_url: Some(format!("https://img/{id}.png")),
            })
            .await;
    }
    for id in ["v1", "v2"] {
        directory
            .add_vendor(VendorProfile {
                vendor_id: id.into(),
                name: format!("Vendor {id}"),
                profile_image: None,
            })
            .await;
    }

    let chats = Arc::new(InMemoryChatRepository::new());
    let bookings = Arc::new(InMemoryBookingLedger::new());
    bookings.confirm("u1", "v1").await;
    let presence = Arc::new(PresenceRegistry::new());
    let service = ChatService::new(
        chats.clone(),
        Arc::new(InMemoryMessageRepository::new()),
        directory,
        bookings.clone(),
        presence.clone(),
    );
    Harness {
        service,
        chats,
        bookings,
        presence,
    }
}

fn text(chat_id: &str, sender_id: &str, sender_type: &str, content: &str) -> SendMessageInput {
    SendMessageInput {
        chat_id: chat_id.into(),
        sender_id: sender_id.into(),
        sender_type: sender_type.into(),
        message_content: content.into(),
        ..SendMessageInput::default()
    }
}

#[tokio::test]
async fn find_or_create_is_symmetric() {
    let h = harness().await;

    let from_user = h.service.find_or_create_chat("u1", "v1").await.unwrap();
    let from_vendor = h.service.find_or_create_chat("v1", "u1").await.unwrap();

    assert_eq!(from_user.chat.chat_id, from_vendor.chat.chat_id);
    assert_eq!(from_user.chat.user_id.as_deref(), Some("u1"));
    assert_eq!(from_user.chat.vendor_id.as_deref(), Some("v1"));
    assert_eq!(from_user.counterpart_id, "v1");
    assert_eq!(from_user.name, "Vendor v1");
    assert_eq!(from_vendor.counterpart_type, ParticipantKind::User);
    assert_eq!(
        from_vendor.profile_image.as_deref(),
        Some("https://img/u1.png")
    );
}

#[tokio::test]
async fn concurrent_initiation_creates_one_chat() {
    let h = harness().await;

    let attempts = (0..8).map(|round| {
        let service = h.service.clone();
        async move {
            if round % 2 == 0 {
                service.find_or_create_chat("u1", "v1").await
            } else {
                service.find_or_create_chat("v1", "u1").await
            }
        }
    });
    let results = join_all(attempts).await;

    let ids: std::collections::HashSet<_> = results
        .into_iter()
        .map(|result| result.expect("created or found").chat.chat_id)
        .collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(h.chats.list_for_participant("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn same_type_pair_is_rejected_even_with_a_booking() {
    let h = harness().await;
    h.bookings.confirm("u1", "u2").await;

    let err = h.service.find_or_create_chat("u1", "u2").await.unwrap_err();
    assert!(matches!(err, DomainError::SameTypePair(ParticipantKind::User)));
}

#[tokio::test]
async fn booking_gate_accepts_either_role_order() {
    let h = harness().await;

    let err = h.service.find_or_create_chat("u2", "v2").await.unwrap_err();
    assert!(matches!(err, DomainError::BookingRequired));
    assert_eq!(err.to_string(), "chat requires a prior booking");

    h.bookings.confirm("v2", "u2").await;
    let summary = h.service.find_or_create_chat("u2", "v2").await.unwrap();
    assert_eq!(summary.chat.user_id.as_deref(), Some("u2"));
}

#[tokio::test]
async fn unread_counts_up_then_resets_on_read() {
    let h = harness().await;
    let chat_id = h
        .service
        .find_or_create_chat("u1", "v1")
        .await
        .unwrap()
        .chat
        .chat_id;

    for n in 0..3 {
        h.service
            .send_message(text(&chat_id, "v1", "vendor", &format!("msg {n}")))
            .await
            .unwrap();
    }
    let chat = h.service.get_chat(&chat_id).await.unwrap();
    assert_eq!(chat.unread_count_user, 3);
    assert_eq!(chat.unread_count_vendor, 0);
    assert_eq!(chat.last_message, "msg 2");

    let modified = h.service.mark_messages_seen(&chat_id, "u1").await.unwrap();
    assert_eq!(modified, 3);
    let chat = h.service.get_chat(&chat_id).await.unwrap();
    assert_eq!(chat.unread_count_user, 0);
}

#[tokio::test]
async fn soft_delete_keeps_position_and_preview() {
    let h = harness().await;
    let chat_id = h
        .service
        .find_or_create_chat("u1", "v1")
        .await
        .unwrap()
        .chat
        .chat_id;

    let first = h
        .service
        .send_message(text(&chat_id, "u1", "User", "first"))
        .await
        .unwrap();
    h.service
        .send_message(text(&chat_id, "u1", "User", "second"))
        .await
        .unwrap();

    let deleted = h
        .service
        .delete_message(&chat_id, &first.message.message_id, Some("u1"))
        .await
        .unwrap();
    assert!(deleted.is_deleted);
    assert!(deleted.deleted_at_ms.is_some());

    let history = h.service.list_messages_for_reader(&chat_id, "u1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].message_content, DELETED_MESSAGE_PLACEHOLDER);
    assert_eq!(history[1].message_content, "second");
    assert_eq!(h.service.get_chat(&chat_id).await.unwrap().last_message, "second");
}

#[tokio::test]
async fn only_the_sender_may_delete() {
    let h = harness().await;
    let chat_id = h
        .service
        .find_or_create_chat("u1", "v1")
        .await
        .unwrap()
        .chat
        .chat_id;
    let sent = h
        .service
        .send_message(text(&chat_id, "u1", "user", "mine"))
        .await
        .unwrap();

    let err = h
        .service
        .delete_message(&chat_id, &sent.message.message_id, Some("v1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = h
        .service
        .delete_message("other-chat", &sent.message.message_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound));
}

#[tokio::test]
async fn corrupted_chat_is_purged_and_recreated() {
    let h = harness().await;
    let original = h.service.find_or_create_chat("u1", "v1").await.unwrap().chat;

    let mut corrupted = original.clone();
    corrupted.vendor_id = None;
    h.chats
        .import_record(corrupted, pair_key("u1", "v1"))
        .await;

    assert!(h.service.list_chats_for_participant("u1").await.unwrap().is_empty());
    assert!(h.chats.get_chat(&original.chat_id).await.unwrap().is_none());

    let mut corrupted_again = original.clone();
    corrupted_again.chat_id = "legacy".into();
    corrupted_again.user_id = None;
    h.chats
        .import_record(corrupted_again, pair_key("u1", "v1"))
        .await;

    let fresh = h.service.find_or_create_chat("v1", "u1").await.unwrap();
    assert_ne!(fresh.chat.chat_id, "legacy");
    assert!(!fresh.chat.is_corrupted());
    assert!(h.chats.get_chat("legacy").await.unwrap().is_none());
}

#[tokio::test]
async fn resend_with_same_client_id_is_not_duplicated() {
    let h = harness().await;
    let chat_id = h
        .service
        .find_or_create_chat("u1", "v1")
        .await
        .unwrap()
        .chat
        .chat_id;

    let mut input = text(&chat_id, "u1", "user", "hello?");
    input.client_message_id = Some("tmp-42".into());
    let first = h.service.send_message(input.clone()).await.unwrap();
    let again = h.service.send_message(input).await.unwrap();

    assert!(first.created);
    assert!(!again.created);
    assert_eq!(first.message.message_id, again.message.message_id);
    let chat = h.service.get_chat(&chat_id).await.unwrap();
    assert_eq!(chat.unread_count_vendor, 1);
}

#[tokio::test]
async fn sender_must_belong_to_the_chat_on_its_declared_side() {
    let h = harness().await;
    let chat_id = h
        .service
        .find_or_create_chat("u1", "v1")
        .await
        .unwrap()
        .chat
        .chat_id;

    let outsider = h
        .service
        .send_message(text(&chat_id, "u2", "user", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(outsider, DomainError::Validation(_)));

    let wrong_side = h
        .service
        .send_message(text(&chat_id, "u1", "vendor", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(wrong_side, DomainError::Validation(_)));

    let mut wrong_receiver = text(&chat_id, "u1", "user", "hi");
    wrong_receiver.receiver_id = Some("v2".into());
    assert!(h.service.send_message(wrong_receiver).await.is_err());
}

#[tokio::test]
async fn reply_snapshot_is_filled_from_the_original() {
    let h = harness().await;
    let chat_id = h
        .service
        .find_or_create_chat("u1", "v1")
        .await
        .unwrap()
        .chat
        .chat_id;
    let original = h
        .service
        .send_message(text(&chat_id, "v1", "vendor", "Pickup at 9"))
        .await
        .unwrap();

    let mut reply = text(&chat_id, "u1", "user", "Great");
    reply.reply_to = Some(ReplyDraft {
        message_id: original.message.message_id.clone(),
        ..ReplyDraft::default()
    });
    let sent = h.service.send_message(reply).await.unwrap();

    let snapshot = sent.message.reply_to.expect("reply snapshot");
    assert_eq!(snapshot.message_content, "Pickup at 9");
    assert_eq!(snapshot.sender_name.as_deref(), Some("Vendor v1"));
}

#[tokio::test]
async fn reconcile_repairs_counter_drift() {
    let h = harness().await;
    let chat_id = h
        .service
        .find_or_create_chat("u1", "v1")
        .await
        .unwrap()
        .chat
        .chat_id;
    for _ in 0..2 {
        h.service
            .send_message(text(&chat_id, "u1", "user", "ping"))
            .await
            .unwrap();
    }
    h.chats
        .set_unread(&chat_id, ParticipantKind::Vendor, 7)
        .await
        .unwrap();

    let snapshot = h.service.reconcile_unread(&chat_id, "v1").await.unwrap();
    assert_eq!(snapshot.unread_count, 2);
    assert_eq!(
        h.service.get_chat(&chat_id).await.unwrap().unread_count_vendor,
        2
    );
}

#[tokio::test]
async fn listing_reports_presence_and_recency() {
    let h = harness().await;
    h.bookings.confirm("u1", "v2").await;
    let first = h.service.find_or_create_chat("u1", "v1").await.unwrap().chat;
    let second = h.service.find_or_create_chat("u1", "v2").await.unwrap().chat;
    h.service
        .send_message(SendMessageInput {
            sended_time_ms: Some(second.last_message_at_ms + 10_000),
            ..text(&first.chat_id, "v1", "vendor", "latest")
        })
        .await
        .unwrap();

    h.presence.connect("conn-v1").await;
    h.presence
        .register("conn-v1", ParticipantKind::Vendor, "v1")
        .await;

    let listed = h.service.list_chats_for_participant("u1").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].chat.chat_id, first.chat_id);
    assert!(listed[0].is_online);
    assert_eq!(listed[0].unread_count, 1);
    assert!(!listed[1].is_online);
}

#[tokio::test]
async fn example_scenario_end_to_end() {
    let h = harness().await;

    let summary = h.service.find_or_create_chat("u1", "v1").await.unwrap();
    assert_eq!(summary.chat.unread_count_user, 0);
    assert_eq!(summary.chat.unread_count_vendor, 0);
    let chat_id = summary.chat.chat_id;

    let sent = h
        .service
        .send_message(text(&chat_id, "v1", "vendor", "Hello"))
        .await
        .unwrap();
    assert_eq!(sent.receiver_id, "u1");
    assert_eq!(sent.receiver_kind, ParticipantKind::User);
    let chat = h.service.get_chat(&chat_id).await.unwrap();
    assert_eq!(chat.last_message, "Hello");
    assert_eq!(chat.unread_count_user, 1);

    let history = h.service.list_messages_for_reader(&chat_id, "u1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].seen);
    assert_eq!(h.service.get_chat(&chat_id).await.unwrap().unread_count_user, 0);
}

#[tokio::test]
async fn older_timestamps_never_rewind_the_chat_preview() {
    let h = harness().await;
    let chat_id = h.service.find_or_create_chat("u1", "v1").await.unwrap().chat.chat_id;
    h.service
        .send_message(text(&chat_id, "v1", "vendor", "first"))
        .await
        .unwrap();
    let before = h.service.get_chat(&chat_id).await.unwrap();

    h.service
        .send_message(SendMessageInput {
            sended_time_ms: Some(1),
            ..text(&chat_id, "u1", "user", "backdated")
        })
        .await
        .unwrap();

    let after = h.service.get_chat(&chat_id).await.unwrap();
    assert_eq!(after.last_message_at_ms, before.last_message_at_ms);
    assert_eq!(after.last_message, "first");
    assert_eq!(after.unread_count_vendor, 1);
}

#[tokio::test]
async fn opening_a_chat_reports_the_counterpart_online() {
    let h = harness().await;

    let opened = h.service.find_or_create_chat("u1", "v1").await.unwrap();
    assert!(opened.is_online);

    let listed = h.service.list_chats_for_participant("u1").await.unwrap();
    assert!(!listed[0].is_online);
}

mod gateway;

use axum::extract::{Extension, Path, State};
use axum::{
    Json, Router,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tripmate_domain::auth::Role;
use tripmate_domain::chat::{ChatSummary, UnreadSnapshot};
use tripmate_domain::identity::ActorIdentity;
use tripmate_domain::message::Message;
use tripmate_domain::ports::db::StoreStatus;
use validator::Validate;

use crate::middleware::AuthContext;
use crate::{error::ApiError, middleware as app_middleware, observability, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/chat/find-or-create-chat", post(find_or_create_chat))
        .route("/v1/chat/chats-of-user/:user_id", get(list_chats_of_user))
        .route("/v1/chat/messages/:chat_id", get(list_chat_messages))
        .route("/v1/chat/messages/mark-seen", post(mark_messages_seen))
        .route("/v1/chat/messages/mark-one-seen", post(mark_message_seen))
        .route("/v1/chat/chats/:chat_id/unread", get(get_unread_count))
        .route("/v1/chat/presence/:participant_id", get(get_presence))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/chat/ws", get(gateway::upgrade))
        .merge(protected)
        .layer(app_middleware::timeout_layer(state.config.http_timeout_secs))
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ))
        .layer(middleware::from_fn(app_middleware::metrics_layer));

    if !state.config.is_test() {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    database: StoreStatus,
}

async fn health(State(state): State<AppState>) -> Response {
    let database = state.store_probe.status().await;
    let (code, status) = if database.healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        database,
    };
    (code, Json(body)).into_response()
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct FindOrCreateChatRequest {
    #[validate(length(min = 1, max = 128), custom(function = "validation::not_blank"))]
    user_id: String,
    #[validate(length(min = 1, max = 128), custom(function = "validation::not_blank"))]
    owner_id: String,
}

async fn find_or_create_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<FindOrCreateChatRequest>,
) -> Result<Json<ChatSummary>, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.require_actor()?;
    if !acts_for(actor, &payload.user_id) && !acts_for(actor, &payload.owner_id) {
        return Err(ApiError::Forbidden);
    }

    let summary = state
        .chat
        .find_or_create_chat(&payload.user_id, &payload.owner_id)
        .await?;
    tracing::debug!(
        chat_id = %summary.chat.chat_id,
        actor = %actor.participant_id,
        "chat resolved"
    );
    Ok(Json(summary))
}

async fn list_chats_of_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    let actor = auth.require_actor()?;
    if !acts_for(actor, &user_id) {
        return Err(ApiError::Forbidden);
    }
    let chats = state.chat.list_chats_for_participant(&user_id).await?;
    Ok(Json(chats))
}

async fn list_chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let actor = auth.require_actor()?;
    assert_chat_access(&state, &chat_id, actor).await?;
    let messages = state
        .chat
        .list_messages_for_reader(&chat_id, &actor.participant_id)
        .await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct MarkSeenRequest {
    #[validate(length(min = 1, max = 128), custom(function = "validation::not_blank"))]
    chat_id: String,
    #[validate(length(min = 1, max = 128), custom(function = "validation::not_blank"))]
    user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkSeenResponse {
    modified_count: u64,
}

async fn mark_messages_seen(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<MarkSeenRequest>,
) -> Result<Json<MarkSeenResponse>, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.require_actor()?;
    if !acts_for(actor, &payload.user_id) {
        return Err(ApiError::Forbidden);
    }
    let modified_count = state
        .chat
        .mark_messages_seen(&payload.chat_id, &payload.user_id)
        .await?;
    Ok(Json(MarkSeenResponse { modified_count }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct MarkOneSeenRequest {
    #[validate(length(min = 1, max = 128), custom(function = "validation::not_blank"))]
    message_id: String,
}

async fn mark_message_seen(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<MarkOneSeenRequest>,
) -> Result<StatusCode, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.require_actor()?;
    state
        .chat
        .mark_message_seen(&payload.message_id, &actor.participant_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_unread_count(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UnreadSnapshot>, ApiError> {
    let actor = auth.require_actor()?;
    assert_chat_access(&state, &chat_id, actor).await?;
    let snapshot = state
        .chat
        .reconcile_unread(&chat_id, &actor.participant_id)
        .await?;
    Ok(Json(snapshot))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresenceResponse {
    participant_id: String,
    is_online: bool,
}

async fn get_presence(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Json<PresenceResponse> {
    let is_online = state.presence.is_online(&participant_id).await;
    Json(PresenceResponse {
        participant_id,
        is_online,
    })
}

fn acts_for(actor: &ActorIdentity, participant_id: &str) -> bool {
    actor.role == Role::Admin || actor.participant_id == participant_id
}

async fn assert_chat_access(
    state: &AppState,
    chat_id: &str,
    actor: &ActorIdentity,
) -> Result<(), ApiError> {
    let chat = state.chat.get_chat(chat_id).await?;
    let is_member = chat
        .pair()
        .and_then(|pair| pair.side_of(&actor.participant_id))
        .is_some();
    if is_member || actor.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

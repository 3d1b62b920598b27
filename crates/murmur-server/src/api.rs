use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{Method, StatusCode},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use murmur_shared::addressing::{conversation_id, ConversationId};
use murmur_shared::constants::PUBLIC_KEY_FORMAT;
use murmur_shared::inbox::{build_inbox_with_profiles, format_timestamp, InboxEntry};
use murmur_shared::storage::{append_envelope, ConversationStore, ProfileDirectory};
use murmur_shared::{
    Message, MessageOrder, Profile, PublicKey, PublishedKey, SealedPayload, UserId,
};
use murmur_store::Database;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::identity::CallerId;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

/// Base64 of a maximum-size envelope plus JSON framing fits comfortably.
const MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    fn db(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        self.db
            .lock()
            .map_err(|_| ServerError::Internal("database mutex poisoned".into()))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/profile", put(update_profile))
        .route("/profile/:user_id", get(fetch_profile))
        .route("/users", get(search_users))
        .route("/keys", put(publish_key))
        .route("/keys/:user_id", get(fetch_key))
        .route(
            "/conversations/:peer/messages",
            post(send_message).get(list_messages),
        )
        .route("/inbox", get(inbox))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: &'static str,
}

#[derive(Deserialize)]
struct ProfileRequest {
    username: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
}

#[derive(Deserialize)]
struct UserSearchQuery {
    username: String,
}

#[derive(Serialize)]
struct UserSearchResult {
    uid: UserId,
    username: Option<String>,
    photo_url: Option<String>,
}

#[derive(Deserialize)]
struct PublishKeyRequest {
    public_key: String,
    format: String,
}

#[derive(Deserialize)]
struct ListMessagesQuery {
    #[serde(default)]
    order: MessageOrder,
}

#[derive(Serialize)]
struct SentResponse {
    id: Uuid,
    conversation_id: ConversationId,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Serialize)]
struct InboxItem {
    #[serde(flatten)]
    entry: InboxEntry,
    /// `last_message_at` rendered in the configured display offset.
    display_time: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn update_profile(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(req): Json<ProfileRequest>,
) -> Result<StatusCode, ServerError> {
    let db = state.db()?;
    db.upsert_profile(
        &caller,
        req.username.as_deref(),
        req.display_name.as_deref(),
        req.photo_url.as_deref(),
    )?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_profile(
    State(state): State<AppState>,
    CallerId(_caller): CallerId,
    Path(user_id): Path<String>,
) -> Result<Json<Profile>, ServerError> {
    let user = UserId::new(user_id)?;
    let db = state.db()?;
    db.profile(&user)?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("No profile for {user}")))
}

/// Exact username lookup. The caller never finds themselves.
async fn search_users(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<UserSearchResult>, ServerError> {
    if query.username.trim().is_empty() {
        return Err(ServerError::BadRequest("username must not be empty".into()));
    }

    let db = state.db()?;
    let profile = db
        .find_profile_by_username(&query.username, &caller)?
        .ok_or_else(|| ServerError::NotFound("No matching user".into()))?;

    Ok(Json(UserSearchResult {
        uid: profile.user_id,
        username: profile.username,
        photo_url: profile.photo_url,
    }))
}

async fn publish_key(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(req): Json<PublishKeyRequest>,
) -> Result<Json<PublishedKey>, ServerError> {
    if req.format != PUBLIC_KEY_FORMAT {
        return Err(ServerError::BadRequest(format!(
            "Unsupported key format, expected {PUBLIC_KEY_FORMAT}"
        )));
    }
    let key = PublicKey::from_base64(&req.public_key)?;

    let db = state.db()?;
    db.publish_public_key(&caller, &key)?;

    Ok(Json(PublishedKey {
        public_key: key.to_base64(),
        format: key.format().to_string(),
    }))
}

async fn fetch_key(
    State(state): State<AppState>,
    CallerId(_caller): CallerId,
    Path(user_id): Path<String>,
) -> Result<Json<PublishedKey>, ServerError> {
    let user = UserId::new(user_id)?;
    let db = state.db()?;
    db.public_key(&user)?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("No public key published for {user}")))
}

async fn send_message(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(peer): Path<String>,
    payload: Result<Json<SealedPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<SentResponse>), ServerError> {
    let Json(payload) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let peer = UserId::new(peer)?;
    // Addresses the pair up front so self-sends fail before any lookup.
    conversation_id(&caller, &peer)?;
    payload.validate()?;

    let db = state.db()?;

    let sender_key = db
        .get_public_key(&caller)?
        .ok_or_else(|| ServerError::Forbidden("Publish a public key before sending".into()))?;
    if sender_key.as_bytes().as_slice() != payload.sender_public_key.as_slice() {
        return Err(ServerError::Forbidden(
            "sender_pub does not match the published key".into(),
        ));
    }
    if db.get_public_key(&peer)?.is_none() {
        return Err(ServerError::NotFound(format!(
            "No public key published for {peer}"
        )));
    }

    // Stored timestamps keep microseconds.
    let envelope = payload.into_envelope(Utc::now().trunc_subsecs(6))?;
    let message = append_envelope(&*db, &caller, &peer, envelope)?;

    info!(
        conversation = %message.conversation_id,
        message_id = %message.id,
        ciphertext_len = message.envelope.ciphertext.len(),
        "Message stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(SentResponse {
            id: message.id,
            conversation_id: message.conversation_id,
            created_at: message.created_at,
        }),
    ))
}

async fn list_messages(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(peer): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let peer = UserId::new(peer)?;
    let id = conversation_id(&caller, &peer)?;

    let db = state.db()?;
    let messages = db.stream_messages(&id, query.order)?;
    Ok(Json(messages))
}

async fn inbox(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<Json<Vec<InboxItem>>, ServerError> {
    let entries = {
        let db = state.db()?;
        let conversations = db.conversations_for(&caller)?;

        let mut last_messages = HashMap::new();
        let mut profiles = HashMap::new();
        for conversation in &conversations {
            if let Some(message) = db.last_message(&conversation.id)? {
                last_messages.insert(conversation.id.clone(), message);
            }
            if let Some(other) = conversation.other_participant(&caller) {
                if let Some(profile) = db.profile(other)? {
                    profiles.insert(other.clone(), profile);
                }
            }
        }

        build_inbox_with_profiles(
            &caller,
            &conversations,
            |c| last_messages.remove(&c.id),
            |user| profiles.remove(user),
        )
    };

    let offset = state.config.display_offset;
    let items = entries
        .into_iter()
        .map(|entry| InboxItem {
            display_time: entry.last_message_at.map(|ts| format_timestamp(ts, offset)),
            entry,
        })
        .collect();

    Ok(Json(items))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::WebSocketUpgrade,
        Path, Query, State,
    },
    http::{HeaderValue, Method},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use application::{events::parse_message_ids, MatchSummary, MessageDto};
use domain::UserId;

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection};

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    before: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadPayload {
    #[serde(default)]
    message_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AliasPayload {
    alias: String,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/matches", get(list_matches))
        .route("/matches/{match_ref}/messages", get(list_messages))
        .route("/matches/{match_ref}/read", post(mark_read))
        .route("/matches/{match_ref}/alias", put(assign_alias))
        .route("/matches/likes/like/{target_id}", post(like))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn list_matches(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let rooms = state.messaging.list_rooms(user).await?;
    Ok(Json(rooms))
}

async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(match_ref): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let Query(query) = query?;
    let before = query
        .before
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| ApiError::bad_request("before must be an RFC 3339 timestamp"))
        })
        .transpose()?;

    let messages = state
        .messaging
        .list_messages(user, &match_ref, before, query.limit)
        .await?;
    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(match_ref): Path<String>,
    payload: Result<Json<MarkReadPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let ids = parse_message_ids(&payload.message_ids);
    let receipt = state.messaging.mark_read(user, &match_ref, ids).await?;
    Ok(Json(json!({
        "ok": true,
        "updated": receipt.updated_count,
        "unreadLeft": receipt.remaining_unread,
    })))
}

async fn assign_alias(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(match_ref): Path<String>,
    payload: Result<Json<AliasPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let updated = state
        .matching
        .assign_alias(&match_ref, user, &payload.alias)
        .await?;
    Ok(Json(json!({
        "ok": true,
        "matchId": updated.id,
        "alias": updated.alias,
    })))
}

async fn like(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(target_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let target: UserId = target_id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid target id"))?;
    let outcome = state.matching.like(user, target).await?;
    Ok(Json(json!({ "ok": true, "matchId": outcome.match_id })))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| ws_connection::serve(socket, state, user))
}

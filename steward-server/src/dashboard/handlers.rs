//! HTTP handlers for the dashboard API.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use steward_core::{
    Application, GuildId, JoinRejection, LeaveRejection, MessageId, Muster, MusterId, UserId,
};
use tracing::error;

use crate::orchestrator::{Status, WorkflowError};
use crate::records::{BlacklistEntry, GuildSettings};
use crate::AppState;

/// Validate the authorization header against the dashboard auth token.
///
/// Returns `Ok(())` if authorized, or an error response if not.
#[allow(clippy::result_large_err)] // Response is large but this is idiomatic in Axum handlers
fn validate_auth(headers: &HeaderMap, auth_token: &Option<String>) -> Result<(), Response> {
    // If no auth token is configured, the API is disabled
    let Some(expected_token) = auth_token else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Dashboard API is disabled (DASHBOARD_AUTH_TOKEN not configured)",
        )
            .into_response());
    };

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided_token) if provided_token == expected_token => Ok(()),
            Some(_) => Err((StatusCode::UNAUTHORIZED, "Invalid token").into_response()),
            None => Err((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header format. Expected: Bearer <token>",
            )
                .into_response()),
        },
        None => Err((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header. Expected: Bearer <token>",
        )
            .into_response()),
    }
}

fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        WorkflowError::NotFound { .. }
        | WorkflowError::Join(JoinRejection::NotFound)
        | WorkflowError::Leave(LeaveRejection::NotFound) => StatusCode::NOT_FOUND,
        WorkflowError::UnderReview { .. }
        | WorkflowError::Join(_)
        | WorkflowError::Leave(_)
        | WorkflowError::Conflict(_) => StatusCode::CONFLICT,
        WorkflowError::Validation(_) | WorkflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        WorkflowError::NotConfigured { .. } => StatusCode::PRECONDITION_FAILED,
        WorkflowError::Collaborator { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: WorkflowError) -> Response {
    if let WorkflowError::Collaborator { service, detail } = &err {
        error!("Dashboard request failed at the {}: {}", service, detail);
    }
    (status_for(&err), Json(json!({ "error": err.to_string() }))).into_response()
}

/// Confirmation plus any best-effort steps that failed.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub ok: bool,
    pub warnings: Vec<String>,
}

/// Handler: GET /api/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Status>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .status()
        .await
        .map(Json)
        .map_err(error_response)
}

/// Handler: GET /api/guilds/:guild/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(guild): Path<GuildId>,
) -> Result<Json<GuildSettings>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .guild_settings(guild)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Handler: PUT /api/guilds/:guild/settings
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(guild): Path<GuildId>,
    Json(settings): Json<GuildSettings>,
) -> Result<Json<GuildSettings>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .replace_guild_settings(guild, settings)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Handler: GET /api/applications
pub async fn list_all_applications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Application>>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .applications(None)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Handler: GET /api/guilds/:guild/applications
pub async fn list_guild_applications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(guild): Path<GuildId>,
) -> Result<Json<Vec<Application>>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .applications(Some(guild))
        .await
        .map(Json)
        .map_err(error_response)
}

/// Handler: GET /api/guilds/:guild/musters
pub async fn list_musters(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(guild): Path<GuildId>,
) -> Result<Json<Vec<Muster>>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    Ok(Json(state.orchestrator.musters(guild)))
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub user_id: UserId,
}

/// Handler: POST /api/guilds/:guild/musters/:message/members
///
/// Adds a member exactly as if they had pressed Join; filling the last slot
/// completes the muster.
pub async fn add_muster_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((guild, message)): Path<(GuildId, MessageId)>,
    Json(request): Json<MemberRequest>,
) -> Result<Json<ActionResponse>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .join_muster(MusterId::new(guild, message), request.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResponse {
        ok: true,
        warnings: Vec::new(),
    }))
}

/// Handler: DELETE /api/guilds/:guild/musters/:message/members/:user
pub async fn remove_muster_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((guild, message, user)): Path<(GuildId, MessageId, UserId)>,
) -> Result<Json<ActionResponse>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .leave_muster(MusterId::new(guild, message), user)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResponse {
        ok: true,
        warnings: Vec::new(),
    }))
}

/// Handler: GET /api/guilds/:guild/blacklist
pub async fn list_blacklist(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(guild): Path<GuildId>,
) -> Result<Json<Vec<BlacklistEntry>>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .blacklist(guild)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct BlacklistRequest {
    pub user_id: UserId,
    pub static_id: String,
    pub reason: String,
    pub reporter_id: UserId,
}

/// Handler: POST /api/guilds/:guild/blacklist
pub async fn add_blacklist_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(guild): Path<GuildId>,
    Json(request): Json<BlacklistRequest>,
) -> Result<Json<ActionResponse>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    let warnings = state
        .orchestrator
        .add_to_blacklist(
            guild,
            request.user_id,
            request.static_id,
            request.reason,
            request.reporter_id,
        )
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResponse { ok: true, warnings }))
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: UserId,
}

/// Handler: DELETE /api/guilds/:guild/blacklist/:user?actor_id=...
pub async fn remove_blacklist_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((guild, user)): Path<(GuildId, UserId)>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<ActionResponse>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    let warnings = state
        .orchestrator
        .remove_from_blacklist(guild, user, query.actor_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResponse { ok: true, warnings }))
}

/// Handler: GET /api/owners
pub async fn list_owners(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserId>>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    Ok(Json(state.orchestrator.owners().await.iter().collect()))
}

/// Handler: PUT /api/owners/:user
pub async fn add_owner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user): Path<UserId>,
) -> Result<Json<ActionResponse>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    state
        .orchestrator
        .add_owner(user)
        .await
        .map_err(|e| error_response(e.into()))?;
    Ok(Json(ActionResponse {
        ok: true,
        warnings: Vec::new(),
    }))
}

/// Handler: DELETE /api/owners/:user
pub async fn remove_owner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user): Path<UserId>,
) -> Result<Json<ActionResponse>, Response> {
    validate_auth(&headers, &state.dashboard_auth_token)?;
    let removed = state
        .orchestrator
        .remove_owner(user)
        .await
        .map_err(|e| error_response(e.into()))?;
    if !removed {
        return Err(error_response(WorkflowError::NotFound { what: "That owner" }));
    }
    Ok(Json(ActionResponse {
        ok: true,
        warnings: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::dashboard::dashboard_router;
    use crate::orchestrator::{Orchestrator, Timing};
    use crate::platform::fake::RecordingPlatform;
    use crate::store::memory::InMemoryDocumentStore;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use axum::Router;
    use ed25519_dalek::SigningKey;
    use tower::ServiceExt;

    #[test]
    fn test_validate_auth_success() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer test-token-123"),
        );
        let auth_token = Some("test-token-123".to_string());
        assert!(validate_auth(&headers, &auth_token).is_ok());
    }

    #[test]
    fn test_validate_auth_wrong_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer wrong-token"),
        );
        let auth_token = Some("test-token-123".to_string());
        assert!(validate_auth(&headers, &auth_token).is_err());
    }

    #[test]
    fn test_validate_auth_disabled() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer test-token"),
        );
        let response = validate_auth(&headers, &None).unwrap_err();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_validate_auth_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        let auth_token = Some("test-token-123".to_string());
        assert!(validate_auth(&headers, &auth_token).is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status_for(&WorkflowError::Join(JoinRejection::Full { capacity: 2 })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&WorkflowError::Join(JoinRejection::NotFound)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&WorkflowError::NotConfigured { what: "x" }),
            StatusCode::PRECONDITION_FAILED
        );
    }

    fn app() -> (Router, Orchestrator) {
        let orchestrator = Orchestrator::new(
            Arc::new(RecordingPlatform::new()),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(SystemClock),
            Timing::default(),
        );
        let state = Arc::new(AppState {
            orchestrator: orchestrator.clone(),
            public_key: SigningKey::from_bytes(&[7u8; 32]).verifying_key(),
            dashboard_auth_token: Some("token".to_string()),
        });
        (dashboard_router().with_state(state), orchestrator)
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, "Bearer token");
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_settings_round_trip_through_api() {
        let (app, orchestrator) = app();
        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                "/api/guilds/5/settings",
                Some(json!({ "review_channel_id": "77" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let settings = orchestrator.guild_settings(GuildId(5)).await.unwrap();
        assert_eq!(settings.review_channel_id, Some(steward_core::ChannelId(77)));
    }

    #[tokio::test]
    async fn test_owner_api_persists() {
        let (app, orchestrator) = app();
        let response = app
            .clone()
            .oneshot(request("PUT", "/api/owners/42", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(orchestrator.owners().await.contains(UserId(42)));
        assert!(orchestrator
            .records()
            .owners()
            .await
            .unwrap()
            .contains(UserId(42)));

        let response = app
            .clone()
            .oneshot(request("DELETE", "/api/owners/42", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("DELETE", "/api/owners/42", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blacklist_requires_report_channel() {
        let (app, _) = app();
        let response = app
            .oneshot(request(
                "POST",
                "/api/guilds/5/blacklist",
                Some(json!({
                    "user_id": "9",
                    "static_id": "S-9",
                    "reason": "spam",
                    "reporter_id": "1"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_missing_muster_is_not_found() {
        let (app, _) = app();
        let response = app
            .oneshot(request(
                "POST",
                "/api/guilds/5/musters/6/members",
                Some(json!({ "user_id": "7" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

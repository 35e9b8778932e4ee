//! JSON API behind the web dashboard.
//!
//! Everything lives under `/api` and requires `Authorization: Bearer <token>`
//! matching `DASHBOARD_AUTH_TOKEN`. Muster membership changes go through the
//! ledger, so capacity and duplicate checks apply exactly as for button
//! presses.

pub mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::AppState;

pub fn dashboard_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/applications", get(handlers::list_all_applications))
        .route(
            "/api/guilds/:guild/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route(
            "/api/guilds/:guild/applications",
            get(handlers::list_guild_applications),
        )
        .route("/api/guilds/:guild/musters", get(handlers::list_musters))
        .route(
            "/api/guilds/:guild/musters/:message/members",
            post(handlers::add_muster_member),
        )
        .route(
            "/api/guilds/:guild/musters/:message/members/:user",
            delete(handlers::remove_muster_member),
        )
        .route(
            "/api/guilds/:guild/blacklist",
            get(handlers::list_blacklist).post(handlers::add_blacklist_entry),
        )
        .route(
            "/api/guilds/:guild/blacklist/:user",
            delete(handlers::remove_blacklist_entry),
        )
        .route("/api/owners", get(handlers::list_owners))
        .route(
            "/api/owners/:user",
            put(handlers::add_owner).delete(handlers::remove_owner),
        )
}

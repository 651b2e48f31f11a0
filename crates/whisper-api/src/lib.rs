pub mod auth;
pub mod chats;
pub mod error;
pub mod friends;

use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use whisper_db::Database;

use crate::auth::AuthService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub auth: AuthService,
}

/// The full REST surface. All endpoints are POST with JSON bodies and
/// answer with a `{success, ...}` envelope.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify", post(auth::verify))
        .route("/forget-password", post(auth::forget_password))
        .route("/change-pfp", post(auth::change_pfp))
        .route("/add-friend", post(friends::add_friend))
        .route("/accept-friend-req", post(friends::accept_friend_req))
        .route("/friends-query", post(friends::friends_query))
        .route("/get-chats", post(chats::get_chats))
        .route("/message-api", post(chats::message_api))
        .with_state(state)
}

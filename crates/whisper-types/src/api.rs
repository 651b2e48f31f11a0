use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatSummary, MessageRecord, UserSummary};

// -- JWT Claims --

/// JWT claims shared between whisper-api (REST) and whisper-gateway
/// (WebSocket Identify handshake). Canonical definition lives here so the
/// two crates never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub bday: String,
    pub pfp: String,
    pub exp: usize,
}

// -- Auth --

/// Required fields are `Option` so a missing field surfaces as the
/// "Important fields missing." validation envelope instead of a body
/// rejection, matching the wire contract clients already depend on.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub secu_key: Option<String>,
    pub bday: Option<String>,
    pub pfp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgetPasswordRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub secu_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePfpRequest {
    pub id: Option<String>,
    #[serde(rename = "newImage")]
    pub new_image: Option<String>,
}

// -- Friends --

#[derive(Debug, Deserialize)]
pub struct FriendActionRequest {
    pub id: Option<String>,
    pub friend_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FriendsQueryRequest {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub search_id: Option<String>,
}

// -- Chats / messages --

#[derive(Debug, Deserialize)]
pub struct GetChatsRequest {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    #[serde(rename = "chatId")]
    pub chat_id: Option<String>,
    pub payload_size: Option<usize>,
}

// -- Response envelopes --
//
// Every REST response carries a `success` flag; failures render through the
// error taxonomy as `{success: false, message}`.

#[derive(Debug, Serialize, Deserialize)]
pub struct OkMessage {
    pub success: bool,
    pub message: String,
}

impl OkMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub success: bool,
    pub message: Vec<UserSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub success: bool,
    pub message: UserSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListResponse {
    pub success: bool,
    pub message: Vec<ChatSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub message: Vec<MessageRecord>,
    /// Total number of messages stored for the chat, independent of the
    /// requested page size.
    pub data_lim: usize,
}

/// Modes accepted by the `/friends-query` endpoint.
pub const MODE_REQUEST_FRIENDS: &str = "REQUEST_FRIENDS";
pub const MODE_SEARCH_USER: &str = "SEARCH_USER";
pub const MODE_REQUEST_FRIEND_REQUESTS: &str = "REQUEST_FRIEND_REQUESTS";

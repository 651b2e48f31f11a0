use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A copy of a user's public display fields, captured at chat-creation or
/// message-send time. Snapshots are not live references: a later profile
/// change does not rewrite them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub user_id: Uuid,
    pub name: String,
    pub pfp: String,
}

/// Public projection of a user record. Password and security-answer hashes
/// never leave the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub pfp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bday: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub members: Vec<MemberSnapshot>,
    pub latest_message: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub body: String,
    pub sent_by: MemberSnapshot,
    pub sent_on: DateTime<Utc>,
}

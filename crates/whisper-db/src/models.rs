/// Database row types — these map directly to SQLite rows.
/// Distinct from the whisper-types API models to keep the DB layer
/// independent. Timestamps are RFC 3339 strings as stored.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub secu_key: String,
    pub bday: String,
    pub pfp: String,
    pub joined: String,
}

pub struct FriendRequestRow {
    pub requester_id: String,
    pub requested_at: String,
}

pub struct ChatRow {
    pub id: String,
    pub latest_message: String,
    pub created_on: String,
}

pub struct ChatMemberRow {
    pub user_id: String,
    pub name: String,
    pub pfp: String,
}

pub struct ChatWithMembers {
    pub chat: ChatRow,
    pub members: Vec<ChatMemberRow>,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub body: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_pfp: String,
    pub sent_on: String,
}

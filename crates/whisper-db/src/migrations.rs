use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            secu_key    TEXT NOT NULL,
            bday        TEXT NOT NULL,
            pfp         TEXT NOT NULL DEFAULT '',
            joined      TEXT NOT NULL
        );

        -- Friendship edges, one row per direction pair. Set semantics via
        -- the UNIQUE constraint.
        CREATE TABLE IF NOT EXISTS friends (
            user_id     TEXT NOT NULL REFERENCES users(id),
            friend_id   TEXT NOT NULL REFERENCES users(id),
            UNIQUE(user_id, friend_id)
        );

        -- Pending incoming requests for user_id. At most one per
        -- (target, requester) pair; the constraint backstops a racing
        -- duplicate send.
        CREATE TABLE IF NOT EXISTS friend_requests (
            user_id         TEXT NOT NULL REFERENCES users(id),
            requester_id    TEXT NOT NULL REFERENCES users(id),
            requested_at    TEXT NOT NULL,
            UNIQUE(user_id, requester_id)
        );

        CREATE TABLE IF NOT EXISTS chats (
            id              TEXT PRIMARY KEY,
            latest_message  TEXT NOT NULL DEFAULT '',
            created_on      TEXT NOT NULL
        );

        -- Member snapshots captured at chat creation. Profile changes do
        -- not rewrite these rows.
        CREATE TABLE IF NOT EXISTS chat_members (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            pfp         TEXT NOT NULL,
            UNIQUE(chat_id, user_id)
        );

        -- A user's chat list. chat_id is deliberately unconstrained; a
        -- dangling entry is skipped on read rather than erroring.
        CREATE TABLE IF NOT EXISTS user_chats (
            user_id     TEXT NOT NULL REFERENCES users(id),
            chat_id     TEXT NOT NULL,
            UNIQUE(user_id, chat_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL,
            body        TEXT NOT NULL,
            sender_id   TEXT NOT NULL,
            sender_name TEXT NOT NULL,
            sender_pfp  TEXT NOT NULL,
            sent_on     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, sent_on);

        CREATE INDEX IF NOT EXISTS idx_friend_requests_user
            ON friend_requests(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

use crate::Database;
use crate::models::{ChatMemberRow, ChatRow, ChatWithMembers, FriendRequestRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

impl Database {
    // -- Users --

    #[allow(clippy::too_many_arguments)]
    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        secu_key_hash: &str,
        bday: &str,
        pfp: &str,
        joined: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, secu_key, bday, pfp, joined)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![id, name, email, password_hash, secu_key_hash, bday, pfp, joined],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2 WHERE id = ?1",
                (id, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn set_pfp(&self, id: &str, pfp: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET pfp = ?2 WHERE id = ?1", (id, pfp))?;
            Ok(())
        })
    }

    // -- Social graph --

    /// True if either direction of the edge exists. The edge is written in
    /// both directions on accept, but a half-written pair still counts.
    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM friends
                    WHERE (user_id = ?1 AND friend_id = ?2)
                       OR (user_id = ?2 AND friend_id = ?1))",
                (a, b),
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    pub fn has_pending_request(&self, target: &str, requester: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM friend_requests
                    WHERE user_id = ?1 AND requester_id = ?2)",
                (target, requester),
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    /// Returns false when the (target, requester) pair already has a pending
    /// entry — the UNIQUE constraint absorbs a racing duplicate send.
    pub fn insert_friend_request(
        &self,
        target: &str,
        requester: &str,
        requested_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO friend_requests (user_id, requester_id, requested_at)
                 VALUES (?1, ?2, ?3)",
                (target, requester, requested_at),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn pending_requests(&self, target: &str) -> Result<Vec<FriendRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT requester_id, requested_at FROM friend_requests
                 WHERE user_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([target], |row| {
                    Ok(FriendRequestRow {
                        requester_id: row.get(0)?,
                        requested_at: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn friends_of(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT friend_id FROM friends WHERE user_id = ?1 ORDER BY rowid")?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Accept a pending friend request. One transaction covers the whole
    /// sequence: mutual friend edges, request removal, chat creation with
    /// member snapshots, and both users' chat lists. Retrying after a
    /// failure converges on the same terminal state — existing edges are
    /// ignored and an existing chat for the pair is reused, so exactly one
    /// chat ever exists per friendship.
    ///
    /// Returns `None` when either user is absent.
    pub fn accept_friend_request(
        &self,
        accepter_id: &str,
        requester_id: &str,
        chat_id: &str,
        now: &str,
    ) -> Result<Option<ChatWithMembers>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let accepter = match query_user(&tx, "id", accepter_id)? {
                Some(u) => u,
                None => return Ok(None),
            };
            let requester = match query_user(&tx, "id", requester_id)? {
                Some(u) => u,
                None => return Ok(None),
            };

            tx.execute(
                "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
                (accepter_id, requester_id),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
                (requester_id, accepter_id),
            )?;

            tx.execute(
                "DELETE FROM friend_requests WHERE user_id = ?1 AND requester_id = ?2",
                (accepter_id, requester_id),
            )?;

            // Reuse a chat the pair already shares (idempotent retry path).
            let existing = tx
                .query_row(
                    "SELECT c.id, c.latest_message, c.created_on
                     FROM chats c
                     JOIN chat_members a ON a.chat_id = c.id AND a.user_id = ?1
                     JOIN chat_members b ON b.chat_id = c.id AND b.user_id = ?2",
                    (accepter_id, requester_id),
                    |row| {
                        Ok(ChatRow {
                            id: row.get(0)?,
                            latest_message: row.get(1)?,
                            created_on: row.get(2)?,
                        })
                    },
                )
                .optional()?;

            let chat = match existing {
                Some(chat) => chat,
                None => {
                    tx.execute(
                        "INSERT INTO chats (id, latest_message, created_on) VALUES (?1, '', ?2)",
                        (chat_id, now),
                    )?;
                    tx.execute(
                        "INSERT INTO chat_members (chat_id, user_id, name, pfp) VALUES (?1, ?2, ?3, ?4)",
                        (chat_id, accepter_id, &accepter.name, &accepter.pfp),
                    )?;
                    tx.execute(
                        "INSERT INTO chat_members (chat_id, user_id, name, pfp) VALUES (?1, ?2, ?3, ?4)",
                        (chat_id, requester_id, &requester.name, &requester.pfp),
                    )?;
                    ChatRow {
                        id: chat_id.to_string(),
                        latest_message: String::new(),
                        created_on: now.to_string(),
                    }
                }
            };

            tx.execute(
                "INSERT OR IGNORE INTO user_chats (user_id, chat_id) VALUES (?1, ?2)",
                (accepter_id, &chat.id),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO user_chats (user_id, chat_id) VALUES (?1, ?2)",
                (requester_id, &chat.id),
            )?;

            let members = query_chat_members(&tx, &chat.id)?;
            tx.commit()?;

            Ok(Some(ChatWithMembers { chat, members }))
        })
    }

    // -- Chats --

    /// Resolve the user's chat list to summaries. A dangling chat id simply
    /// drops out of the join — soft inconsistency is tolerated on read.
    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatWithMembers>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.latest_message, c.created_on
                 FROM user_chats uc
                 JOIN chats c ON c.id = uc.chat_id
                 WHERE uc.user_id = ?1
                 ORDER BY uc.rowid",
            )?;
            let chats = stmt
                .query_map([user_id], |row| {
                    Ok(ChatRow {
                        id: row.get(0)?,
                        latest_message: row.get(1)?,
                        created_on: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(chats.len());
            for chat in chats {
                let members = query_chat_members(conn, &chat.id)?;
                out.push(ChatWithMembers { chat, members });
            }
            Ok(out)
        })
    }

    pub fn chat_has_member(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM chat_members WHERE chat_id = ?1 AND user_id = ?2)",
                (chat_id, user_id),
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    // -- Messages --

    /// Persist a message, then refresh the owning chat's latest-message
    /// cache. The two writes are logically one operation, but a failed
    /// cache update leaves the message durable with a stale cache rather
    /// than failing the send.
    pub fn append_message(&self, msg: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, body, sender_id, sender_name, sender_pfp, sent_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.chat_id,
                    msg.body,
                    msg.sender_id,
                    msg.sender_name,
                    msg.sender_pfp,
                    msg.sent_on
                ],
            )?;
            Ok(())
        })?;

        let cache = self.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET latest_message = ?2 WHERE id = ?1",
                (&msg.chat_id, &msg.body),
            )?;
            Ok(())
        });
        if let Err(e) = cache {
            warn!(
                "latest_message cache update failed for chat {}: {}",
                msg.chat_id, e
            );
        }

        Ok(())
    }

    /// The most recent `page_size` messages in ascending order, plus the
    /// total count for the chat. Bounded reverse query, then flipped back
    /// to chronological — ties fall back to insertion order via rowid.
    pub fn history_page(&self, chat_id: &str, page_size: usize) -> Result<(Vec<MessageRow>, usize)> {
        self.with_conn(|conn| {
            let total: usize = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, chat_id, body, sender_id, sender_name, sender_pfp, sent_on
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY sent_on DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt
                .query_map(rusqlite::params![chat_id, page_size as i64], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        body: row.get(2)?,
                        sender_id: row.get(3)?,
                        sender_name: row.get(4)?,
                        sender_pfp: row.get(5)?,
                        sent_on: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok((rows, total))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a compile-time constant ("id" / "email"), never user input.
    let sql = format!(
        "SELECT id, name, email, password, secu_key, bday, pfp, joined FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                secu_key: row.get(4)?,
                bday: row.get(5)?,
                pfp: row.get(6)?,
                joined: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_chat_members(conn: &Connection, chat_id: &str) -> Result<Vec<ChatMemberRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, name, pfp FROM chat_members WHERE chat_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([chat_id], |row| {
            Ok(ChatMemberRow {
                user_id: row.get(0)?,
                name: row.get(1)?,
                pfp: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use whisper_db::models::{ChatWithMembers, MessageRow};
use whisper_types::api::{ChatListResponse, GetChatsRequest, HistoryRequest, HistoryResponse};
use whisper_types::models::{ChatSummary, MemberSnapshot, MessageRecord};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

pub async fn get_chats(
    State(state): State<AppState>,
    Json(req): Json<GetChatsRequest>,
) -> ApiResult<Json<ChatListResponse>> {
    let Some(id) = req.id else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    if state.db.get_user_by_id(&id)?.is_none() {
        return Err(ApiError::NotFound("No chats.".into()));
    }

    let rows = tokio::task::spawn_blocking({
        let state = state.clone();
        move || state.db.chats_for_user(&id)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let chats = rows.iter().filter_map(chat_summary).collect();

    Ok(Json(ChatListResponse {
        success: true,
        message: chats,
    }))
}

/// The most recent `payload_size` messages in chronological order, plus the
/// total count for the chat (`data_lim`).
pub async fn message_api(
    State(state): State<AppState>,
    Json(req): Json<HistoryRequest>,
) -> ApiResult<Json<HistoryResponse>> {
    let (Some(chat_id), Some(payload_size)) = (req.chat_id, req.payload_size) else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    let (rows, total) = tokio::task::spawn_blocking({
        let state = state.clone();
        move || state.db.history_page(&chat_id, payload_size)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let messages = rows.iter().filter_map(message_record).collect();

    Ok(Json(HistoryResponse {
        success: true,
        message: messages,
        data_lim: total,
    }))
}

fn chat_summary(row: &ChatWithMembers) -> Option<ChatSummary> {
    let id: Uuid = match row.chat.id.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!("corrupt chat id '{}': {}", row.chat.id, e);
            return None;
        }
    };

    let members = row
        .members
        .iter()
        .filter_map(|m| {
            let user_id = m
                .user_id
                .parse()
                .map_err(|e| warn!("corrupt member id '{}' in chat '{}': {}", m.user_id, row.chat.id, e))
                .ok()?;
            Some(MemberSnapshot {
                user_id,
                name: m.name.clone(),
                pfp: m.pfp.clone(),
            })
        })
        .collect();

    Some(ChatSummary {
        id,
        members,
        latest_message: row.chat.latest_message.clone(),
        created_on: parse_timestamp(&row.chat.created_on, &row.chat.id),
    })
}

fn message_record(row: &MessageRow) -> Option<MessageRecord> {
    let id: Uuid = match row.id.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!("corrupt message id '{}': {}", row.id, e);
            return None;
        }
    };
    let chat_id: Uuid = match row.chat_id.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!("corrupt chat id '{}' on message '{}': {}", row.chat_id, row.id, e);
            return None;
        }
    };
    let sender_id: Uuid = match row.sender_id.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!("corrupt sender id '{}' on message '{}': {}", row.sender_id, row.id, e);
            return None;
        }
    };

    Some(MessageRecord {
        id,
        chat_id,
        body: row.body.clone(),
        sent_by: MemberSnapshot {
            user_id: sender_id,
            name: row.sender_name.clone(),
            pfp: row.sender_pfp.clone(),
        },
        sent_on: parse_timestamp(&row.sent_on, &row.id),
    })
}

fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("corrupt timestamp '{}' on '{}': {}", raw, context, e);
        DateTime::default()
    })
}

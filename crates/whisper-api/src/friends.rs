use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use tracing::warn;
use uuid::Uuid;

use whisper_db::models::UserRow;
use whisper_types::api::{
    FriendActionRequest, FriendsQueryRequest, MODE_REQUEST_FRIEND_REQUESTS, MODE_REQUEST_FRIENDS,
    MODE_SEARCH_USER, OkMessage, UserListResponse, UserResponse,
};
use whisper_types::models::UserSummary;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Send a friend request. Check order is part of the wire contract:
/// missing target, then existing friendship (either direction), then an
/// already-pending request. The checks are advisory; the UNIQUE constraint
/// on the insert backstops a racing duplicate.
pub async fn add_friend(
    State(state): State<AppState>,
    Json(req): Json<FriendActionRequest>,
) -> ApiResult<Json<OkMessage>> {
    let (Some(id), Some(friend_id)) = (req.id, req.friend_id) else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    if state.db.get_user_by_id(&friend_id)?.is_none() {
        return Err(ApiError::NotFound("User doesn't exist.".into()));
    }

    if state.db.are_friends(&id, &friend_id)? {
        return Err(ApiError::Conflict(
            "You're already friends with this user.".into(),
        ));
    }

    if state.db.has_pending_request(&friend_id, &id)? {
        return Err(ApiError::Conflict("Friend request already sent.".into()));
    }

    let now = chrono::Utc::now().to_rfc3339();
    if !state.db.insert_friend_request(&friend_id, &id, &now)? {
        // Lost the race to an identical request.
        return Err(ApiError::Conflict("Friend request already sent.".into()));
    }

    Ok(Json(OkMessage::new("Friend request sent.")))
}

/// Accept a pending request from `friend_id`. The store runs the whole
/// sequence — mutual edges, request removal, chat creation, chat lists —
/// as one transaction, so there is no partial state to reconcile.
pub async fn accept_friend_req(
    State(state): State<AppState>,
    Json(req): Json<FriendActionRequest>,
) -> ApiResult<Json<OkMessage>> {
    let (Some(id), Some(friend_id)) = (req.id, req.friend_id) else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    let chat_id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();

    let accepted = tokio::task::spawn_blocking({
        let state = state.clone();
        move || {
            state
                .db
                .accept_friend_request(&id, &friend_id, &chat_id.to_string(), &now)
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    if accepted.is_none() {
        return Err(ApiError::NotFound("User doesn't exist.".into()));
    }

    Ok(Json(OkMessage::new("Friend request accepted.")))
}

pub async fn friends_query(
    State(state): State<AppState>,
    Json(req): Json<FriendsQueryRequest>,
) -> ApiResult<Response> {
    let (Some(id), Some(mode)) = (req.id, req.mode) else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    match mode.as_str() {
        MODE_REQUEST_FRIENDS => {
            if state.db.get_user_by_id(&id)?.is_none() {
                return Err(ApiError::NotFound("User doesn't exist.".into()));
            }

            let mut friends = Vec::new();
            for friend_id in state.db.friends_of(&id)? {
                match state.db.get_user_by_id(&friend_id)? {
                    Some(user) => {
                        if let Some(summary) = summarize(&user, false) {
                            friends.push(summary);
                        }
                    }
                    None => warn!("friend {} of {} no longer exists", friend_id, id),
                }
            }

            Ok(Json(UserListResponse {
                success: true,
                message: friends,
            })
            .into_response())
        }

        MODE_SEARCH_USER => {
            let Some(search_id) = req.search_id else {
                return Err(ApiError::Validation("No ID provided.".into()));
            };
            if search_id.parse::<Uuid>().is_err() {
                return Err(ApiError::Validation("Invalid user ID.".into()));
            }

            let user = state
                .db
                .get_user_by_id(&search_id)?
                .ok_or_else(|| ApiError::NotFound("User not found.".into()))?;
            let summary = summarize(&user, true)
                .ok_or_else(|| anyhow::anyhow!("corrupt user id '{}'", user.id))?;

            Ok(Json(UserResponse {
                success: true,
                message: summary,
            })
            .into_response())
        }

        MODE_REQUEST_FRIEND_REQUESTS => {
            if state.db.get_user_by_id(&id)?.is_none() {
                return Err(ApiError::NotFound("User not found.".into()));
            }

            let mut requesters = Vec::new();
            for pending in state.db.pending_requests(&id)? {
                match state.db.get_user_by_id(&pending.requester_id)? {
                    Some(user) => {
                        if let Some(summary) = summarize(&user, false) {
                            requesters.push(summary);
                        }
                    }
                    None => warn!(
                        "requester {} for {} no longer exists",
                        pending.requester_id, id
                    ),
                }
            }

            Ok(Json(UserListResponse {
                success: true,
                message: requesters,
            })
            .into_response())
        }

        _ => Err(ApiError::Validation("Invalid mode.".into())),
    }
}

/// Public projection — hashes never leave the store. Birthdate only rides
/// along on a direct lookup.
fn summarize(user: &UserRow, with_bday: bool) -> Option<UserSummary> {
    let id: Uuid = match user.id.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!("corrupt user id '{}': {}", user.id, e);
            return None;
        }
    };
    Some(UserSummary {
        id,
        name: user.name.clone(),
        pfp: user.pfp.clone(),
        bday: with_bday.then(|| user.bday.clone()),
    })
}

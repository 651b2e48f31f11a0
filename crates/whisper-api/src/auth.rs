use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Json, http::HeaderMap};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use whisper_db::models::UserRow;
use whisper_types::api::{
    ChangePfpRequest, Claims, ForgetPasswordRequest, LoginRequest, OkMessage, RegisterRequest,
    TokenResponse,
};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Credential hashing and token issuance, consumed as an opaque capability.
/// Handlers never look at hashing parameters or token internals.
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Argon2id with a fresh random salt. Used for both passwords and
    /// security answers.
    pub fn hash(&self, secret: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow!("hashing failed: {}", e))
    }

    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(secret.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub fn mint_token(&self, claims: &Claims) -> anyhow::Result<String> {
        let token = encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .ok()
    }
}

/// Token claims are the user's public profile at mint time.
pub fn claims_for(user: &UserRow) -> anyhow::Result<Claims> {
    let sub: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow!("corrupt user id '{}': {}", user.id, e))?;
    Ok(Claims {
        sub,
        name: user.name.clone(),
        bday: user.bday.clone(),
        pfp: user.pfp.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<OkMessage>> {
    let (Some(name), Some(email), Some(password), Some(secu_key), Some(bday)) =
        (req.name, req.email, req.password, req.secu_key, req.bday)
    else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict("Email in-use.".into()));
    }

    let password_hash = state.auth.hash(&password)?;
    let secu_key_hash = state.auth.hash(&secu_key)?;

    let user_id = Uuid::new_v4();
    let joined = chrono::Utc::now().to_rfc3339();
    state.db.create_user(
        &user_id.to_string(),
        &name,
        &email,
        &password_hash,
        &secu_key_hash,
        &bday,
        req.pfp.as_deref().unwrap_or(""),
        &joined,
    )?;

    Ok(Json(OkMessage::new(format!("{} has been registered!", name))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or_else(|| ApiError::NotFound("User doesn't exist.".into()))?;

    if !state.auth.verify(&password, &user.password) {
        return Err(ApiError::Auth("Wrong password!".into()));
    }

    let token = state.auth.mint_token(&claims_for(&user)?)?;
    Ok(Json(TokenResponse {
        success: true,
        token,
    }))
}

/// Decode the token from the Authorization header. Answers with the decoded
/// claims, or the JSON literal `false` on any failure — never an error
/// envelope, so clients can probe a stored token cheaply.
pub async fn verify(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match token.and_then(|t| state.auth.verify_token(t)) {
        Some(claims) => Json(claims).into_response(),
        None => Json(false).into_response(),
    }
}

pub async fn forget_password(
    State(state): State<AppState>,
    Json(req): Json<ForgetPasswordRequest>,
) -> ApiResult<Json<OkMessage>> {
    let (Some(email), Some(password), Some(secu_key)) = (req.email, req.password, req.secu_key)
    else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or_else(|| ApiError::NotFound("User doesn't exist!".into()))?;

    if !state.auth.verify(&secu_key, &user.secu_key) {
        return Err(ApiError::Auth("Wrong Secu-Key®.".into()));
    }

    let password_hash = state.auth.hash(&password)?;
    state.db.set_password(&user.id, &password_hash)?;

    Ok(Json(OkMessage::new("Password successfully changed.")))
}

pub async fn change_pfp(
    State(state): State<AppState>,
    Json(req): Json<ChangePfpRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let Some(id) = req.id else {
        return Err(ApiError::Validation("Important fields missing.".into()));
    };

    let user = state
        .db
        .get_user_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound("User doesn't exist.".into()))?;

    state
        .db
        .set_pfp(&user.id, req.new_image.as_deref().unwrap_or(""))?;

    // Mint from the updated profile so the client's token reflects the
    // new image immediately.
    let updated = state
        .db
        .get_user_by_id(&user.id)?
        .ok_or_else(|| ApiError::NotFound("User doesn't exist.".into()))?;
    let token = state.auth.mint_token(&claims_for(&updated)?)?;

    Ok(Json(TokenResponse {
        success: true,
        token,
    }))
}

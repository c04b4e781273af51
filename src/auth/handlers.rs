use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, AvatarResponse, ForgotPasswordRequest, LoginRequest, PublicUser,
            RegisterRequest, ResetPasswordRequest, UpdateProfileRequest,
        },
        repo_types::User,
        services::{
            hash_password, is_valid_email, validate_new_password, validate_profile_update,
            validate_registration, verify_password, AuthUser, JwtKeys,
        },
    },
    error::{AppError, FieldError},
    images,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).put(update_me))
        .route("/me/avatar", post(upload_avatar).get(get_avatar))
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024)) // 5MB
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.username = payload.username.trim().to_string();
    validate_registration(&payload)?;

    // Username and email must both be free
    if User::find_by_username(&state.db, &payload.username)
        .await?
        .is_some()
    {
        warn!(username = %payload.username, "username already taken");
        return Err(AppError::Conflict("username already taken".into()));
    }
    if User::find_by_email(&state.db, &payload.email)
        .await?
        .is_some()
    {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.username, &payload.email, &hash).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_session(user.id, false)?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            AppError::Unauthorized("invalid credentials".into())
        })?;

    if !verify_password(&payload.password, &user.password_hash) {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_session(user.id, payload.remember)?;

    info!(user_id = %user.id, remember = payload.remember, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

/// Sessions are stateless tokens; logout acknowledges and the client
/// discards its copy.
#[instrument(skip_all)]
pub async fn logout(AuthUser(user_id): AuthUser) -> StatusCode {
    info!(user_id = %user_id, "user logged out");
    StatusCode::NO_CONTENT
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(mut payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, AppError> {
    payload.email = payload.email.map(|e| e.trim().to_lowercase());
    payload.username = payload.username.map(|u| u.trim().to_string());
    validate_profile_update(&payload)?;

    let current = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;

    // Username and email update independently; availability is only
    // checked for a field that actually changes.
    let username = payload.username.unwrap_or_else(|| current.username.clone());
    let email = payload.email.unwrap_or_else(|| current.email.clone());

    if username != current.username
        && User::find_by_username(&state.db, &username).await?.is_some()
    {
        return Err(AppError::Conflict("username already taken".into()));
    }
    if email != current.email && User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict("email already registered".into()));
    }

    let user = User::update_profile(&state.db, user_id, &username, &email).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(Json(PublicUser::from(&user)))
}

/// POST /me/avatar (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<AvatarResponse>, AppError> {
    let mut upload = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(vec![FieldError::new("file", e.to_string())]))?;
            upload = Some((data, content_type));
            break;
        }
    }
    let Some((bytes, content_type)) = upload else {
        return Err(AppError::Validation(vec![FieldError::new(
            "file",
            "multipart field 'file' is required",
        )]));
    };
    if images::ext_from_mime(&content_type).is_none() {
        return Err(AppError::Validation(vec![FieldError::new(
            "file",
            "unsupported image type; expected jpeg, png or webp",
        )]));
    }

    let current = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;

    let key = images::store_avatar(&state, user_id, bytes, &content_type).await?;
    User::set_avatar(&state.db, user_id, &key).await?;

    // Best-effort cleanup of the replaced object
    if let Some(old_key) = current.avatar_key {
        let storage = state.storage.clone();
        tokio::spawn(async move {
            if let Err(e) = storage.delete_object(&old_key).await {
                warn!(error = %e, %old_key, "failed to delete previous avatar");
            }
        });
    }

    let avatar_url = images::presign_avatar(&state, &key).await?;
    info!(user_id = %user_id, %key, "avatar updated");
    Ok(Json(AvatarResponse { avatar_url }))
}

/// 302 → presigned url of the caller's profile picture
#[instrument(skip(state))]
pub async fn get_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Redirect, AppError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;
    let key = user
        .avatar_key
        .ok_or_else(|| AppError::NotFound("no profile picture set".into()))?;
    let url = images::presign_avatar(&state, &key).await?;
    Ok(Redirect::temporary(&url))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        return Err(AppError::Validation(vec![FieldError::new(
            "email",
            "not a valid email address",
        )]));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| AppError::NotFound("no account with that email".into()))?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_reset(user.id)?;

    let link = format!(
        "{}/reset-password?token={}",
        state.config.public_base_url.trim_end_matches('/'),
        token
    );
    let body = format!(
        "To reset your password, visit the following link:\n\n{link}\n\n\
         The link is valid for {} minutes. If you did not make this request, \
         you can ignore this email.",
        state.config.jwt.reset_ttl_minutes
    );

    // Fire-and-forget: a failed send is logged, the issued token stays valid.
    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer
            .send(&recipient, "Password reset request", &body)
            .await
        {
            warn!(error = %e, "reset email send failed");
        }
    });

    info!(user_id = %user.id, "password reset requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "a password reset email has been sent" })),
    ))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_reset(&payload.token).map_err(|e| {
        warn!(error = %e, "reset token rejected");
        AppError::Token("invalid or expired reset token; request a new link".into())
    })?;

    // The token must still resolve to a live account
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| {
            AppError::Token("invalid or expired reset token; request a new link".into())
        })?;

    validate_new_password(&payload.new_password)?;
    let hash = hash_password(&payload.new_password)?;
    User::set_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password reset completed");
    Ok(StatusCode::NO_CONTENT)
}

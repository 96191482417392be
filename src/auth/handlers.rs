use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, ForgotRequest, LoginRequest, PublicUser, ResetRequest,
            SignupRequest,
        },
        error::AuthError,
        extractors::CurrentUser,
        repo::StoreError,
        repo_types::User,
        services::{is_valid_email, normalize_email},
    },
    middleware::cookie,
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;

type Rejection = (StatusCode, String);
type SetCookie = [(HeaderName, String); 1];

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/forgot", post(forgot))
        .route("/reset", post(reset))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_me).delete(delete_me))
        .route("/me/password", put(change_password))
}

fn set_remember(state: &AppState, user: &User) -> SetCookie {
    [(
        header::SET_COOKIE,
        cookie::remember(&user.remember, state.config.production),
    )]
}

fn clear_remember(state: &AppState) -> SetCookie {
    [(header::SET_COOKIE, cookie::clear(state.config.production))]
}

/// Map an `AuthError` to a response, logging faults but not expected misses.
fn reject(e: AuthError) -> Rejection {
    if e.is_expected() {
        warn!(error = %e, "auth request rejected");
    } else {
        error!(error = %e, "auth operation failed");
    }
    let message = match &e {
        AuthError::NotFound | AuthError::InvalidCredentials => "Invalid credentials",
        AuthError::InvalidId => "Invalid ID",
        AuthError::InvalidToken => "Invalid or expired reset token",
        AuthError::Persistence(StoreError::Conflict(_)) => "Email already registered",
        _ => "Internal server error",
    };
    (e.status_code(), message.into())
}

/// Length rule in characters, not bytes.
fn check_password(password: &str) -> Result<(), Rejection> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, SetCookie, Json<PublicUser>), Rejection> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    check_password(&payload.password)?;

    let user = state
        .users
        .create(User::new(payload.name.trim(), email, payload.password))
        .await
        .map_err(reject)?;

    info!(user_id = user.id(), email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        set_remember(&state, &user),
        Json(PublicUser::from(&user)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(SetCookie, Json<PublicUser>), Rejection> {
    let user = state
        .users
        .authenticate(&payload.email, &payload.password)
        .await
        .map_err(reject)?;
    let user = state.users.sign_in(user).await.map_err(reject)?;

    info!(user_id = user.id(), "user logged in");
    Ok((set_remember(&state, &user), Json(PublicUser::from(&user))))
}

/// The cookie is cleared even when rotating the stored token fails.
#[instrument(skip(state, user), fields(user_id = user.id()))]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> (StatusCode, SetCookie, String) {
    match state.users.sign_out(user).await {
        Ok(()) => {
            info!("user logged out");
            (StatusCode::NO_CONTENT, clear_remember(&state), String::new())
        }
        Err(e) => {
            let (status, message) = reject(e);
            (status, clear_remember(&state), message)
        }
    }
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip(state, user, payload), fields(user_id = user.id()))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<(StatusCode, SetCookie), Rejection> {
    check_password(&payload.new_password)?;
    let user = state
        .users
        .change_password(&user, &payload.current_password, &payload.new_password)
        .await
        .map_err(reject)?;
    info!("password changed");
    Ok((StatusCode::NO_CONTENT, set_remember(&state, &user)))
}

#[instrument(skip(state, user), fields(user_id = user.id()))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, SetCookie), Rejection> {
    state.users.delete(user.id()).await.map_err(reject)?;
    Ok((StatusCode::NO_CONTENT, clear_remember(&state)))
}

/// Always `202` for a well-formed email so accounts cannot be probed.
#[instrument(skip(state, payload))]
pub async fn forgot(
    State(state): State<AppState>,
    Json(payload): Json<ForgotRequest>,
) -> Result<StatusCode, Rejection> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    match state.resets.initiate_reset(&email).await {
        Ok(()) | Err(AuthError::NotFound) => Ok(StatusCode::ACCEPTED),
        Err(e) => Err(reject(e)),
    }
}

#[instrument(skip(state, payload))]
pub async fn reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> Result<(SetCookie, Json<PublicUser>), Rejection> {
    check_password(&payload.password)?;
    let user = state
        .resets
        .complete_reset(&payload.token, &payload.password)
        .await
        .map_err(reject)?;
    Ok((set_remember(&state, &user), Json(PublicUser::from(&user))))
}

/// Authentication routes: registration, login, refresh rotation, logout,
/// and the authenticated profile/session endpoints.
///
/// The refresh token travels in a scoped HttpOnly cookie restricted to the
/// rotation endpoint; handlers translate `SessionService` results into HTTP
/// shapes and never touch the stores directly.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::Claims;
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, RefreshError};
use crate::session::SessionService;
use crate::store::{CredentialRecord, RefreshTokenRecord};

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
/// The cookie never leaves the rotation endpoint's path.
pub const REFRESH_COOKIE_PATH: &str = "/auth/refresh";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public profile; the password hash never leaves the service.
#[derive(Serialize)]
pub struct UserResponse {
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: String,
    pub is_active: bool,
}

impl From<CredentialRecord> for UserResponse {
    fn from(record: CredentialRecord) -> Self {
        Self {
            email: record.email,
            display_name: record.display_name,
            created_at: record.created_at.to_rfc3339(),
            is_active: record.is_active,
        }
    }
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Rotation response: the successor refresh token travels only in the
/// replaced cookie, never in the body.
#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// One live session; metadata only, never token material.
#[derive(Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub created_at: String,
    pub expires_at: String,
    pub user_agent: Option<String>,
}

impl From<RefreshTokenRecord> for SessionResponse {
    fn from(record: RefreshTokenRecord) -> Self {
        Self {
            id: record.id.to_string(),
            created_at: record.created_at.to_rfc3339(),
            expires_at: record.expires_at.to_rfc3339(),
            user_agent: record.user_agent,
        }
    }
}

fn refresh_cookie(value: &str, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE_NAME, value.to_string())
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

/// Expired empty cookie that overwrites the rotation cookie client-side.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE_NAME, "")
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}

fn user_agent_of(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid email, display name, or password policy violation
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    service: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let record = service
        .register(&form.email, &form.password, form.display_name.as_deref())
        .await?;

    Ok(HttpResponse::Created().json(UserResponse::from(record)))
}

/// POST /auth/login
///
/// Issues an access token in the body and the refresh token both in the
/// body and in the scoped rotation cookie.
///
/// # Errors
/// - 400: malformed email or oversized password
/// - 401: unknown account or wrong password (indistinguishable)
/// - 403: account inactive
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    service: web::Data<SessionService>,
    app: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let issued = service
        .login(&form.email, &form.password, user_agent_of(&req))
        .await?;

    let cookie = refresh_cookie(
        &issued.refresh_token,
        issued.refresh_expires_in,
        app.cookie_secure(),
    );

    Ok(HttpResponse::Ok().cookie(cookie).json(TokenResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        token_type: "bearer".to_string(),
        expires_in: issued.expires_in,
    }))
}

/// POST /auth/refresh
///
/// Rotates the refresh token presented in the cookie. Every rejection
/// clears the cookie (see `AppError::error_response`).
///
/// # Errors
/// - 401: missing, unknown, revoked, or expired refresh token
pub async fn refresh(
    req: HttpRequest,
    service: web::Data<SessionService>,
    app: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let presented = req
        .cookie(REFRESH_COOKIE_NAME)
        .ok_or(AppError::Refresh(RefreshError::Missing))?;

    let issued = service
        .refresh(presented.value(), user_agent_of(&req))
        .await?;

    let cookie = refresh_cookie(
        &issued.refresh_token,
        issued.refresh_expires_in,
        app.cookie_secure(),
    );

    Ok(HttpResponse::Ok().cookie(cookie).json(RefreshResponse {
        access_token: issued.access_token,
        token_type: "bearer".to_string(),
    }))
}

/// POST /auth/logout
///
/// Always 200: once this returns, no valid session remains for the
/// presented token, whether or not one existed.
pub async fn logout(req: HttpRequest, service: web::Data<SessionService>) -> HttpResponse {
    let presented = req.cookie(REFRESH_COOKIE_NAME);
    service
        .logout(presented.as_ref().map(|c| c.value()))
        .await;

    HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(MessageResponse {
            message: "Logged out successfully".to_string(),
        })
}

/// GET /auth/me — requires a Bearer access token.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    service: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = service.profile(claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// GET /auth/sessions — live sessions for the authenticated principal.
pub async fn list_sessions(
    claims: web::ReqData<Claims>,
    service: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let sessions = service.sessions(claims.user_id()?).await?;
    let body: Vec<SessionResponse> = sessions.into_iter().map(SessionResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

// src/utils/guard.rs

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::user::{IdentityClaim, SessionRow, User},
    state::AppState,
    store::{Filter, RemoteStore, StoreError, Table, decode},
};

/// Header carrying the client's cached identity claim (JSON).
pub const IDENTITY_HEADER: &str = "x-auth-user";

/// What the client holds locally: an identity claim and an opaque session token.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentity {
    pub claim: Option<IdentityClaim>,
    pub token: Option<String>,
}

impl LocalIdentity {
    pub fn new(claim: Option<IdentityClaim>, token: Option<String>) -> Self {
        Self { claim, token }
    }

    /// Reads `Authorization: Bearer <token>` and the identity header.
    /// An unreadable claim is treated as missing.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let claim = headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| serde_json::from_str(raw).ok());

        Self { claim, token }
    }

    pub fn clear(&mut self) {
        self.claim = None;
        self.token = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Student,
    Admin,
}

#[derive(Debug, Clone)]
pub enum GuardOutcome {
    /// No valid session: send the user to the login page.
    Unauthenticated,
    /// Valid session without the admin flag: send the user home.
    Forbidden(User),
    Authorized(User),
}

/// Resolves the caller's session against the store.
///
/// Fails closed: any missing, expired or mismatched piece yields
/// `Unauthenticated`. On success the local claim is overwritten with the
/// server's copy of the user.
pub async fn check_session(
    store: &dyn RemoteStore,
    identity: &mut LocalIdentity,
    access: Access,
    now: DateTime<Utc>,
) -> GuardOutcome {
    match resolve(store, identity, now).await {
        Ok(Some(user)) => {
            identity.claim = Some(IdentityClaim::from(&user));
            if access == Access::Admin && !user.is_admin {
                GuardOutcome::Forbidden(user)
            } else {
                GuardOutcome::Authorized(user)
            }
        }
        Ok(None) => {
            identity.clear();
            GuardOutcome::Unauthenticated
        }
        Err(e) => {
            tracing::warn!("Session check failed, denying access: {}", e);
            GuardOutcome::Unauthenticated
        }
    }
}

async fn resolve(
    store: &dyn RemoteStore,
    identity: &LocalIdentity,
    now: DateTime<Utc>,
) -> Result<Option<User>, StoreError> {
    let (Some(claim), Some(token)) = (&identity.claim, &identity.token) else {
        return Ok(None);
    };

    let Some(row) = store
        .select_one(Table::Sessions, &Filter::new().eq("token", token.as_str()))
        .await?
    else {
        tracing::debug!("Unknown session token");
        return Ok(None);
    };
    let session: SessionRow = decode(Table::Sessions, row)?;
    if session.expires_at <= now {
        tracing::debug!("Session {} expired at {}", session.id, session.expires_at);
        return Ok(None);
    }

    let Some(row) = store
        .select_one(Table::Users, &Filter::new().eq("id", claim.user_id.to_string()))
        .await?
    else {
        return Ok(None);
    };
    let user: User = decode(Table::Users, row)?;
    if user.id != session.user_id {
        tracing::warn!(
            "Session token bound to {} presented with claim for {}",
            session.user_id,
            user.id
        );
        return Ok(None);
    }

    Ok(Some(user))
}

/// Creates a server-side session for `user` and returns its token.
pub async fn open_session(
    store: &dyn RemoteStore,
    user: &User,
    ttl_secs: i64,
) -> Result<String, StoreError> {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let expires_at = Utc::now() + Duration::seconds(ttl_secs);
    let row = json!({
        "user_id": user.id.to_string(),
        "token": token,
        "expires_at": expires_at.to_rfc3339(),
    });
    if let serde_json::Value::Object(row) = row {
        store.insert(Table::Sessions, row).await?;
    }
    tracing::info!("Opened session for {}", user.register_no);
    Ok(token)
}

/// The authorized caller, injected into request extensions by the middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn redirect(status: StatusCode, message: &str, target: &str) -> Response {
    (
        status,
        Json(json!({ "error": message, "redirect": target })),
    )
        .into_response()
}

async fn guarded(state: AppState, access: Access, mut req: Request<Body>, next: Next) -> Response {
    let mut identity = LocalIdentity::from_headers(req.headers());

    match check_session(state.store.as_ref(), &mut identity, access, Utc::now()).await {
        GuardOutcome::Unauthenticated => {
            redirect(StatusCode::UNAUTHORIZED, "Not logged in", "/login")
        }
        GuardOutcome::Forbidden(_) => {
            redirect(StatusCode::FORBIDDEN, "Administrator access required", "/home")
        }
        GuardOutcome::Authorized(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            let mut response = next.run(req).await;
            if let Some(claim) = identity.claim {
                // Refreshed claim for the client to store; skipped if not header-safe.
                if let Some(value) = serde_json::to_string(&claim)
                    .ok()
                    .and_then(|raw| HeaderValue::from_str(&raw).ok())
                {
                    response.headers_mut().insert(IDENTITY_HEADER, value);
                }
            }
            response
        }
    }
}

/// Axum Middleware: Authentication.
///
/// Rejects with 401 (redirect `/login`) unless the caller holds a live session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    guarded(state, Access::Student, req, next).await
}

/// Axum Middleware: Admin Authorization.
///
/// Same as `auth_middleware`, plus 403 (redirect `/home`) for non-admins.
pub async fn admin_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    guarded(state, Access::Admin, req, next).await
}

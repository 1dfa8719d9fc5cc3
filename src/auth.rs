//! Login against the POS staff table and the role claim gating the
//! accounting surface.
//!
//! The legacy till stores staff in `people` with the card value doubling
//! as a password, compared in plaintext. That is preserved as-is; what is
//! redesigned is the authorization side: instead of each handler sniffing
//! headers/body/query for a role, an extractor produces an explicit
//! [`RoleClaim`] and admin-only handlers require an [`AdminClaim`]
//! parameter, so the capability check is visible in the signature.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::PosStore;
use crate::error::ServiceError;

/// Header carrying the caller's role, set by the frontend after login.
pub const ROLE_HEADER: &str = "x-user-role";

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Check credentials against `people` (name + card, visible only) and
/// return the user plus a session token.
pub fn login(pos: &PosStore, username: &str, password: &str) -> Result<Value, ServiceError> {
    if username.is_empty() {
        return Err(ServiceError::Unauthorized);
    }

    let conn = pos.conn()?;
    let user: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT id, name, role FROM people
             WHERE name = ?1 AND card = ?2 AND visible = 1
             LIMIT 1",
            params![username, password],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let (id, name, role) = user.ok_or(ServiceError::Unauthorized)?;
    info!(user = %name, "Login correcto");

    Ok(serde_json::json!({
        "success": true,
        "user": { "id": id, "name": name, "role": role },
        "token": Uuid::new_v4().to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Role claim
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
}

/// A verified role claim, derived once at the transport edge.
#[derive(Debug, Clone, Copy)]
pub struct RoleClaim {
    pub role: Role,
}

impl RoleClaim {
    /// The till exports admin as numeric role 0; the web UI may also store
    /// the literal string "admin". Anything else is regular staff.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let role = match raw.map(str::trim) {
            Some(value) if !value.is_empty() => {
                let numeric_admin = value.parse::<i64>().is_ok_and(|n| n == 0);
                if numeric_admin || value.eq_ignore_ascii_case("admin") {
                    Role::Admin
                } else {
                    Role::Staff
                }
            }
            _ => Role::Staff,
        };
        Self { role }
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Staff => Err(ServiceError::Forbidden),
        }
    }
}

impl<S> FromRequestParts<S> for RoleClaim
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok());
        Ok(RoleClaim::from_raw(raw))
    }
}

/// Extractor form of the admin gate: handlers taking an `AdminClaim`
/// reject non-admin callers with 403 before running.
#[derive(Debug, Clone, Copy)]
pub struct AdminClaim;

impl<S> FromRequestParts<S> for AdminClaim
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claim = RoleClaim::from_request_parts(parts, state).await?;
        claim.require_admin()?;
        Ok(AdminClaim)
    }
}

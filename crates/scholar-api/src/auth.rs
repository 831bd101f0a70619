//! Bearer-token protection for the admin routes.
//!
//! The token comes from the configuration or from a token file that is
//! created with a random value on first start.

use std::path::Path;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use tracing::{info, warn};

use scholar_core::error::{Result, ScholarError};

use crate::error::ErrorBody;
use crate::state::AppState;

/// Random 32-character hex token.
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

/// Read the token stored at `path`, or write a fresh one there.
///
/// The file is created owner-readable only on Unix.
pub fn load_or_generate_token(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => {
            info!(path = %path.display(), "Admin token loaded");
            return Ok(contents.trim().to_string());
        }
        Ok(_) => warn!(path = %path.display(), "Admin token file is empty; generating a new token"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let token = generate_token();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &token)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    info!(path = %path.display(), "Admin token generated");
    Ok(token)
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "unauthorized".to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Reject requests whose `Authorization: Bearer <token>` does not carry
/// `AppState.admin_token`.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return unauthorized("Missing Authorization header");
    };
    let Ok(value) = value.to_str() else {
        return unauthorized("Invalid Authorization header encoding");
    };
    match value.strip_prefix("Bearer ") {
        Some(token) if !state.admin_token.is_empty() && token == state.admin_token => {
            next.run(req).await
        }
        _ => unauthorized("Invalid bearer token"),
    }
}

/// Resolve the admin token: configured value first, then the token file.
pub fn resolve_admin_token(configured: Option<&str>, token_file: &Path) -> Result<String> {
    match configured.map(str::trim) {
        Some("") => Err(ScholarError::Config(
            "server.admin_token must not be empty".to_string(),
        )),
        Some(token) => Ok(token.to_string()),
        None => load_or_generate_token(token_file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_hex_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_file_is_created_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("admin_token");

        let first = load_or_generate_token(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert_eq!(load_or_generate_token(&path).unwrap(), first);
    }

    #[test]
    fn test_configured_token_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin_token");
        assert_eq!(
            resolve_admin_token(Some(" s3cret "), &path).unwrap(),
            "s3cret"
        );
        assert!(!path.exists());
        assert!(resolve_admin_token(Some(""), &path).is_err());
    }
}

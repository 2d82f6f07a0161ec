//! Player identity resolution.
//!
//! The seam is a trait so the dev provider can be swapped for a real one
//! without touching the session layer. The dev provider treats the username
//! as the whole credential and derives the player id deterministically from
//! it, which keeps ids stable across instances with no shared auth state:
//! a player who reconnects through a different instance resolves to the same
//! id their seat was bound to.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 20;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub player_id: Uuid,
    pub username: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username: {detail}")]
    InvalidUsername { detail: String },
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<PlayerIdentity, AuthError>;
}

/// Username-only identity for development and tests.
#[derive(Debug, Default)]
pub struct DevIdentityProvider;

impl DevIdentityProvider {
    pub fn new() -> Self {
        Self
    }

    fn player_namespace() -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, b"hokm.players")
    }
}

#[async_trait]
impl IdentityProvider for DevIdentityProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<PlayerIdentity, AuthError> {
        let username = normalize_username(&credentials.username)?;
        let player_id = Uuid::new_v5(&Self::player_namespace(), username.as_bytes());
        Ok(PlayerIdentity {
            player_id,
            username,
        })
    }
}

/// Canonical username: trimmed, lowercased, 3..=20 chars from
/// [a-z0-9_-]. "Ada" and "ada" are the same player.
pub fn normalize_username(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim();
    if trimmed.len() < USERNAME_MIN || trimmed.len() > USERNAME_MAX {
        return Err(AuthError::InvalidUsername {
            detail: format!("length must be {USERNAME_MIN}..={USERNAME_MAX}"),
        });
    }
    let normalized = trimmed.to_ascii_lowercase();
    if let Some(bad) = normalized
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(AuthError::InvalidUsername {
            detail: format!("character {bad:?} not allowed"),
        });
    }
    Ok(normalized)
}

use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{EducatorId, EducatorProfile, UserId};

/// Role claim issued by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Educator,
    Family,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "educator" => Some(Role::Educator),
            "family" => Some(Role::Family),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Educator => "educator",
            Role::Family => "family",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated caller. The claim is trusted as-is; session issuance lives in the
/// identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("admin role required")]
    AdminRequired,
    #[error("educator role required")]
    EducatorRequired,
    #[error("not allowed to act on educator {0}")]
    NotOwner(EducatorId),
}

/// Proof that the caller passed the admin check; only constructed by [`require_admin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminClaim {
    reviewer: UserId,
}

impl AdminClaim {
    pub fn reviewer(&self) -> &UserId {
        &self.reviewer
    }
}

pub fn require_admin(actor: &Actor) -> Result<AdminClaim, AccessError> {
    if actor.is_admin() {
        Ok(AdminClaim {
            reviewer: actor.user_id.clone(),
        })
    } else {
        Err(AccessError::AdminRequired)
    }
}

pub fn require_educator(actor: &Actor) -> Result<(), AccessError> {
    match actor.role {
        Role::Educator => Ok(()),
        _ => Err(AccessError::EducatorRequired),
    }
}

/// Owners and admins may read or modify an educator's verification file.
pub fn require_owner_or_admin(actor: &Actor, profile: &EducatorProfile) -> Result<(), AccessError> {
    if actor.is_admin() || (actor.role == Role::Educator && actor.user_id == profile.user_id) {
        Ok(())
    } else {
        Err(AccessError::NotOwner(profile.id.clone()))
    }
}

//! Caller identity as consumed from the identity provider.
//!
//! Campuspay never issues sessions. It receives a signed bearer token and
//! only reads the owner id, role and verified-merchant flag from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UserId;

/// JWT claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (owner id).
    pub sub: Uuid,
    /// Role assigned by the identity provider (e.g. "student", "seller").
    pub role: String,
    /// True when the owner is a verified seller allowed to run a merchant profile.
    #[serde(default)]
    pub verified_merchant: bool,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
}

impl Claims {
    /// Creates new claims for a user.
    #[must_use]
    pub fn new(
        user_id: Uuid,
        role: &str,
        verified_merchant: bool,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            role: role.to_string(),
            verified_merchant,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// Returns the owner id from claims.
    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.sub
    }

    /// Reduces the claims to what ledger operations need.
    #[must_use]
    pub fn identity(&self) -> CallerIdentity {
        CallerIdentity {
            owner_id: UserId::from_uuid(self.sub),
            verified_merchant: self.verified_merchant,
        }
    }
}

/// The part of a caller's identity the ledger acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Wallet owner.
    pub owner_id: UserId,
    /// Whether the caller may operate a merchant profile.
    pub verified_merchant: bool,
}

impl CallerIdentity {
    /// Identity of a regular (non-merchant) owner.
    #[must_use]
    pub const fn owner(owner_id: UserId) -> Self {
        Self {
            owner_id,
            verified_merchant: false,
        }
    }

    /// Identity of a verified seller.
    #[must_use]
    pub const fn merchant(owner_id: UserId) -> Self {
        Self {
            owner_id,
            verified_merchant: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_claims_identity() {
        let id = Uuid::new_v4();
        let claims = Claims::new(id, "seller", true, Utc::now() + Duration::minutes(5));
        let identity = claims.identity();
        assert_eq!(identity.owner_id.into_inner(), id);
        assert!(identity.verified_merchant);
    }

    #[test]
    fn test_missing_merchant_flag_defaults_false() {
        let json = format!(
            r#"{{"sub":"{}","role":"student","iat":0,"exp":10}}"#,
            Uuid::nil()
        );
        let claims: Claims = serde_json::from_str(&json).unwrap();
        assert!(!claims.verified_merchant);
    }
}

//! Backend-independent records handled by the storage engines.
//!
//! List and set fields are real collections here; only the engines marshal
//! them to JSON text (see [`super::codec`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Scope names, kept sorted so stored encodings are stable.
pub type ScopeSet = BTreeSet<String>;

/// Collect scope names from anything string-like.
pub fn scope_set<I, S>(scopes: I) -> ScopeSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    scopes.into_iter().map(Into::into).collect()
}

/// `true` if every requested scope is present in `granted`.
pub fn scopes_cover(granted: &ScopeSet, requested: &ScopeSet) -> bool {
    requested.is_subset(granted)
}

// ============================================================================
// Clients
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    /// `None` for public clients.
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: BTreeSet<String>,
    pub scopes: ScopeSet,
    pub is_confidential: bool,
    pub owner_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: BTreeSet<String>,
    pub scopes: ScopeSet,
    pub is_confidential: bool,
    pub owner_id: String,
    pub is_active: bool,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdate {
    /// `Some(None)` clears the secret, turning the client public.
    pub client_secret_hash: Option<Option<String>>,
    pub name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub grant_types: Option<BTreeSet<String>>,
    pub scopes: Option<ScopeSet>,
    pub is_confidential: Option<bool>,
    pub owner_id: Option<String>,
    pub is_active: Option<bool>,
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TokenKind {
    Access,
    Refresh,
    /// Caller-defined kind, stored verbatim.
    Other(String),
}

impl TokenKind {
    pub fn as_str(&self) -> &str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Other(kind) => kind,
        }
    }
}

impl From<String> for TokenKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "access" => TokenKind::Access,
            "refresh" => TokenKind::Refresh,
            _ => TokenKind::Other(value),
        }
    }
}

impl From<&str> for TokenKind {
    fn from(value: &str) -> Self {
        TokenKind::from(value.to_string())
    }
}

impl From<TokenKind> for String {
    fn from(kind: TokenKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub kind: TokenKind,
    pub client_id: String,
    /// Absent for client-credentials grants.
    pub user_id: Option<String>,
    pub scopes: ScopeSet,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_revoked: bool,
}

impl Token {
    /// Valid iff not revoked and `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewToken {
    pub token: String,
    pub kind: TokenKind,
    pub client_id: String,
    pub user_id: Option<String>,
    pub scopes: ScopeSet,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Authorization codes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    /// Stored byte-for-byte; comparing it at exchange time is the caller's job.
    pub redirect_uri: String,
    pub scopes: ScopeSet,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub consumed: bool,
}

impl AuthCode {
    pub fn is_consumable_at(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuthCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: ScopeSet,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Rate limiting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Attempts recorded in the current window, including denied ones.
    pub count: u64,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Judge a bucket state read back after the atomic increment.
    pub fn from_bucket(count: u64, reset_at: DateTime<Utc>, max_count: u32) -> Self {
        let max = u64::from(max_count);
        let remaining = max.saturating_sub(count);
        Self {
            allowed: count <= max,
            count,
            remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
            reset_at,
        }
    }
}

// ============================================================================
// Consent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub user_id: String,
    pub client_id: String,
    pub scopes: ScopeSet,
    /// First grant; merges never move it.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rows removed by [`super::StorageAdapter::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub tokens: u64,
    pub auth_codes: u64,
    pub rate_limits: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.tokens + self.auth_codes + self.rate_limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_kind_round_trips_through_strings() {
        assert_eq!(TokenKind::from("access"), TokenKind::Access);
        assert_eq!(TokenKind::from("refresh"), TokenKind::Refresh);
        assert_eq!(
            TokenKind::from("device"),
            TokenKind::Other("device".to_string())
        );
        assert_eq!(TokenKind::Other("device".into()).as_str(), "device");
        assert_eq!(TokenKind::Refresh.to_string(), "refresh");
    }

    #[test]
    fn test_token_validity_window() {
        let now = Utc::now();
        let mut token = Token {
            token: "t".into(),
            kind: TokenKind::Access,
            client_id: "c1".into(),
            user_id: None,
            scopes: scope_set(["read"]),
            expires_at: now + Duration::seconds(60),
            created_at: now,
            is_revoked: false,
        };
        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(token.expires_at));

        token.is_revoked = true;
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn test_rate_limit_decision_at_boundary() {
        let reset_at = Utc::now();

        let at_limit = RateLimitDecision::from_bucket(3, reset_at, 3);
        assert!(at_limit.allowed);
        assert_eq!(at_limit.remaining, 0);

        let over = RateLimitDecision::from_bucket(4, reset_at, 3);
        assert!(!over.allowed);
        assert_eq!(over.remaining, 0);
        assert_eq!(over.count, 4);

        let fresh = RateLimitDecision::from_bucket(1, reset_at, 3);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
    }

    #[test]
    fn test_zero_limit_denies_first_attempt() {
        let decision = RateLimitDecision::from_bucket(1, Utc::now(), 0);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_scopes_cover() {
        let granted = scope_set(["openid", "profile", "email"]);
        assert!(scopes_cover(&granted, &scope_set(["openid", "email"])));
        assert!(scopes_cover(&granted, &ScopeSet::new()));
        assert!(!scopes_cover(&granted, &scope_set(["admin"])));
    }
}

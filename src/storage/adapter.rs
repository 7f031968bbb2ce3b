//! The storage contract callers depend on.
//!
//! Each capability is its own trait so a caller can ask for only what it uses;
//! [`StorageAdapter`] bundles all of them with lifecycle control. Every engine
//! in this crate implements the full set and must behave identically, which
//! `tests/conformance.rs` checks against each one.

use async_trait::async_trait;

use super::model::{
    AuthCode, Client, ClientUpdate, Consent, NewAuthCode, NewClient, NewToken, PurgeReport,
    RateLimitDecision, ScopeSet, Token,
};
use crate::errors::StoreResult;

/// CRUD over OAuth client registrations.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Register a client.
    ///
    /// # Errors
    ///
    /// `Conflict` if `client_id` is already registered.
    async fn create_client(&self, client: NewClient) -> StoreResult<Client>;

    async fn get_client(&self, client_id: &str) -> StoreResult<Option<Client>>;

    /// All clients registered by `owner_id`, oldest first.
    async fn list_clients_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Client>>;

    /// Apply a partial update. Returns `Ok(None)` when the client does not
    /// exist; that is a signal, not an error.
    async fn update_client(
        &self,
        client_id: &str,
        update: ClientUpdate,
    ) -> StoreResult<Option<Client>>;

    /// Hard-delete a client. Returns `true` iff a row was removed.
    ///
    /// Tokens and codes issued to the client are left alone; cascade with
    /// [`TokenStore::revoke_all_for_client`] and
    /// [`AuthCodeStore::invalidate_auth_codes_for_client`].
    async fn delete_client(&self, client_id: &str) -> StoreResult<bool>;
}

/// Access/refresh token persistence and the single token validity gate.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// # Errors
    ///
    /// `Conflict` if the token string is already stored.
    async fn store_token(&self, token: NewToken) -> StoreResult<Token>;

    /// Returns the token only while it is valid: not revoked and not expired.
    async fn get_token(&self, token: &str) -> StoreResult<Option<Token>>;

    /// Mark a token revoked. `true` if the token exists (already revoked
    /// included), `false` if it was never stored.
    async fn revoke_token(&self, token: &str) -> StoreResult<bool>;

    /// Revoke every live token of a client. Returns how many rows flipped;
    /// rows that were already revoked are not counted.
    async fn revoke_all_for_client(&self, client_id: &str) -> StoreResult<u64>;

    /// Same as [`TokenStore::revoke_all_for_client`], keyed by user.
    async fn revoke_all_for_user(&self, user_id: &str) -> StoreResult<u64>;
}

/// Authorization codes with atomic single-use consumption.
#[async_trait]
pub trait AuthCodeStore: Send + Sync {
    /// # Errors
    ///
    /// `Conflict` if the code is already stored.
    async fn store_auth_code(&self, code: NewAuthCode) -> StoreResult<AuthCode>;

    /// Consume a code in one indivisible step.
    ///
    /// Succeeds only if the code exists, is unconsumed and has not expired;
    /// the returned record has `consumed = true`. Every other case yields
    /// `Ok(None)` and changes nothing. Of any number of concurrent calls for
    /// one code, at most one returns `Some`.
    ///
    /// PKCE fields come back as stored; verifying the code verifier is the
    /// caller's job.
    async fn consume_auth_code(&self, code: &str) -> StoreResult<Option<AuthCode>>;

    /// Read a code without consuming it, whatever its state.
    async fn get_auth_code(&self, code: &str) -> StoreResult<Option<AuthCode>>;

    /// Mark every unconsumed code of a client consumed. Returns the number of
    /// codes that changed.
    async fn invalidate_auth_codes_for_client(&self, client_id: &str) -> StoreResult<u64>;
}

/// Fixed-window counters keyed by arbitrary strings.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one attempt against `key` and judge it.
    ///
    /// A missing or elapsed bucket restarts at `count = 1` with
    /// `reset_at = now + window_seconds`; otherwise the count is incremented.
    /// Denied attempts still count. The increment and the comparison happen
    /// atomically in the backend.
    async fn check_and_increment(
        &self,
        key: &str,
        window_seconds: u32,
        max_count: u32,
    ) -> StoreResult<RateLimitDecision>;

    /// Drop the bucket for `key`. `true` if one existed.
    async fn reset_rate_limit(&self, key: &str) -> StoreResult<bool>;
}

/// Per-(user, client) scope grants.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Record a grant, merging `scopes` into any existing grant for the pair.
    /// The first-grant timestamp is preserved.
    async fn store_consent(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: ScopeSet,
    ) -> StoreResult<()>;

    /// `Ok(None)` if no consent was ever recorded for the pair; an empty set
    /// means a consent row exists with nothing granted.
    async fn get_consent(&self, user_id: &str, client_id: &str) -> StoreResult<Option<ScopeSet>>;

    /// Delete the consent for the pair. `true` if one existed.
    async fn revoke_consent(&self, user_id: &str, client_id: &str) -> StoreResult<bool>;

    /// Every consent a user has granted, ordered by client id.
    async fn list_consents_by_user(&self, user_id: &str) -> StoreResult<Vec<Consent>>;
}

/// The full capability set plus lifecycle, implemented once per engine.
#[async_trait]
pub trait StorageAdapter:
    ClientStore + TokenStore + AuthCodeStore + RateLimiter + ConsentStore
{
    /// Ensure the schema and its indexes exist. Idempotent.
    async fn initialize(&self) -> StoreResult<()>;

    /// Release backend resources. Safe to call more than once; operations
    /// issued afterwards fail with `BackendUnavailable`.
    async fn close(&self) -> StoreResult<()>;

    /// Delete expired tokens and codes and elapsed rate-limit buckets.
    async fn purge_expired(&self) -> StoreResult<PurgeReport>;

    /// Short engine name for logs.
    fn engine_name(&self) -> &'static str;
}

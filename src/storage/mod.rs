//! Persistence for OAuth clients, tokens, authorization codes, rate-limit
//! counters and consent grants.
//!
//! Callers hold an `Arc<dyn StorageAdapter>` from [`connect`] and never see
//! which engine is behind it:
//!
//! - [`OrmStorage`] works through SeaORM entities and builds its schema with
//!   the `migration` crate.
//! - [`SqlStorage`] issues hand-written SQL and builds the same schema from
//!   embedded DDL.
//!
//! Both rely on the database for atomicity (conditional updates, upserts,
//! transactions); neither keeps in-process locks or caches.

pub mod adapter;
pub mod codec;
pub mod model;
pub mod orm;
pub mod sql;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64ct::Encoding;
use rand::RngCore;
use sea_orm::{
    ConnAcquireErr, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
};

use crate::errors::{StoreError, StoreResult};
use crate::settings::{Database as DbCfg, Engine};

pub use adapter::{
    AuthCodeStore, ClientStore, ConsentStore, RateLimiter, StorageAdapter, TokenStore,
};
pub use model::{
    scope_set, scopes_cover, AuthCode, Client, ClientUpdate, Consent, NewAuthCode, NewClient,
    NewToken, PurgeReport, RateLimitDecision, ScopeSet, Token, TokenKind,
};
pub use orm::OrmStorage;
pub use sql::SqlStorage;

/// Open a connection pool and wrap it in the configured engine.
///
/// The schema is not touched; call [`StorageAdapter::initialize`] next.
pub async fn connect(cfg: &DbCfg) -> StoreResult<Arc<dyn StorageAdapter>> {
    let mut opts = ConnectOptions::new(cfg.url.clone());
    opts.max_connections(cfg.max_connections)
        .min_connections(cfg.min_connections)
        .connect_timeout(cfg.connect_timeout())
        .sqlx_logging(cfg.sqlx_logging);

    let db = Database::connect(opts).await?;
    tracing::debug!(engine = ?cfg.engine, backend = ?db.get_database_backend(), "Connected to database");

    let adapter: Arc<dyn StorageAdapter> = match cfg.engine {
        Engine::Orm => Arc::new(OrmStorage::new(db)),
        Engine::Sql => Arc::new(SqlStorage::new(db)?),
    };
    Ok(adapter)
}

/// Pool handle shared by the engines; refuses work once closed.
#[derive(Debug)]
pub(crate) struct Handle {
    db: DatabaseConnection,
    closed: AtomicBool,
}

impl Handle {
    pub(crate) fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn conn(&self) -> StoreResult<&DatabaseConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::BackendUnavailable(DbErr::ConnectionAcquire(
                ConnAcquireErr::ConnectionClosed,
            )));
        }
        Ok(&self.db)
    }

    /// Close the pool. Once a close has succeeded, later calls are no-ops;
    /// a failed close leaves the handle open so it can be retried.
    pub(crate) async fn close(&self) -> StoreResult<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.db.clone().close().await?;
        Ok(!self.closed.swap(true, Ordering::AcqRel))
    }
}

/// A fresh opaque identifier: 24 random bytes, unpadded base64url.
///
/// Suitable for tokens, authorization codes and generated client ids.
pub fn random_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_failed_close_keeps_handle_open() {
        let handle = Handle::new(DatabaseConnection::Disconnected);

        let err = handle.close().await.unwrap_err();
        assert!(err.is_backend_unavailable(), "got {err:?}");
        // Not marked closed: a retry fails the same way instead of passing
        assert!(handle.close().await.is_err());
        assert!(handle.conn().is_ok());
    }

    #[test]
    fn test_random_token_shape() {
        let token = random_token();
        assert_eq!(token.len(), 32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_random_tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..256).map(|_| random_token()).collect();
        assert_eq!(tokens.len(), 256);
    }
}

//! Storage engine issuing hand-written SQL.
//!
//! Statements go through SeaORM's [`Statement`] interface and rows come back
//! through the entity models, so row decoding is shared with the ORM engine.
//! Atomic operations are single statements where the dialect allows it:
//! `UPDATE .. RETURNING` for code consumption and
//! `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` for rate-limit buckets.

mod dialect;
mod schema;

use dialect::Dialect;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, EntityTrait, Statement, TransactionTrait, Value,
};

use super::adapter::{
    AuthCodeStore, ClientStore, ConsentStore, RateLimiter, StorageAdapter, TokenStore,
};
use super::codec;
use super::model::{
    AuthCode, Client, ClientUpdate, Consent, NewAuthCode, NewClient, NewToken, PurgeReport,
    RateLimitDecision, ScopeSet, Token,
};
use super::Handle;
use crate::entities::{auth_code, client, consent, rate_limit, token};
use crate::errors::{StoreError, StoreResult};

const CLIENT_COLUMNS: &str = "id, client_id, client_secret_hash, name, redirect_uris, \
     grant_types, scopes, is_confidential, owner_id, is_active, created_at, updated_at";

const TOKEN_COLUMNS: &str =
    "id, token, token_type, client_id, user_id, scopes, expires_at, created_at, is_revoked";

const CODE_COLUMNS: &str = "id, code, client_id, user_id, redirect_uri, scopes, \
     code_challenge, code_challenge_method, expires_at, created_at, consumed";

const CONSENT_COLUMNS: &str = "id, user_id, client_id, scopes, created_at, updated_at";

const BUCKET_COLUMNS: &str = r#"id, "key", "count", reset_at"#;

#[derive(Debug)]
pub struct SqlStorage {
    handle: Handle,
    dialect: Dialect,
}

impl SqlStorage {
    /// # Errors
    ///
    /// `Unsupported` for backends without a dialect (MySQL).
    pub fn new(db: DatabaseConnection) -> StoreResult<Self> {
        let dialect = Dialect::for_backend(db.get_database_backend())?;
        Ok(Self {
            handle: Handle::new(db),
            dialect,
        })
    }

    fn conn(&self) -> StoreResult<&DatabaseConnection> {
        self.handle.conn()
    }

    fn stmt(&self, sql: &str, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(
            self.dialect.backend(),
            self.dialect.bind(sql).as_str(),
            values,
        )
    }
}

#[async_trait]
impl ClientStore for SqlStorage {
    async fn create_client(&self, new: NewClient) -> StoreResult<Client> {
        let now = codec::now();
        let client_id = new.client_id.clone();
        let stmt = self.stmt(
            &format!(
                "INSERT INTO oauth_clients (client_id, client_secret_hash, name, redirect_uris, \
                 grant_types, scopes, is_confidential, owner_id, is_active, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {CLIENT_COLUMNS}"
            ),
            vec![
                new.client_id.into(),
                new.client_secret_hash.into(),
                new.name.into(),
                codec::encode_list(&new.redirect_uris)?.into(),
                codec::encode_set(&new.grant_types)?.into(),
                codec::encode_set(&new.scopes)?.into(),
                new.is_confidential.into(),
                new.owner_id.into(),
                new.is_active.into(),
                now.into(),
                now.into(),
            ],
        );

        let model = client::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await
            .map_err(|e| {
                StoreError::on_insert(e, || format!("client '{client_id}' already exists"))
            })?
            .ok_or_else(|| StoreError::invariant("INSERT .. RETURNING produced no row"))?;

        tracing::info!(client_id = %model.client_id, "Registered client");
        Client::try_from(model)
    }

    async fn get_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        let stmt = self.stmt(
            &format!("SELECT {CLIENT_COLUMNS} FROM oauth_clients WHERE client_id = ?"),
            vec![client_id.into()],
        );

        client::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn list_clients_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Client>> {
        let stmt = self.stmt(
            &format!(
                "SELECT {CLIENT_COLUMNS} FROM oauth_clients WHERE owner_id = ? \
                 ORDER BY created_at, id"
            ),
            vec![owner_id.into()],
        );

        client::Entity::find()
            .from_raw_sql(stmt)
            .all(self.conn()?)
            .await?
            .into_iter()
            .map(Client::try_from)
            .collect()
    }

    async fn update_client(
        &self,
        client_id: &str,
        update: ClientUpdate,
    ) -> StoreResult<Option<Client>> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(secret) = update.client_secret_hash {
            sets.push("client_secret_hash = ?");
            values.push(secret.into());
        }
        if let Some(name) = update.name {
            sets.push("name = ?");
            values.push(name.into());
        }
        if let Some(uris) = update.redirect_uris {
            sets.push("redirect_uris = ?");
            values.push(codec::encode_list(&uris)?.into());
        }
        if let Some(grants) = update.grant_types {
            sets.push("grant_types = ?");
            values.push(codec::encode_set(&grants)?.into());
        }
        if let Some(scopes) = update.scopes {
            sets.push("scopes = ?");
            values.push(codec::encode_set(&scopes)?.into());
        }
        if let Some(confidential) = update.is_confidential {
            sets.push("is_confidential = ?");
            values.push(confidential.into());
        }
        if let Some(owner) = update.owner_id {
            sets.push("owner_id = ?");
            values.push(owner.into());
        }
        if let Some(is_active) = update.is_active {
            sets.push("is_active = ?");
            values.push(is_active.into());
        }
        sets.push("updated_at = ?");
        values.push(codec::now().into());
        values.push(client_id.into());

        let stmt = self.stmt(
            &format!(
                "UPDATE oauth_clients SET {} WHERE client_id = ? RETURNING {CLIENT_COLUMNS}",
                sets.join(", ")
            ),
            values,
        );

        client::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn delete_client(&self, client_id: &str) -> StoreResult<bool> {
        let stmt = self.stmt(
            "DELETE FROM oauth_clients WHERE client_id = ?",
            vec![client_id.into()],
        );
        let deleted = self.conn()?.execute(stmt).await?.rows_affected() > 0;

        if deleted {
            tracing::info!(client_id, "Deleted client");
        }
        Ok(deleted)
    }
}

#[async_trait]
impl TokenStore for SqlStorage {
    async fn store_token(&self, new: NewToken) -> StoreResult<Token> {
        let stmt = self.stmt(
            &format!(
                "INSERT INTO oauth_tokens (token, token_type, client_id, user_id, scopes, \
                 expires_at, created_at, is_revoked) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 RETURNING {TOKEN_COLUMNS}"
            ),
            vec![
                new.token.into(),
                String::from(new.kind).into(),
                new.client_id.into(),
                new.user_id.into(),
                codec::encode_set(&new.scopes)?.into(),
                codec::to_timestamp(new.expires_at).into(),
                codec::now().into(),
                false.into(),
            ],
        );

        let model = token::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await
            .map_err(|e| StoreError::on_insert(e, || "token already stored".to_string()))?
            .ok_or_else(|| StoreError::invariant("INSERT .. RETURNING produced no row"))?;

        Token::try_from(model)
    }

    async fn get_token(&self, token: &str) -> StoreResult<Option<Token>> {
        let stmt = self.stmt(
            &format!("SELECT {TOKEN_COLUMNS} FROM oauth_tokens WHERE token = ?"),
            vec![token.into()],
        );

        let Some(model) = token::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await?
        else {
            return Ok(None);
        };

        let token = Token::try_from(model)?;
        Ok(token.is_valid_at(Utc::now()).then_some(token))
    }

    async fn revoke_token(&self, token: &str) -> StoreResult<bool> {
        let stmt = self.stmt(
            "UPDATE oauth_tokens SET is_revoked = ? WHERE token = ?",
            vec![true.into(), token.into()],
        );
        Ok(self.conn()?.execute(stmt).await?.rows_affected() > 0)
    }

    async fn revoke_all_for_client(&self, client_id: &str) -> StoreResult<u64> {
        let stmt = self.stmt(
            "UPDATE oauth_tokens SET is_revoked = ? WHERE client_id = ? AND is_revoked = ?",
            vec![true.into(), client_id.into(), false.into()],
        );
        let revoked = self.conn()?.execute(stmt).await?.rows_affected();

        tracing::info!(client_id, revoked, "Revoked client tokens");
        Ok(revoked)
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> StoreResult<u64> {
        let stmt = self.stmt(
            "UPDATE oauth_tokens SET is_revoked = ? WHERE user_id = ? AND is_revoked = ?",
            vec![true.into(), user_id.into(), false.into()],
        );
        let revoked = self.conn()?.execute(stmt).await?.rows_affected();

        tracing::info!(user_id, revoked, "Revoked user tokens");
        Ok(revoked)
    }
}

#[async_trait]
impl AuthCodeStore for SqlStorage {
    async fn store_auth_code(&self, new: NewAuthCode) -> StoreResult<AuthCode> {
        let stmt = self.stmt(
            &format!(
                "INSERT INTO oauth_auth_codes (code, client_id, user_id, redirect_uri, scopes, \
                 code_challenge, code_challenge_method, expires_at, created_at, consumed) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {CODE_COLUMNS}"
            ),
            vec![
                new.code.into(),
                new.client_id.into(),
                new.user_id.into(),
                new.redirect_uri.into(),
                codec::encode_set(&new.scopes)?.into(),
                new.code_challenge.into(),
                new.code_challenge_method.into(),
                codec::to_timestamp(new.expires_at).into(),
                codec::now().into(),
                false.into(),
            ],
        );

        let model = auth_code::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await
            .map_err(|e| {
                StoreError::on_insert(e, || "authorization code already stored".to_string())
            })?
            .ok_or_else(|| StoreError::invariant("INSERT .. RETURNING produced no row"))?;

        AuthCode::try_from(model)
    }

    async fn consume_auth_code(&self, code: &str) -> StoreResult<Option<AuthCode>> {
        let stmt = self.stmt(
            &format!(
                "UPDATE oauth_auth_codes SET consumed = ? \
                 WHERE code = ? AND consumed = ? AND expires_at > ? \
                 RETURNING {CODE_COLUMNS}"
            ),
            vec![true.into(), code.into(), false.into(), codec::now().into()],
        );

        let mut rows = auth_code::Entity::find()
            .from_raw_sql(stmt)
            .all(self.conn()?)
            .await?;

        match rows.len() {
            0 => {
                tracing::debug!("Authorization code not consumable");
                Ok(None)
            }
            1 => rows.pop().map(AuthCode::try_from).transpose(),
            n => Err(StoreError::invariant(format!(
                "consuming one authorization code matched {n} rows"
            ))),
        }
    }

    async fn get_auth_code(&self, code: &str) -> StoreResult<Option<AuthCode>> {
        let stmt = self.stmt(
            &format!("SELECT {CODE_COLUMNS} FROM oauth_auth_codes WHERE code = ?"),
            vec![code.into()],
        );

        auth_code::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await?
            .map(AuthCode::try_from)
            .transpose()
    }

    async fn invalidate_auth_codes_for_client(&self, client_id: &str) -> StoreResult<u64> {
        let stmt = self.stmt(
            "UPDATE oauth_auth_codes SET consumed = ? WHERE client_id = ? AND consumed = ?",
            vec![true.into(), client_id.into(), false.into()],
        );
        let invalidated = self.conn()?.execute(stmt).await?.rows_affected();

        tracing::info!(client_id, invalidated, "Invalidated authorization codes");
        Ok(invalidated)
    }
}

#[async_trait]
impl RateLimiter for SqlStorage {
    async fn check_and_increment(
        &self,
        key: &str,
        window_seconds: u32,
        max_count: u32,
    ) -> StoreResult<RateLimitDecision> {
        let now = codec::now();
        let fresh_reset = codec::after_seconds(now, window_seconds);

        // One statement: create, restart or increment the bucket, and report it.
        let stmt = self.stmt(
            &format!(
                r#"INSERT INTO oauth_rate_limits ("key", "count", reset_at) VALUES (?, 1, ?)
                   ON CONFLICT ("key") DO UPDATE SET
                     "count" = CASE WHEN oauth_rate_limits.reset_at <= ? THEN 1
                                    ELSE oauth_rate_limits."count" + 1 END,
                     reset_at = CASE WHEN oauth_rate_limits.reset_at <= ? THEN ?
                                     ELSE oauth_rate_limits.reset_at END
                   RETURNING {BUCKET_COLUMNS}"#
            ),
            vec![
                key.into(),
                fresh_reset.into(),
                now.into(),
                now.into(),
                fresh_reset.into(),
            ],
        );

        let mut rows = rate_limit::Entity::find()
            .from_raw_sql(stmt)
            .all(self.conn()?)
            .await?;
        let bucket = match (rows.pop(), rows.is_empty()) {
            (Some(bucket), true) => bucket,
            _ => {
                return Err(StoreError::invariant(format!(
                    "rate-limit upsert for '{key}' did not return exactly one row"
                )))
            }
        };

        let decision = codec::rate_limit_decision(&bucket, max_count)?;
        if !decision.allowed {
            tracing::debug!(key, count = decision.count, max_count, "Rate limit exceeded");
        }
        Ok(decision)
    }

    async fn reset_rate_limit(&self, key: &str) -> StoreResult<bool> {
        let stmt = self.stmt(
            r#"DELETE FROM oauth_rate_limits WHERE "key" = ?"#,
            vec![key.into()],
        );
        Ok(self.conn()?.execute(stmt).await?.rows_affected() > 0)
    }
}

#[async_trait]
impl ConsentStore for SqlStorage {
    async fn store_consent(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: ScopeSet,
    ) -> StoreResult<()> {
        let now = codec::now();
        let txn = self.conn()?.begin().await?;

        // Inserts the first grant, or touches updated_at on an existing one;
        // either way the row is locked and its stored scopes come back.
        let upsert = self.stmt(
            &format!(
                "INSERT INTO oauth_consents (user_id, client_id, scopes, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT (user_id, client_id) DO UPDATE SET updated_at = ? \
                 RETURNING {CONSENT_COLUMNS}"
            ),
            vec![
                user_id.into(),
                client_id.into(),
                codec::encode_set(&scopes)?.into(),
                now.into(),
                now.into(),
                now.into(),
            ],
        );
        let row = consent::Entity::find()
            .from_raw_sql(upsert)
            .all(&txn)
            .await?
            .pop()
            .ok_or_else(|| StoreError::invariant("consent upsert returned no row"))?;

        let mut merged = codec::decode_set("scopes", &row.scopes)?;
        let before = merged.len();
        merged.extend(scopes);
        if merged.len() != before {
            let update = self.stmt(
                "UPDATE oauth_consents SET scopes = ? WHERE id = ?",
                vec![codec::encode_set(&merged)?.into(), row.id.into()],
            );
            txn.execute(update).await?;
        }

        txn.commit().await?;
        tracing::debug!(user_id, client_id, "Stored consent");
        Ok(())
    }

    async fn get_consent(&self, user_id: &str, client_id: &str) -> StoreResult<Option<ScopeSet>> {
        let stmt = self.stmt(
            &format!(
                "SELECT {CONSENT_COLUMNS} FROM oauth_consents WHERE user_id = ? AND client_id = ?"
            ),
            vec![user_id.into(), client_id.into()],
        );

        consent::Entity::find()
            .from_raw_sql(stmt)
            .one(self.conn()?)
            .await?
            .map(|model| codec::decode_set("scopes", &model.scopes))
            .transpose()
    }

    async fn revoke_consent(&self, user_id: &str, client_id: &str) -> StoreResult<bool> {
        let stmt = self.stmt(
            "DELETE FROM oauth_consents WHERE user_id = ? AND client_id = ?",
            vec![user_id.into(), client_id.into()],
        );
        Ok(self.conn()?.execute(stmt).await?.rows_affected() > 0)
    }

    async fn list_consents_by_user(&self, user_id: &str) -> StoreResult<Vec<Consent>> {
        let stmt = self.stmt(
            &format!(
                "SELECT {CONSENT_COLUMNS} FROM oauth_consents WHERE user_id = ? ORDER BY client_id"
            ),
            vec![user_id.into()],
        );

        consent::Entity::find()
            .from_raw_sql(stmt)
            .all(self.conn()?)
            .await?
            .into_iter()
            .map(Consent::try_from)
            .collect()
    }
}

#[async_trait]
impl StorageAdapter for SqlStorage {
    async fn initialize(&self) -> StoreResult<()> {
        let txn = self.conn()?.begin().await?;
        for ddl in schema::statements(self.dialect) {
            txn.execute_unprepared(&ddl).await?;
        }
        txn.commit().await?;

        tracing::info!(engine = self.engine_name(), dialect = ?self.dialect, "Schema ready");
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if self.handle.close().await? {
            tracing::info!(engine = self.engine_name(), "Closed storage");
        }
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<PurgeReport> {
        let now = codec::now();
        let txn = self.conn()?.begin().await?;

        let mut counts = [0u64; 3];
        for (slot, sql) in counts.iter_mut().zip([
            "DELETE FROM oauth_tokens WHERE expires_at <= ?",
            "DELETE FROM oauth_auth_codes WHERE expires_at <= ?",
            "DELETE FROM oauth_rate_limits WHERE reset_at <= ?",
        ]) {
            *slot = txn
                .execute(self.stmt(sql, vec![now.into()]))
                .await?
                .rows_affected();
        }
        txn.commit().await?;

        let [tokens, auth_codes, rate_limits] = counts;
        let report = PurgeReport {
            tokens,
            auth_codes,
            rate_limits,
        };
        tracing::info!(
            tokens,
            auth_codes,
            rate_limits,
            total = report.total(),
            "Purged expired records"
        );
        Ok(report)
    }

    fn engine_name(&self) -> &'static str {
        "sql"
    }
}

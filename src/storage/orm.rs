//! Storage engine built on SeaORM entities.
//!
//! Single-row test-and-set operations are conditional `update_many` calls.
//! Read-modify-write operations (rate-limit buckets, consent merges) run in a
//! transaction that first writes the row, so the backend holds the row (or,
//! on SQLite, the database) lock before anything is read.

use async_trait::async_trait;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set, TransactionTrait,
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

#[derive(Debug)]
pub struct OrmStorage {
    handle: Handle,
}

impl OrmStorage {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            handle: Handle::new(db),
        }
    }

    fn conn(&self) -> StoreResult<&DatabaseConnection> {
        self.handle.conn()
    }
}

#[async_trait]
impl ClientStore for OrmStorage {
    async fn create_client(&self, new: NewClient) -> StoreResult<Client> {
        let now = codec::now();
        let client_id = new.client_id.clone();
        let model = client::ActiveModel {
            client_id: Set(new.client_id),
            client_secret_hash: Set(new.client_secret_hash),
            name: Set(new.name),
            redirect_uris: Set(codec::encode_list(&new.redirect_uris)?),
            grant_types: Set(codec::encode_set(&new.grant_types)?),
            scopes: Set(codec::encode_set(&new.scopes)?),
            is_confidential: Set(new.is_confidential),
            owner_id: Set(new.owner_id),
            is_active: Set(new.is_active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.conn()?)
        .await
        .map_err(|e| {
            StoreError::on_insert(e, || format!("client '{client_id}' already exists"))
        })?;

        tracing::info!(client_id = %model.client_id, "Registered client");
        Client::try_from(model)
    }

    async fn get_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        use client::{Column, Entity};

        Entity::find()
            .filter(Column::ClientId.eq(client_id))
            .one(self.conn()?)
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn list_clients_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Client>> {
        use client::{Column, Entity};

        Entity::find()
            .filter(Column::OwnerId.eq(owner_id))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
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
        use client::{Column, Entity};

        let conn = self.conn()?;
        let Some(existing) = Entity::find()
            .filter(Column::ClientId.eq(client_id))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };

        let mut active = existing.into_active_model();
        if let Some(secret) = update.client_secret_hash {
            active.client_secret_hash = Set(secret);
        }
        if let Some(name) = update.name {
            active.name = Set(name);
        }
        if let Some(uris) = update.redirect_uris {
            active.redirect_uris = Set(codec::encode_list(&uris)?);
        }
        if let Some(grants) = update.grant_types {
            active.grant_types = Set(codec::encode_set(&grants)?);
        }
        if let Some(scopes) = update.scopes {
            active.scopes = Set(codec::encode_set(&scopes)?);
        }
        if let Some(confidential) = update.is_confidential {
            active.is_confidential = Set(confidential);
        }
        if let Some(owner) = update.owner_id {
            active.owner_id = Set(owner);
        }
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(codec::now());

        match active.update(conn).await {
            Ok(model) => Ok(Some(Client::try_from(model)?)),
            // Deleted between the read and the write.
            Err(DbErr::RecordNotUpdated) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_client(&self, client_id: &str) -> StoreResult<bool> {
        use client::{Column, Entity};

        let result = Entity::delete_many()
            .filter(Column::ClientId.eq(client_id))
            .exec(self.conn()?)
            .await?;

        if result.rows_affected > 0 {
            tracing::info!(client_id, "Deleted client");
        }
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl TokenStore for OrmStorage {
    async fn store_token(&self, new: NewToken) -> StoreResult<Token> {
        let model = token::ActiveModel {
            token: Set(new.token),
            token_type: Set(new.kind.into()),
            client_id: Set(new.client_id),
            user_id: Set(new.user_id),
            scopes: Set(codec::encode_set(&new.scopes)?),
            expires_at: Set(codec::to_timestamp(new.expires_at)),
            created_at: Set(codec::now()),
            is_revoked: Set(false),
            ..Default::default()
        }
        .insert(self.conn()?)
        .await
        .map_err(|e| StoreError::on_insert(e, || "token already stored".to_string()))?;

        Token::try_from(model)
    }

    async fn get_token(&self, token: &str) -> StoreResult<Option<Token>> {
        use token::{Column, Entity};

        let Some(model) = Entity::find()
            .filter(Column::Token.eq(token))
            .one(self.conn()?)
            .await?
        else {
            return Ok(None);
        };

        let token = Token::try_from(model)?;
        Ok(token.is_valid_at(Utc::now()).then_some(token))
    }

    async fn revoke_token(&self, token: &str) -> StoreResult<bool> {
        use token::{Column, Entity};

        let result = Entity::update_many()
            .col_expr(Column::IsRevoked, Expr::value(true))
            .filter(Column::Token.eq(token))
            .exec(self.conn()?)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn revoke_all_for_client(&self, client_id: &str) -> StoreResult<u64> {
        use token::{Column, Entity};

        let result = Entity::update_many()
            .col_expr(Column::IsRevoked, Expr::value(true))
            .filter(Column::ClientId.eq(client_id))
            .filter(Column::IsRevoked.eq(false))
            .exec(self.conn()?)
            .await?;

        tracing::info!(client_id, revoked = result.rows_affected, "Revoked client tokens");
        Ok(result.rows_affected)
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> StoreResult<u64> {
        use token::{Column, Entity};

        let result = Entity::update_many()
            .col_expr(Column::IsRevoked, Expr::value(true))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsRevoked.eq(false))
            .exec(self.conn()?)
            .await?;

        tracing::info!(user_id, revoked = result.rows_affected, "Revoked user tokens");
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl AuthCodeStore for OrmStorage {
    async fn store_auth_code(&self, new: NewAuthCode) -> StoreResult<AuthCode> {
        let model = auth_code::ActiveModel {
            code: Set(new.code),
            client_id: Set(new.client_id),
            user_id: Set(new.user_id),
            redirect_uri: Set(new.redirect_uri),
            scopes: Set(codec::encode_set(&new.scopes)?),
            code_challenge: Set(new.code_challenge),
            code_challenge_method: Set(new.code_challenge_method),
            expires_at: Set(codec::to_timestamp(new.expires_at)),
            created_at: Set(codec::now()),
            consumed: Set(false),
            ..Default::default()
        }
        .insert(self.conn()?)
        .await
        .map_err(|e| {
            StoreError::on_insert(e, || "authorization code already stored".to_string())
        })?;

        AuthCode::try_from(model)
    }

    async fn consume_auth_code(&self, code: &str) -> StoreResult<Option<AuthCode>> {
        use auth_code::{Column, Entity};

        let now = codec::now();
        let txn = self.conn()?.begin().await?;

        // The conditional flip is the test-and-set; only one caller can match.
        let flipped = Entity::update_many()
            .col_expr(Column::Consumed, Expr::value(true))
            .filter(Column::Code.eq(code))
            .filter(Column::Consumed.eq(false))
            .filter(Column::ExpiresAt.gt(now))
            .exec(&txn)
            .await?
            .rows_affected;

        match flipped {
            0 => {
                txn.rollback().await?;
                tracing::debug!("Authorization code not consumable");
                return Ok(None);
            }
            1 => {}
            n => {
                txn.rollback().await?;
                return Err(StoreError::invariant(format!(
                    "consuming one authorization code matched {n} rows"
                )));
            }
        }

        let model = Entity::find()
            .filter(Column::Code.eq(code))
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::invariant("consumed authorization code vanished"))?;
        let consumed = AuthCode::try_from(model)?;
        txn.commit().await?;

        Ok(Some(consumed))
    }

    async fn get_auth_code(&self, code: &str) -> StoreResult<Option<AuthCode>> {
        use auth_code::{Column, Entity};

        Entity::find()
            .filter(Column::Code.eq(code))
            .one(self.conn()?)
            .await?
            .map(AuthCode::try_from)
            .transpose()
    }

    async fn invalidate_auth_codes_for_client(&self, client_id: &str) -> StoreResult<u64> {
        use auth_code::{Column, Entity};

        let result = Entity::update_many()
            .col_expr(Column::Consumed, Expr::value(true))
            .filter(Column::ClientId.eq(client_id))
            .filter(Column::Consumed.eq(false))
            .exec(self.conn()?)
            .await?;

        tracing::info!(
            client_id,
            invalidated = result.rows_affected,
            "Invalidated authorization codes"
        );
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl RateLimiter for OrmStorage {
    async fn check_and_increment(
        &self,
        key: &str,
        window_seconds: u32,
        max_count: u32,
    ) -> StoreResult<RateLimitDecision> {
        use rate_limit::{Column, Entity};

        let now = codec::now();
        let txn = self.conn()?.begin().await?;

        // An already-elapsed placeholder; the restart branch below takes it.
        let placeholder = rate_limit::ActiveModel {
            key: Set(key.to_string()),
            count: Set(0),
            reset_at: Set(now),
            ..Default::default()
        };
        Entity::insert(placeholder)
            .on_conflict(OnConflict::column(Column::Key).do_nothing().to_owned())
            .exec_without_returning(&txn)
            .await?;

        // Lock the bucket before reading it.
        Entity::update_many()
            .col_expr(Column::Count, Expr::col(Column::Count).into())
            .filter(Column::Key.eq(key))
            .exec(&txn)
            .await?;

        let bucket = Entity::find()
            .filter(Column::Key.eq(key))
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::invariant(format!("rate-limit bucket '{key}' vanished")))?;

        let (count, reset_at) = if bucket.reset_at <= now {
            (1, codec::after_seconds(now, window_seconds))
        } else {
            (bucket.count + 1, bucket.reset_at)
        };
        let mut active = bucket.into_active_model();
        active.count = Set(count);
        active.reset_at = Set(reset_at);
        let bucket = active.update(&txn).await?;
        txn.commit().await?;

        let decision = codec::rate_limit_decision(&bucket, max_count)?;
        if !decision.allowed {
            tracing::debug!(key, count = decision.count, max_count, "Rate limit exceeded");
        }
        Ok(decision)
    }

    async fn reset_rate_limit(&self, key: &str) -> StoreResult<bool> {
        use rate_limit::{Column, Entity};

        let result = Entity::delete_many()
            .filter(Column::Key.eq(key))
            .exec(self.conn()?)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl ConsentStore for OrmStorage {
    async fn store_consent(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: ScopeSet,
    ) -> StoreResult<()> {
        use consent::{Column, Entity};

        let now = codec::now();
        let txn = self.conn()?.begin().await?;

        let first_grant = consent::ActiveModel {
            user_id: Set(user_id.to_string()),
            client_id: Set(client_id.to_string()),
            scopes: Set(codec::encode_set(&scopes)?),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let inserted = Entity::insert(first_grant)
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::ClientId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            // Touching updated_at also takes the row lock for the merge.
            Entity::update_many()
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::UserId.eq(user_id))
                .filter(Column::ClientId.eq(client_id))
                .exec(&txn)
                .await?;

            let existing = Entity::find()
                .filter(Column::UserId.eq(user_id))
                .filter(Column::ClientId.eq(client_id))
                .one(&txn)
                .await?
                .ok_or_else(|| StoreError::invariant("consent row vanished during merge"))?;

            let mut merged = codec::decode_set("scopes", &existing.scopes)?;
            let before = merged.len();
            merged.extend(scopes);
            if merged.len() != before {
                let mut active = existing.into_active_model();
                active.scopes = Set(codec::encode_set(&merged)?);
                active.update(&txn).await?;
            }
        }

        txn.commit().await?;
        tracing::debug!(user_id, client_id, first_grant = inserted > 0, "Stored consent");
        Ok(())
    }

    async fn get_consent(&self, user_id: &str, client_id: &str) -> StoreResult<Option<ScopeSet>> {
        use consent::{Column, Entity};

        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ClientId.eq(client_id))
            .one(self.conn()?)
            .await?
            .map(|model| codec::decode_set("scopes", &model.scopes))
            .transpose()
    }

    async fn revoke_consent(&self, user_id: &str, client_id: &str) -> StoreResult<bool> {
        use consent::{Column, Entity};

        let result = Entity::delete_many()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ClientId.eq(client_id))
            .exec(self.conn()?)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn list_consents_by_user(&self, user_id: &str) -> StoreResult<Vec<Consent>> {
        use consent::{Column, Entity};

        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_asc(Column::ClientId)
            .all(self.conn()?)
            .await?
            .into_iter()
            .map(Consent::try_from)
            .collect()
    }
}

#[async_trait]
impl StorageAdapter for OrmStorage {
    async fn initialize(&self) -> StoreResult<()> {
        migration::Migrator::up(self.conn()?, None).await?;
        tracing::info!(engine = self.engine_name(), "Schema ready");
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

        let tokens = token::Entity::delete_many()
            .filter(token::Column::ExpiresAt.lte(now))
            .exec(&txn)
            .await?
            .rows_affected;
        let auth_codes = auth_code::Entity::delete_many()
            .filter(auth_code::Column::ExpiresAt.lte(now))
            .exec(&txn)
            .await?
            .rows_affected;
        let rate_limits = rate_limit::Entity::delete_many()
            .filter(rate_limit::Column::ResetAt.lte(now))
            .exec(&txn)
            .await?
            .rows_affected;

        txn.commit().await?;

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
        "orm"
    }
}

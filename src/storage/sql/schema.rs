//! Embedded DDL for the raw engine.
//!
//! Tables, columns and index names match the `migration` crate exactly, so
//! either engine can open a database the other one created. Every
//! timestamp column holds Unix milliseconds.

use super::dialect::Dialect;

/// `@ID` and `@BOOL` are replaced per dialect.
const TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "users" (
        "id" @ID,
        "email" varchar NOT NULL UNIQUE,
        "name" varchar,
        "created_at" bigint NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "oauth_clients" (
        "id" @ID,
        "client_id" varchar NOT NULL UNIQUE,
        "client_secret_hash" varchar,
        "name" varchar NOT NULL,
        "redirect_uris" text NOT NULL,
        "grant_types" text NOT NULL,
        "scopes" text NOT NULL,
        "is_confidential" @BOOL NOT NULL DEFAULT TRUE,
        "owner_id" varchar NOT NULL,
        "is_active" @BOOL NOT NULL DEFAULT TRUE,
        "created_at" bigint NOT NULL,
        "updated_at" bigint NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "oauth_tokens" (
        "id" @ID,
        "token" varchar NOT NULL UNIQUE,
        "token_type" varchar NOT NULL,
        "client_id" varchar NOT NULL,
        "user_id" varchar,
        "scopes" text NOT NULL,
        "expires_at" bigint NOT NULL,
        "created_at" bigint NOT NULL,
        "is_revoked" @BOOL NOT NULL DEFAULT FALSE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "oauth_auth_codes" (
        "id" @ID,
        "code" varchar NOT NULL UNIQUE,
        "client_id" varchar NOT NULL,
        "user_id" varchar NOT NULL,
        "redirect_uri" text NOT NULL,
        "scopes" text NOT NULL,
        "code_challenge" varchar,
        "code_challenge_method" varchar,
        "expires_at" bigint NOT NULL,
        "created_at" bigint NOT NULL,
        "consumed" @BOOL NOT NULL DEFAULT FALSE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "oauth_consents" (
        "id" @ID,
        "user_id" varchar NOT NULL,
        "client_id" varchar NOT NULL,
        "scopes" text NOT NULL,
        "created_at" bigint NOT NULL,
        "updated_at" bigint NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "oauth_rate_limits" (
        "id" @ID,
        "key" varchar NOT NULL UNIQUE,
        "count" bigint NOT NULL DEFAULT 0,
        "reset_at" bigint NOT NULL
    )"#,
];

const INDEXES: &[&str] = &[
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_clients_owner_id" ON "oauth_clients" ("owner_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_tokens_client_id" ON "oauth_tokens" ("client_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_tokens_user_id" ON "oauth_tokens" ("user_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_tokens_expires_at" ON "oauth_tokens" ("expires_at")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_auth_codes_expires_at" ON "oauth_auth_codes" ("expires_at")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_auth_codes_client_id" ON "oauth_auth_codes" ("client_id")"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_oauth_consents_user_client" ON "oauth_consents" ("user_id", "client_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_consents_client_id" ON "oauth_consents" ("client_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_oauth_rate_limits_reset_at" ON "oauth_rate_limits" ("reset_at")"#,
];

/// Every statement needed to bring an empty database up to date, in order.
pub fn statements(dialect: Dialect) -> Vec<String> {
    let (id, boolean) = match dialect {
        Dialect::Sqlite => ("integer NOT NULL PRIMARY KEY AUTOINCREMENT", "boolean"),
        Dialect::Postgres => ("serial NOT NULL PRIMARY KEY", "bool"),
    };

    TABLES
        .iter()
        .map(|ddl| ddl.replace("@ID", id).replace("@BOOL", boolean))
        .chain(INDEXES.iter().map(|ddl| ddl.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_placeholder_is_substituted() {
        for dialect in [Dialect::Sqlite, Dialect::Postgres] {
            for ddl in statements(dialect) {
                assert!(!ddl.contains('@'), "{dialect:?}: {ddl}");
                assert!(ddl.contains("IF NOT EXISTS"));
            }
        }
    }

    #[test]
    fn test_tables_precede_indexes() {
        let ddl = statements(Dialect::Sqlite);
        let first_index = ddl
            .iter()
            .position(|s| s.contains("INDEX"))
            .expect("no index statements");
        assert!(ddl[..first_index].iter().all(|s| s.starts_with("CREATE TABLE")));
        assert_eq!(ddl.len(), TABLES.len() + INDEXES.len());
    }
}

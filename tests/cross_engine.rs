//! Both engines share one schema: whatever one writes, the other reads.

mod helpers;

use helpers::{AuthCodeBuilder, ClientBuilder, TestDb, TokenBuilder};
use tessera::settings::Engine;
use tessera::storage::scope_set;

#[tokio::test]
async fn test_sql_engine_reads_orm_rows() {
    let db = TestDb::new(Engine::Orm).await;
    let orm = db.store();
    let sql = db.reopen(Engine::Sql).await;
    assert_eq!(orm.engine_name(), "orm");
    assert_eq!(sql.engine_name(), "sql");

    let client = ClientBuilder::new("shared").create(orm.as_ref()).await;
    assert_eq!(sql.get_client("shared").await.unwrap(), Some(client));

    let token = TokenBuilder::new("shared").create(orm.as_ref()).await;
    assert_eq!(sql.get_token(&token.token).await.unwrap(), Some(token));

    orm.store_consent("alice", "shared", scope_set(["openid"]))
        .await
        .unwrap();
    sql.store_consent("alice", "shared", scope_set(["email"]))
        .await
        .unwrap();
    assert_eq!(
        orm.get_consent("alice", "shared").await.unwrap(),
        Some(scope_set(["email", "openid"]))
    );
}

#[tokio::test]
async fn test_orm_engine_opens_sql_schema() {
    // Embedded DDL first, then the migrations over the same file
    let db = TestDb::new(Engine::Sql).await;
    let sql = db.store();
    let orm = db.reopen(Engine::Orm).await;

    let code = AuthCodeBuilder::new("shared")
        .with_pkce("challenge", "S256")
        .create(sql.as_ref())
        .await;
    let consumed = orm
        .consume_auth_code(&code.code)
        .await
        .unwrap()
        .expect("code written by the sql engine is consumable");
    assert_eq!(consumed.code_challenge.as_deref(), Some("challenge"));
    assert!(sql.consume_auth_code(&code.code).await.unwrap().is_none());

    // Rate-limit buckets are shared state too
    assert_eq!(sql.check_and_increment("k", 60, 2).await.unwrap().count, 1);
    assert_eq!(orm.check_and_increment("k", 60, 2).await.unwrap().count, 2);
    assert!(!sql.check_and_increment("k", 60, 2).await.unwrap().allowed);
}

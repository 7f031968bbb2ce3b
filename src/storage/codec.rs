//! Marshalling between domain collections/timestamps and their stored form.
//!
//! List and set columns hold JSON arrays of strings. Timestamps are Unix
//! milliseconds. Anything that does not decode is an invariant violation: the rows
//! were written by something other than these engines.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

use super::model::{AuthCode, Client, Consent, RateLimitDecision, Token, TokenKind};
use crate::entities::{auth_code, client, consent, rate_limit, token};
use crate::errors::{StoreError, StoreResult};

pub fn encode_list(values: &[String]) -> StoreResult<String> {
    Ok(serde_json::to_string(values)?)
}

pub fn encode_set(values: &BTreeSet<String>) -> StoreResult<String> {
    Ok(serde_json::to_string(values)?)
}

pub fn decode_list(column: &str, raw: &str) -> StoreResult<Vec<String>> {
    decode(column, raw)
}

pub fn decode_set(column: &str, raw: &str) -> StoreResult<BTreeSet<String>> {
    decode(column, raw)
}

fn decode<T: DeserializeOwned>(column: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| {
        StoreError::invariant(format!("column '{column}' holds malformed JSON: {e}"))
    })
}

pub fn to_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_timestamp(column: &str, millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::invariant(format!("column '{column}' out of range: {millis}")))
}

/// Current time at storage precision.
pub fn now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Stored timestamp `seconds` after `at`.
pub fn after_seconds(at: i64, seconds: u32) -> i64 {
    at.saturating_add(i64::from(seconds) * 1000)
}

impl TryFrom<client::Model> for Client {
    type Error = StoreError;

    fn try_from(model: client::Model) -> StoreResult<Self> {
        Ok(Client {
            redirect_uris: decode_list("redirect_uris", &model.redirect_uris)?,
            grant_types: decode_set("grant_types", &model.grant_types)?,
            scopes: decode_set("scopes", &model.scopes)?,
            created_at: from_timestamp("created_at", model.created_at)?,
            updated_at: from_timestamp("updated_at", model.updated_at)?,
            client_id: model.client_id,
            client_secret_hash: model.client_secret_hash,
            name: model.name,
            is_confidential: model.is_confidential,
            owner_id: model.owner_id,
            is_active: model.is_active,
        })
    }
}

impl TryFrom<token::Model> for Token {
    type Error = StoreError;

    fn try_from(model: token::Model) -> StoreResult<Self> {
        Ok(Token {
            scopes: decode_set("scopes", &model.scopes)?,
            expires_at: from_timestamp("expires_at", model.expires_at)?,
            created_at: from_timestamp("created_at", model.created_at)?,
            kind: TokenKind::from(model.token_type),
            token: model.token,
            client_id: model.client_id,
            user_id: model.user_id,
            is_revoked: model.is_revoked,
        })
    }
}

impl TryFrom<auth_code::Model> for AuthCode {
    type Error = StoreError;

    fn try_from(model: auth_code::Model) -> StoreResult<Self> {
        Ok(AuthCode {
            scopes: decode_set("scopes", &model.scopes)?,
            expires_at: from_timestamp("expires_at", model.expires_at)?,
            created_at: from_timestamp("created_at", model.created_at)?,
            code: model.code,
            client_id: model.client_id,
            user_id: model.user_id,
            redirect_uri: model.redirect_uri,
            code_challenge: model.code_challenge,
            code_challenge_method: model.code_challenge_method,
            consumed: model.consumed,
        })
    }
}

impl TryFrom<consent::Model> for Consent {
    type Error = StoreError;

    fn try_from(model: consent::Model) -> StoreResult<Self> {
        Ok(Consent {
            scopes: decode_set("scopes", &model.scopes)?,
            created_at: from_timestamp("created_at", model.created_at)?,
            updated_at: from_timestamp("updated_at", model.updated_at)?,
            user_id: model.user_id,
            client_id: model.client_id,
        })
    }
}

/// Judge a bucket as it stands after this call's increment.
pub fn rate_limit_decision(
    bucket: &rate_limit::Model,
    max_count: u32,
) -> StoreResult<RateLimitDecision> {
    let count = u64::try_from(bucket.count).map_err(|_| {
        StoreError::invariant(format!(
            "rate-limit bucket '{}' has negative count {}",
            bucket.key, bucket.count
        ))
    })?;
    let reset_at = from_timestamp("reset_at", bucket.reset_at)?;
    Ok(RateLimitDecision::from_bucket(count, reset_at, max_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_encoding_is_sorted() {
        let set: BTreeSet<String> = ["write", "read", "admin"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(encode_set(&set).unwrap(), r#"["admin","read","write"]"#);
    }

    #[test]
    fn test_list_keeps_order_and_duplicates() {
        let uris = vec![
            "https://b.example/cb".to_string(),
            "https://a.example/cb".to_string(),
            "https://b.example/cb".to_string(),
        ];
        let raw = encode_list(&uris).unwrap();
        assert_eq!(decode_list("redirect_uris", &raw).unwrap(), uris);
    }

    #[test]
    fn test_malformed_encodings_are_invariant_violations() {
        for raw in ["", "read write", "{\"a\":1}", "[1,2]", "[\"a\""] {
            let err = decode_set("scopes", raw).unwrap_err();
            assert!(err.is_invariant_violation(), "accepted {raw:?}");
            assert!(err.to_string().contains("scopes"));
        }
    }

    #[test]
    fn test_timestamp_keeps_milliseconds() {
        let at = DateTime::from_timestamp(1_700_000_000, 600_700_000).unwrap();
        let stored = to_timestamp(at);
        assert_eq!(stored, 1_700_000_000_600);
        assert_eq!(
            from_timestamp("expires_at", stored).unwrap(),
            DateTime::from_timestamp(1_700_000_000, 600_000_000).unwrap()
        );
    }

    #[test]
    fn test_window_end_is_in_milliseconds() {
        assert_eq!(after_seconds(1_700_000_000_250, 60), 1_700_000_060_250);
        assert_eq!(after_seconds(5, 0), 5);
    }

    #[test]
    fn test_client_row_with_bad_scopes_is_rejected() {
        let row = client::Model {
            id: 1,
            client_id: "c1".into(),
            client_secret_hash: None,
            name: "Test".into(),
            redirect_uris: "[]".into(),
            grant_types: r#"["authorization_code"]"#.into(),
            scopes: "read write".into(),
            is_confidential: false,
            owner_id: "o1".into(),
            is_active: true,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        };
        let err = Client::try_from(row).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_token_row_decodes_kind() {
        let row = token::Model {
            id: 7,
            token: "tok".into(),
            token_type: "refresh".into(),
            client_id: "c1".into(),
            user_id: Some("u1".into()),
            scopes: r#"["offline_access"]"#.into(),
            expires_at: 1_700_003_600_500,
            created_at: 1_700_000_000_000,
            is_revoked: false,
        };
        let token = Token::try_from(row).unwrap();
        assert_eq!(token.kind, TokenKind::Refresh);
        assert!(token.scopes.contains("offline_access"));
        assert_eq!(token.expires_at.timestamp_millis(), 1_700_003_600_500);
    }

    #[test]
    fn test_negative_bucket_count_is_rejected() {
        let bucket = rate_limit::Model {
            id: 1,
            key: "login:1.2.3.4".into(),
            count: -1,
            reset_at: 1_700_000_060_000,
        };
        assert!(rate_limit_decision(&bucket, 5)
            .unwrap_err()
            .is_invariant_violation());
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let err = from_timestamp("expires_at", i64::MAX).unwrap_err();
        assert!(err.is_invariant_violation());
    }
}

use chrono::{DateTime, Duration, Utc};
use tessera::storage::{
    random_token, scope_set, AuthCode, Client, NewAuthCode, NewClient, NewToken, ScopeSet,
    StorageAdapter, Token, TokenKind,
};

/// Builder for creating test OAuth clients
pub struct ClientBuilder {
    client: NewClient,
}

impl ClientBuilder {
    pub fn new(client_id: &str) -> Self {
        Self {
            client: NewClient {
                client_id: client_id.to_string(),
                client_secret_hash: Some("$argon2id$v=19$test".to_string()),
                name: "Test Client".to_string(),
                redirect_uris: vec!["http://localhost:3000/callback".to_string()],
                grant_types: scope_set(["authorization_code", "refresh_token"]),
                scopes: scope_set(["openid", "profile"]),
                is_confidential: true,
                owner_id: "owner-1".to_string(),
                is_active: true,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.client.name = name.to_string();
        self
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.client.owner_id = owner_id.to_string();
        self
    }

    pub fn with_redirect_uris(mut self, uris: &[&str]) -> Self {
        self.client.redirect_uris = uris.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn public(mut self) -> Self {
        self.client.client_secret_hash = None;
        self.client.is_confidential = false;
        self
    }

    pub fn build(self) -> NewClient {
        self.client
    }

    pub async fn create(self, store: &dyn StorageAdapter) -> Client {
        store
            .create_client(self.client)
            .await
            .expect("Failed to create test client")
    }
}

/// Builder for creating test tokens
pub struct TokenBuilder {
    token: NewToken,
}

impl TokenBuilder {
    pub fn new(client_id: &str) -> Self {
        Self {
            token: NewToken {
                token: random_token(),
                kind: TokenKind::Access,
                client_id: client_id.to_string(),
                user_id: Some("user-1".to_string()),
                scopes: scope_set(["openid"]),
                expires_at: Utc::now() + Duration::hours(1),
            },
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token.token = token.to_string();
        self
    }

    pub fn with_kind(mut self, kind: TokenKind) -> Self {
        self.token.kind = kind;
        self
    }

    pub fn for_user(mut self, user_id: &str) -> Self {
        self.token.user_id = Some(user_id.to_string());
        self
    }

    pub fn without_user(mut self) -> Self {
        self.token.user_id = None;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.token.expires_at = at;
        self
    }

    pub fn expired(self) -> Self {
        self.expires_at(Utc::now() - Duration::minutes(10))
    }

    pub fn build(self) -> NewToken {
        self.token
    }

    pub async fn create(self, store: &dyn StorageAdapter) -> Token {
        store
            .store_token(self.token)
            .await
            .expect("Failed to store test token")
    }
}

/// Builder for creating test authorization codes
pub struct AuthCodeBuilder {
    code: NewAuthCode,
}

impl AuthCodeBuilder {
    pub fn new(client_id: &str) -> Self {
        Self {
            code: NewAuthCode {
                code: random_token(),
                client_id: client_id.to_string(),
                user_id: "user-1".to_string(),
                redirect_uri: "http://localhost:3000/callback".to_string(),
                scopes: scope_set(["openid", "profile"]),
                code_challenge: None,
                code_challenge_method: None,
                expires_at: Utc::now() + Duration::minutes(5),
            },
        }
    }

    pub fn with_pkce(mut self, challenge: &str, method: &str) -> Self {
        self.code.code_challenge = Some(challenge.to_string());
        self.code.code_challenge_method = Some(method.to_string());
        self
    }

    pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
        self.code.scopes = scopes;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.code.expires_at = at;
        self
    }

    pub fn expired(self) -> Self {
        self.expires_at(Utc::now() - Duration::minutes(10))
    }

    pub fn build(self) -> NewAuthCode {
        self.code
    }

    pub async fn create(self, store: &dyn StorageAdapter) -> AuthCode {
        store
            .store_auth_code(self.code)
            .await
            .expect("Failed to store test authorization code")
    }
}

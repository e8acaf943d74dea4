//! # Layerpack Depot トークン検証
//!
//! Bearerトークン（HS256 JWT）の検証・発行を提供する。
//!
//! ## クレーム
//! | クレーム | 必須 | 用途 |
//! |---------|------|------|
//! | `sub` | ○ | 主体ID |
//! | `username` | - | 表示名（省略時は `sub`） |
//! | `roles` | - | ロール一覧（省略時は空） |
//! | `exp` | ○ | 有効期限（UNIX秒） |
//! | `iat` | - | 発行時刻（UNIX秒） |
//!
//! 検証はステートレスで、共有シークレットのみに依存する。

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use packdepot_types::Principal;
use serde::{Deserialize, Serialize};

/// トークン処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// 有効期限切れ
    #[error("token expired")]
    Expired,
    /// 署名不一致（改ざん・別シークレット）
    #[error("invalid signature")]
    InvalidSignature,
    /// JWTとして解釈できない、またはクレームが不正
    #[error("malformed token: {0}")]
    Malformed(String),
    /// 発行時のエンコード失敗
    #[error("failed to encode token: {0}")]
    Encode(String),
}

/// トークンに含まれるクレーム。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// 主体ID
    pub sub: String,
    /// 表示名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// ロール一覧
    #[serde(default)]
    pub roles: Vec<String>,
    /// 有効期限（UNIX秒）
    pub exp: u64,
    /// 発行時刻（UNIX秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

impl TokenClaims {
    /// 現在時刻から `ttl_secs` 秒有効なクレームを構築する。
    pub fn new(sub: &str, username: Option<&str>, roles: Vec<String>, ttl_secs: u64) -> Self {
        let now = unix_now();
        Self {
            sub: sub.to_string(),
            username: username.map(str::to_string),
            roles,
            exp: now + ttl_secs,
            iat: Some(now),
        }
    }

    /// クレームから認証主体を構築する。
    pub fn into_principal(self) -> Principal {
        Principal {
            username: self.username.unwrap_or_else(|| self.sub.clone()),
            subject_id: self.sub,
            roles: self.roles.into_iter().collect(),
        }
    }
}

/// トークン検証の抽象インターフェース。
///
/// Gatewayはこのトレイト経由でのみトークンを検証するため、
/// テストでは任意の実装に差し替えられる。
pub trait TokenVerifier: Send + Sync {
    /// 署名と有効期限を検証し、クレームを返す。
    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

/// 共有シークレットによるHS256検証器。
pub struct Hs256Verifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256Verifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenVerifier for Hs256Verifier {
    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

/// HS256でトークンを発行する。
pub fn issue_token(secret: &[u8], claims: &TokenClaims) -> Result<String, TokenError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| TokenError::Encode(e.to_string()))
}

/// 現在のUNIX秒。時計が1970年以前を指す環境では0を返す。
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    /// 発行したトークンが同じシークレットで検証できることを確認
    #[test]
    fn test_issue_and_verify() {
        let claims = TokenClaims::new("user-1", Some("alice"), vec!["ADMIN".to_string()], 3600);
        let token = issue_token(SECRET, &claims).unwrap();

        let verified = Hs256Verifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(verified, claims);

        let principal = verified.into_principal();
        assert_eq!(principal.subject_id, "user-1");
        assert_eq!(principal.username, "alice");
        assert!(principal.has_role("ADMIN"));
    }

    /// usernameがない場合はsubが表示名になることを確認
    #[test]
    fn test_username_falls_back_to_subject() {
        let claims = TokenClaims::new("user-2", None, vec![], 60);
        assert_eq!(claims.into_principal().username, "user-2");
    }

    /// 別シークレットで署名されたトークンが拒否されることを確認
    #[test]
    fn test_wrong_secret_rejected() {
        let claims = TokenClaims::new("user-1", None, vec![], 3600);
        let token = issue_token(b"other-secret", &claims).unwrap();

        let result = Hs256Verifier::new(SECRET).verify(&token);
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    /// 期限切れトークンが拒否されることを確認（leewayを十分超える過去）
    #[test]
    fn test_expired_rejected() {
        let mut claims = TokenClaims::new("user-1", None, vec![], 0);
        claims.exp = unix_now() - 3600;
        let token = issue_token(SECRET, &claims).unwrap();

        let result = Hs256Verifier::new(SECRET).verify(&token);
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_garbage_rejected() {
        let result = Hs256Verifier::new(SECRET).verify("not-a-jwt");
        assert!(matches!(result, Err(TokenError::Malformed(_))));
    }
}

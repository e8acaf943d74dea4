//! # Gateway認証
//!
//! `Authorization: Bearer <token>` ヘッダーからトークンを取り出し、
//! `TokenVerifier` で検証して認証主体を得る。ロール判定もここで行う。

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use packdepot_crypto::{TokenError, TokenVerifier};
use packdepot_types::Principal;

use crate::error::GatewayError;

/// Bearerスキーム（大文字小文字を区別する）
const BEARER_PREFIX: &str = "Bearer ";

/// 認証エラー型。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// ヘッダー欠落、またはBearer形式でない
    #[error("missing bearer token")]
    MissingToken,
    /// 署名・有効期限・ペイロードの検証失敗
    #[error("invalid token: {0}")]
    InvalidToken(#[source] TokenError),
}

impl AuthError {
    /// 診断用の失敗理由。レスポンスの `detail` に載る。
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// リクエストヘッダーから `Authorization` の値を取り出す。
/// 非ASCII等で文字列化できない値は欠落とみなす。
pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// `Bearer <token>` からトークン部分を取り出す。
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let token = header
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .ok_or(AuthError::MissingToken)?;

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// トークンを検証し、認証主体を返す。副作用はない。
pub fn authenticate(
    verifier: &dyn TokenVerifier,
    header: Option<&str>,
) -> Result<Principal, AuthError> {
    let token = extract_bearer_token(header)?;
    let claims = verifier.verify(token).map_err(|e| {
        tracing::warn!(reason = %e, "トークン検証に失敗");
        AuthError::InvalidToken(e)
    })?;
    Ok(claims.into_principal())
}

/// 主体が指定ロールを持つか（完全一致）。
pub fn has_role(principal: &Principal, role: &str) -> bool {
    principal.has_role(role)
}

/// 指定ロールを要求する。持たない場合は403。
pub fn require_role(principal: &Principal, role: &'static str) -> Result<(), GatewayError> {
    if has_role(principal, role) {
        return Ok(());
    }
    tracing::info!(
        subject = %principal.subject_id,
        required = role,
        "必要なロールがありません"
    );
    Err(GatewayError::Forbidden(role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use packdepot_crypto::{issue_token, Hs256Verifier, TokenClaims};
    use packdepot_types::ROLE_ADMIN;

    const SECRET: &[u8] = b"auth-test-secret";

    fn bearer(claims: &TokenClaims) -> String {
        format!("Bearer {}", issue_token(SECRET, claims).unwrap())
    }

    #[test]
    fn test_missing_header() {
        let verifier = Hs256Verifier::new(SECRET);
        let result = authenticate(&verifier, None);
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }

    /// スキームは大文字小文字を区別し、空トークンも欠落扱い
    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            extract_bearer_token(Some("bearer abc")),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            extract_bearer_token(Some("Basic dXNlcjpwYXNz")),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            extract_bearer_token(Some("Bearer ")),
            Err(AuthError::MissingToken)
        ));
        assert_eq!(extract_bearer_token(Some("Bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn test_valid_token_yields_principal() {
        let verifier = Hs256Verifier::new(SECRET);
        let claims = TokenClaims::new(
            "user-42",
            Some("bob"),
            vec!["USER".to_string(), ROLE_ADMIN.to_string()],
            600,
        );
        let header = bearer(&claims);

        let principal = authenticate(&verifier, Some(&header)).unwrap();
        assert_eq!(principal.subject_id, "user-42");
        assert_eq!(principal.username, "bob");
        assert_eq!(principal.roles.len(), 2);
        assert!(has_role(&principal, ROLE_ADMIN));
    }

    /// 別シークレットで署名されたトークンはInvalidTokenになり、理由が保持される
    #[test]
    fn test_forged_token() {
        let verifier = Hs256Verifier::new(SECRET);
        let claims = TokenClaims::new("user-1", None, vec![ROLE_ADMIN.to_string()], 600);
        let header = format!("Bearer {}", issue_token(b"forged", &claims).unwrap());

        let err = authenticate(&verifier, Some(&header)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenError::InvalidSignature)));
        assert!(err.reason().contains("invalid signature"));
    }

    #[test]
    fn test_require_role() {
        let principal = TokenClaims::new("user-1", None, vec!["USER".to_string()], 600)
            .into_principal();
        let err = require_role(&principal, ROLE_ADMIN).unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden("ADMIN")));
    }
}

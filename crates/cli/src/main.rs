//! # Layerpack Depot CLI
//!
//! 運用者向けのトークン管理ツール。Gatewayと同じ共有シークレットで
//! Bearerトークンを発行・検証する。
//!
//! ## コマンド
//! - `issue-token`: 主体のトークンを発行
//! - `verify-token`: トークンを検証し、主体をJSONで表示
//! - `generate-secret`: ランダムな共有シークレットを生成

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use packdepot_crypto::{issue_token, Hs256Verifier, TokenClaims, TokenVerifier};
use rand::RngCore;

/// トークンの既定有効期間（秒）
const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Parser)]
#[command(name = "packdepot")]
#[command(about = "Layerpack Depot operator CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SecretArgs {
    /// Shared HS256 secret (same value as the gateway's JWT_SECRET)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a bearer token for a principal
    IssueToken {
        /// Subject id (`sub` claim)
        #[arg(long)]
        sub: String,

        /// Display name (defaults to the subject id on the gateway)
        #[arg(long)]
        username: Option<String>,

        /// Role to grant; repeat for several roles
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = DEFAULT_TTL_SECS)]
        ttl: u64,

        #[command(flatten)]
        secret: SecretArgs,
    },
    /// Verify a token and print the resulting principal as JSON
    VerifyToken {
        /// Token to verify (with or without the `Bearer ` prefix)
        token: String,

        #[command(flatten)]
        secret: SecretArgs,
    },
    /// Generate a random shared secret (hex)
    GenerateSecret {
        /// Secret length in bytes
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::IssueToken {
            sub,
            username,
            roles,
            ttl,
            secret,
        } => {
            let token = issue(&secret.secret, &sub, username.as_deref(), roles, ttl)?;
            println!("{token}");
        }
        Commands::VerifyToken { token, secret } => {
            let principal = verify(&secret.secret, &token)?;
            println!("{}", serde_json::to_string_pretty(&principal)?);
        }
        Commands::GenerateSecret { bytes } => {
            println!("{}", generate_secret(bytes)?);
        }
    }

    Ok(())
}

fn issue(
    secret: &str,
    sub: &str,
    username: Option<&str>,
    roles: Vec<String>,
    ttl: u64,
) -> Result<String> {
    if sub.trim().is_empty() {
        anyhow::bail!("--sub must not be empty");
    }
    let claims = TokenClaims::new(sub, username, roles, ttl);
    issue_token(secret.as_bytes(), &claims).context("failed to issue token")
}

fn verify(secret: &str, token: &str) -> Result<packdepot_types::Principal> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    let claims = Hs256Verifier::new(secret.as_bytes())
        .verify(token)
        .context("token rejected")?;
    Ok(claims.into_principal())
}

fn generate_secret(len: usize) -> Result<String> {
    if len < 16 {
        anyhow::bail!("secret must be at least 16 bytes");
    }
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use packdepot_types::ROLE_ADMIN;

    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let token = issue(
            "cli-secret",
            "admin-1",
            Some("Admin"),
            vec![ROLE_ADMIN.to_string()],
            600,
        )
        .unwrap();

        let principal = verify("cli-secret", &format!("Bearer {token}")).unwrap();
        assert_eq!(principal.subject_id, "admin-1");
        assert_eq!(principal.username, "Admin");
        assert!(principal.has_role(ROLE_ADMIN));

        assert!(verify("other-secret", &token).is_err());
    }

    #[test]
    fn test_issue_rejects_empty_subject() {
        assert!(issue("s", "  ", None, vec![], 60).is_err());
    }

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret(32).unwrap();
        assert_eq!(secret.len(), 64);
        assert!(hex::decode(&secret).is_ok());
        assert_ne!(secret, generate_secret(32).unwrap());
        assert!(generate_secret(8).is_err());
    }

    #[test]
    fn test_cli_parses_repeated_roles() {
        let cli = Cli::try_parse_from([
            "packdepot",
            "issue-token",
            "--sub",
            "u1",
            "--role",
            "ADMIN",
            "--role",
            "EDITOR",
            "--secret",
            "s",
        ])
        .unwrap();
        match cli.command {
            Commands::IssueToken { roles, ttl, .. } => {
                assert_eq!(roles, vec!["ADMIN", "EDITOR"]);
                assert_eq!(ttl, DEFAULT_TTL_SECS);
            }
            _ => panic!("unexpected command"),
        }
    }
}

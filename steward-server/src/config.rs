use anyhow::{anyhow, Context, Result};
use ed25519_dalek::VerifyingKey;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use steward_core::UserId;

use crate::orchestrator::Timing;

#[derive(Clone)]
pub struct Config {
    pub discord_bot_token: String,
    pub discord_application_id: u64,
    /// Key the platform signs interaction requests with.
    pub discord_public_key: VerifyingKey,
    pub port: u16,
    /// Directory for the SQLite document store.
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Optional bearer token for the `/api` dashboard routes.
    /// If not set, those routes are disabled (503).
    pub dashboard_auth_token: Option<String>,
    /// Owners configured by the operator, merged into the persisted set.
    pub owner_ids: Vec<UserId>,
    pub timing: Timing,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discord_bot_token = env::var("DISCORD_BOT_TOKEN")
            .context("DISCORD_BOT_TOKEN environment variable is required")?;

        let discord_application_id = env::var("DISCORD_APPLICATION_ID")
            .context("DISCORD_APPLICATION_ID environment variable is required")?
            .parse::<u64>()
            .context("DISCORD_APPLICATION_ID must be a valid number")?;

        let discord_public_key = parse_public_key(
            &env::var("DISCORD_PUBLIC_KEY")
                .context("DISCORD_PUBLIC_KEY environment variable is required")?,
        )
        .context("DISCORD_PUBLIC_KEY must be a hex-encoded Ed25519 public key")?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let dashboard_auth_token = parse_auth_token(env::var("DASHBOARD_AUTH_TOKEN").ok());

        let owner_ids = parse_owner_ids(&env::var("OWNER_IDS").unwrap_or_default())
            .context("OWNER_IDS must be a comma-separated list of user ids")?;

        let timing = Timing {
            review_idle_timeout: parse_seconds(
                "APPLICATION_STATE_TIMEOUT",
                env::var("APPLICATION_STATE_TIMEOUT").ok(),
                3600,
            )?,
            sweep_interval: parse_seconds(
                "CLEAR_OLD_STATES_INTERVAL",
                env::var("CLEAR_OLD_STATES_INTERVAL").ok(),
                60,
            )?,
            muster_cleanup_delay: parse_seconds(
                "MUSTER_CLEANUP_DELAY",
                env::var("MUSTER_CLEANUP_DELAY").ok(),
                5,
            )?,
        };

        Ok(Config {
            discord_bot_token,
            discord_application_id,
            discord_public_key,
            port,
            state_dir,
            dashboard_auth_token,
            owner_ids,
            timing,
        })
    }
}

/// Returns None if the value is missing, empty, or contains only whitespace,
/// so an empty token never grants access.
pub fn parse_auth_token(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Parse a comma-separated id list. Blank entries are skipped.
pub fn parse_owner_ids(value: &str) -> Result<Vec<UserId>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<UserId>()
                .map_err(|_| anyhow!("`{}` is not a user id", id))
        })
        .collect()
}

pub fn parse_public_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = hex::decode(hex_key.trim())
        .context("public key is not valid hex")?
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow!("public key must be 32 bytes, got {}", bytes.len()))?;
    VerifyingKey::from_bytes(&bytes).context("public key is not a valid Ed25519 point")
}

/// A whole number of seconds, falling back to `default` when unset.
/// Zero is rejected.
pub fn parse_seconds(name: &str, value: Option<String>, default: u64) -> Result<Duration> {
    let seconds = match value.filter(|s| !s.trim().is_empty()) {
        Some(text) => text
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds", name))?,
        None => default,
    };
    if seconds == 0 {
        return Err(anyhow!("{} must be greater than zero", name));
    }
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn test_parse_auth_token_none() {
        assert_eq!(parse_auth_token(None), None);
    }

    #[test]
    fn test_parse_auth_token_whitespace_only() {
        assert_eq!(parse_auth_token(Some("".to_string())), None);
        assert_eq!(parse_auth_token(Some("  \t".to_string())), None);
    }

    #[test]
    fn test_parse_auth_token_valid() {
        assert_eq!(
            parse_auth_token(Some("secret-token".to_string())),
            Some("secret-token".to_string())
        );
    }

    #[test]
    fn test_parse_owner_ids() {
        assert_eq!(
            parse_owner_ids(" 12, 34 ,,").unwrap(),
            vec![UserId(12), UserId(34)]
        );
        assert!(parse_owner_ids("").unwrap().is_empty());
        assert!(parse_owner_ids("12,abc").is_err());
    }

    #[test]
    fn test_parse_public_key() {
        let key = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        let parsed = parse_public_key(&hex::encode(key.to_bytes())).unwrap();
        assert_eq!(parsed, key);

        assert!(parse_public_key("zz").is_err());
        assert!(parse_public_key("abcd").is_err());
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(
            parse_seconds("X", None, 60).unwrap(),
            Duration::from_secs(60)
        );
        assert_eq!(
            parse_seconds("X", Some(" 90 ".into()), 60).unwrap(),
            Duration::from_secs(90)
        );
        assert!(parse_seconds("X", Some("0".into()), 60).is_err());
        assert!(parse_seconds("X", Some("-5".into()), 60).is_err());
    }
}

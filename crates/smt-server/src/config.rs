use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail};

use smt_api::session::DEFAULT_SESSION_TTL_SECS;
use smt_gateway::GatewayConfig;
use smt_gateway::registry::DEFAULT_OUTBOUND_QUEUE;
use smt_types::DEFAULT_REPLAY_LIMIT;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_secret: String,
    pub session_ttl_secs: u64,
    pub replay_limit: u32,
    pub outbound_queue: usize,
    pub static_dir: PathBuf,
}

impl ServerConfig {
    /// Read `SMT_*` variables from the process environment (after `.env`).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_secret = lookup("SMT_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("SMT_SESSION_SECRET is unset or still a placeholder");
        }

        Ok(Self {
            host: lookup("SMT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "SMT_PORT", 8080)?,
            db_path: lookup("SMT_DB_PATH").unwrap_or_else(|| "smt.db".into()).into(),
            session_secret,
            session_ttl_secs: parse_or(&lookup, "SMT_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
            replay_limit: parse_or(&lookup, "SMT_REPLAY_LIMIT", DEFAULT_REPLAY_LIMIT)?,
            outbound_queue: parse_or(&lookup, "SMT_OUTBOUND_QUEUE", DEFAULT_OUTBOUND_QUEUE)?,
            static_dir: lookup("SMT_STATIC_DIR")
                .unwrap_or_else(|| "./static".into())
                .into(),
        })
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            replay_limit: self.replay_limit,
            outbound_queue: self.outbound_queue,
            ..GatewayConfig::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

//! Server configuration sourced from environment variables.

use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone)]
pub struct GatekeepConfig {
    pub bind_addr: SocketAddr,
    /// HS256 signing secret shared by minting and verification.
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub token_leeway_secs: u64,
    /// Optional `email:password` pair provisioned as an admin at startup.
    pub seed_admin: Option<(String, String)>,
}

impl GatekeepConfig {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("GATEKEEP_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = match std::env::var("PORT") {
            Ok(v) => v.trim().parse().with_context(|| format!("parse PORT: {v}"))?,
            Err(_) => DEFAULT_PORT,
        };
        let bind_addr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("parse bind address {host}:{port}"))?;

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            return Err(anyhow!("JWT_SECRET is not defined in configuration"));
        }

        let token_ttl = match std::env::var("JWT_EXPIRES_IN") {
            Ok(v) => parse_ttl(&v).with_context(|| format!("parse JWT_EXPIRES_IN: {v}"))?,
            Err(_) => DEFAULT_TOKEN_TTL,
        };
        let token_leeway_secs = match std::env::var("GATEKEEP_TOKEN_LEEWAY_SECS") {
            Ok(v) => v.trim().parse().with_context(|| "parse GATEKEEP_TOKEN_LEEWAY_SECS")?,
            Err(_) => 0,
        };
        let seed_admin = match std::env::var("GATEKEEP_SEED_ADMIN") {
            Ok(v) if !v.trim().is_empty() => {
                let (email, password) = v
                    .split_once(':')
                    .ok_or_else(|| anyhow!("GATEKEEP_SEED_ADMIN must be email:password"))?;
                Some((email.trim().to_string(), password.to_string()))
            }
            _ => None,
        };

        Ok(Self { bind_addr, jwt_secret, token_ttl, token_leeway_secs, seed_admin })
    }
}

/// Parse a token lifetime: plain seconds (`3600`) or a humantime span (`90s`, `15m`, `2h`, `7d`, `1h 30m`).
pub fn parse_ttl(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() { return Err(anyhow!("empty duration")); }
    let ttl = if s.bytes().all(|b| b.is_ascii_digit()) {
        Duration::from_secs(s.parse::<u64>().with_context(|| format!("invalid duration: {raw}"))?)
    } else {
        humantime::parse_duration(s).with_context(|| format!("invalid duration: {raw}"))?
    };
    if ttl.is_zero() { return Err(anyhow!("duration must be positive")); }
    Ok(ttl)
}

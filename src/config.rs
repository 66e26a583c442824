//! Service configuration, read from the environment (and `.env`).

use crate::auth::jwt::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};
use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

#[derive(Clone)]
pub struct Config {
    pub bind_addr: String,
    pub auth_db_path: String,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub revocation_sweep_secs: u64,
    pub refresh_cookie_secure: bool,
}

// Secrets stay out of debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("auth_db_path", &self.auth_db_path)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("revocation_sweep_secs", &self.revocation_sweep_secs)
            .field("refresh_cookie_secure", &self.refresh_cookie_secure)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let access_secret = non_empty("JWT_SECRET").context("JWT_SECRET must be set")?;
        let refresh_secret =
            non_empty("JWT_REFRESH_SECRET").context("JWT_REFRESH_SECRET must be set")?;
        if access_secret == refresh_secret {
            bail!("JWT_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let auth_db_path = non_empty("AUTH_DB_PATH").unwrap_or_else(|| "sis_auth.db".to_string());

        let access_ttl_secs = parse_or(&non_empty, "ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_ttl_secs =
            parse_or(&non_empty, "REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?;
        if access_ttl_secs <= 0 || refresh_ttl_secs <= 0 {
            bail!("token lifetimes must be positive");
        }

        let bcrypt_cost = parse_or(&non_empty, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        let revocation_sweep_secs = parse_or(&non_empty, "REVOCATION_SWEEP_SECS", 60u64)?.max(1);

        let refresh_cookie_secure = non_empty("REFRESH_COOKIE_SECURE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false);

        Ok(Self {
            bind_addr,
            auth_db_path,
            access_secret,
            refresh_secret,
            access_ttl_secs,
            refresh_ttl_secs,
            bcrypt_cost,
            revocation_sweep_secs,
            refresh_cookie_secure,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Load `.env` from the working directory (and parents), then the crate root.
pub fn load_env() {
    let _ = dotenv::dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_vars(vars(&[("JWT_SECRET", "a"), ("JWT_REFRESH_SECRET", "b")])).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.auth_db_path, "sis_auth.db");
        assert_eq!(config.access_ttl_secs, 900);
        assert_eq!(config.refresh_ttl_secs, 604_800);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.revocation_sweep_secs, 60);
        assert!(!config.refresh_cookie_secure);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("JWT_SECRET", "a"),
            ("JWT_REFRESH_SECRET", "b"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("ACCESS_TOKEN_TTL_SECS", "60"),
            ("BCRYPT_COST", "4"),
            ("REFRESH_COOKIE_SECURE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.access_ttl_secs, 60);
        assert_eq!(config.bcrypt_cost, 4);
        assert!(config.refresh_cookie_secure);
    }

    #[test]
    fn test_secrets_required_and_distinct() {
        assert!(Config::from_vars(vars(&[("JWT_SECRET", "a")])).is_err());
        assert!(Config::from_vars(vars(&[("JWT_REFRESH_SECRET", "b")])).is_err());
        assert!(
            Config::from_vars(vars(&[("JWT_SECRET", "same"), ("JWT_REFRESH_SECRET", "same")]))
                .is_err()
        );
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let result = Config::from_vars(vars(&[
            ("JWT_SECRET", "a"),
            ("JWT_REFRESH_SECRET", "b"),
            ("ACCESS_TOKEN_TTL_SECS", "fifteen"),
        ]));
        assert!(result.is_err());

        let result = Config::from_vars(vars(&[
            ("JWT_SECRET", "a"),
            ("JWT_REFRESH_SECRET", "b"),
            ("REFRESH_TOKEN_TTL_SECS", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config::from_vars(vars(&[
            ("JWT_SECRET", "top-secret-access"),
            ("JWT_REFRESH_SECRET", "top-secret-refresh"),
        ]))
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("top-secret"));
    }
}

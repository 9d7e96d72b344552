//! Server configuration module
//! Handles token lifetimes, signing key material and maintenance intervals

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_HOST, DEFAULT_LOGIN_MIN_DURATION_MS, DEFAULT_PORT,
    DEFAULT_REFRESH_TOKEN_TTL_SECS, DEFAULT_SESSION_SWEEP_INTERVAL_SECS,
    DEFAULT_VERIFICATION_TTL_SECS, MAX_DURATION_SECS,
};
use crate::error::{CareHubError, Result};

const MIN_SECRET_LEN: usize = 32;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Symmetric key used to sign access and refresh tokens
    pub jwt_secret: Vec<u8>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// How often expired refresh tokens are swept from the session store
    pub session_sweep_interval: Duration,
    pub verification_ttl: Duration,
    /// Minimum wall-clock time spent on a login attempt, success or failure
    pub login_min_duration: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        panic!("ServerConfig::default() is not allowed for security reasons. Use ServerConfig::from_env() instead.");
    }
}

impl ServerConfig {
    /// Create a test configuration. Never use outside tests.
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            jwt_secret: b"test-jwt-key-only-for-unit-tests-never-use-in-production".to_vec(),
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            session_sweep_interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_INTERVAL_SECS),
            verification_ttl: Duration::from_secs(DEFAULT_VERIFICATION_TTL_SECS),
            login_min_duration: Duration::ZERO,
        }
    }

    /// Validate that a raw secret meets security requirements
    fn validate_secret(secret: &str) -> Result<()> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CareHubError::ConfigError(format!(
                "JWT secret must be at least {} characters long",
                MIN_SECRET_LEN
            )));
        }

        let insecure_patterns = [
            "your-secret-key",
            "change-this",
            "test-secret",
            "default",
            "secret",
            "password",
            "12345",
        ];

        for pattern in &insecure_patterns {
            if secret.contains(pattern) {
                return Err(CareHubError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Generate one with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CareHubError::ConfigError(
                "JWT secret should contain mixed characters (letters, numbers, symbols)".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve signing key bytes from either a base64 or a raw secret variable
    fn load_jwt_secret() -> Result<Vec<u8>> {
        if let Ok(encoded) = env::var("CAREHUB_JWT_SECRET_BASE64") {
            let decoded = BASE64.decode(encoded.trim()).map_err(|e| {
                CareHubError::ConfigError(format!("CAREHUB_JWT_SECRET_BASE64 is not valid base64: {}", e))
            })?;
            if decoded.len() < MIN_SECRET_LEN {
                return Err(CareHubError::ConfigError(format!(
                    "Decoded JWT key must be at least {} bytes",
                    MIN_SECRET_LEN
                )));
            }
            return Ok(decoded);
        }

        let raw = env::var("CAREHUB_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                CareHubError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_secret(&raw)?;
        Ok(raw.into_bytes())
    }

    fn secs_from_env(name: &str, default: u64) -> Result<Duration> {
        match env::var(name) {
            Ok(value) => value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| CareHubError::ConfigError(format!("{} must be a number of seconds", name))),
            Err(_) => Ok(Duration::from_secs(default)),
        }
    }

    /// Durations must be non-zero and no longer than MAX_DURATION_SECS
    fn check_duration(name: &str, value: Duration) -> Result<()> {
        if value.is_zero() {
            return Err(CareHubError::ConfigError(format!(
                "{} must be greater than zero",
                name
            )));
        }
        if value.as_secs() > MAX_DURATION_SECS {
            return Err(CareHubError::ConfigError(format!(
                "{} must not exceed {} seconds",
                name, MAX_DURATION_SECS
            )));
        }
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("CAREHUB_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("CAREHUB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let jwt_secret = Self::load_jwt_secret()?;

        let access_token_ttl =
            Self::secs_from_env("CAREHUB_ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TOKEN_TTL_SECS)?;
        let refresh_token_ttl =
            Self::secs_from_env("CAREHUB_REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TOKEN_TTL_SECS)?;
        let session_sweep_interval = Self::secs_from_env(
            "CAREHUB_SESSION_SWEEP_INTERVAL_SECS",
            DEFAULT_SESSION_SWEEP_INTERVAL_SECS,
        )?;
        let verification_ttl =
            Self::secs_from_env("CAREHUB_VERIFICATION_TTL_SECS", DEFAULT_VERIFICATION_TTL_SECS)?;

        let login_min_duration = env::var("CAREHUB_LOGIN_MIN_DURATION_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_LOGIN_MIN_DURATION_MS));

        for (name, value) in [
            ("CAREHUB_ACCESS_TOKEN_TTL_SECS", access_token_ttl),
            ("CAREHUB_REFRESH_TOKEN_TTL_SECS", refresh_token_ttl),
            ("CAREHUB_SESSION_SWEEP_INTERVAL_SECS", session_sweep_interval),
            ("CAREHUB_VERIFICATION_TTL_SECS", verification_ttl),
        ] {
            Self::check_duration(name, value)?;
        }

        if refresh_token_ttl < access_token_ttl {
            log::warn!(
                "Refresh token TTL ({:?}) is shorter than access token TTL ({:?})",
                refresh_token_ttl,
                access_token_ttl
            );
        }

        Ok(Self {
            host,
            port,
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            session_sweep_interval,
            verification_ttl,
            login_min_duration,
        })
    }

    /// Longest lifetime any token issued under this configuration can have
    pub fn max_token_ttl(&self) -> Duration {
        self.access_token_ttl.max(self.refresh_token_ttl)
    }
}

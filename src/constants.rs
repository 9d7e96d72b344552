// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const API_PREFIX: &str = "api";

// Token lifetimes
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 14 * 24 * 3600;
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

// Upper bound for every configured lifetime and interval
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

// Background maintenance
pub const DEFAULT_SESSION_SWEEP_INTERVAL_SECS: u64 = 24 * 3600;
pub const DEFAULT_EXPIRING_PURGE_INTERVAL_SECS: u64 = 300;

// Verification codes
pub const DEFAULT_VERIFICATION_TTL_SECS: u64 = 300;
pub const VERIFICATION_CODE_LENGTH: usize = 6;

// Registration
pub const MIN_PASSWORD_LENGTH: usize = 8;

// Expiring store key prefixes
pub const REVOCATION_KEY_PREFIX: &str = "jwt:revoked:";
pub const VERIFICATION_CODE_PREFIX: &str = "verification:code:";
pub const VERIFICATION_TOKEN_PREFIX: &str = "verification:token:";

// Authentication timing equalisation
pub const DEFAULT_LOGIN_MIN_DURATION_MS: u64 = 100;

// Memo attached to the guardian record created alongside a care subject
pub const CREATOR_GUARDIAN_MEMO: &str = "care subject creator";

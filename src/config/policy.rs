use chrono::Duration;
use std::env;

/// What happens when a login would push a user past the device cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLimitPolicy {
    /// Silently evict the oldest session to make room (default).
    EvictOldest,
    /// Refuse the login with `DeviceLimitExceeded`.
    Reject,
}

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub threshold: i32,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct DevicePolicy {
    pub cap: i64,
    pub on_limit: DeviceLimitPolicy,
}

#[derive(Debug, Clone)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
    pub reset_password: Duration,
    pub verify_email: Duration,
    pub two_factor_challenge: Duration,
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub history_depth: usize,
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct TotpPolicy {
    pub issuer: String,
    pub backup_code_count: usize,
    pub backup_code_length: usize,
}

/// Every tunable security constant in one typed place.
/// Defaults match the documented policy; env vars override individual knobs.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub lockout: LockoutPolicy,
    pub devices: DevicePolicy,
    pub tokens: TokenTtls,
    pub passwords: PasswordPolicy,
    pub totp: TotpPolicy,
    pub event_retention: Duration,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            lockout: LockoutPolicy {
                threshold: 5,
                duration: Duration::minutes(15),
            },
            devices: DevicePolicy {
                cap: 3,
                on_limit: DeviceLimitPolicy::EvictOldest,
            },
            tokens: TokenTtls {
                access: Duration::minutes(15),
                refresh: Duration::days(7),
                reset_password: Duration::hours(1),
                verify_email: Duration::hours(24),
                two_factor_challenge: Duration::minutes(5),
            },
            passwords: PasswordPolicy {
                min_length: 8,
                history_depth: 5,
                max_age: Duration::days(90),
            },
            totp: TotpPolicy {
                issuer: "Identity Platform".to_string(),
                backup_code_count: 10,
                backup_code_length: 8,
            },
            event_retention: Duration::days(365),
        }
    }
}

impl SecurityPolicy {
    pub fn from_env() -> Self {
        let mut policy = Self::default();

        if let Some(n) = env_i64("LOCKOUT_THRESHOLD") {
            policy.lockout.threshold = n as i32;
        }
        if let Some(n) = env_i64("LOCKOUT_DURATION_MINUTES") {
            policy.lockout.duration = Duration::minutes(n);
        }
        if let Some(n) = env_i64("DEVICE_SESSION_CAP") {
            policy.devices.cap = n;
        }
        if let Ok(v) = env::var("DEVICE_LIMIT_POLICY") {
            if v.eq_ignore_ascii_case("reject") {
                policy.devices.on_limit = DeviceLimitPolicy::Reject;
            }
        }
        if let Some(n) = env_i64("ACCESS_TOKEN_TTL_MINUTES") {
            policy.tokens.access = Duration::minutes(n);
        }
        if let Some(n) = env_i64("REFRESH_TOKEN_TTL_DAYS") {
            policy.tokens.refresh = Duration::days(n);
        }
        if let Some(n) = env_i64("PASSWORD_MAX_AGE_DAYS") {
            policy.passwords.max_age = Duration::days(n);
        }
        if let Ok(v) = env::var("TOTP_ISSUER") {
            policy.totp.issuer = v;
        }
        if let Some(n) = env_i64("SECURITY_EVENT_RETENTION_DAYS") {
            policy.event_retention = Duration::days(n);
        }

        policy
    }
}

fn env_i64(key: &str) -> Option<i64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

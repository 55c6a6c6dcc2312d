pub mod device_sessions;
pub mod events;
pub mod hashing;
pub mod jwt;
pub mod lockout;
pub mod password_policy;
pub mod rate_limit;
pub mod security;
pub mod sweeper;
pub mod tokens;
pub mod totp;
pub mod two_factor;

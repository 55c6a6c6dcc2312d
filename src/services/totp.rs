use rand::Rng;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm as TotpAlgorithm, TOTP};

use crate::modules::auth::interface::AuthError;

const STEP_SECONDS: u64 = 30;
const DIGITS: usize = 6;
// Accept the current step and one step either side (±1 step of skew).
const SKEW: u8 = 1;

// No 0/O/1/I so codes survive being read over the phone; alphabetic content
// keeps them visually distinct from 6-digit TOTP codes.
const BACKUP_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 20 random bytes, base32-encoded for storage and QR provisioning.
pub fn generate_secret() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 20];
    rng.fill(&mut bytes);
    base32::encode(base32::Alphabet::RFC4648 { padding: false }, &bytes)
}

/// otpauth URI for QR rendering; the rendering itself happens elsewhere.
pub fn provisioning_uri(secret: &str, account: &str, issuer: &str) -> String {
    let issuer = issuer.replace(' ', "%20");
    let account = account.replace(' ', "%20");
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}"
    )
}

fn totp_for(secret: &str) -> Result<TOTP, AuthError> {
    let bytes = base32::decode(base32::Alphabet::RFC4648 { padding: false }, secret)
        .ok_or_else(|| AuthError::Internal("stored TOTP secret is not valid base32".into()))?;

    TOTP::new(TotpAlgorithm::SHA1, DIGITS, SKEW, STEP_SECONDS, bytes)
        .map_err(|e| AuthError::Internal(format!("TOTP init error: {e}")))
}

pub fn check(secret: &str, code: &str) -> Result<bool, AuthError> {
    let totp = totp_for(secret)?;
    Ok(totp.check_current(code).unwrap_or(false))
}

pub fn check_at(secret: &str, code: &str, time: u64) -> Result<bool, AuthError> {
    let totp = totp_for(secret)?;
    Ok(totp.check(code, time))
}

pub fn generate_at(secret: &str, time: u64) -> Result<String, AuthError> {
    let totp = totp_for(secret)?;
    Ok(totp.generate(time))
}

pub fn generate_now(secret: &str) -> Result<String, AuthError> {
    let totp = totp_for(secret)?;
    totp.generate_current()
        .map_err(|e| AuthError::Internal(format!("system clock error: {e}")))
}

/// `count` unique codes of `length` chars each, drawn from a CSPRNG.
pub fn generate_backup_codes(count: usize, length: usize) -> Vec<String> {
    let mut rng = rand::rng();
    let mut codes = Vec::with_capacity(count);

    while codes.len() < count {
        let code: String = (0..length)
            .map(|_| {
                let idx = rng.random_range(0..BACKUP_CODE_CHARSET.len());
                BACKUP_CODE_CHARSET[idx] as char
            })
            .collect();
        if !codes.contains(&code) {
            codes.push(code);
        }
    }

    codes
}

/// Backup codes are stored as digests; comparison happens hash-to-hash.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

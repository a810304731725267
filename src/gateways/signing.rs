//! HMAC helpers shared by the gateway adapters.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

fn key_error(e: hmac::digest::InvalidLength) -> AppError {
    AppError::Internal(format!("invalid HMAC key: {e}"))
}

/// Lowercase hex HMAC-SHA256 of `data`.
pub fn hmac_sha256_hex(secret: &str, data: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(key_error)?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Lowercase hex HMAC-SHA512 of `data`.
pub fn hmac_sha512_hex(secret: &str, data: &str) -> Result<String, AppError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).map_err(key_error)?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex HMAC-SHA256 signature.
pub fn verify_sha256_hex(secret: &str, data: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(data.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time check of a hex HMAC-SHA512 signature. Case-insensitive hex.
pub fn verify_sha512_hex(secret: &str, data: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.to_ascii_lowercase()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(data.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

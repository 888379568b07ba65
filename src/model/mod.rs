pub mod admin;
pub mod auth;
pub mod candidate;
pub mod cascade;
pub mod category;
pub mod election;
pub mod id;
pub mod results;
pub mod vote;
pub mod voter;

use argon2::Config as Argon2Config;
use rand::Rng;

use crate::error::{Error, Result};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    // 16 bytes is the recommended salt length for argon2.
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    Ok(argon2::hash_encoded(
        password.as_bytes(),
        &salt,
        &Argon2Config::default(),
    )?)
}

/// Check a password against a stored hash. A malformed hash never verifies.
pub fn verify_password(hash: &str, password: &str) -> bool {
    argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false)
}

/// Reject blank display names.
pub fn require_name(name: &str, what: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        Err(Error::bad_request(format!("{what} name must not be empty")))
    } else {
        Ok(name.to_string())
    }
}

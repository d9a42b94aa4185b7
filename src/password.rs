//! Password hashing with PBKDF2-HMAC-SHA256.
//!
//! Stored format: `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`.
//! The iteration count travels with the hash so it can be raised later
//! without invalidating existing accounts.

use anyhow::{bail, Context, Result};
use sha2::Sha256;

const SCHEME: &str = "pbkdf2-sha256";
pub const DEFAULT_ITERATIONS: u32 = 210_000;
const HASH_LEN: usize = 32;

/// Hash `password` with a fresh random salt.
pub fn hash_with_iterations(password: &str, iterations: u32) -> Result<String> {
    if iterations == 0 {
        bail!("iterations must be > 0");
    }
    let salt = uuid::Uuid::new_v4();
    let hash = derive(password.as_bytes(), salt.as_bytes(), iterations);
    Ok(format!(
        "{}${}${}${}",
        SCHEME,
        iterations,
        hex::encode(salt.as_bytes()),
        hex::encode(hash)
    ))
}

/// Check `password` against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    verify_inner(password, stored).unwrap_or(false)
}

fn verify_inner(password: &str, stored: &str) -> Result<bool> {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        bail!("malformed password hash");
    };
    if scheme != SCHEME {
        bail!("unsupported password scheme {}", scheme);
    }
    let iterations: u32 = iterations.parse().context("bad iteration count")?;
    let salt = hex::decode(salt).context("bad salt")?;
    let expected = hex::decode(expected).context("bad hash")?;

    if iterations == 0 {
        bail!("bad iteration count");
    }
    let actual = derive(password.as_bytes(), &salt, iterations);
    Ok(constant_time_eq(&actual, &expected))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

//! RFC 6238 TOTP code derivation and verification.
//!
//! The protocol parameters are fixed: HMAC-SHA1 (via `ring::hmac`),
//! 6-digit codes, 30-second time steps. Authenticator apps default to
//! exactly this profile.

use ring::hmac;

use crate::error::OtpError;
use crate::secret::TotpSecret;

// ── Constants ───────────────────────────────────────────────────────

/// TOTP period in seconds (RFC 6238 §4). Fixed protocol parameter.
pub const PERIOD_SECONDS: u64 = 30;

/// Number of decimal digits in a code.
pub const CODE_DIGITS: usize = 6;

/// Default validation window in time steps (±1, RFC 6238 §5.2).
pub const DRIFT_WINDOW: u32 = 1;

/// Truncation modulus: 10^6.
const CODE_MODULUS: u32 = 1_000_000;

/// Constant-time byte comparison for OTP codes.
///
/// Returns `true` iff both slices have equal length and identical contents.
/// Uses bitwise OR accumulation to avoid short-circuit timing leaks.
///
/// Note: The early return on length mismatch is acceptable for OTP codes
/// because the expected digit count (6) is public information — it is not
/// secret. The constant-time property protects the *code value*, not its
/// length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Whether `code` has the shape of a TOTP code: exactly 6 ASCII digits.
///
/// Callers should reject malformed input before attempting verification;
/// a well-formed-but-wrong code and a malformed code are different
/// failures to the user.
#[must_use]
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

// ── Derivation (RFC 6238 over RFC 4226) ─────────────────────────────

/// Map a Unix timestamp to its 30-second time step (RFC 6238 §4).
const fn time_step(timestamp: u64) -> u64 {
    // PERIOD_SECONDS is a non-zero constant.
    #[allow(clippy::arithmetic_side_effects)]
    {
        timestamp / PERIOD_SECONDS
    }
}

/// Derive the 6-digit code for `secret` at `timestamp`.
///
/// Deterministic: any two timestamps within the same 30-second step yield
/// the identical code.
///
/// 1. `step = floor(timestamp / 30)`, encoded as 8 bytes big-endian.
/// 2. `digest = HMAC-SHA1(secret, step_bytes)` — 20 bytes.
/// 3. Dynamic truncation (RFC 4226 §5.3): `offset = digest[19] & 0x0F`,
///    read 4 bytes from `offset`, mask the sign bit of the first.
/// 4. Reduce mod 10^6, format zero-padded to 6 characters.
///
/// # Errors
///
/// Returns [`OtpError::Otp`] if the secret is empty.
#[must_use = "OTP code should be used or stored"]
pub fn derive_code(secret: &TotpSecret, timestamp: u64) -> Result<String, OtpError> {
    derive_code_at_step(secret, time_step(timestamp))
}

/// Derive the code for an explicit time-step counter.
///
/// # Errors
///
/// Returns [`OtpError::Otp`] if the secret is empty.
fn derive_code_at_step(secret: &TotpSecret, step: u64) -> Result<String, OtpError> {
    if secret.is_empty() {
        return Err(OtpError::Otp("secret must not be empty".to_owned()));
    }

    // HMAC(K, C) where C is the step as 8-byte big-endian (RFC 4226 §5.2).
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret.expose());
    let step_bytes = step.to_be_bytes();
    let tag = hmac::sign(&key, &step_bytes);
    let digest = tag.as_ref();

    // Dynamic Truncation (RFC 4226 §5.3).
    // offset = low-order 4 bits of the last byte.
    let offset = usize::from(digest[digest.len().wrapping_sub(1)] & 0x0F);

    // Extract 4 bytes starting at offset, mask the high bit (0x7FFFFFFF).
    let binary_code = u32::from_be_bytes([
        digest[offset] & 0x7F,
        digest[offset.wrapping_add(1)],
        digest[offset.wrapping_add(2)],
        digest[offset.wrapping_add(3)],
    ]);

    // code = binary_code mod 10^6. CODE_MODULUS is never zero.
    #[allow(clippy::arithmetic_side_effects)]
    let code = binary_code % CODE_MODULUS;

    Ok(format!("{code:06}"))
}

// ── Verification ────────────────────────────────────────────────────

/// Verify `submitted` against `secret` at `timestamp` with a ±`window`
/// time-step tolerance (window 1 tolerates ±30 s of clock drift).
///
/// Every candidate step in the window is derived and compared in constant
/// time, without short-circuiting on a match, so the position of a match
/// within the window is not observable. Saturating arithmetic keeps the
/// scan inside `u64` bounds (at step 0 the window is {0, 1}).
///
/// # Errors
///
/// Returns [`OtpError::Otp`] if the secret is empty.
#[must_use = "validation result should be checked"]
pub fn verify_code(
    submitted: &str,
    secret: &TotpSecret,
    timestamp: u64,
    window: u32,
) -> Result<bool, OtpError> {
    let step = time_step(timestamp);
    let start = step.saturating_sub(u64::from(window));
    let end = step.saturating_add(u64::from(window));

    let mut valid = false;
    let mut candidate = start;
    loop {
        let expected = derive_code_at_step(secret, candidate)?;
        if constant_time_eq(expected.as_bytes(), submitted.as_bytes()) {
            valid = true;
        }
        if candidate == end {
            break;
        }
        candidate = candidate.wrapping_add(1);
    }

    Ok(valid)
}

// ── Tests ───────────────────────────────────────────────────────────

//! Error types for `tessera-otp-core`.

use thiserror::Error;

/// Errors produced by the TOTP engine.
#[derive(Debug, Error)]
pub enum OtpError {
    /// CSPRNG failure during secret generation — fatal, non-recoverable.
    #[error("secure random source failed: {0}")]
    Rng(String),

    /// Engine misuse (empty secret, zero-length secret request).
    #[error("OTP error: {0}")]
    Otp(String),
}

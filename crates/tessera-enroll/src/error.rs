//! Enrollment error types for `tessera-enroll`.

use thiserror::Error;
use tessera_otp_core::OtpError;

/// Errors produced by enrollment operations.
///
/// Everything except `Otp` (CSPRNG exhaustion) is recoverable and meant to
/// be translated into a user-facing message by the request layer. A failed
/// verification never mutates stored state.
#[derive(Debug, Error)]
pub enum EnrollError {
    /// Engine failure (delegated from `tessera-otp-core`).
    #[error(transparent)]
    Otp(#[from] OtpError),

    /// Two-factor auth is already enabled; re-setup requires `force`.
    #[error("two-factor auth is already enabled for this user")]
    AlreadyEnabled,

    /// No pending secret to confirm — setup has not run, or was reset.
    #[error("no pending two-factor setup found for this user")]
    NoPendingSecret,

    /// Login verification requested for a user without enabled 2FA.
    #[error("two-factor auth is not enabled for this user")]
    NotEnabled,

    /// Submitted code did not match any code in the drift window.
    #[error("invalid code")]
    InvalidCode,

    /// Submitted code is not 6 ASCII digits.
    #[error("code must be exactly 6 digits")]
    MalformedCode,

    /// Stored state violates an invariant (e.g. enabled without a usable
    /// secret). Surfaced for diagnosis, never silently repaired.
    #[error("inconsistent enrollment state: {0}")]
    InconsistentState(String),

    /// The external user store failed.
    #[error("store error: {0}")]
    Store(String),
}
